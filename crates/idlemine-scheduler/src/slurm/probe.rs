use idlemine_common::{ClusterCapacity, CommandClass, MineError, Result};

use super::Slurm;

const NODE_LISTING: &str = "scontrol show nodes";
const TRES_MARKER: &str = "CfgTRES=";
const NODE_MARKER: &str = "NodeName=";

impl Slurm {
    /// Total configured GPUs across all nodes.
    pub async fn find_max_gpu(&self) -> Result<u32> {
        let out = self.node_listing().await?;
        sum_tres(&out, gpu_count)
    }

    /// Total configured CPU cores across all nodes.
    pub async fn find_max_cpu(&self) -> Result<u32> {
        let out = self.node_listing().await?;
        sum_tres(&out, cpu_count)
    }

    pub async fn find_max_node(&self) -> Result<u32> {
        let out = self.node_listing().await?;
        count_nodes(&out)
    }

    /// Probe all three dimensions. Never cached: every planning cycle sees the
    /// cluster as it is now.
    pub async fn probe_capacity(&self) -> Result<ClusterCapacity> {
        let max_gpu = self.find_max_gpu().await?;
        let max_cpu = self.find_max_cpu().await?;
        let max_node = self.find_max_node().await?;
        let capacity = ClusterCapacity {
            max_gpu,
            max_cpu,
            max_node,
        };
        tracing::info!(max_gpu, max_cpu, max_node, "probed cluster capacity");
        Ok(capacity)
    }

    async fn node_listing(&self) -> Result<String> {
        self.exec(&self.admin_user, NODE_LISTING, CommandClass::NodeListing)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "node listing failed"))
    }
}

fn sum_tres(output: &str, extract: fn(&str) -> Result<u32>) -> Result<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(TRES_MARKER))
        .try_fold(0u32, |acc, tres| -> Result<u32> {
            Ok(acc.saturating_add(extract(tres)?))
        })
}

fn count_nodes(output: &str) -> Result<u32> {
    let nodes = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains(NODE_MARKER))
        .count();
    if nodes == 0 {
        return Err(MineError::Parse {
            class: CommandClass::NodeListing,
            line: String::new(),
            reason: "no nodes reported".to_string(),
        });
    }
    Ok(u32::try_from(nodes).unwrap_or(u32::MAX))
}

/// `cpu=N` is always present in a node's configured TRES.
fn cpu_count(tres: &str) -> Result<u32> {
    let value = tres_fields(tres)
        .find(|(key, _)| *key == "cpu")
        .map(|(_, value)| value)
        .ok_or_else(|| parse_error(tres, "missing cpu count"))?;
    parse_count(tres, value)
}

/// `gres/gpu=N`, or the typed `gres/gpu:<model>=N` entries when no total is listed.
/// Nodes without GPUs contribute zero.
fn gpu_count(tres: &str) -> Result<u32> {
    if let Some((_, value)) = tres_fields(tres).find(|(key, _)| *key == "gres/gpu") {
        return parse_count(tres, value);
    }
    tres_fields(tres)
        .filter(|(key, _)| key.starts_with("gres/gpu:"))
        .try_fold(0u32, |acc, (_, value)| -> Result<u32> {
            Ok(acc.saturating_add(parse_count(tres, value)?))
        })
}

fn tres_fields(tres: &str) -> impl Iterator<Item = (&str, &str)> {
    tres.split(',')
        .filter_map(|field| field.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
}

fn parse_count(line: &str, value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|e| parse_error(line, &format!("{value:?} is not a count: {e}")))
}

fn parse_error(line: &str, reason: &str) -> MineError {
    MineError::Parse {
        class: CommandClass::NodeListing,
        line: line.to_string(),
        reason: reason.to_string(),
    }
}
