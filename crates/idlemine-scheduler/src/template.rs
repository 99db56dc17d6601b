use idlemine_common::{AlgorithmChoice, MineError, ReplicaPlan, Result};

use crate::slurm::QOS_NAME;

pub const DEFAULT_GPU_IMAGE: &str = "registry-1.deepsquare.run#library/gminer";
pub const DEFAULT_CPU_IMAGE: &str = "registry-1.deepsquare.run#library/xmrig";

/// One GPU, one core per task; `replicas` tasks spread by the scheduler.
const GPU_TEMPLATE: &str = r#"#!/bin/bash
#SBATCH --ntasks={{replicas}}
#SBATCH --gpus-per-task=1
#SBATCH --cpus-per-task=1
#SBATCH --mem-per-cpu=8G
#SBATCH --qos={{qos}}

cont='{{image}}'

srun --ntasks={{replicas}} --gpus-per-task=1 --cpus-per-task=1 --container-image="$cont" \
  bash -c "miner --algo {{miner_flag}} --server {{pool}} --proto stratum --ssl 1 --user {{wallet}} --pass x"
"#;

/// One task per node, each with `cores` CPUs.
const CPU_TEMPLATE: &str = r#"#!/bin/bash
#SBATCH --nodes={{nodes}}
#SBATCH --ntasks-per-node=1
#SBATCH --cpus-per-task={{cores}}
#SBATCH --mem-per-cpu=1G
#SBATCH --qos={{qos}}

cont='{{image}}'

srun --nodes={{nodes}} --ntasks-per-node=1 --cpus-per-task={{cores}} --container-image="$cont" \
  bash -c "xmrig --algo {{miner_flag}} --url {{pool}} --tls --user {{wallet}} --pass x --threads {{cores}}"
"#;

/// Submission script bodies for the two tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedJobs {
    pub gpu: String,
    pub cpu: String,
}

#[derive(Debug, Clone)]
pub struct JobTemplates {
    gpu_image: String,
    cpu_image: String,
}

impl Default for JobTemplates {
    fn default() -> Self {
        Self::new(DEFAULT_GPU_IMAGE, DEFAULT_CPU_IMAGE)
    }
}

impl JobTemplates {
    pub fn new(gpu_image: impl Into<String>, cpu_image: impl Into<String>) -> Self {
        Self {
            gpu_image: gpu_image.into(),
            cpu_image: cpu_image.into(),
        }
    }

    pub fn render(
        &self,
        wallet: &str,
        gpu: &AlgorithmChoice,
        cpu: &AlgorithmChoice,
        plan: &ReplicaPlan,
    ) -> Result<RenderedJobs> {
        let replicas = plan.gpu_replicas().to_string();
        let gpu_body = render(
            GPU_TEMPLATE,
            &[
                ("replicas", replicas.as_str()),
                ("qos", QOS_NAME),
                ("image", self.gpu_image.as_str()),
                ("miner_flag", gpu.miner_flag.as_str()),
                ("pool", gpu.pool_address.as_str()),
                ("wallet", wallet),
            ],
        )?;

        let nodes = plan.node_count().to_string();
        let cores = plan.cpu_cores_per_task().to_string();
        let cpu_body = render(
            CPU_TEMPLATE,
            &[
                ("nodes", nodes.as_str()),
                ("cores", cores.as_str()),
                ("qos", QOS_NAME),
                ("image", self.cpu_image.as_str()),
                ("miner_flag", cpu.miner_flag.as_str()),
                ("pool", cpu.pool_address.as_str()),
                ("wallet", wallet),
            ],
        )?;

        Ok(RenderedJobs {
            gpu: gpu_body,
            cpu: cpu_body,
        })
    }
}

/// Substitute `{{name}}` markers. An unclosed marker or a name missing from `vars` is a
/// template bug and fails the render.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| MineError::Template(format!("unclosed placeholder near {:?}", truncate(after))))?;
        let key = after[..end].trim();
        let value = vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| MineError::Template(format!("no value for placeholder {key:?}")))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(24) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
