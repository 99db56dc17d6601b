use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MineError, Result};

/// Appended to a canonical algorithm id to get its stratum pool.
pub const POOL_SUFFIX: &str = ".auto.nicehash.com:443";

const CPU_MINER_FLAG: &str = "rx/0";
const CPU_POOL: &str = "randomxmonero.auto.nicehash.com:443";

/// Canonical algorithm id → GPU miner `--algo` flag.
const DEFAULT_MINER_FLAGS: &[(&str, &str)] = &[
    ("autolykos", "autolykos"),
    ("beamv3", "beamhash"),
    ("cuckoocycle", "cuckoocycle"),
    ("cuckatoo32", "cuckatoo32"),
    ("etchash", "etchash"),
    ("ethash", "ethash"),
    ("kawpow", "kawpow"),
    ("kheavyhash", "kheavyhash"),
    ("octopus", "octopus"),
    ("zelhash", "equihash125_4"),
    ("zhash", "equihash144_5"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmChoice {
    pub id: String,
    pub miner_flag: String,
    pub pool_address: String,
}

impl AlgorithmChoice {
    /// The CPU track always mines RandomX regardless of GPU profitability.
    pub fn cpu() -> Self {
        Self {
            id: "randomxmonero".to_string(),
            miner_flag: CPU_MINER_FLAG.to_string(),
            pool_address: CPU_POOL.to_string(),
        }
    }
}

/// Static id → miner flag dictionary, fixed once the process has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmTable {
    flags: BTreeMap<String, String>,
}

impl Default for AlgorithmTable {
    fn default() -> Self {
        Self {
            flags: DEFAULT_MINER_FLAGS
                .iter()
                .map(|(id, flag)| (id.to_string(), flag.to_string()))
                .collect(),
        }
    }
}

impl AlgorithmTable {
    /// Built-in table with entries from `overrides` added or replaced.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut table = Self::default();
        for (id, flag) in overrides {
            table.flags.insert(canonical_id(id), flag.trim().to_string());
        }
        table
    }

    pub fn miner_flag(&self, id: &str) -> Option<&str> {
        self.flags.get(&canonical_id(id)).map(String::as_str)
    }

    /// Map an algorithm id reported by the selector to a concrete miner invocation.
    pub fn resolve(&self, id: &str) -> Result<AlgorithmChoice> {
        let id = canonical_id(id);
        if id.is_empty() {
            return Err(MineError::UpstreamUnavailable(
                "selector returned an empty algorithm id".to_string(),
            ));
        }
        let miner_flag = self.flags.get(&id).ok_or_else(|| {
            MineError::UpstreamUnavailable(format!("no miner flag known for algorithm {id:?}"))
        })?;
        Ok(AlgorithmChoice {
            pool_address: format!("{id}{POOL_SUFFIX}"),
            miner_flag: miner_flag.clone(),
            id,
        })
    }
}

fn canonical_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}
