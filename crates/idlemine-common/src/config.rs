use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::AlgorithmTable;
use crate::error::{MineError, Result};

/// Per-algorithm figures fed to the profitability comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmRate {
    /// Hash rate in the unit the comparison site expects for this algorithm.
    #[serde(alias = "hash-rate")]
    pub hash_rate: u64,
    /// Power draw in watts.
    pub power: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitabilityConfig {
    /// GPU model short name → number of cards.
    #[serde(default)]
    pub gpus: BTreeMap<String, u32>,

    #[serde(default)]
    pub algos: BTreeMap<String, AlgorithmRate>,

    #[serde(default = "default_power_cost")]
    pub power_cost_per_kwh: f64,
}

fn default_power_cost() -> f64 {
    0.1
}

impl Default for ProfitabilityConfig {
    fn default() -> Self {
        Self {
            gpus: BTreeMap::new(),
            algos: BTreeMap::new(),
            power_cost_per_kwh: default_power_cost(),
        }
    }
}

/// Contents of the optional JSON config file. Loaded once at startup.
///
/// Older deployments kept these inputs in a YAML file shaped
/// `{gpus, algos: {<id>: {hash-rate, power}}, general: {power_cost_per_kwh}}`. That file
/// is not read directly; carry it over as:
///
/// - `gpus` → `profitability.gpus`
/// - `algos` → `profitability.algos` (`hash-rate` is accepted as well as `hash_rate`)
/// - `general.power_cost_per_kwh` → `profitability.power_cost_per_kwh`
/// - `general.polling_frequency` (minutes) → `--watchdog-interval-secs` (seconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Additions to, or replacements for, the built-in miner flag table.
    #[serde(default)]
    pub miner_flags: BTreeMap<String, String>,

    #[serde(default)]
    pub profitability: ProfitabilityConfig,
}

impl MinerConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: MinerConfig =
            serde_json::from_str(text).map_err(|e| MineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            MineError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn algorithm_table(&self) -> AlgorithmTable {
        AlgorithmTable::with_overrides(&self.miner_flags)
    }

    fn validate(&self) -> Result<()> {
        if let Some((id, _)) = self.miner_flags.iter().find(|(_, f)| f.trim().is_empty()) {
            return Err(MineError::Config(format!("empty miner flag for {id:?}")));
        }
        let cost = self.profitability.power_cost_per_kwh;
        if !cost.is_finite() || cost < 0.0 {
            return Err(MineError::Config(format!("invalid power_cost_per_kwh {cost}")));
        }
        Ok(())
    }
}
