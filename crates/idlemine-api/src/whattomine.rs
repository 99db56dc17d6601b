use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use idlemine_common::{MineError, ProfitabilityConfig, Result};
use idlemine_scheduler::AlgorithmSelector;

const ALGO_CODES: &[(&str, &str)] = &[
    ("beamv3", "eqb"),
    ("cuckoocycle", "cc"),
    ("cuckatoo32", "ct32"),
    ("etchash", "etc"),
    ("ethash", "eth"),
    ("kawpow", "kpw"),
    ("kheavyhash", "hh"),
    ("octopus", "ops"),
    ("zelhash", "zlh"),
    ("zhash", "zh"),
];

const GPU_CODES: &[(&str, &str)] = &[
    ("amd69xt", "69xt"),
    ("amd68xt", "68xt"),
    ("amd67xt", "67xt"),
    ("amd66xt", "66xt"),
    ("vii", "vii"),
    ("amd5700xt", "5700xt"),
    ("amd5700", "5700"),
    ("amd5600xt", "5600xt"),
    ("vega64", "vega64"),
    ("vega56", "vega56"),
    ("nvi4090", "4090"),
    ("nvi4080", "4080"),
    ("nvi47Ti", "47Ti"),
    ("nvi47", "47"),
    ("nvi39Ti", "39Ti"),
    ("nvi3090", "3090"),
    ("nvi38Ti", "38Ti"),
    ("nvi3080", "3080"),
    ("nvi37Ti", "37Ti"),
    ("nvi3070", "3070"),
];

const EXCHANGES: &[&str] = &[
    "", "binance", "bitfinex", "bitforex", "bittrex", "coinex", "exmo", "gate", "graviex",
    "hitbtc", "ogre", "poloniex", "stex",
];

const MARKER: &str = "Nicehash-";

fn code_for(table: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    table.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
}

/// Asks whattomine.com which NiceHash algorithm currently earns the most for the
/// configured fleet.
#[derive(Debug, Clone)]
pub struct WhatToMineSelector {
    http: Client,
    query_url: String,
}

impl WhatToMineSelector {
    pub fn new(http: Client, base_url: &str, config: &ProfitabilityConfig) -> Result<Self> {
        if config.gpus.is_empty() || config.algos.is_empty() {
            return Err(MineError::Config(
                "profitability lookup needs at least one gpu and one algorithm".to_string(),
            ));
        }
        Ok(Self {
            http,
            query_url: build_query_url(base_url, config)?,
        })
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }
}

#[async_trait]
impl AlgorithmSelector for WhatToMineSelector {
    async fn best_algorithm(&self) -> anyhow::Result<String> {
        let body = self
            .http
            .get(&self.query_url)
            .send()
            .await
            .context("whattomine request failed")?
            .error_for_status()
            .context("whattomine answered with an error")?
            .text()
            .await
            .context("failed to read whattomine response")?;

        let algorithm = extract_best_algorithm(&body)
            .ok_or_else(|| anyhow!("no {MARKER} entry in whattomine response"))?;
        debug!(%algorithm, "whattomine ranking");
        Ok(algorithm)
    }

    fn name(&self) -> &'static str {
        "whattomine"
    }
}

/// Comparison query for the configured cards, per-algorithm figures and power price.
pub fn build_query_url(base_url: &str, config: &ProfitabilityConfig) -> Result<String> {
    let mut url = format!("{}?", base_url.trim_end_matches('?'));

    for (gpu, count) in &config.gpus {
        let code = code_for(GPU_CODES, gpu)
            .ok_or_else(|| MineError::Config(format!("unknown gpu model {gpu:?}")))?;
        if *count > 0 {
            let _ = write!(url, "aq_{code}={count}&a_{code}=true&");
        } else {
            let _ = write!(url, "aq_{code}=0&");
        }
    }

    for (algo, rate) in &config.algos {
        let code = code_for(ALGO_CODES, algo)
            .ok_or_else(|| MineError::Config(format!("unknown algorithm {algo:?}")))?;
        let _ = write!(
            url,
            "&{code}=true&factor%5B{code}_hr%5D={}&factor%5B{code}_p%5D={}",
            rate.hash_rate, rate.power
        );
    }

    let _ = write!(
        url,
        "&factor%5Bcost%5D={:.6}&factor%5Bcost_currency%5D+USD&sort=Revenue&volume=0&revenue=24h",
        config.power_cost_per_kwh
    );
    for exchange in EXCHANGES {
        let _ = write!(url, "&factor%5Bexchanges%5D%5B%5D={exchange}");
    }
    url.push_str("&dataset=Main&commit=Calculate");
    Ok(url)
}

/// The page lists rows best-first; the first `Nicehash-<Algo>` names the winner.
pub fn extract_best_algorithm(page: &str) -> Option<String> {
    let start = page.find(MARKER)? + MARKER.len();
    let name: String = page[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

pub fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(3))
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}
