use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(long, env = "IDLEMINE_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// JSON file with miner flag overrides and profitability inputs.
    #[arg(long, env = "CONFIG_PATH")]
    pub config_path: Option<String>,

    /// User that submits, queries and cancels the mining jobs.
    #[arg(long, env = "IDLEMINE_JOB_USER", default_value = "root")]
    pub job_user: String,

    /// User that reads node inventory and runs health checks.
    #[arg(long, env = "IDLEMINE_ADMIN_USER", default_value = "root")]
    pub admin_user: String,

    #[arg(long, env = "IDLEMINE_COMMAND_TIMEOUT_SECS", default_value_t = 30)]
    pub command_timeout_secs: u64,

    #[arg(long, env = "IDLEMINE_HEALTH_TIMEOUT_SECS", default_value_t = 5)]
    pub health_timeout_secs: u64,

    #[arg(long, env = "IDLEMINE_SELECTOR_TIMEOUT_SECS", default_value_t = 30)]
    pub selector_timeout_secs: u64,

    /// Pause between cancelling and resubmitting during a restart.
    #[arg(long, env = "IDLEMINE_SETTLE_DELAY_SECS", default_value_t = 10)]
    pub settle_delay_secs: u64,

    /// Restart period for the running session. 0 disables the watchdog.
    #[arg(long, env = "IDLEMINE_WATCHDOG_INTERVAL_SECS", default_value_t = 3600)]
    pub watchdog_interval_secs: u64,

    /// Skip the profitability lookup and always mine this algorithm.
    #[arg(long, env = "IDLEMINE_FIXED_ALGORITHM")]
    pub fixed_algorithm: Option<String>,

    #[arg(long, env = "IDLEMINE_WHATTOMINE_URL", default_value = "https://whattomine.com/coins")]
    pub whattomine_url: String,

    #[arg(long, env = "IDLEMINE_GPU_IMAGE", default_value = idlemine_scheduler::DEFAULT_GPU_IMAGE)]
    pub gpu_image: String,

    #[arg(long, env = "IDLEMINE_CPU_IMAGE", default_value = idlemine_scheduler::DEFAULT_CPU_IMAGE)]
    pub cpu_image: String,

    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "OTEL_EXPORTER_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}

impl Args {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn watchdog_interval(&self) -> Option<Duration> {
        (self.watchdog_interval_secs > 0).then(|| Duration::from_secs(self.watchdog_interval_secs))
    }
}
