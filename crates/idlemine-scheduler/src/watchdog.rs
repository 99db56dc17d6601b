use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use idlemine_common::MineError;

use crate::orchestrator::Orchestrator;

/// Periodically restart the running session so it follows the most profitable algorithm.
///
/// The first tick is skipped: a session started moments ago does not need a restart.
/// Failures are logged and left to the next tick.
pub async fn watchdog_loop(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!("watchdog started (interval={}s)", interval.as_secs());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        match orchestrator.restart(&shutdown).await {
            Ok(jobs) => info!(
                algorithm = %jobs.algorithm,
                gpu_job = %jobs.gpu_job,
                cpu_job = %jobs.cpu_job,
                "watchdog restarted miners"
            ),
            Err(MineError::NoOp(_)) => debug!("watchdog tick, nothing running"),
            Err(MineError::Shutdown) => break,
            Err(e) => warn!(error = %e, code = e.code(), "watchdog restart failed"),
        }
    }

    info!("watchdog stopped");
}
