mod args;
mod handlers;
mod shutdown;
mod state;
mod whattomine;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use idlemine_common::{telemetry::init_tracing, MinerConfig};
use idlemine_scheduler::{
    watchdog_loop, AlgorithmSelector, FixedAlgorithm, JobTemplates, Orchestrator,
    OrchestratorConfig, ShellRunner, Slurm,
};

use crate::args::Args;
use crate::state::AppState;
use crate::whattomine::{http_client, WhatToMineSelector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let telemetry = init_tracing(
        "idlemine",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
    );
    info!(exporting = telemetry.exporting(), "idlemine starting");

    let config = match &args.config_path {
        Some(path) => MinerConfig::load(path).await?,
        None => MinerConfig::default(),
    };
    let algorithms = config.algorithm_table();

    let selector: Arc<dyn AlgorithmSelector> = match &args.fixed_algorithm {
        Some(id) => {
            algorithms.resolve(id)?;
            info!(algorithm = %id, "profitability lookup disabled");
            Arc::new(FixedAlgorithm(id.clone()))
        }
        None => {
            let selector = WhatToMineSelector::new(
                http_client(args.selector_timeout())?,
                &args.whattomine_url,
                &config.profitability,
            )?;
            info!(url = selector.query_url(), "using whattomine for algorithm selection");
            Arc::new(selector)
        }
    };

    let slurm = Slurm::new(Arc::new(ShellRunner::new()), args.admin_user.clone())
        .with_timeouts(args.command_timeout(), args.health_timeout());
    let orchestrator = Arc::new(Orchestrator::new(
        slurm,
        selector,
        algorithms,
        JobTemplates::new(args.gpu_image.clone(), args.cpu_image.clone()),
        OrchestratorConfig {
            job_user: args.job_user.clone(),
            settle_delay: args.settle_delay(),
            selector_timeout: args.selector_timeout(),
        },
    ));

    let shutdown = shutdown::install_shutdown_handler()?;

    let watchdog = match args.watchdog_interval() {
        Some(interval) => Some(tokio::spawn(watchdog_loop(
            orchestrator.clone(),
            interval,
            shutdown.clone(),
        ))),
        None => {
            info!("watchdog disabled");
            None
        }
    };

    let app = handlers::router(AppState { orchestrator });
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    info!(addr = %args.listen_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait(shutdown.clone()))
        .await?;

    if let Some(handle) = watchdog {
        if let Err(e) = handle.await {
            warn!(error = %e, "watchdog task ended abnormally");
        }
    }
    telemetry.shutdown();
    Ok(())
}
