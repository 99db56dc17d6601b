use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use idlemine_common::{
    AlgorithmChoice, AlgorithmTable, JobHandle, MineError, MiningJobSpec, ReplicaPlan, Result,
    SessionStatus, StartedJobs, Track,
};

use crate::planner::build_plan;
use crate::selector::AlgorithmSelector;
use crate::slurm::Slurm;
use crate::template::JobTemplates;

/// Time the scheduler needs to release a cancelled allocation before we submit again.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

const DEFAULT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_WALLET_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// UNIX user that owns, queries and cancels the mining jobs.
    pub job_user: String,
    pub settle_delay: Duration,
    pub selector_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_user: "root".to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            selector_timeout: DEFAULT_SELECTOR_TIMEOUT,
        }
    }
}

/// What the last successful start asked for. `running` is the operator's intent, so it
/// survives a failed watchdog restart and the next tick tries again.
#[derive(Debug, Default)]
struct OrchestratorState {
    last_wallet_id: String,
    last_usage: f64,
    running: bool,
    algorithm: Option<String>,
    plan: Option<ReplicaPlan>,
    gpu_job: Option<JobHandle>,
    cpu_job: Option<JobHandle>,
    started_at: Option<DateTime<Utc>>,
}

impl OrchestratorState {
    fn record(&mut self, wallet_id: &str, usage: f64, launched: &Launched) {
        self.last_wallet_id = wallet_id.to_string();
        self.last_usage = usage;
        self.running = true;
        self.algorithm = Some(launched.algorithm.id.clone());
        self.plan = Some(launched.plan);
        self.gpu_job = Some(launched.gpu_job.clone());
        self.cpu_job = Some(launched.cpu_job.clone());
        self.started_at = Some(Utc::now());
    }

    fn snapshot(&self) -> SessionStatus {
        if !self.running {
            return SessionStatus::default();
        }
        SessionStatus {
            running: true,
            wallet_id: Some(self.last_wallet_id.clone()),
            usage: Some(self.last_usage),
            algorithm: self.algorithm.clone(),
            plan: self.plan,
            gpu_job: self.gpu_job.clone(),
            cpu_job: self.cpu_job.clone(),
            started_at: self.started_at,
        }
    }
}

struct Launched {
    plan: ReplicaPlan,
    algorithm: AlgorithmChoice,
    gpu_job: JobHandle,
    cpu_job: JobHandle,
}

impl Launched {
    fn started_jobs(&self) -> StartedJobs {
        StartedJobs {
            gpu_job: self.gpu_job.clone(),
            cpu_job: self.cpu_job.clone(),
            algorithm: self.algorithm.id.clone(),
        }
    }
}

/// Owns the mining session. Start, stop and restart all hold the same lock for their
/// whole duration, so they never interleave within this process.
pub struct Orchestrator {
    slurm: Slurm,
    selector: Arc<dyn AlgorithmSelector>,
    algorithms: AlgorithmTable,
    templates: JobTemplates,
    config: OrchestratorConfig,
    state: Mutex<OrchestratorState>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("slurm", &self.slurm)
            .field("selector", &self.selector.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        slurm: Slurm,
        selector: Arc<dyn AlgorithmSelector>,
        algorithms: AlgorithmTable,
        templates: JobTemplates,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            slurm,
            selector,
            algorithms,
            templates,
            config,
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    /// Start both mining tracks for `wallet_id` at `usage` of the cluster.
    ///
    /// `usage` is the raw request text. It is parsed only after the running-job check, so
    /// a busy cluster answers `Conflict` whatever the request carried.
    pub async fn start(&self, wallet_id: &str, usage: &str) -> Result<StartedJobs> {
        let mut state = self.state.lock().await;

        self.ensure_not_running().await?;
        let wallet_id = validate_wallet(wallet_id)?;
        let usage = parse_usage(usage)?;

        let launched = self.launch(wallet_id, usage).await?;
        state.record(wallet_id, usage, &launched);
        info!(
            wallet = wallet_id,
            usage,
            algorithm = %launched.algorithm.id,
            gpu_job = %launched.gpu_job,
            cpu_job = %launched.cpu_job,
            "mining started"
        );
        Ok(launched.started_jobs())
    }

    /// Cancel both tracks. The session is cleared only when neither cancel failed;
    /// a track that was already gone counts as stopped.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.cancel_all().await?;
        *state = OrchestratorState::default();
        info!("mining stopped");
        Ok(())
    }

    /// Stop, let the scheduler settle, and start again with the stored wallet and usage
    /// and a freshly selected algorithm.
    pub async fn restart(&self, shutdown: &CancellationToken) -> Result<StartedJobs> {
        let mut state = self.state.lock().await;
        if !state.running {
            return Err(MineError::NoOp("no mining session is running".to_string()));
        }

        self.cancel_all().await?;
        state.gpu_job = None;
        state.cpu_job = None;

        tokio::select! {
            _ = tokio::time::sleep(self.config.settle_delay) => {}
            _ = shutdown.cancelled() => {
                warn!("shutdown during restart settle delay, jobs left stopped");
                return Err(MineError::Shutdown);
            }
        }

        let wallet_id = state.last_wallet_id.clone();
        let usage = state.last_usage;
        match self.launch(&wallet_id, usage).await {
            Ok(launched) => {
                state.record(&wallet_id, usage, &launched);
                info!(
                    algorithm = %launched.algorithm.id,
                    gpu_job = %launched.gpu_job,
                    cpu_job = %launched.cpu_job,
                    "mining restarted"
                );
                Ok(launched.started_jobs())
            }
            Err(e) => {
                if let MineError::PartialFailure { gpu_job, .. } = &e {
                    state.gpu_job = Some(gpu_job.clone());
                }
                Err(e)
            }
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.snapshot()
    }

    pub async fn health(&self) -> Result<()> {
        self.slurm.health_check().await
    }

    async fn ensure_not_running(&self) -> Result<()> {
        for track in Track::ALL {
            match self
                .slurm
                .find_running_job_by_name(track.job_name(), &self.config.job_user)
                .await
            {
                Ok(job_id) => {
                    info!(%track, job_id, "refusing to start, job already running");
                    return Err(MineError::Conflict { track, job_id });
                }
                Err(MineError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Probe, plan, pick an algorithm, then submit GPU before CPU. A failed CPU
    /// submission leaves the GPU job running and is reported as a partial failure.
    async fn launch(&self, wallet_id: &str, usage: f64) -> Result<Launched> {
        let capacity = self.slurm.probe_capacity().await?;
        let plan = build_plan(usage, &capacity)?;
        let algorithm = self.resolve_algorithm().await?;
        let rendered = self
            .templates
            .render(wallet_id, &algorithm, &AlgorithmChoice::cpu(), &plan)?;

        let user = &self.config.job_user;
        let gpu_job = self
            .slurm
            .submit(&MiningJobSpec::for_track(Track::Gpu, user, rendered.gpu))
            .await?;

        let cpu_job = match self
            .slurm
            .submit(&MiningJobSpec::for_track(Track::Cpu, user, rendered.cpu))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(gpu_job = %gpu_job, error = %e, "cpu submission failed, gpu job left running");
                return Err(MineError::PartialFailure {
                    gpu_job,
                    source: Box::new(e),
                });
            }
        };

        Ok(Launched {
            plan,
            algorithm,
            gpu_job,
            cpu_job,
        })
    }

    async fn resolve_algorithm(&self) -> Result<AlgorithmChoice> {
        let id = match tokio::time::timeout(
            self.config.selector_timeout,
            self.selector.best_algorithm(),
        )
        .await
        {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                warn!(selector = self.selector.name(), error = %e, "algorithm selection failed");
                return Err(MineError::UpstreamUnavailable(format!("{e:#}")));
            }
            Err(_) => {
                warn!(selector = self.selector.name(), "algorithm selection timed out");
                return Err(MineError::UpstreamUnavailable(format!(
                    "no answer within {}s",
                    self.config.selector_timeout.as_secs()
                )));
            }
        };
        let choice = self.algorithms.resolve(&id)?;
        info!(algorithm = %choice.id, flag = %choice.miner_flag, "selected algorithm");
        Ok(choice)
    }

    async fn cancel_all(&self) -> Result<()> {
        let mut failures = Vec::new();
        for track in Track::ALL {
            match self
                .slurm
                .cancel_job(track.job_name(), &self.config.job_user)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_job_absent() => {
                    info!(%track, "job already absent");
                }
                Err(e) => failures.push((track, e)),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(MineError::StopFailed { failures })
        }
    }
}

/// Parse the operator's usage fraction from request text.
fn parse_usage(raw: &str) -> Result<f64> {
    let usage = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| MineError::Input(format!("usage {raw:?} is not a number")))?;
    validate_usage(usage)?;
    Ok(usage)
}

fn validate_usage(usage: f64) -> Result<()> {
    if !usage.is_finite() || usage <= 0.0 || usage > 1.0 {
        return Err(MineError::Input(format!(
            "usage must be a fraction in (0, 1], got {usage}"
        )));
    }
    Ok(())
}

/// Wallets end up inside the miner command line, so only plain address characters pass.
fn validate_wallet(wallet_id: &str) -> Result<&str> {
    let wallet_id = wallet_id.trim();
    if wallet_id.is_empty() {
        return Err(MineError::Input("wallet not defined".to_string()));
    }
    if wallet_id.len() > MAX_WALLET_LEN
        || !wallet_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(MineError::Input(format!("invalid wallet id {wallet_id:?}")));
    }
    Ok(wallet_id)
}
