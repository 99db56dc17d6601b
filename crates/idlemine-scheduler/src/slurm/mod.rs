//! Slurm access through its text CLI.
//!
//! Everything that reads raw command output lives under this module; callers only see
//! typed values. `probe` derives cluster capacity, `jobs` owns the job lifecycle.

mod jobs;
mod probe;

use std::sync::Arc;
use std::time::Duration;

use idlemine_common::{CommandClass, MineError, Result};

use crate::executor::CommandRunner;

pub use jobs::QOS_NAME;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Slurm {
    runner: Arc<dyn CommandRunner>,
    admin_user: String,
    command_timeout: Duration,
    health_timeout: Duration,
}

impl std::fmt::Debug for Slurm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slurm")
            .field("admin_user", &self.admin_user)
            .field("command_timeout", &self.command_timeout)
            .field("health_timeout", &self.health_timeout)
            .finish()
    }
}

impl Slurm {
    pub fn new(runner: Arc<dyn CommandRunner>, admin_user: impl Into<String>) -> Self {
        Self {
            runner,
            admin_user: admin_user.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, command_timeout: Duration, health_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self.health_timeout = health_timeout;
        self
    }

    async fn exec(&self, user: &str, command: &str, class: CommandClass) -> Result<String> {
        self.exec_within(user, command, class, self.command_timeout)
            .await
    }

    /// Run one command, aborting it once `limit` has elapsed.
    async fn exec_within(
        &self,
        user: &str,
        command: &str,
        class: CommandClass,
        limit: Duration,
    ) -> Result<String> {
        match tokio::time::timeout(limit, self.runner.run(user, command, class)).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(%class, user, timeout_secs = limit.as_secs(), "scheduler command timed out");
                Err(MineError::ExecTimeout {
                    class,
                    after: limit,
                })
            }
        }
    }
}
