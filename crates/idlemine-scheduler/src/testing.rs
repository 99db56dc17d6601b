//! Scripted stand-in for the Slurm CLI, answering `sbatch`, `squeue`, `scancel` and
//! `scontrol show nodes` from in-memory state.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use idlemine_common::{CommandClass, MineError, Result};

use crate::executor::CommandRunner;

pub(crate) const TWO_NODE_LISTING: &str = "\
NodeName=gpu01 Arch=x86_64 CoresPerSocket=16
   CfgTRES=cpu=64,mem=256000M,billing=64,gres/gpu=4
NodeName=gpu02 Arch=x86_64 CoresPerSocket=16
   CfgTRES=cpu=64,mem=256000M,billing=64,gres/gpu=4
";

enum Scripted {
    Respond(String),
    Fail(String),
}

struct Inner {
    next_id: u64,
    jobs: Vec<(String, u64)>,
    commands: Vec<(String, String)>,
    scripted: Vec<(String, Scripted)>,
    delay: Duration,
    node_listing: String,
    strict_cancel: bool,
}

pub(crate) struct FakeSlurm {
    inner: Mutex<Inner>,
}

impl FakeSlurm {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1000,
                jobs: Vec::new(),
                commands: Vec::new(),
                scripted: Vec::new(),
                delay: Duration::ZERO,
                node_listing: TWO_NODE_LISTING.to_string(),
                strict_cancel: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer commands containing `pattern` with `output`.
    pub(crate) fn respond(&self, pattern: &str, output: &str) {
        self.lock()
            .scripted
            .push((pattern.to_string(), Scripted::Respond(output.to_string())));
    }

    /// Fail commands containing `pattern`, reporting `output`.
    pub(crate) fn fail(&self, pattern: &str, output: &str) {
        self.lock()
            .scripted
            .push((pattern.to_string(), Scripted::Fail(output.to_string())));
    }

    pub(crate) fn clear_scripted(&self) {
        self.lock().scripted.clear();
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    pub(crate) fn set_node_listing(&self, listing: &str) {
        self.lock().node_listing = listing.to_string();
    }

    /// Make `scancel` fail like Slurm does for an unknown job id.
    pub(crate) fn set_strict_cancel(&self, strict: bool) {
        self.lock().strict_cancel = strict;
    }

    pub(crate) fn add_job(&self, name: &str) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.jobs.push((name.to_string(), id));
        id
    }

    pub(crate) fn running_jobs(&self) -> Vec<(String, u64)> {
        self.lock().jobs.clone()
    }

    pub(crate) fn commands(&self) -> Vec<(String, String)> {
        self.lock().commands.clone()
    }

    pub(crate) fn commands_matching(&self, pattern: &str) -> Vec<(String, String)> {
        self.commands()
            .into_iter()
            .filter(|(_, cmd)| cmd.contains(pattern))
            .collect()
    }

    fn answer(&self, command: &str, class: CommandClass) -> Result<String> {
        let mut inner = self.lock();
        if let Some((_, scripted)) = inner.scripted.iter().find(|(p, _)| command.contains(p)) {
            return match scripted {
                Scripted::Respond(out) => Ok(out.clone()),
                Scripted::Fail(out) => Err(exit_failure(class, out)),
            };
        }

        if command.starts_with("sbatch") {
            let name = flag_value(command, "--job-name=").unwrap_or_default();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.jobs.push((name, id));
            return Ok(format!("{id}\n"));
        }
        if command.starts_with("scancel") {
            let name = flag_value(command, "--name=").unwrap_or_default();
            let before = inner.jobs.len();
            inner.jobs.retain(|(n, _)| *n != name);
            if inner.jobs.len() == before && inner.strict_cancel {
                return Err(exit_failure(class, "scancel: error: No matching job found\n"));
            }
            return Ok(String::new());
        }
        if let Some(rest) = command.strip_prefix("squeue --name ") {
            let name = rest.split_whitespace().next().unwrap_or_default();
            let ids: String = inner
                .jobs
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, id)| format!("{id:<256}\n"))
                .collect();
            return Ok(ids);
        }
        if command == "squeue" {
            return Ok("JOBID PARTITION NAME USER ST TIME NODES NODELIST(REASON)\n".to_string());
        }
        if command == "scontrol show nodes" {
            return Ok(inner.node_listing.clone());
        }
        Err(exit_failure(class, &format!("sh: unknown command: {command}")))
    }
}

#[async_trait]
impl CommandRunner for FakeSlurm {
    async fn run(&self, as_user: &str, command: &str, class: CommandClass) -> Result<String> {
        let delay = {
            let mut inner = self.lock();
            inner
                .commands
                .push((as_user.to_string(), command.to_string()));
            inner.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.answer(command, class)
    }
}

fn flag_value(command: &str, flag: &str) -> Option<String> {
    command
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix(flag))
        .map(str::to_string)
}

fn exit_failure(class: CommandClass, output: &str) -> MineError {
    MineError::Exec {
        class,
        message: "exit status: 1".to_string(),
        output: output.to_string(),
    }
}
