use rand::distributions::Alphanumeric;
use rand::Rng;

use idlemine_common::{CommandClass, JobHandle, MineError, MiningJobSpec, Result};

use super::Slurm;

/// Quality-of-service class every mining job is pinned to.
pub const QOS_NAME: &str = "mining";

const LOG_PATH_PATTERN: &str = "/tmp/miner-%j_%a.log";
const DELIMITER_LEN: usize = 16;

impl Slurm {
    /// Submit a batch script with `sbatch`, returning the scheduler-assigned id.
    ///
    /// The body is passed through a quoted heredoc whose terminator is freshly
    /// generated per call, so a script that happens to contain a fixed marker line
    /// cannot end the heredoc early. It is a framing guard, not a sandbox.
    pub async fn submit(&self, spec: &MiningJobSpec) -> Result<JobHandle> {
        check_job_name(&spec.name)?;
        let delimiter = heredoc_delimiter(&spec.script_body);
        let cmd = submit_command(&spec.name, &spec.script_body, &delimiter);

        let out = self
            .exec(&spec.owner_user, &cmd, CommandClass::Submit)
            .await
            .inspect_err(|e| tracing::warn!(job = %spec.name, error = %e, "submit failed"))?;

        let id = parse_submitted_id(&out)?;
        tracing::info!(job = %spec.name, job_id = %id, user = %spec.owner_user, "submitted job");
        Ok(JobHandle::new(id))
    }

    /// Cancel the caller's own jobs carrying `name`. Scheduler errors are returned
    /// as-is; see [`MineError::is_job_absent`] for telling "nothing to cancel" apart.
    pub async fn cancel_job(&self, name: &str, user: &str) -> Result<()> {
        check_job_name(name)?;
        let cmd = format!("scancel --name={name} --me");
        self.exec(user, &cmd, CommandClass::Cancel)
            .await
            .inspect_err(|e| tracing::warn!(job = name, error = %e, "cancel failed"))?;
        tracing::info!(job = name, user, "cancelled job");
        Ok(())
    }

    /// Id of the first queued or running job called `name`.
    pub async fn find_running_job_by_name(&self, name: &str, user: &str) -> Result<u64> {
        check_job_name(name)?;
        let cmd = format!("squeue --name {name} -O JobId:256 --noheader");
        let out = self
            .exec(user, &cmd, CommandClass::Query)
            .await
            .inspect_err(|e| tracing::warn!(job = name, error = %e, "job lookup failed"))?;

        let Some(line) = out.lines().map(str::trim).find(|l| !l.is_empty()) else {
            tracing::debug!(job = name, "no running job");
            return Err(MineError::NotFound(name.to_string()));
        };
        line.parse::<u64>().map_err(|e| MineError::Parse {
            class: CommandClass::Query,
            line: line.to_string(),
            reason: e.to_string(),
        })
    }

    /// Cheap queue query as the admin identity. Any failure, timeouts included,
    /// means unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        self.exec_within(
            &self.admin_user,
            "squeue",
            CommandClass::Health,
            self.health_timeout,
        )
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "health check failed"))?;
        Ok(())
    }
}

fn submit_command(name: &str, body: &str, delimiter: &str) -> String {
    format!(
        "sbatch \\\n  --job-name={name} \\\n  --qos={QOS_NAME} \\\n  --output={LOG_PATH_PATTERN} \\\n  --parsable << '{delimiter}'\n{body}\n{delimiter}"
    )
}

fn heredoc_delimiter(body: &str) -> String {
    loop {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(DELIMITER_LEN)
            .map(char::from)
            .collect();
        let delimiter = format!("EOF_{token}");
        if !body.lines().any(|l| l.trim() == delimiter) {
            return delimiter;
        }
    }
}

/// `--parsable` prints `<id>` or `<id>;<cluster>`. Warnings from stderr can land on
/// either side of it, so the first line that is an id wins.
fn parse_submitted_id(out: &str) -> Result<String> {
    out.lines()
        .filter_map(|l| l.trim().split(';').next())
        .find(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| MineError::Parse {
            class: CommandClass::Submit,
            line: out.trim_end().to_string(),
            reason: "expected a numeric job id".to_string(),
        })
}

/// Names are interpolated into shell commands unquoted.
fn check_job_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(MineError::Input(format!("invalid job name {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use idlemine_common::Track;

    use super::*;
    use crate::testing::FakeSlurm;

    fn slurm(fake: &Arc<FakeSlurm>) -> Slurm {
        Slurm::new(fake.clone(), "admin")
    }

    #[test]
    fn submit_command_frames_body() {
        let cmd = submit_command("gpu-auto-mining", "#!/bin/bash\nsrun true", "EOF_abc");
        assert!(cmd.starts_with("sbatch"));
        assert!(cmd.contains("--job-name=gpu-auto-mining"));
        assert!(cmd.contains("--qos=mining"));
        assert!(cmd.contains("--output=/tmp/miner-%j_%a.log"));
        assert!(cmd.contains("<< 'EOF_abc'\n#!/bin/bash\nsrun true\nEOF_abc"));
        assert!(cmd.ends_with("EOF_abc"));
    }

    #[test]
    fn delimiter_is_random_and_avoids_body() {
        let a = heredoc_delimiter("");
        let b = heredoc_delimiter("");
        assert_ne!(a, b);
        assert_eq!(a.len(), "EOF_".len() + DELIMITER_LEN);
        assert!(!heredoc_delimiter("EOF\nEOF_x").contains('\n'));
    }

    #[test]
    fn parses_submitted_id() {
        assert_eq!(parse_submitted_id("123\n").unwrap(), "123");
        assert_eq!(parse_submitted_id("  4567;cluster1 \n").unwrap(), "4567");
        assert!(parse_submitted_id("").is_err());
        assert!(parse_submitted_id("sbatch: error: Batch job submission failed").is_err());
        assert_eq!(
            parse_submitted_id("sbatch: warning: can't honor --ntasks-per-node set to 1\n812\n")
                .unwrap(),
            "812"
        );
    }

    #[tokio::test]
    async fn trailing_warning_does_not_hide_job_id() {
        let fake = Arc::new(FakeSlurm::new());
        fake.respond(
            "sbatch",
            "4242\nsbatch: warning: can't honor --ntasks-per-node set to 1 without --ntasks\n",
        );
        let spec = MiningJobSpec::for_track(Track::Cpu, "miner", "#!/bin/sh\nsrun true".into());
        let handle = slurm(&fake).submit(&spec).await.unwrap();
        assert_eq!(handle, JobHandle::new("4242"));
    }

    #[test]
    fn rejects_unsafe_names() {
        assert!(check_job_name("cpu-auto-mining").is_ok());
        assert!(check_job_name("x; rm -rf /").is_err());
        assert!(check_job_name("").is_err());
    }

    #[tokio::test]
    async fn submit_then_find_returns_same_id() {
        let fake = Arc::new(FakeSlurm::new());
        let slurm = slurm(&fake);
        let spec = MiningJobSpec::for_track(Track::Gpu, "miner", "#!/bin/sh\nsrun sleep infinity".into());

        let handle = slurm.submit(&spec).await.unwrap();
        let found = slurm
            .find_running_job_by_name(&spec.name, "miner")
            .await
            .unwrap();
        assert_eq!(handle.id, found.to_string());

        let submitted = fake.commands_matching("sbatch");
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, "miner");
        assert!(submitted[0].1.contains("srun sleep infinity"));
    }

    #[tokio::test]
    async fn find_on_empty_queue_is_not_found() {
        let fake = Arc::new(FakeSlurm::new());
        let err = slurm(&fake)
            .find_running_job_by_name("gpu-auto-mining", "miner")
            .await
            .unwrap_err();
        assert!(matches!(err, MineError::NotFound(_)));
    }

    #[tokio::test]
    async fn find_with_garbage_is_parse_error() {
        let fake = Arc::new(FakeSlurm::new());
        fake.respond("squeue --name", "JOBID\n");
        let err = slurm(&fake)
            .find_running_job_by_name("gpu-auto-mining", "miner")
            .await
            .unwrap_err();
        assert!(matches!(err, MineError::Parse { class: CommandClass::Query, .. }));
    }

    #[tokio::test]
    async fn cancel_removes_job_and_runs_as_owner() {
        let fake = Arc::new(FakeSlurm::new());
        let slurm = slurm(&fake);
        let spec = MiningJobSpec::for_track(Track::Cpu, "miner", "#!/bin/sh".into());
        slurm.submit(&spec).await.unwrap();

        slurm.cancel_job(&spec.name, "miner").await.unwrap();
        assert!(fake.running_jobs().is_empty());
        let cancels = fake.commands_matching("scancel");
        assert_eq!(cancels[0].0, "miner");
        assert!(cancels[0].1.contains("--name=cpu-auto-mining --me"));
    }

    #[tokio::test]
    async fn failed_submit_keeps_partial_output() {
        let fake = Arc::new(FakeSlurm::new());
        fake.fail("sbatch", "sbatch: error: QOSMaxSubmitJobPerUserLimit");
        let spec = MiningJobSpec::for_track(Track::Gpu, "miner", "#!/bin/sh".into());
        let err = slurm(&fake).submit(&spec).await.unwrap_err();
        match err {
            MineError::Exec { class, output, .. } => {
                assert_eq!(class, CommandClass::Submit);
                assert!(output.contains("QOSMaxSubmitJobPerUserLimit"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_uses_admin_and_times_out() {
        let fake = Arc::new(FakeSlurm::new());
        let slurm = slurm(&fake).with_timeouts(Duration::from_secs(30), Duration::from_millis(20));
        slurm.health_check().await.unwrap();
        assert_eq!(fake.commands_matching("squeue")[0].0, "admin");

        fake.set_delay(Duration::from_millis(200));
        let err = slurm.health_check().await.unwrap_err();
        assert!(matches!(err, MineError::ExecTimeout { class: CommandClass::Health, .. }));
    }
}
