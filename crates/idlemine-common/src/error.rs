use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::job::{JobHandle, Track};

/// Which scheduler command produced an exec/parse failure. Carried in errors so logs and
/// responses can say what was being attempted without echoing the whole command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    NodeListing,
    Submit,
    Cancel,
    Query,
    Health,
}

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandClass::NodeListing => "node-listing",
            CommandClass::Submit => "submit",
            CommandClass::Cancel => "cancel",
            CommandClass::Query => "query",
            CommandClass::Health => "health",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum MineError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    #[error("{track} job {job_id} is already running")]
    Conflict { track: Track, job_id: u64 },

    #[error("{class} command failed: {message}")]
    Exec {
        class: CommandClass,
        message: String,
        /// Combined output captured before the failure, possibly empty.
        output: String,
    },

    #[error("{class} command timed out after {}s", .after.as_secs())]
    ExecTimeout { class: CommandClass, after: Duration },

    #[error("failed to parse {class} output {line:?}: {reason}")]
    Parse {
        class: CommandClass,
        line: String,
        reason: String,
    },

    #[error("no running job named {0}")]
    NotFound(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("algorithm selector unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("gpu job {gpu_job} submitted but cpu submission failed: {source}")]
    PartialFailure {
        gpu_job: JobHandle,
        #[source]
        source: Box<MineError>,
    },

    #[error("stop failed for {}", describe_failures(.failures))]
    StopFailed { failures: Vec<(Track, MineError)> },

    #[error("nothing to do: {0}")]
    NoOp(String),

    #[error("shutting down")]
    Shutdown,

    #[error("configuration error: {0}")]
    Config(String),
}

fn describe_failures(failures: &[(Track, MineError)]) -> String {
    failures
        .iter()
        .map(|(track, err)| format!("{track} track ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl MineError {
    /// Whether a cancel failure only means the scheduler had no such job to cancel.
    pub fn is_job_absent(&self) -> bool {
        match self {
            MineError::NotFound(_) => true,
            MineError::Exec {
                class: CommandClass::Cancel,
                message,
                output,
            } => {
                let text = format!("{message}\n{output}").to_ascii_lowercase();
                text.contains("no matching job")
                    || text.contains("invalid job id")
                    || text.contains("no jobs matched")
            }
            _ => false,
        }
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            MineError::Input(_) => "invalid_input",
            MineError::InvalidUsage(_) => "invalid_usage",
            MineError::Conflict { .. } => "conflict",
            MineError::Exec { .. } => "exec_failed",
            MineError::ExecTimeout { .. } => "exec_timeout",
            MineError::Parse { .. } => "parse_failed",
            MineError::NotFound(_) => "not_found",
            MineError::Template(_) => "template_failed",
            MineError::UpstreamUnavailable(_) => "upstream_unavailable",
            MineError::PartialFailure { .. } => "partial_failure",
            MineError::StopFailed { .. } => "stop_failed",
            MineError::NoOp(_) => "no_op",
            MineError::Shutdown => "shutting_down",
            MineError::Config(_) => "config",
        }
    }

    /// Whether the failure was caused by the caller rather than the cluster or upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MineError::Input(_)
                | MineError::InvalidUsage(_)
                | MineError::Conflict { .. }
                | MineError::NoOp(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MineError>;
