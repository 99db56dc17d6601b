use std::fmt;

use serde::{Deserialize, Serialize};

pub const GPU_JOB_NAME: &str = "gpu-auto-mining";
pub const CPU_JOB_NAME: &str = "cpu-auto-mining";

/// One of the two independently submitted job types that make up a mining session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Gpu,
    Cpu,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Gpu, Track::Cpu];

    /// Well-known job name, the only idempotency key the scheduler gives us.
    pub fn job_name(self) -> &'static str {
        match self {
            Track::Gpu => GPU_JOB_NAME,
            Track::Cpu => CPU_JOB_NAME,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::Gpu => f.write_str("gpu"),
            Track::Cpu => f.write_str("cpu"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningJobSpec {
    pub name: String,
    /// UNIX user the submission runs as.
    pub owner_user: String,
    pub script_body: String,
}

impl MiningJobSpec {
    pub fn for_track(track: Track, owner_user: &str, script_body: String) -> Self {
        Self {
            name: track.job_name().to_string(),
            owner_user: owner_user.to_string(),
            script_body,
        }
    }
}

/// Scheduler-assigned job id, kept opaque and used only for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
