use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capacity::ReplicaPlan;
use crate::job::JobHandle;

/// Reporting view of the orchestrator's session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ReplicaPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_job: Option<JobHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_job: Option<JobHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Job ids produced by one successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedJobs {
    pub gpu_job: JobHandle,
    pub cpu_job: JobHandle,
    pub algorithm: String,
}
