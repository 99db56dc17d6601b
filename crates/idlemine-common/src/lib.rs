pub mod algorithm;
pub mod capacity;
pub mod config;
pub mod error;
pub mod job;
pub mod status;

pub use algorithm::{AlgorithmChoice, AlgorithmTable, POOL_SUFFIX};
pub use capacity::{ClusterCapacity, ReplicaPlan};
pub use config::{AlgorithmRate, MinerConfig, ProfitabilityConfig};
pub use error::{CommandClass, MineError, Result};
pub use job::{JobHandle, MiningJobSpec, Track, CPU_JOB_NAME, GPU_JOB_NAME};
pub use status::{SessionStatus, StartedJobs};

pub mod telemetry;
