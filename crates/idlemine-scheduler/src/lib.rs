pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod selector;
pub mod slurm;
pub mod template;
pub mod watchdog;

#[cfg(test)]
mod testing;

pub use executor::{CommandRunner, ShellRunner};
pub use orchestrator::{Orchestrator, OrchestratorConfig, DEFAULT_SETTLE_DELAY};
pub use planner::build_plan;
pub use selector::{AlgorithmSelector, FixedAlgorithm};
pub use slurm::Slurm;
pub use template::{JobTemplates, RenderedJobs, DEFAULT_CPU_IMAGE, DEFAULT_GPU_IMAGE};
pub use watchdog::watchdog_loop;
