use serde::{Deserialize, Serialize};

use crate::error::{MineError, Result};

/// Aggregate cluster resources as reported by the scheduler at probe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCapacity {
    pub max_gpu: u32,
    pub max_cpu: u32,
    pub max_node: u32,
}

impl ClusterCapacity {
    /// CPU cores left once one core is reserved for each GPU miner.
    pub fn non_gpu_cpu(&self) -> i64 {
        i64::from(self.max_cpu) - i64::from(self.max_gpu)
    }
}

/// How many GPU miners to run and how many cores each per-node CPU miner gets.
/// Only built through [`ReplicaPlan::new`], so it is serialized for reporting but never
/// deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplicaPlan {
    gpu_replicas: u32,
    cpu_cores_per_task: u32,
    node_count: u32,
}

impl ReplicaPlan {
    /// Validates derived counts against the capacity they were computed from.
    pub fn new(
        gpu_replicas: i64,
        cpu_cores_per_task: i64,
        capacity: &ClusterCapacity,
    ) -> Result<Self> {
        if gpu_replicas <= 0 {
            return Err(MineError::InvalidUsage(format!(
                "usage yields {gpu_replicas} gpu replicas out of {} gpus",
                capacity.max_gpu
            )));
        }
        if cpu_cores_per_task <= 0 {
            return Err(MineError::InvalidUsage(format!(
                "usage yields {cpu_cores_per_task} cpu cores per task ({} spare cores over {} nodes)",
                capacity.non_gpu_cpu(),
                capacity.max_node
            )));
        }
        if gpu_replicas > i64::from(capacity.max_gpu) {
            return Err(MineError::InvalidUsage(format!(
                "{gpu_replicas} gpu replicas exceed {} gpus",
                capacity.max_gpu
            )));
        }
        if cpu_cores_per_task * i64::from(capacity.max_node) > capacity.non_gpu_cpu() {
            return Err(MineError::InvalidUsage(format!(
                "{cpu_cores_per_task} cores on {} nodes exceed {} spare cores",
                capacity.max_node,
                capacity.non_gpu_cpu()
            )));
        }

        // Both bounded by u32 capacity fields above.
        Ok(Self {
            gpu_replicas: gpu_replicas as u32,
            cpu_cores_per_task: cpu_cores_per_task as u32,
            node_count: capacity.max_node,
        })
    }

    pub fn gpu_replicas(&self) -> u32 {
        self.gpu_replicas
    }

    pub fn cpu_cores_per_task(&self) -> u32 {
        self.cpu_cores_per_task
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }
}
