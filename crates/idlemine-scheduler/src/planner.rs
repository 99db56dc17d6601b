use idlemine_common::{ClusterCapacity, MineError, ReplicaPlan, Result};

/// Turn a requested usage fraction into replica counts for both tracks.
///
/// The same fraction scales both tracks, so "half the cluster" claims half the GPUs and
/// half of each node's spare CPU budget. CPU cores backing GPU miners (one per GPU) are
/// excluded before splitting the rest across nodes.
pub fn build_plan(usage: f64, capacity: &ClusterCapacity) -> Result<ReplicaPlan> {
    if !usage.is_finite() || usage <= 0.0 || usage > 1.0 {
        return Err(MineError::InvalidUsage(format!(
            "usage {usage} is outside (0, 1]"
        )));
    }
    if capacity.max_node == 0 {
        return Err(MineError::InvalidUsage(
            "cluster reports no nodes".to_string(),
        ));
    }

    let gpu_replicas = (usage * f64::from(capacity.max_gpu)).floor() as i64;
    let cpu_cores_per_task =
        (usage * capacity.non_gpu_cpu() as f64 / f64::from(capacity.max_node)).floor() as i64;

    let plan = ReplicaPlan::new(gpu_replicas, cpu_cores_per_task, capacity)?;
    tracing::debug!(
        usage,
        gpu_replicas = plan.gpu_replicas(),
        cpu_cores_per_task = plan.cpu_cores_per_task(),
        nodes = plan.node_count(),
        "built replica plan"
    );
    Ok(plan)
}
