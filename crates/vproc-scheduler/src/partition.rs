use vproc_domain::Resources;

use crate::error::SchedulerError;

/// Adapter-level resource ceilings, independent of any cluster's live
/// capacity (spec §4.C, "configured maxima"). Checked before a Submit is
/// ever delegated to the backend.
#[derive(Debug, Clone, Copy)]
pub struct AdapterLimits {
    pub max_nodes_per_job: u32,
    pub max_cores_per_node: u32,
    pub max_memory_gb_per_node: u32,
    pub max_gpus_per_node: u32,
}

/// Reject a Submit whose requested resources exceed this adapter's
/// configured maxima. Runs before partition selection and before any
/// backend call.
pub fn check_resource_maxima(resources: &Resources, limits: &AdapterLimits) -> Result<(), SchedulerError> {
    if resources.nodes > limits.max_nodes_per_job {
        return Err(SchedulerError::InsufficientResources(format!(
            "nodes {} exceeds max {}",
            resources.nodes, limits.max_nodes_per_job
        )));
    }
    if resources.cores_per_node > limits.max_cores_per_node {
        return Err(SchedulerError::InsufficientResources(format!(
            "cores-per-node {} exceeds max {}",
            resources.cores_per_node, limits.max_cores_per_node
        )));
    }
    if resources.memory_gb_per_node > limits.max_memory_gb_per_node {
        return Err(SchedulerError::InsufficientResources(format!(
            "memory-gb-per-node {} exceeds max {}",
            resources.memory_gb_per_node, limits.max_memory_gb_per_node
        )));
    }
    if resources.gpus_per_node > limits.max_gpus_per_node {
        return Err(SchedulerError::InsufficientResources(format!(
            "gpus-per-node {} exceeds max {}",
            resources.gpus_per_node, limits.max_gpus_per_node
        )));
    }
    Ok(())
}

/// Picks the partition for a job (spec §4.C): an explicit `queue-name`
/// always wins; otherwise `gpu` if GPUs are requested, `highmem` if
/// requested memory clears `high_mem_threshold_gb`, else `default`.
pub fn partition_select(queue_name: Option<&str>, resources: &Resources, high_mem_threshold_gb: u32) -> String {
    if let Some(name) = queue_name {
        return name.to_string();
    }
    if resources.gpus_per_node > 0 {
        return "gpu".to_string();
    }
    if resources.memory_gb_per_node > high_mem_threshold_gb {
        return "highmem".to_string();
    }
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(nodes: u32, cores: u32, mem: u32, gpus: u32) -> Resources {
        Resources {
            nodes,
            cores_per_node: cores,
            memory_gb_per_node: mem,
            gpus_per_node: gpus,
            gpu_type: None,
            storage_gb: 10,
        }
    }

    fn limits() -> AdapterLimits {
        AdapterLimits { max_nodes_per_job: 64, max_cores_per_node: 128, max_memory_gb_per_node: 1024, max_gpus_per_node: 8 }
    }

    #[test]
    fn explicit_queue_name_wins() {
        let r = resources(1, 4, 8, 4);
        assert_eq!(partition_select(Some("batch"), &r, 256), "batch");
    }

    #[test]
    fn gpu_partition_when_gpus_requested() {
        let r = resources(1, 4, 8, 2);
        assert_eq!(partition_select(None, &r, 256), "gpu");
    }

    #[test]
    fn highmem_partition_above_threshold() {
        let r = resources(1, 4, 512, 0);
        assert_eq!(partition_select(None, &r, 256), "highmem");
    }

    #[test]
    fn default_partition_otherwise() {
        let r = resources(1, 4, 8, 0);
        assert_eq!(partition_select(None, &r, 256), "default");
    }

    #[test]
    fn maxima_check_rejects_oversized_requests() {
        let r = resources(1000, 4, 8, 0);
        assert!(check_resource_maxima(&r, &limits()).is_err());

        let r = resources(1, 4, 8, 0);
        assert!(check_resource_maxima(&r, &limits()).is_ok());
    }
}
