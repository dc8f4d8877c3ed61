use vproc_domain::{Metrics, Resources};

/// `cores_per_node * nodes * running_seconds` (spec §4.G). Pure integer
/// arithmetic — no floating point ever enters a billable quantity.
pub fn cpu_core_seconds(resources: &Resources, running_seconds: u64) -> u64 {
    resources.nodes as u64 * resources.cores_per_node as u64 * running_seconds
}

pub fn memory_gb_seconds(resources: &Resources, running_seconds: u64) -> u64 {
    resources.nodes as u64 * resources.memory_gb_per_node as u64 * running_seconds
}

/// Bounded above by the theoretical maximum `nodes * gpus_per_node *
/// running_seconds`: backend-reported `gpu_seconds` occasionally exceeds
/// what is physically possible, so the reported value is clamped rather
/// than trusted outright.
pub fn gpu_seconds(resources: &Resources, running_seconds: u64, reported: u64) -> u64 {
    let theoretical_max = resources.nodes as u64 * resources.gpus_per_node as u64 * running_seconds;
    reported.min(theoretical_max)
}

pub fn node_hours_numerator(resources: &Resources, running_seconds: u64) -> u64 {
    resources.nodes as u64 * running_seconds
}

/// Derives the full billable `Metrics` for one snapshot from the job's
/// requested resources, its elapsed running time, and whatever the
/// adapter last reported for backend-observed fields (network bytes,
/// peak memory, raw gpu seconds). `reported` supplies the fields this
/// pipeline does not itself derive.
pub fn derive_metrics(resources: &Resources, running_seconds: u64, reported: &Metrics) -> Metrics {
    Metrics {
        wall_clock_seconds: running_seconds,
        cpu_time_seconds: reported.cpu_time_seconds,
        cpu_core_seconds: cpu_core_seconds(resources, running_seconds),
        memory_bytes_max: reported.memory_bytes_max,
        memory_gb_seconds: memory_gb_seconds(resources, running_seconds),
        gpu_seconds: gpu_seconds(resources, running_seconds, reported.gpu_seconds),
        storage_gb_seconds: reported.storage_gb_seconds,
        network_bytes_in: reported.network_bytes_in,
        network_bytes_out: reported.network_bytes_out,
        nodes_used: resources.nodes,
        node_hours_numerator: node_hours_numerator(resources, running_seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(nodes: u32, cores: u32, mem_gb: u32, gpus: u32) -> Resources {
        Resources {
            nodes,
            cores_per_node: cores,
            memory_gb_per_node: mem_gb,
            gpus_per_node: gpus,
            gpu_type: None,
            storage_gb: 0,
        }
    }

    #[test]
    fn s1_happy_path_billable_values() {
        let r = resources(1, 4, 8, 0);
        assert_eq!(cpu_core_seconds(&r, 3600), 14_400);
        assert_eq!(memory_gb_seconds(&r, 3600), 28_800);
        assert_eq!(gpu_seconds(&r, 3600, 0), 0);
        let hours = vproc_domain::NodeHours::from_node_seconds(node_hours_numerator(&r, 3600));
        assert_eq!(hours.as_f64(), 1.0);
    }

    #[test]
    fn s3_cancel_mid_run_billable_values() {
        let r = resources(1, 4, 8, 0);
        assert_eq!(cpu_core_seconds(&r, 1800), 7_200);
    }

    #[test]
    fn gpu_seconds_is_clamped_to_theoretical_maximum() {
        let r = resources(2, 4, 8, 2);
        // theoretical max = 2 nodes * 2 gpus * 10s = 40
        assert_eq!(gpu_seconds(&r, 10, 1_000), 40);
        assert_eq!(gpu_seconds(&r, 10, 10), 10);
    }

    #[test]
    fn derive_metrics_passes_through_backend_reported_fields() {
        let r = resources(1, 4, 8, 0);
        let reported = Metrics { network_bytes_in: 500, network_bytes_out: 200, memory_bytes_max: 9_000, ..Default::default() };
        let metrics = derive_metrics(&r, 100, &reported);
        assert_eq!(metrics.network_bytes_in, 500);
        assert_eq!(metrics.network_bytes_out, 200);
        assert_eq!(metrics.memory_bytes_max, 9_000);
        assert_eq!(metrics.nodes_used, 1);
    }
}
