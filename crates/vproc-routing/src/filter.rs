use vproc_domain::Cluster;

use crate::request::RoutingRequest;

/// Hard filter (spec §4.E): a cluster is a candidate iff it has enough
/// available CPU/memory/GPU for the job, supports the requested GPU
/// type (if any), meets the required identity tier, and satisfies region
/// constraints.
pub fn is_candidate(cluster: &Cluster, request: &RoutingRequest) -> bool {
    let resources = &request.job.resources;
    let needed_cpu = resources.nodes as u64 * resources.cores_per_node as u64;
    let needed_mem = resources.nodes as u64 * resources.memory_gb_per_node as u64;
    let needed_gpu = resources.nodes as u64 * resources.gpus_per_node as u64;

    if cluster.available.cpu < needed_cpu {
        return false;
    }
    if cluster.available.mem_gb < needed_mem {
        return false;
    }
    if cluster.available.gpus < needed_gpu {
        return false;
    }
    if let Some(gpu_type) = &request.gpu_type {
        if !gpu_type.is_empty() && !cluster.available.gpu_types.iter().any(|t| t == gpu_type) {
            return false;
        }
    }
    if cluster.identity_tier < request.required_tier {
        return false;
    }
    if let Some(required_region) = &request.required_region {
        let allowed_fallback = request.allowed_regions.as_ref().is_some_and(|regions| regions.contains(&cluster.region));
        if &cluster.region != required_region && !allowed_fallback {
            return false;
        }
    }
    true
}

pub fn candidates<'a>(clusters: &'a [Cluster], request: &RoutingRequest) -> Vec<&'a Cluster> {
    clusters.iter().filter(|c| is_candidate(c, request)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproc_domain::{Capacity, ClusterId, ClusterStatus, CustomerAddress, JobId, OfferingId, ProviderAddress, Resources, Workload};
    use chrono::Utc;
    use std::collections::HashMap;

    fn cluster(id: &str, region: &str, tier: u8, gpu_types: Vec<&str>) -> Cluster {
        Cluster {
            cluster_id: ClusterId::new(id),
            provider_id: "p".into(),
            region: region.into(),
            partitions: vec![],
            total: Capacity { cpu: 100, mem_gb: 400, gpus: 8, gpu_types: gpu_types.iter().map(|s| s.to_string()).collect() },
            available: Capacity { cpu: 100, mem_gb: 400, gpus: 8, gpu_types: gpu_types.iter().map(|s| s.to_string()).collect() },
            endpoint: "https://x".into(),
            status: ClusterStatus::Up,
            identity_tier: tier,
            latency_score: 0.9,
            price_score: 0.8,
        }
    }

    fn request(gpu_type: Option<&str>, required_tier: u8, required_region: Option<&str>, allowed_regions: Option<Vec<&str>>) -> RoutingRequest {
        RoutingRequest {
            job: vproc_domain::Job {
                job_id: JobId::new("j1"),
                cluster_id: None,
                offering_id: OfferingId::new("o1"),
                provider_address: ProviderAddress::new("p1"),
                customer_address: CustomerAddress::new("c1"),
                workload: Workload { image: "i".into(), command: "c".into(), args: vec![], env: HashMap::new() },
                resources: Resources { nodes: 1, cores_per_node: 4, memory_gb_per_node: 8, gpus_per_node: 1, gpu_type: gpu_type.map(String::from), storage_gb: 10 },
                queue_name: None,
                max_runtime_seconds: 3600,
                created_at: Utc::now(),
                priority: 50,
            },
            customer_tier: 0,
            required_tier,
            required_region: required_region.map(String::from),
            allowed_regions: allowed_regions.map(|rs| rs.into_iter().map(String::from).collect()),
            gpu_type: gpu_type.map(String::from),
        }
    }

    #[test]
    fn rejects_insufficient_capacity() {
        let mut small = cluster("c1", "us-west", 0, vec!["a100"]);
        small.available.gpus = 0;
        let req = request(Some("a100"), 0, None, None);
        assert!(!is_candidate(&small, &req));
    }

    #[test]
    fn rejects_gpu_type_mismatch() {
        let c = cluster("c1", "us-west", 0, vec!["v100"]);
        let req = request(Some("a100"), 0, None, None);
        assert!(!is_candidate(&c, &req));
    }

    #[test]
    fn rejects_insufficient_tier() {
        let c = cluster("c1", "us-west", 0, vec!["a100"]);
        let req = request(Some("a100"), 5, None, None);
        assert!(!is_candidate(&c, &req));
    }

    #[test]
    fn rejects_region_mismatch_without_fallback() {
        let c = cluster("c1", "eu-west", 0, vec!["a100"]);
        let req = request(Some("a100"), 0, Some("us-west"), None);
        assert!(!is_candidate(&c, &req));
    }

    #[test]
    fn accepts_region_mismatch_with_fallback_listed() {
        let c = cluster("c1", "eu-west", 0, vec!["a100"]);
        let req = request(Some("a100"), 0, Some("us-west"), Some(vec!["eu-west"]));
        assert!(is_candidate(&c, &req));
    }

    #[test]
    fn accepts_eligible_cluster() {
        let c = cluster("c1", "us-west", 0, vec!["a100"]);
        let req = request(Some("a100"), 0, Some("us-west"), None);
        assert!(is_candidate(&c, &req));
    }
}
