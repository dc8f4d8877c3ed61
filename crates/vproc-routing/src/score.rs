use vproc_domain::{Cluster, ClusterScore};

use crate::request::RoutingRequest;

pub const W_RESOURCE: f64 = 0.30;
pub const W_REGION: f64 = 0.25;
pub const W_LATENCY: f64 = 0.20;
pub const W_PRICE: f64 = 0.15;
pub const W_GPU: f64 = 0.10;

/// Soft score for one candidate cluster (spec §4.E). Each component is
/// in `[0, 1]`; `total` is the fixed weighted sum.
pub fn score_cluster(cluster: &Cluster, request: &RoutingRequest) -> ClusterScore {
    let resources = &request.job.resources;
    let needed_cpu = (resources.nodes as u64 * resources.cores_per_node as u64).max(1) as f64;
    let needed_mem = (resources.nodes as u64 * resources.memory_gb_per_node as u64).max(1) as f64;
    let needed_gpu = (resources.nodes as u64 * resources.gpus_per_node as u64) as f64;

    let cpu_ratio = (cluster.available.cpu as f64 / needed_cpu).min(1.0);
    let mem_ratio = (cluster.available.mem_gb as f64 / needed_mem).min(1.0);
    let gpu_ratio = if needed_gpu > 0.0 { (cluster.available.gpus as f64 / needed_gpu).min(1.0) } else { 1.0 };
    let resource = cpu_ratio.min(mem_ratio).min(gpu_ratio);

    let region = match &request.required_region {
        None => 1.0,
        Some(required) if &cluster.region == required => 1.0,
        Some(_) => {
            if request.allowed_regions.as_ref().is_some_and(|rs| rs.contains(&cluster.region)) {
                0.5
            } else {
                0.0
            }
        }
    };

    let gpu_match = match &request.gpu_type {
        None => 1.0,
        Some(gpu_type) if gpu_type.is_empty() => 1.0,
        Some(gpu_type) => {
            if cluster.available.gpu_types.iter().any(|t| t == gpu_type) {
                1.0
            } else {
                0.0
            }
        }
    };

    let total = W_RESOURCE * resource
        + W_REGION * region
        + W_LATENCY * cluster.latency_score
        + W_PRICE * cluster.price_score
        + W_GPU * gpu_match;

    ClusterScore { resource, region, latency: cluster.latency_score, price: cluster.price_score, gpu_match, total }
}
