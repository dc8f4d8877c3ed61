use std::collections::HashMap;

use chrono::{DateTime, Utc};
use vproc_domain::{Cluster, ClusterScore, RoutingDecision};

use crate::error::RoutingError;
use crate::filter::is_candidate;
use crate::request::RoutingRequest;
use crate::score::score_cluster;

/// Picks a cluster and partition for `request.job` (spec §4.E). Pure
/// given its inputs — no I/O, no shared mutable state — so two
/// independent evaluators given the same clusters and timestamp bucket
/// produce an identical `decision_hash`.
pub fn route(request: &RoutingRequest, clusters: &[Cluster], timestamp: DateTime<Utc>, partition: &str) -> Result<RoutingDecision, RoutingError> {
    if let Some(explicit) = &request.job.cluster_id {
        let matched = clusters.iter().find(|c| &c.cluster_id == explicit);
        let cluster = match matched {
            Some(cluster) if is_candidate(cluster, request) => cluster,
            _ => return Err(RoutingError::ClusterIneligible(explicit.to_string())),
        };

        let score = score_cluster(cluster, request);
        let scores: HashMap<vproc_domain::ClusterId, ClusterScore> = [(cluster.cluster_id.clone(), score.clone())].into_iter().collect();
        let sorted_scores = vec![(cluster.cluster_id.to_string(), score.total)];
        let timestamp_bucket = timestamp.timestamp() as u64;
        let hash = vproc_crypto::payload::routing_decision_hash(
            request.job.job_id.as_str(),
            &sorted_scores,
            cluster.cluster_id.as_str(),
            timestamp_bucket,
        );

        return Ok(RoutingDecision {
            job_id: request.job.job_id.clone(),
            candidates: vec![cluster.cluster_id.clone()],
            scores,
            selected_cluster: cluster.cluster_id.clone(),
            selected_partition: partition.to_string(),
            reason: format!("explicit cluster_id pinned; customer_tier={} required_tier={}", request.customer_tier, request.required_tier),
            decision_hash: hash.to_string(),
            timestamp,
        });
    }

    let candidate_clusters: Vec<&Cluster> = clusters.iter().filter(|c| is_candidate(c, request)).collect();

    if candidate_clusters.is_empty() {
        let all_tier_too_low = !clusters.is_empty() && clusters.iter().all(|c| c.identity_tier < request.required_tier);
        if all_tier_too_low {
            return Err(RoutingError::InsufficientTier(request.required_tier));
        }
        return Err(RoutingError::NoCandidatesFound);
    }

    let mut scores: HashMap<vproc_domain::ClusterId, ClusterScore> = HashMap::new();
    for cluster in &candidate_clusters {
        scores.insert(cluster.cluster_id.clone(), score_cluster(cluster, request));
    }

    let mut ranked: Vec<&vproc_domain::ClusterId> = scores.keys().collect();
    ranked.sort_by(|a, b| {
        let score_a = scores[*a].total;
        let score_b = scores[*b].total;
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.as_str().cmp(b.as_str()))
    });
    let selected_cluster = ranked[0].clone();

    let mut sorted_scores: Vec<(String, f64)> = scores.iter().map(|(id, s)| (id.to_string(), s.total)).collect();
    sorted_scores.sort_by(|a, b| a.0.cmp(&b.0));

    let timestamp_bucket = timestamp.timestamp() as u64;
    let hash = vproc_crypto::payload::routing_decision_hash(
        request.job.job_id.as_str(),
        &sorted_scores,
        selected_cluster.as_str(),
        timestamp_bucket,
    );

    Ok(RoutingDecision {
        job_id: request.job.job_id.clone(),
        candidates: candidate_clusters.iter().map(|c| c.cluster_id.clone()).collect(),
        scores,
        selected_cluster,
        selected_partition: partition.to_string(),
        reason: format!("customer_tier={} required_tier={}", request.customer_tier, request.required_tier),
        decision_hash: hash.to_string(),
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use vproc_domain::{Capacity, ClusterId, ClusterStatus, CustomerAddress, Job, JobId, OfferingId, ProviderAddress, Resources, Workload};

    fn cluster(id: &str, region: &str, latency: f64, price: f64) -> Cluster {
        Cluster {
            cluster_id: ClusterId::new(id),
            provider_id: "p".into(),
            region: region.into(),
            partitions: vec![],
            total: Capacity { cpu: 100, mem_gb: 400, gpus: 8, gpu_types: vec!["a100".into()] },
            available: Capacity { cpu: 100, mem_gb: 400, gpus: 8, gpu_types: vec!["a100".into()] },
            endpoint: "https://x".into(),
            status: ClusterStatus::Up,
            identity_tier: 0,
            latency_score: latency,
            price_score: price,
        }
    }

    fn request(explicit_cluster: Option<&str>, required_region: Option<&str>, allowed_regions: Option<Vec<&str>>) -> RoutingRequest {
        RoutingRequest {
            job: Job {
                job_id: JobId::new("j1"),
                cluster_id: explicit_cluster.map(ClusterId::new),
                offering_id: OfferingId::new("o1"),
                provider_address: ProviderAddress::new("p1"),
                customer_address: CustomerAddress::new("c1"),
                workload: Workload { image: "i".into(), command: "c".into(), args: vec![], env: Map::new() },
                resources: Resources { nodes: 1, cores_per_node: 4, memory_gb_per_node: 8, gpus_per_node: 0, gpu_type: None, storage_gb: 10 },
                queue_name: None,
                max_runtime_seconds: 3600,
                created_at: Utc::now(),
                priority: 50,
            },
            customer_tier: 0,
            required_tier: 0,
            required_region: required_region.map(String::from),
            allowed_regions: allowed_regions.map(|rs| rs.into_iter().map(String::from).collect()),
            gpu_type: None,
        }
    }

    #[test]
    fn selects_highest_scoring_cluster() {
        let clusters = vec![cluster("c1", "us-west", 0.5, 0.5), cluster("c2", "us-west", 0.95, 0.95)];
        let req = request(None, Some("us-west"), None);
        let decision = route(&req, &clusters, Utc::now(), "default").unwrap();
        assert_eq!(decision.selected_cluster.as_str(), "c2");
    }

    #[test]
    fn ties_broken_lexicographically() {
        let clusters = vec![cluster("zeta", "us-west", 0.5, 0.5), cluster("alpha", "us-west", 0.5, 0.5)];
        let req = request(None, Some("us-west"), None);
        let decision = route(&req, &clusters, Utc::now(), "default").unwrap();
        assert_eq!(decision.selected_cluster.as_str(), "alpha");
    }

    #[test]
    fn empty_candidates_is_no_candidates_found() {
        let clusters = vec![cluster("c1", "eu-west", 0.5, 0.5)];
        let req = request(None, Some("us-west"), None);
        let result = route(&req, &clusters, Utc::now(), "default");
        assert!(matches!(result, Err(RoutingError::NoCandidatesFound)));
    }

    #[test]
    fn explicit_ineligible_cluster_is_reported() {
        let clusters = vec![cluster("c1", "eu-west", 0.5, 0.5)];
        let req = request(Some("c1"), Some("us-west"), None);
        let result = route(&req, &clusters, Utc::now(), "default");
        assert!(matches!(result, Err(RoutingError::ClusterIneligible(_))));
    }

    #[test]
    fn explicit_eligible_cluster_is_pinned_even_when_not_highest_scoring() {
        let clusters = vec![cluster("c1", "us-west", 0.5, 0.5), cluster("c2", "us-west", 0.95, 0.95)];
        let req = request(Some("c1"), Some("us-west"), None);
        let decision = route(&req, &clusters, Utc::now(), "default").unwrap();
        assert_eq!(decision.selected_cluster.as_str(), "c1");
        assert_eq!(decision.candidates, vec![ClusterId::new("c1")]);
        assert_eq!(decision.scores.len(), 1);
    }

    #[test]
    fn region_fallback_scenario_selects_allowed_region() {
        // Scenario S4: required region has no capacity, allowed fallback region does.
        let clusters = vec![cluster("c1", "eu-west", 0.8, 0.8)];
        let req = request(None, Some("us-west"), Some(vec!["eu-west"]));
        let decision = route(&req, &clusters, Utc::now(), "default").unwrap();
        assert_eq!(decision.selected_cluster.as_str(), "c1");
        assert_eq!(decision.scores[&ClusterId::new("c1")].region, 0.5);
    }

    #[test]
    fn identical_inputs_yield_identical_decision_hash() {
        let clusters = vec![cluster("c1", "us-west", 0.8, 0.8)];
        let req = request(None, Some("us-west"), None);
        let ts = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let d1 = route(&req, &clusters, ts, "default").unwrap();
        let d2 = route(&req, &clusters, ts, "default").unwrap();
        assert_eq!(d1.decision_hash, d2.decision_hash);
    }
}
