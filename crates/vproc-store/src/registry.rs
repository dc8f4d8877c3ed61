use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use vproc_domain::{Cluster, ClusterId};

use crate::error::StoreError;

/// A delta applied to a cluster's available capacity. Negative values
/// consume capacity (submit), positive values release it (terminate).
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityDelta {
    pub cpu: i64,
    pub mem_gb: i64,
    pub gpus: i64,
}

/// Registered clusters, partitions, and live capacity (spec component D).
///
/// Each cluster is held behind its own lock so `update_capacity` on one
/// cluster never blocks readers/writers of another — only the outer map
/// lock (held briefly, for lookup) is shared.
#[derive(Clone, Default)]
pub struct ClusterRegistry {
    clusters: Arc<RwLock<HashMap<ClusterId, Arc<RwLock<Cluster>>>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_cluster(&self, cluster: Cluster) -> Result<(), StoreError> {
        let mut map = self.clusters.write().await;
        if map.contains_key(&cluster.cluster_id) {
            return Err(StoreError::ClusterAlreadyRegistered(cluster.cluster_id.to_string()));
        }
        map.insert(cluster.cluster_id.clone(), Arc::new(RwLock::new(cluster)));
        Ok(())
    }

    async fn handle(&self, cluster_id: &ClusterId) -> Result<Arc<RwLock<Cluster>>, StoreError> {
        let map = self.clusters.read().await;
        map.get(cluster_id)
            .cloned()
            .ok_or_else(|| StoreError::ClusterNotFound(cluster_id.to_string()))
    }

    pub async fn get_cluster(&self, cluster_id: &ClusterId) -> Result<Cluster, StoreError> {
        let handle = self.handle(cluster_id).await?;
        Ok(handle.read().await.clone())
    }

    pub async fn list_clusters(&self) -> Vec<Cluster> {
        let map = self.clusters.read().await;
        let mut out = Vec::with_capacity(map.len());
        for handle in map.values() {
            out.push(handle.read().await.clone());
        }
        out
    }

    /// Atomically apply `delta` to `cluster_id`'s available capacity.
    /// Serialized per-cluster (spec §4.D, §5) — concurrent calls against
    /// different clusters proceed independently.
    pub async fn update_capacity(&self, cluster_id: &ClusterId, delta: CapacityDelta) -> Result<(), StoreError> {
        let handle = self.handle(cluster_id).await?;
        let mut cluster = handle.write().await;
        let new_cpu = cluster.available.cpu as i64 + delta.cpu;
        let new_mem = cluster.available.mem_gb as i64 + delta.mem_gb;
        let new_gpus = cluster.available.gpus as i64 + delta.gpus;
        if new_cpu < 0 || new_mem < 0 || new_gpus < 0 {
            return Err(StoreError::InsufficientCapacity { cluster_id: cluster_id.to_string() });
        }
        cluster.available.cpu = new_cpu as u64;
        cluster.available.mem_gb = new_mem as u64;
        cluster.available.gpus = new_gpus as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproc_domain::{Capacity, ClusterStatus};

    fn sample_cluster(id: &str) -> Cluster {
        Cluster {
            cluster_id: ClusterId::new(id),
            provider_id: "provider-1".into(),
            region: "us-west".into(),
            partitions: vec![],
            total: Capacity { cpu: 100, mem_gb: 400, gpus: 8, gpu_types: vec!["a100".into()] },
            available: Capacity { cpu: 100, mem_gb: 400, gpus: 8, gpu_types: vec!["a100".into()] },
            endpoint: "https://cluster.example".into(),
            status: ClusterStatus::Up,
            identity_tier: 0,
            latency_score: 0.9,
            price_score: 0.8,
        }
    }

    #[tokio::test]
    async fn register_then_get() {
        let registry = ClusterRegistry::new();
        registry.register_cluster(sample_cluster("c1")).await.unwrap();
        let got = registry.get_cluster(&ClusterId::new("c1")).await.unwrap();
        assert_eq!(got.cluster_id.as_str(), "c1");
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let registry = ClusterRegistry::new();
        registry.register_cluster(sample_cluster("c1")).await.unwrap();
        let result = registry.register_cluster(sample_cluster("c1")).await;
        assert!(matches!(result, Err(StoreError::ClusterAlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn update_capacity_is_atomic_and_rejects_overdraw() {
        let registry = ClusterRegistry::new();
        registry.register_cluster(sample_cluster("c1")).await.unwrap();
        let id = ClusterId::new("c1");

        registry.update_capacity(&id, CapacityDelta { cpu: -40, mem_gb: -100, gpus: -2 }).await.unwrap();
        let cluster = registry.get_cluster(&id).await.unwrap();
        assert_eq!(cluster.available.cpu, 60);
        assert_eq!(cluster.available.gpus, 6);

        let result = registry.update_capacity(&id, CapacityDelta { cpu: -1000, mem_gb: 0, gpus: 0 }).await;
        assert!(matches!(result, Err(StoreError::InsufficientCapacity { .. })));
        // Rejected delta must not have partially applied.
        let cluster = registry.get_cluster(&id).await.unwrap();
        assert_eq!(cluster.available.cpu, 60);
    }

    #[tokio::test]
    async fn unrelated_clusters_do_not_block_each_other() {
        let registry = ClusterRegistry::new();
        registry.register_cluster(sample_cluster("a")).await.unwrap();
        registry.register_cluster(sample_cluster("b")).await.unwrap();

        let r1 = registry.clone();
        let r2 = registry.clone();
        let (res_a, res_b) = tokio::join!(
            r1.update_capacity(&ClusterId::new("a"), CapacityDelta { cpu: -10, mem_gb: 0, gpus: 0 }),
            r2.update_capacity(&ClusterId::new("b"), CapacityDelta { cpu: -20, mem_gb: 0, gpus: 0 }),
        );
        res_a.unwrap();
        res_b.unwrap();
    }
}
