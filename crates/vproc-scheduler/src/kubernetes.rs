use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use vproc_domain::{Job, Metrics, SchedulerJob};

use crate::adapter::SchedulerAdapter;
use crate::error::SchedulerError;

/// Stub backend for clusters fronted by Kubernetes Jobs. The wire
/// protocol (kube-apiserver REST calls, watch streams) is out of scope
/// for this core; this adapter exists so `scheduler_type: kubernetes`
/// resolves to a real `SchedulerAdapter` and the rest of the pipeline
/// (Lifecycle, Usage, Reporter) can be exercised against it in tests.
pub struct KubernetesAdapter {
    running: AtomicBool,
}

impl KubernetesAdapter {
    pub fn new() -> Self {
        KubernetesAdapter { running: AtomicBool::new(false) }
    }
}

impl Default for KubernetesAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerAdapter for KubernetesAdapter {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn start(&self) -> Result<(), SchedulerError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SchedulerError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn submit(&self, _job: &Job) -> Result<SchedulerJob, SchedulerError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::AdapterNotRunning);
        }
        Err(SchedulerError::BackendError("kubernetes backend not yet implemented".into()))
    }

    async fn get_job_status(&self, job_id: &str) -> Result<SchedulerJob, SchedulerError> {
        Err(SchedulerError::NotFound(job_id.to_string()))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotFound(job_id.to_string()))
    }

    async fn get_job_accounting(&self, job_id: &str) -> Result<Metrics, SchedulerError> {
        Err(SchedulerError::NotFound(job_id.to_string()))
    }

    async fn list_active_jobs(&self) -> Vec<SchedulerJob> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use chrono::Utc;
    use vproc_domain::{CustomerAddress, JobId, OfferingId, ProviderAddress, Resources, Workload};

    fn sample_job() -> Job {
        Job {
            job_id: JobId::new("j1"),
            cluster_id: None,
            offering_id: OfferingId::new("o1"),
            provider_address: ProviderAddress::new("p1"),
            customer_address: CustomerAddress::new("c1"),
            workload: Workload { image: "img".into(), command: "run".into(), args: vec![], env: HashMap::new() },
            resources: Resources { nodes: 1, cores_per_node: 4, memory_gb_per_node: 8, gpus_per_node: 0, gpu_type: None, storage_gb: 10 },
            queue_name: None,
            max_runtime_seconds: 3600,
            created_at: Utc::now(),
            priority: 50,
        }
    }

    #[tokio::test]
    async fn submit_before_start_fails() {
        let adapter = KubernetesAdapter::new();
        assert!(matches!(adapter.submit(&sample_job()).await, Err(SchedulerError::AdapterNotRunning)));
    }
}
