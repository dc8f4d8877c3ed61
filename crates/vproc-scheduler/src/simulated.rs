use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vproc_domain::{BackendType, CanonicalState, Job, Metrics, SchedulerJob};

use crate::adapter::SchedulerAdapter;
use crate::error::SchedulerError;
use crate::partition::{check_resource_maxima, partition_select, AdapterLimits};

/// A stub adapter that simulates a batch scheduler locally. Produces
/// synthetic backend job ids and advances jobs through the canonical
/// states on a fixed cadence driven by `tick`, rather than by talking to
/// any real infrastructure. Used in tests and `simulation-mode` (spec §6).
pub struct SimulatedAdapter {
    running: AtomicBool,
    limits: AdapterLimits,
    high_mem_threshold_gb: u32,
    next_backend_id: AtomicU64,
    jobs: RwLock<HashMap<String, SimulatedJob>>,
}

struct SimulatedJob {
    scheduler_job: SchedulerJob,
    metrics: Metrics,
    ticks_until_running: u32,
    ticks_until_complete: u32,
}

impl SimulatedAdapter {
    pub fn new(limits: AdapterLimits, high_mem_threshold_gb: u32) -> Self {
        SimulatedAdapter {
            running: AtomicBool::new(false),
            limits,
            high_mem_threshold_gb,
            next_backend_id: AtomicU64::new(1),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            AdapterLimits { max_nodes_per_job: 64, max_cores_per_node: 128, max_memory_gb_per_node: 1024, max_gpus_per_node: 8 },
            256,
        )
    }

    /// Advances every non-terminal simulated job by one step. Exposed for
    /// tests and for the poll loop to drive deterministic progress without
    /// a real backend.
    pub async fn tick(&self) {
        let mut jobs = self.jobs.write().await;
        for job in jobs.values_mut() {
            if job.scheduler_job.state.is_terminal() {
                continue;
            }
            match job.scheduler_job.state {
                CanonicalState::Pending => job.scheduler_job.state = CanonicalState::Queued,
                CanonicalState::Queued => job.scheduler_job.state = CanonicalState::Starting,
                CanonicalState::Starting => {
                    if job.ticks_until_running == 0 {
                        job.scheduler_job.state = CanonicalState::Running;
                        job.scheduler_job.start_time = Some(Utc::now());
                    } else {
                        job.ticks_until_running -= 1;
                    }
                }
                CanonicalState::Running => {
                    job.metrics.wall_clock_seconds += 1;
                    job.metrics.cpu_core_seconds += 1;
                    job.metrics.node_hours_numerator += 1;
                    if job.ticks_until_complete == 0 {
                        job.scheduler_job.state = CanonicalState::Completed;
                        job.scheduler_job.end_time = Some(Utc::now());
                        job.scheduler_job.exit_code = Some(0);
                    } else {
                        job.ticks_until_complete -= 1;
                    }
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl SchedulerAdapter for SimulatedAdapter {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn start(&self) -> Result<(), SchedulerError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SchedulerError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn submit(&self, job: &Job) -> Result<SchedulerJob, SchedulerError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::AdapterNotRunning);
        }
        check_resource_maxima(&job.resources, &self.limits)?;
        let _partition = partition_select(job.queue_name.as_deref(), &job.resources, self.high_mem_threshold_gb);

        let backend_id = self.next_backend_id.fetch_add(1, Ordering::SeqCst);
        let scheduler_job = SchedulerJob {
            job_id: job.job_id.clone(),
            backend_job_id: Some(format!("sim-{backend_id}")),
            backend_type: BackendType::Simulated,
            state: CanonicalState::Pending,
            submit_time: Utc::now(),
            start_time: None,
            end_time: None,
            exit_code: None,
            original_job_ref: None,
        };

        let mut jobs = self.jobs.write().await;
        jobs.insert(
            job.job_id.as_str().to_string(),
            SimulatedJob {
                scheduler_job: scheduler_job.clone(),
                metrics: Metrics::default(),
                ticks_until_running: 1,
                ticks_until_complete: 3,
            },
        );
        Ok(scheduler_job)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<SchedulerJob, SchedulerError> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .map(|j| j.scheduler_job.clone())
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        if job.scheduler_job.state.is_terminal() {
            return Err(SchedulerError::AlreadyTerminal(job_id.to_string()));
        }
        job.scheduler_job.state = CanonicalState::Cancelled;
        job.scheduler_job.end_time = Some(Utc::now());
        Ok(())
    }

    async fn get_job_accounting(&self, job_id: &str) -> Result<Metrics, SchedulerError> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|j| j.metrics).ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))
    }

    async fn list_active_jobs(&self) -> Vec<SchedulerJob> {
        let jobs = self.jobs.read().await;
        jobs.values().filter(|j| !j.scheduler_job.state.is_terminal()).map(|j| j.scheduler_job.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use vproc_domain::{CustomerAddress, JobId, OfferingId, ProviderAddress, Resources, Workload};

    fn sample_job(job_id: &str, gpus: u32) -> Job {
        Job {
            job_id: JobId::new(job_id),
            cluster_id: None,
            offering_id: OfferingId::new("o1"),
            provider_address: ProviderAddress::new("p1"),
            customer_address: CustomerAddress::new("c1"),
            workload: Workload { image: "img".into(), command: "run".into(), args: vec![], env: Map::new() },
            resources: Resources { nodes: 1, cores_per_node: 4, memory_gb_per_node: 8, gpus_per_node: gpus, gpu_type: None, storage_gb: 10 },
            queue_name: None,
            max_runtime_seconds: 3600,
            created_at: Utc::now(),
            priority: 50,
        }
    }

    #[tokio::test]
    async fn submit_before_start_fails() {
        let adapter = SimulatedAdapter::with_defaults();
        let result = adapter.submit(&sample_job("j1", 0)).await;
        assert!(matches!(result, Err(SchedulerError::AdapterNotRunning)));
    }

    #[tokio::test]
    async fn submit_then_status_then_progress_to_completion() {
        let adapter = SimulatedAdapter::with_defaults();
        adapter.start().await.unwrap();
        let submitted = adapter.submit(&sample_job("j1", 0)).await.unwrap();
        assert_eq!(submitted.state, CanonicalState::Pending);

        for _ in 0..10 {
            adapter.tick().await;
            let status = adapter.get_job_status("j1").await.unwrap();
            if status.state.is_terminal() {
                assert_eq!(status.state, CanonicalState::Completed);
                assert!(status.end_time.is_some());
                return;
            }
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn cancel_rejects_terminal_jobs() {
        let adapter = SimulatedAdapter::with_defaults();
        adapter.start().await.unwrap();
        adapter.submit(&sample_job("j1", 0)).await.unwrap();
        adapter.cancel_job("j1").await.unwrap();
        let result = adapter.cancel_job("j1").await;
        assert!(matches!(result, Err(SchedulerError::AlreadyTerminal(_))));
    }

    #[tokio::test]
    async fn submit_rejects_oversized_resource_request() {
        let adapter = SimulatedAdapter::with_defaults();
        adapter.start().await.unwrap();
        let mut job = sample_job("j1", 0);
        job.resources.nodes = 10_000;
        let result = adapter.submit(&job).await;
        assert!(matches!(result, Err(SchedulerError::InsufficientResources(_))));
    }
}
