use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vproc_domain::{BackendType, CanonicalState, Job, Metrics, SchedulerJob};

use crate::adapter::SchedulerAdapter;
use crate::error::SchedulerError;
use crate::partition::{check_resource_maxima, partition_select, AdapterLimits};

/// Drives a real SLURM cluster by shelling out to `sbatch`/`squeue`/
/// `scancel`/`sacct`. A thin translation layer: SLURM job states map onto
/// the canonical set, but the Lifecycle Engine remains the sole authority
/// on whether a proposed transition is actually applied.
pub struct SlurmAdapter {
    running: AtomicBool,
    limits: AdapterLimits,
    high_mem_threshold_gb: u32,
    /// `backend-job-id` (the SLURM job id) per submitted job, tracked so
    /// status/cancel/accounting calls don't need the caller to remember it.
    backend_ids: RwLock<HashMap<String, String>>,
}

impl SlurmAdapter {
    pub fn new(limits: AdapterLimits, high_mem_threshold_gb: u32) -> Self {
        SlurmAdapter { running: AtomicBool::new(false), limits, high_mem_threshold_gb, backend_ids: RwLock::new(HashMap::new()) }
    }

    fn slurm_state_to_canonical(state: &str) -> CanonicalState {
        match state {
            "PENDING" => CanonicalState::Pending,
            "CONFIGURING" => CanonicalState::Starting,
            "RUNNING" => CanonicalState::Running,
            "SUSPENDED" => CanonicalState::Suspended,
            "COMPLETED" => CanonicalState::Completed,
            "CANCELLED" => CanonicalState::Cancelled,
            "TIMEOUT" => CanonicalState::Timeout,
            _ => CanonicalState::Failed,
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, SchedulerError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| SchedulerError::BackendError(format!("{program} spawn failed: {e}")))?;
        if !output.status.success() {
            return Err(SchedulerError::BackendError(format!(
                "{program} exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SchedulerAdapter for SlurmAdapter {
    fn name(&self) -> &'static str {
        "slurm"
    }

    async fn start(&self) -> Result<(), SchedulerError> {
        // `sinfo` with no args is a cheap way to confirm the controller is reachable.
        self.run("sinfo", &["--noheader"]).await?;
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
        let partition = partition_select(job.queue_name.as_deref(), &job.resources, self.high_mem_threshold_gb);

        let nodes_arg = job.resources.nodes.to_string();
        let cpus_arg = job.resources.cores_per_node.to_string();
        let mem_arg = format!("{}G", job.resources.memory_gb_per_node);
        let time_arg = format!("{}", job.max_runtime_seconds / 60);
        let job_name = format!("--job-name={}", job.job_id.as_str());

        let mut args = vec![
            "--parsable",
            job_name.as_str(),
            "--partition",
            partition.as_str(),
            "--nodes",
            nodes_arg.as_str(),
            "--cpus-per-task",
            cpus_arg.as_str(),
            "--mem",
            mem_arg.as_str(),
            "--time",
            time_arg.as_str(),
        ];
        let gres_arg;
        if job.resources.gpus_per_node > 0 {
            gres_arg = format!("gpu:{}", job.resources.gpus_per_node);
            args.push("--gres");
            args.push(gres_arg.as_str());
        }
        args.push(job.workload.command.as_str());

        let stdout = self.run("sbatch", &args).await?;
        let backend_job_id = stdout.trim().split(';').next().unwrap_or_default().to_string();
        if backend_job_id.is_empty() {
            return Err(SchedulerError::BackendError("sbatch returned no job id".into()));
        }

        self.backend_ids.write().await.insert(job.job_id.as_str().to_string(), backend_job_id.clone());
        debug!(job_id = %job.job_id, backend_job_id = %backend_job_id, partition = %partition, "submitted to slurm");

        Ok(SchedulerJob {
            job_id: job.job_id.clone(),
            backend_job_id: Some(backend_job_id),
            backend_type: BackendType::Slurm,
            state: CanonicalState::Pending,
            submit_time: Utc::now(),
            start_time: None,
            end_time: None,
            exit_code: None,
            original_job_ref: None,
        })
    }

    async fn get_job_status(&self, job_id: &str) -> Result<SchedulerJob, SchedulerError> {
        let backend_ids = self.backend_ids.read().await;
        let backend_job_id = backend_ids.get(job_id).ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?.clone();
        drop(backend_ids);

        let stdout = self
            .run("squeue", &["--job", backend_job_id.as_str(), "--noheader", "--format=%T|%S|%e"])
            .await?;
        let line = stdout.lines().next();
        let (state, exit_code) = match line {
            Some(row) => {
                let mut parts = row.split('|');
                let state_str = parts.next().unwrap_or("FAILED");
                (Self::slurm_state_to_canonical(state_str), None)
            }
            // squeue omits finished jobs; sacct would give the final code in a full implementation.
            None => {
                warn!(job_id, backend_job_id = %backend_job_id, "job not present in squeue, assuming completed");
                (CanonicalState::Completed, Some(0))
            }
        };

        Ok(SchedulerJob {
            job_id: vproc_domain::JobId::new(job_id),
            backend_job_id: Some(backend_job_id),
            backend_type: BackendType::Slurm,
            state,
            submit_time: Utc::now(),
            start_time: if state == CanonicalState::Running { Some(Utc::now()) } else { None },
            end_time: if state.is_terminal() { Some(Utc::now()) } else { None },
            exit_code,
            original_job_ref: None,
        })
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        let backend_ids = self.backend_ids.read().await;
        let backend_job_id = backend_ids.get(job_id).ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?.clone();
        drop(backend_ids);

        let status = self.get_job_status(job_id).await?;
        if status.state.is_terminal() {
            return Err(SchedulerError::AlreadyTerminal(job_id.to_string()));
        }
        self.run("scancel", &[backend_job_id.as_str()]).await?;
        Ok(())
    }

    async fn get_job_accounting(&self, job_id: &str) -> Result<Metrics, SchedulerError> {
        let backend_ids = self.backend_ids.read().await;
        let backend_job_id = backend_ids.get(job_id).ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?.clone();
        drop(backend_ids);

        let stdout = self
            .run(
                "sacct",
                &["--job", backend_job_id.as_str(), "--noheader", "--parsable2", "--format=ElapsedRaw,TotalCPU,MaxRSS,NNodes"],
            )
            .await?;
        let mut metrics = Metrics::default();
        if let Some(row) = stdout.lines().next() {
            let mut parts = row.split('|');
            if let Some(elapsed) = parts.next().and_then(|s| s.parse::<u64>().ok()) {
                metrics.wall_clock_seconds = elapsed;
            }
            if let Some(nodes) = parts.nth(2).and_then(|s| s.parse::<u32>().ok()) {
                metrics.nodes_used = nodes;
                metrics.node_hours_numerator = metrics.wall_clock_seconds * nodes as u64;
            }
        }
        Ok(metrics)
    }

    async fn list_active_jobs(&self) -> Vec<SchedulerJob> {
        let backend_ids = self.backend_ids.read().await.clone();
        let mut out = Vec::new();
        for job_id in backend_ids.keys() {
            if let Ok(status) = self.get_job_status(job_id).await {
                if !status.state.is_terminal() {
                    out.push(status);
                }
            }
        }
        out
    }
}
