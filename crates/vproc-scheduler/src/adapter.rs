use async_trait::async_trait;
use vproc_crypto::{Clock, Signer};
use vproc_domain::{Job, Metrics, ProviderAddress, SchedulerJob};

use crate::error::SchedulerError;

/// Uniform interface over one concrete batch-scheduler backend (spec
/// §4.C). Implementations are responsible for translating backend-native
/// states into the canonical set on every `get_job_status`/poll call —
/// the Lifecycle Engine, not the adapter, is the authority on whether a
/// proposed transition is valid.
#[async_trait]
pub trait SchedulerAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Idempotent: calling `start` while already running is a no-op.
    async fn start(&self) -> Result<(), SchedulerError>;

    /// Tears down long-lived backend connections. Idempotent.
    async fn stop(&self) -> Result<(), SchedulerError>;

    /// Fails with `AdapterNotRunning` unless `start` has succeeded and
    /// `stop` has not since been called.
    async fn submit(&self, job: &Job) -> Result<SchedulerJob, SchedulerError>;

    async fn get_job_status(&self, job_id: &str) -> Result<SchedulerJob, SchedulerError>;

    /// May transition a job in `{Pending, Queued, Starting, Running,
    /// Suspended}` to `Cancelled`; terminal jobs return `AlreadyTerminal`.
    async fn cancel_job(&self, job_id: &str) -> Result<(), SchedulerError>;

    /// Returns the latest captured metrics. Safe to call on a running job
    /// — returns a partial snapshot.
    async fn get_job_accounting(&self, job_id: &str) -> Result<Metrics, SchedulerError>;

    async fn list_active_jobs(&self) -> Vec<SchedulerJob>;

    /// Signs the hash of the canonical payload `(provider, job-id,
    /// backend-job-id, state, exit-code, timestamp)` with `signer`, using
    /// `clock` for the timestamp so two reports for different jobs never
    /// collide even when their states match.
    async fn create_status_report(
        &self,
        job: &SchedulerJob,
        provider: &ProviderAddress,
        signer: &dyn Signer,
        clock: &dyn Clock,
    ) -> vproc_domain::StatusReport {
        let timestamp = clock.now();
        let content_hash = vproc_crypto::payload::status_report_hash(
            provider.as_str(),
            job.job_id.as_str(),
            job.backend_job_id.as_deref(),
            job.backend_type,
            job.state,
            job.exit_code,
            timestamp.timestamp() as u64,
        );
        let signature = signer.sign(&content_hash.0);
        vproc_domain::StatusReport {
            provider_address: provider.clone(),
            job_id: job.job_id.clone(),
            backend_job_id: job.backend_job_id.clone(),
            backend_type: job.backend_type,
            state: job.state,
            exit_code: job.exit_code,
            end_time: job.end_time,
            timestamp,
            signature,
        }
    }
}
