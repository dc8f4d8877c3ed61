use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use vproc_audit::InMemoryAuditSink;
use vproc_domain::{Job, JobId};
use vproc_lifecycle::LifecycleEngine;
use vproc_scheduler::SchedulerAdapter;
use vproc_store::ClusterRegistry;
use vproc_usage::UsagePipeline;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<dyn SchedulerAdapter>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub cluster_registry: Arc<ClusterRegistry>,
    pub usage: Arc<UsagePipeline>,
    /// Concrete, not `Arc<dyn AuditSink>`, so `/events` can read back what
    /// was recorded — mirrors the teacher's `InMemoryStore.events` tail.
    pub audit: Arc<InMemoryAuditSink>,
    pub auth_token: Arc<String>,
    pub high_mem_threshold_gb: u32,
    /// Submitted job bodies, shared with the Supervisor's poll and snapshot
    /// loops — they need `Resources`/`customer_address` etc. to derive
    /// billable metrics, which `SchedulerJob` alone does not carry.
    pub jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}
