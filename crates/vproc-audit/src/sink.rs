use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::event::AuditEvent;

/// Append-only sink for audit events (spec component I). `record` must
/// never fail the caller's operation — sinks that can fail (e.g. a
/// future durable sink) should swallow and self-log their own errors.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);

    async fn log_job(&self, event: AuditEvent) {
        self.record(event).await;
    }

    async fn log_security(&self, event: AuditEvent) {
        self.record(event).await;
    }

    async fn log_usage(&self, event: AuditEvent) {
        self.record(event).await;
    }
}

/// Forwards every event to `tracing` at `info` level as structured
/// fields. The production default — durable persistence of the audit
/// trail is the operator's log pipeline's job, not this process's.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::JobSubmitted { job_id, cluster_id, .. } => {
                info!(%job_id, cluster_id = ?cluster_id, "job submitted")
            }
            AuditEvent::JobTransition { job_id, from, to, .. } => {
                info!(%job_id, from = ?from, to = ?to, "job transition")
            }
            AuditEvent::TransitionRejected { job_id, from, to, .. } => {
                info!(%job_id, from = ?from, to = ?to, "transition rejected")
            }
            AuditEvent::CallbackFailed { job_id, callback_id, message, .. } => {
                info!(%job_id, callback_id, message, "callback failed")
            }
            AuditEvent::CallbackOverBudget { job_id, callback_id, budget_ms, .. } => {
                info!(%job_id, callback_id, budget_ms, "callback exceeded budget")
            }
            AuditEvent::SecurityEvent { message, .. } => info!(message, "security event"),
            AuditEvent::UsageRecordEmitted { job_id, record_id, is_final, .. } => {
                info!(%job_id, record_id, is_final, "usage record emitted")
            }
            AuditEvent::UsageRecordRejected { job_id, reason, .. } => {
                info!(%job_id, reason, "usage record rejected")
            }
        }
    }
}

/// Keeps every event in memory, in arrival order. Used by tests and by
/// the `events` admin endpoint for a short in-process tail.
#[derive(Default, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    pub async fn events_for_job(&self, job_id: &vproc_domain::JobId) -> Vec<AuditEvent> {
        self.events.read().await.iter().filter(|e| e.job_id() == Some(job_id)).cloned().collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.write().await.push(event);
    }
}
