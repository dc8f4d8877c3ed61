use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vproc_domain::{CanonicalState, ClusterId, JobId};

/// Append-only audit record (spec component I). Tagged by `kind` so a
/// sink that persists these as JSON keeps the variant name alongside the
/// fields, mirroring the teacher's `AuditEvent` convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuditEvent {
    JobSubmitted {
        id: Uuid,
        at: DateTime<Utc>,
        job_id: JobId,
        cluster_id: Option<ClusterId>,
    },
    JobTransition {
        id: Uuid,
        at: DateTime<Utc>,
        job_id: JobId,
        from: Option<CanonicalState>,
        to: CanonicalState,
    },
    TransitionRejected {
        id: Uuid,
        at: DateTime<Utc>,
        job_id: JobId,
        from: CanonicalState,
        to: CanonicalState,
    },
    CallbackFailed {
        id: Uuid,
        at: DateTime<Utc>,
        job_id: JobId,
        callback_id: String,
        message: String,
    },
    CallbackOverBudget {
        id: Uuid,
        at: DateTime<Utc>,
        job_id: JobId,
        callback_id: String,
        budget_ms: u64,
    },
    SecurityEvent {
        id: Uuid,
        at: DateTime<Utc>,
        message: String,
    },
    UsageRecordEmitted {
        id: Uuid,
        at: DateTime<Utc>,
        job_id: JobId,
        record_id: String,
        is_final: bool,
    },
    UsageRecordRejected {
        id: Uuid,
        at: DateTime<Utc>,
        job_id: JobId,
        reason: String,
    },
}

impl AuditEvent {
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            AuditEvent::JobSubmitted { job_id, .. }
            | AuditEvent::JobTransition { job_id, .. }
            | AuditEvent::TransitionRejected { job_id, .. }
            | AuditEvent::CallbackFailed { job_id, .. }
            | AuditEvent::CallbackOverBudget { job_id, .. }
            | AuditEvent::UsageRecordEmitted { job_id, .. }
            | AuditEvent::UsageRecordRejected { job_id, .. } => Some(job_id),
            AuditEvent::SecurityEvent { .. } => None,
        }
    }
}
