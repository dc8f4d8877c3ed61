use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ClusterId, CustomerAddress, JobId, OfferingId, ProviderAddress, RecordId};

// ── Backend / canonical state ────────────────────────────────────────────────

/// Which concrete batch-scheduler backend drives a job. Carried on
/// `SchedulerJob` so persisted/replayed records are self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Slurm,
    Kubernetes,
    Simulated,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendType::Slurm => "slurm",
            BackendType::Kubernetes => "kubernetes",
            BackendType::Simulated => "simulated",
        };
        write!(f, "{}", s)
    }
}

/// The canonical job lifecycle state, shared by the Scheduler Adapter
/// (which proposes transitions) and the Lifecycle Engine (which is the
/// sole authority on whether a proposed transition is valid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalState {
    Pending,
    Queued,
    Starting,
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl CanonicalState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CanonicalState::Completed
                | CanonicalState::Failed
                | CanonicalState::Cancelled
                | CanonicalState::Timeout
        )
    }
}

impl std::fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CanonicalState::Pending => "pending",
            CanonicalState::Queued => "queued",
            CanonicalState::Starting => "starting",
            CanonicalState::Running => "running",
            CanonicalState::Suspended => "suspended",
            CanonicalState::Completed => "completed",
            CanonicalState::Failed => "failed",
            CanonicalState::Cancelled => "cancelled",
            CanonicalState::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// The allowed-transition table of spec §4.C. This is the single source of
/// truth consulted by the Lifecycle Engine; the Scheduler Adapter may
/// propose any state but never validates it itself.
pub fn transition_allowed(from: CanonicalState, to: CanonicalState) -> bool {
    use CanonicalState::*;
    matches!(
        (from, to),
        (Pending, Queued)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Queued, Starting)
            | (Queued, Failed)
            | (Queued, Cancelled)
            | (Starting, Running)
            | (Starting, Failed)
            | (Starting, Cancelled)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
            | (Running, Suspended)
            | (Running, Timeout)
            | (Suspended, Running)
            | (Suspended, Failed)
            | (Suspended, Cancelled)
    )
}

// ── Workload / resources / job ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub image: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub nodes: u32,
    pub cores_per_node: u32,
    pub memory_gb_per_node: u32,
    pub gpus_per_node: u32,
    pub gpu_type: Option<String>,
    pub storage_gb: u32,
}

/// An immutable job request. Never mutated after submission; owned by the
/// Lifecycle Engine for the duration of its run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub cluster_id: Option<ClusterId>,
    pub offering_id: OfferingId,
    pub provider_address: ProviderAddress,
    pub customer_address: CustomerAddress,
    pub workload: Workload,
    pub resources: Resources,
    pub queue_name: Option<String>,
    pub max_runtime_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub priority: u8,
}

impl Job {
    /// Validate the invariants spec §3 places on a `Job` before it is
    /// accepted into the system: `max-runtime-seconds > 0`, `priority in [0..100]`.
    pub fn validate(&self) -> Result<(), crate::error::DomainError> {
        if self.max_runtime_seconds == 0 {
            return Err(crate::error::DomainError::InvalidMaxRuntime(0));
        }
        if self.priority > 100 {
            return Err(crate::error::DomainError::InvalidPriority(self.priority));
        }
        Ok(())
    }
}

// ── SchedulerJob / LifecycleEvent ────────────────────────────────────────────

/// The adapter's handle on a submitted job. One-to-one with `Job`; mutated
/// only through state transitions proposed by the adapter and accepted by
/// the Lifecycle Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerJob {
    pub job_id: JobId,
    pub backend_job_id: Option<String>,
    pub backend_type: BackendType,
    pub state: CanonicalState,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub original_job_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEventKind {
    JobSubmitted,
    JobQueued,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobCancelled,
    JobSuspended,
    JobTimeout,
}

impl std::fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleEventKind::JobSubmitted => "job_submitted",
            LifecycleEventKind::JobQueued => "job_queued",
            LifecycleEventKind::JobStarted => "job_started",
            LifecycleEventKind::JobCompleted => "job_completed",
            LifecycleEventKind::JobFailed => "job_failed",
            LifecycleEventKind::JobCancelled => "job_cancelled",
            LifecycleEventKind::JobSuspended => "job_suspended",
            LifecycleEventKind::JobTimeout => "job_timeout",
        };
        write!(f, "{}", s)
    }
}

impl LifecycleEventKind {
    pub fn for_transition(to: CanonicalState) -> Option<Self> {
        use CanonicalState::*;
        Some(match to {
            Queued => LifecycleEventKind::JobQueued,
            Starting => LifecycleEventKind::JobStarted,
            Running => return None, // Starting -> Running is folded into JobStarted at Starting
            Completed => LifecycleEventKind::JobCompleted,
            Failed => LifecycleEventKind::JobFailed,
            Cancelled => LifecycleEventKind::JobCancelled,
            Suspended => LifecycleEventKind::JobSuspended,
            Timeout => LifecycleEventKind::JobTimeout,
            Pending => LifecycleEventKind::JobSubmitted,
        })
    }
}

/// An append-only record of one accepted state transition. Order within a
/// job's `Vec<LifecycleEvent>` is preserved and drives callback dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub job_id: JobId,
    pub event_kind: LifecycleEventKind,
    pub from_state: Option<CanonicalState>,
    pub to_state: CanonicalState,
    pub timestamp: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
}

// ── Cluster / Partition ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Up,
    Down,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionLiveState {
    Up,
    Down,
    Drained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub cpu: u64,
    pub mem_gb: u64,
    pub gpus: u64,
    pub gpu_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub node_count: u32,
    pub priority: u8,
    pub state: PartitionLiveState,
    pub available_gpu: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: ClusterId,
    pub provider_id: String,
    pub region: String,
    pub partitions: Vec<Partition>,
    pub total: Capacity,
    pub available: Capacity,
    pub endpoint: String,
    pub status: ClusterStatus,
    /// Identity/KYC tier this cluster is willing to serve, 0 = lowest.
    pub identity_tier: u8,
    /// Pre-normalized [0,1] score inputs supplied by cluster metadata.
    pub latency_score: f64,
    pub price_score: f64,
}

// ── RoutingDecision ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterScore {
    pub resource: f64,
    pub region: f64,
    pub latency: f64,
    pub price: f64,
    pub gpu_match: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub job_id: JobId,
    pub candidates: Vec<ClusterId>,
    pub scores: HashMap<ClusterId, ClusterScore>,
    pub selected_cluster: ClusterId,
    pub selected_partition: String,
    pub reason: String,
    pub decision_hash: String,
    pub timestamp: DateTime<Utc>,
}

// ── Metrics ───────────────────────────────────────────────────────────────────

/// Fixed-point node-hours: `numerator / scale`. Avoids floating point in a
/// billable quantity per spec §4.G ("integer fixed-point").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHours {
    pub numerator: u64,
    pub scale: u64,
}

impl NodeHours {
    pub fn from_node_seconds(node_seconds: u64) -> Self {
        NodeHours { numerator: node_seconds, scale: 3600 }
    }

    pub fn as_f64(self) -> f64 {
        if self.scale == 0 {
            0.0
        } else {
            self.numerator as f64 / self.scale as f64
        }
    }
}

impl std::fmt::Display for NodeHours {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.as_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Metrics {
    pub wall_clock_seconds: u64,
    pub cpu_time_seconds: u64,
    pub cpu_core_seconds: u64,
    pub memory_bytes_max: u64,
    pub memory_gb_seconds: u64,
    pub gpu_seconds: u64,
    pub storage_gb_seconds: u64,
    pub network_bytes_in: u64,
    pub network_bytes_out: u64,
    pub nodes_used: u32,
    pub node_hours_numerator: u64,
}

impl Metrics {
    pub fn node_hours(&self) -> NodeHours {
        NodeHours::from_node_seconds(self.node_hours_numerator)
    }

    /// True iff `self` componentwise dominates (>=) `other`. Used to
    /// enforce monotonicity (I3/P4) and to detect fraud-check regressions.
    pub fn dominates(&self, other: &Metrics) -> bool {
        self.wall_clock_seconds >= other.wall_clock_seconds
            && self.cpu_time_seconds >= other.cpu_time_seconds
            && self.cpu_core_seconds >= other.cpu_core_seconds
            && self.memory_bytes_max >= other.memory_bytes_max
            && self.memory_gb_seconds >= other.memory_gb_seconds
            && self.gpu_seconds >= other.gpu_seconds
            && self.storage_gb_seconds >= other.storage_gb_seconds
            && self.network_bytes_in >= other.network_bytes_in
            && self.network_bytes_out >= other.network_bytes_out
    }

    /// True iff `self` strictly exceeds `other` in at least one component
    /// (used to suppress zero-delta periodic snapshots, spec §4.G).
    pub fn advanced_since(&self, other: &Metrics) -> bool {
        self.wall_clock_seconds > other.wall_clock_seconds
            || self.cpu_time_seconds > other.cpu_time_seconds
            || self.cpu_core_seconds > other.cpu_core_seconds
            || self.memory_bytes_max > other.memory_bytes_max
            || self.memory_gb_seconds > other.memory_gb_seconds
            || self.gpu_seconds > other.gpu_seconds
            || self.storage_gb_seconds > other.storage_gb_seconds
            || self.network_bytes_in > other.network_bytes_in
            || self.network_bytes_out > other.network_bytes_out
    }
}

// ── Signatures / hashes ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub const ZERO: ContentHash = ContentHash([0u8; 32]);
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyBytes(pub Vec<u8>);

// ── StatusReport / UsageRecord ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub provider_address: ProviderAddress,
    pub job_id: JobId,
    pub backend_job_id: Option<String>,
    pub backend_type: BackendType,
    pub state: CanonicalState,
    pub exit_code: Option<i32>,
    pub end_time: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
    pub signature: Signature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub record_id: RecordId,
    pub job_id: JobId,
    pub cluster_id: ClusterId,
    pub provider: ProviderAddress,
    pub customer: CustomerAddress,
    pub offering_id: OfferingId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metrics: Metrics,
    pub is_final: bool,
    pub job_state: CanonicalState,
    pub prev_record_hash: ContentHash,
    pub content_hash: ContentHash,
    pub signature: Signature,
    pub submitted_at: Option<DateTime<Utc>>,
}

// ── Credentials ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    ApiToken,
    SshKey,
    Kubeconfig,
}

/// Secret material for one cluster. Never logged — `Debug` redacts the
/// payload — and zeroed on drop.
pub struct Credentials {
    pub cluster_id: ClusterId,
    pub kind: CredentialType,
    secret_material: Vec<u8>,
}

impl Credentials {
    pub fn new(cluster_id: ClusterId, kind: CredentialType, secret_material: Vec<u8>) -> Self {
        Credentials { cluster_id, kind, secret_material }
    }

    pub fn reveal(&self) -> &[u8] {
        &self.secret_material
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cluster_id", &self.cluster_id)
            .field("kind", &self.kind)
            .field("secret_material", &"<redacted>")
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        for byte in self.secret_material.iter_mut() {
            *byte = 0;
        }
    }
}
