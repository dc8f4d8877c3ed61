use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;
use vproc_audit::{AuditEvent, AuditSink};
use vproc_domain::{JobId, RecordId, StatusReport, UsageRecord};
use vproc_store::PersistedLog;

use crate::client::{ChainAck, ChainClient};
use crate::error::ReporterError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueuedRecord {
    Usage(UsageRecord),
    Status(StatusReport),
}

impl QueuedRecord {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueuedRecord::Usage(r) => &r.job_id,
            QueuedRecord::Status(r) => &r.job_id,
        }
    }

    /// Final usage records and status reports are both non-displaceable;
    /// only a periodic (non-final) usage record may be evicted to make
    /// room (spec §4.H).
    fn is_displaceable(&self) -> bool {
        matches!(self, QueuedRecord::Usage(r) if !r.is_final)
    }
}

struct QueueEntry {
    record_id: RecordId,
    payload: QueuedRecord,
    attempts: u32,
}

/// Bounded FIFO of records awaiting chain submission (spec component H).
/// A periodic usage snapshot may be displaced by a final one for the same
/// job when the queue is full; every other kind of entry fails fast with
/// `QueueFull` once capacity is reached.
pub struct ReporterQueue {
    inner: Mutex<VecDeque<QueueEntry>>,
    capacity: usize,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
    persisted: Arc<PersistedLog>,
    audit: Arc<dyn AuditSink>,
    chain: Arc<dyn ChainClient>,
}

impl ReporterQueue {
    pub fn new(
        capacity: usize,
        batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
        persisted: Arc<PersistedLog>,
        audit: Arc<dyn AuditSink>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        ReporterQueue {
            inner: Mutex::new(VecDeque::new()),
            capacity,
            batch_size,
            max_retries,
            retry_backoff,
            persisted,
            audit,
            chain,
        }
    }

    fn record_id_for(payload: &QueuedRecord) -> RecordId {
        match payload {
            QueuedRecord::Usage(r) => r.record_id.clone(),
            QueuedRecord::Status(r) => RecordId::new(format!("status:{}:{}", r.job_id, r.timestamp.timestamp())),
        }
    }

    pub async fn enqueue(&self, payload: QueuedRecord) -> Result<RecordId, ReporterError> {
        let record_id = Self::record_id_for(&payload);
        let mut inner = self.inner.lock().await;

        if inner.len() >= self.capacity {
            let displaced = if !payload.is_displaceable() {
                inner.iter().position(|e| e.payload.job_id() == payload.job_id() && e.payload.is_displaceable())
            } else {
                None
            };
            match displaced {
                Some(idx) => {
                    let removed = inner.remove(idx).expect("index was just located");
                    self.persisted.mark_acknowledged(&removed.record_id).await?;
                }
                None => return Err(ReporterError::QueueFull(self.capacity)),
            }
        }

        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        self.persisted.append(&record_id, &bytes).await?;
        inner.push_back(QueueEntry { record_id: record_id.clone(), payload, attempts: 0 });
        Ok(record_id)
    }

    /// Re-populates the queue from the crash-safe log on startup. Entries
    /// keep their original `record-id` so a chain that already saw them
    /// before the crash treats resubmission as `Duplicate`, not a new
    /// record (spec §9, "Replay and crash recovery").
    pub async fn recover(&self) -> Result<usize, ReporterError> {
        let pending = self.persisted.replay().await?;
        let mut inner = self.inner.lock().await;
        let mut recovered = 0;
        for (record_id, bytes) in pending {
            if let Ok(payload) = serde_json::from_slice::<QueuedRecord>(&bytes) {
                inner.push_back(QueueEntry { record_id, payload, attempts: 0 });
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Pops up to `batch_size` entries for one submission. Batches favor a
    /// single job but draw from a second job's entries rather than return
    /// an undersized batch while the queue holds more to give (spec §4.H:
    /// "batch boundaries do not cross job boundaries unless the queue
    /// would otherwise stall").
    async fn pop_batch(&self) -> Vec<QueueEntry> {
        let mut inner = self.inner.lock().await;
        if inner.is_empty() {
            return Vec::new();
        }
        let mut batch = Vec::new();
        let target_job = inner[0].payload.job_id().clone();
        let mut idx = 0;
        while idx < inner.len() && batch.len() < self.batch_size {
            if inner[idx].payload.job_id() == &target_job {
                batch.push(inner.remove(idx).expect("index in bounds"));
            } else {
                idx += 1;
            }
        }
        while batch.len() < self.batch_size && !inner.is_empty() {
            batch.push(inner.pop_front().expect("queue checked non-empty"));
        }
        batch
    }

    async fn requeue_front(&self, entry: QueueEntry) {
        self.inner.lock().await.push_front(entry);
    }

    /// Drains and submits one batch, retrying transient failures with
    /// exponential backoff up to `max_retries` before dead-lettering the
    /// entry. Returns the number of entries it attempted.
    pub async fn drain_once(&self) -> usize {
        let batch = self.pop_batch().await;
        if batch.is_empty() {
            return 0;
        }

        let usage_entries: Vec<&QueueEntry> = batch.iter().filter(|e| matches!(e.payload, QueuedRecord::Usage(_))).collect();
        let mut acks = std::collections::HashMap::new();
        if !usage_entries.is_empty() {
            let records: Vec<UsageRecord> = usage_entries
                .iter()
                .map(|e| match &e.payload {
                    QueuedRecord::Usage(r) => r.clone(),
                    QueuedRecord::Status(_) => unreachable!(),
                })
                .collect();
            match self.chain.submit_usage_records(&records).await {
                Ok(results) => {
                    for (entry, ack) in usage_entries.iter().zip(results) {
                        acks.insert(entry.record_id.clone(), Ok(ack));
                    }
                }
                Err(err) => {
                    for entry in &usage_entries {
                        acks.insert(entry.record_id.clone(), Err(Self::clone_err(&err)));
                    }
                }
            }
        }

        let attempted = batch.len();
        for mut entry in batch {
            let outcome = match &entry.payload {
                QueuedRecord::Usage(_) => acks.remove(&entry.record_id).unwrap_or(Err(ReporterError::Transient("missing ack".into()))),
                QueuedRecord::Status(report) => self.chain.submit_status_report(report).await,
            };

            match outcome {
                Ok(ChainAck::Accepted) | Ok(ChainAck::Duplicate) => {
                    if let Err(e) = self.persisted.mark_acknowledged(&entry.record_id).await {
                        warn!(record_id = %entry.record_id, error = %e, "failed to mark record acknowledged on disk");
                    }
                }
                Err(ReporterError::Permanent(reason)) => {
                    warn!(record_id = %entry.record_id, reason, "chain client rejected record permanently, dead-lettering");
                    self.audit
                        .log_security(AuditEvent::SecurityEvent { id: Uuid::new_v4(), at: chrono::Utc::now(), message: format!("dead-lettered record {}: {reason}", entry.record_id) })
                        .await;
                    let _ = self.persisted.mark_acknowledged(&entry.record_id).await;
                }
                Err(err) => {
                    entry.attempts += 1;
                    if entry.attempts > self.max_retries {
                        warn!(record_id = %entry.record_id, error = %err, attempts = entry.attempts, "exhausted retries, dead-lettering");
                        self.audit
                            .log_security(AuditEvent::SecurityEvent { id: Uuid::new_v4(), at: chrono::Utc::now(), message: format!("dead-lettered record {} after {} attempts: {err}", entry.record_id, entry.attempts) })
                            .await;
                        let _ = self.persisted.mark_acknowledged(&entry.record_id).await;
                    } else {
                        let backoff = self.retry_backoff * 2u32.pow(entry.attempts.saturating_sub(1)).min(16);
                        info!(record_id = %entry.record_id, attempts = entry.attempts, backoff_ms = backoff.as_millis() as u64, "retrying after backoff");
                        tokio::time::sleep(backoff).await;
                        self.requeue_front(entry).await;
                    }
                }
            }
        }
        attempted
    }

    fn clone_err(err: &ReporterError) -> ReporterError {
        match err {
            ReporterError::Transient(msg) => ReporterError::Transient(msg.clone()),
            ReporterError::Permanent(msg) => ReporterError::Permanent(msg.clone()),
            ReporterError::QueueFull(cap) => ReporterError::QueueFull(*cap),
            ReporterError::Store(_) => ReporterError::Transient("store error".into()),
        }
    }

    /// Long-lived drain worker: repeatedly calls `drain_once` until told
    /// to stop. Used by the Supervisor's reporter worker task.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, idle_poll: Duration) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let attempted = self.drain_once().await;
            if attempted == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(idle_poll) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    }
}
