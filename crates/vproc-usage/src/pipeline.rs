use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use vproc_audit::{AuditEvent, AuditSink};
use vproc_crypto::payload::usage_record_hash;
use vproc_crypto::{Clock, Signer};
use vproc_domain::{CanonicalState, ContentHash, Job, JobId, Metrics, ProviderAddress, RecordId, UsageRecord};

use crate::error::UsageError;

/// Per-job bookkeeping the pipeline needs to enforce the "exactly one
/// final" invariant (I4/P2) and to keep the hash chain and regression
/// check anchored to the last record actually emitted, not the last one
/// merely attempted.
struct UsageTrack {
    last_emitted_metrics: Option<Metrics>,
    chain_tail_hash: ContentHash,
    is_final_emitted: bool,
}

impl Default for UsageTrack {
    fn default() -> Self {
        UsageTrack { last_emitted_metrics: None, chain_tail_hash: ContentHash::ZERO, is_final_emitted: false }
    }
}

/// Turns billable snapshots into signed, hash-chained `UsageRecord`s and
/// forwards each accepted one to the Reporter Queue over a
/// one-directional channel (spec §9 — no direct pointer back into the
/// Lifecycle Engine).
pub struct UsagePipeline {
    clock: Arc<dyn Clock>,
    signer: Arc<dyn Signer>,
    audit: Arc<dyn AuditSink>,
    provider: ProviderAddress,
    tracks: RwLock<HashMap<JobId, UsageTrack>>,
    record_tx: mpsc::UnboundedSender<UsageRecord>,
}

impl UsagePipeline {
    pub fn new(
        clock: Arc<dyn Clock>,
        signer: Arc<dyn Signer>,
        audit: Arc<dyn AuditSink>,
        provider: ProviderAddress,
        record_tx: mpsc::UnboundedSender<UsageRecord>,
    ) -> Self {
        UsagePipeline { clock, signer, audit, provider, tracks: RwLock::new(HashMap::new()), record_tx }
    }

    /// The single entry point both the periodic snapshot loop and the
    /// terminal-triggered final snapshot funnel through, so the
    /// "at most one final" invariant is enforced in one place (spec
    /// §4.G). Returns `Ok(None)` when a periodic snapshot is suppressed
    /// because metrics have not advanced since the last one emitted.
    pub async fn emit(
        &self,
        job: &Job,
        job_state: CanonicalState,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        metrics: Metrics,
        is_final: bool,
    ) -> Result<Option<UsageRecord>, UsageError> {
        let mut tracks = self.tracks.write().await;
        let track = tracks.entry(job.job_id.clone()).or_default();

        if track.is_final_emitted {
            return if is_final {
                Err(UsageError::DuplicateFinal(job.job_id.to_string()))
            } else {
                Ok(None) // no periodic traffic after the chain has closed
            };
        }

        if !is_final {
            if let Some(last) = &track.last_emitted_metrics {
                if !metrics.advanced_since(last) {
                    return Ok(None);
                }
            }
        }

        if let Err(reason) = crate::fraud::check(self.clock.now(), period_start, period_end, &metrics, track.last_emitted_metrics.as_ref()) {
            self.audit
                .log_usage(AuditEvent::UsageRecordRejected {
                    id: Uuid::new_v4(),
                    at: self.clock.now(),
                    job_id: job.job_id.clone(),
                    reason: reason.clone(),
                })
                .await;
            return Err(UsageError::InvalidUsage { job_id: job.job_id.to_string(), reason });
        }

        let record_id = RecordId::new(Uuid::new_v4().to_string());
        let cluster_id = job.cluster_id.clone().unwrap_or_else(|| vproc_domain::ClusterId::new("unassigned"));
        let content_hash = usage_record_hash(
            record_id.as_str(),
            job.job_id.as_str(),
            self.provider.as_str(),
            job.customer_address.as_str(),
            period_start.timestamp() as u64,
            period_end.timestamp() as u64,
            &metrics,
            is_final,
            &track.chain_tail_hash,
        );
        let signature = self.signer.sign(&content_hash.0);

        let record = UsageRecord {
            record_id: record_id.clone(),
            job_id: job.job_id.clone(),
            cluster_id,
            provider: self.provider.clone(),
            customer: job.customer_address.clone(),
            offering_id: job.offering_id.clone(),
            period_start,
            period_end,
            metrics,
            is_final,
            job_state,
            prev_record_hash: track.chain_tail_hash.clone(),
            content_hash: content_hash.clone(),
            signature,
            submitted_at: None,
        };

        track.chain_tail_hash = content_hash;
        track.last_emitted_metrics = Some(record.metrics);
        if is_final {
            track.is_final_emitted = true;
        }
        drop(tracks);

        self.audit
            .log_usage(AuditEvent::UsageRecordEmitted {
                id: Uuid::new_v4(),
                at: self.clock.now(),
                job_id: record.job_id.clone(),
                record_id: record.record_id.to_string(),
                is_final,
            })
            .await;

        let _ = self.record_tx.send(record.clone());
        Ok(Some(record))
    }

    pub async fn is_final_emitted(&self, job_id: &JobId) -> bool {
        self.tracks.read().await.get(job_id).map(|t| t.is_final_emitted).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use vproc_audit::InMemoryAuditSink;
    use vproc_crypto::{FakeClock, InMemorySigner};
    use vproc_domain::{CustomerAddress, OfferingId, ProviderAddress as Provider, Resources, Workload};

    fn job(job_id: &str) -> Job {
        Job {
            job_id: JobId::new(job_id),
            cluster_id: Some(vproc_domain::ClusterId::new("c1")),
            offering_id: OfferingId::new("o1"),
            provider_address: Provider::new("p1"),
            customer_address: CustomerAddress::new("cust1"),
            workload: Workload { image: "img".into(), command: "run".into(), args: vec![], env: StdHashMap::new() },
            resources: Resources { nodes: 1, cores_per_node: 4, memory_gb_per_node: 8, gpus_per_node: 0, gpu_type: None, storage_gb: 0 },
            queue_name: None,
            max_runtime_seconds: 3600,
            created_at: Utc::now(),
            priority: 50,
        }
    }

    fn pipeline() -> (UsagePipeline, mpsc::UnboundedReceiver<UsageRecord>) {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let signer = Arc::new(InMemorySigner::generate());
        let audit = Arc::new(InMemoryAuditSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (UsagePipeline::new(clock, signer, audit, ProviderAddress::new("p1"), tx), rx)
    }

    #[tokio::test]
    async fn s1_happy_path_final_record() {
        let (pipeline, mut rx) = pipeline();
        let j = job("j1");
        let now = Utc::now();
        let metrics = Metrics {
            wall_clock_seconds: 3600,
            cpu_core_seconds: 14_400,
            memory_gb_seconds: 28_800,
            gpu_seconds: 0,
            nodes_used: 1,
            node_hours_numerator: 3600,
            ..Default::default()
        };
        let record = pipeline
            .emit(&j, CanonicalState::Completed, now - chrono::Duration::seconds(3600), now, metrics, true)
            .await
            .unwrap()
            .expect("final record must be emitted");
        assert!(record.is_final);
        assert_eq!(record.metrics.cpu_core_seconds, 14_400);
        assert_eq!(record.metrics.memory_gb_seconds, 28_800);
        assert_eq!(record.metrics.node_hours().as_f64(), 1.0);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn at_most_one_final_per_job() {
        let (pipeline, _rx) = pipeline();
        let j = job("j1");
        let now = Utc::now();
        pipeline.emit(&j, CanonicalState::Completed, now, now, Metrics::default(), true).await.unwrap();
        let second = pipeline.emit(&j, CanonicalState::Completed, now, now, Metrics::default(), true).await;
        assert!(matches!(second, Err(UsageError::DuplicateFinal(_))));
    }

    #[tokio::test]
    async fn zero_delta_periodic_is_suppressed() {
        let (pipeline, mut rx) = pipeline();
        let j = job("j1");
        let now = Utc::now();
        let metrics = Metrics { wall_clock_seconds: 10, ..Default::default() };
        pipeline.emit(&j, CanonicalState::Running, now, now, metrics, false).await.unwrap();
        rx.try_recv().unwrap();

        let result = pipeline.emit(&j, CanonicalState::Running, now, now, metrics, false).await.unwrap();
        assert!(result.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn hash_chain_links_periodic_to_final() {
        let (pipeline, _rx) = pipeline();
        let j = job("j1");
        let now = Utc::now();
        let m1 = Metrics { wall_clock_seconds: 10, ..Default::default() };
        let m2 = Metrics { wall_clock_seconds: 20, ..Default::default() };

        let r1 = pipeline.emit(&j, CanonicalState::Running, now, now, m1, false).await.unwrap().unwrap();
        let r2 = pipeline.emit(&j, CanonicalState::Completed, now, now, m2, true).await.unwrap().unwrap();

        assert_eq!(r2.prev_record_hash.0, r1.content_hash.0);
    }

    #[tokio::test]
    async fn regressed_metrics_are_rejected() {
        let (pipeline, _rx) = pipeline();
        let j = job("j1");
        let now = Utc::now();
        let high = Metrics { wall_clock_seconds: 100, ..Default::default() };
        let low = Metrics { wall_clock_seconds: 10, ..Default::default() };

        pipeline.emit(&j, CanonicalState::Running, now, now, high, false).await.unwrap();
        let result = pipeline.emit(&j, CanonicalState::Running, now, now, low, false).await;
        assert!(matches!(result, Err(UsageError::InvalidUsage { .. })));
    }
}
