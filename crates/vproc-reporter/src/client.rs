use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use vproc_domain::{RecordId, StatusReport, UsageRecord};

use crate::error::ReporterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainAck {
    Accepted,
    Duplicate,
}

/// The chain's view of the world (spec §6, "Chain Client"). Implementations
/// must treat `record-id` as a primary key: resubmitting an already-seen id
/// is acknowledged as `Duplicate`, never as an error, so the Reporter Queue
/// can retry freely under at-least-once delivery.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn submit_usage_records(&self, records: &[UsageRecord]) -> Result<Vec<ChainAck>, ReporterError>;

    async fn submit_status_report(&self, report: &StatusReport) -> Result<ChainAck, ReporterError>;
}

/// reqwest-based client for a marketplace chain HTTP endpoint. Out of
/// scope: the wire schema of the endpoint itself (spec §1) — the bodies
/// below are this provider's own canonical JSON, not a marketplace RPC.
pub struct HttpChainClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpChainClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpChainClient { http: reqwest::Client::new(), base_url: base_url.into(), auth_token: None }
    }

    /// Attaches a bearer token (sourced from the Credential Store, spec
    /// component B) to every request against the chain endpoint.
    pub fn with_auth_token(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        HttpChainClient { http: reqwest::Client::new(), base_url: base_url.into(), auth_token: Some(auth_token.into()) }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn classify(status: reqwest::StatusCode) -> Option<ReporterError> {
        if status.is_success() {
            None
        } else if status.as_u16() == 409 {
            None // conflict == already-seen record-id, treated as Duplicate by the caller
        } else if status.is_client_error() {
            Some(ReporterError::Permanent(format!("chain rejected submission: {status}")))
        } else {
            Some(ReporterError::Transient(format!("chain endpoint returned {status}")))
        }
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn submit_usage_records(&self, records: &[UsageRecord]) -> Result<Vec<ChainAck>, ReporterError> {
        let url = format!("{}/usage-records", self.base_url);
        let resp = self
            .authed(self.http.post(&url))
            .json(records)
            .send()
            .await
            .map_err(|e| ReporterError::Transient(e.to_string()))?;
        let status = resp.status();
        if status.as_u16() == 409 {
            return Ok(vec![ChainAck::Duplicate; records.len()]);
        }
        if let Some(err) = Self::classify(status) {
            return Err(err);
        }
        Ok(vec![ChainAck::Accepted; records.len()])
    }

    async fn submit_status_report(&self, report: &StatusReport) -> Result<ChainAck, ReporterError> {
        let url = format!("{}/status-reports", self.base_url);
        let resp = self
            .authed(self.http.post(&url))
            .json(report)
            .send()
            .await
            .map_err(|e| ReporterError::Transient(e.to_string()))?;
        let status = resp.status();
        if status.as_u16() == 409 {
            return Ok(ChainAck::Duplicate);
        }
        if let Some(err) = Self::classify(status) {
            return Err(err);
        }
        Ok(ChainAck::Accepted)
    }
}

/// Behavior of the next N submissions, consumed in FIFO order; once
/// exhausted the client falls back to `Accepted`.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Accepted,
    Duplicate,
    Transient,
    Permanent,
}

/// In-memory test double that can be told up-front how to respond,
/// and which tracks every `record-id` it has ever seen so repeat
/// submissions are reported as `Duplicate` even without a script entry.
pub struct InMemoryChainClient {
    script: Mutex<Vec<Scripted>>,
    seen: Mutex<HashSet<RecordId>>,
    sent: Mutex<Vec<RecordId>>,
}

impl InMemoryChainClient {
    pub fn new() -> Self {
        InMemoryChainClient { script: Mutex::new(Vec::new()), seen: Mutex::new(HashSet::new()), sent: Mutex::new(Vec::new()) }
    }

    pub fn with_script(script: Vec<Scripted>) -> Self {
        InMemoryChainClient { script: Mutex::new(script), seen: Mutex::new(HashSet::new()), sent: Mutex::new(Vec::new()) }
    }

    pub fn sent(&self) -> Vec<RecordId> {
        self.sent.lock().expect("chain client mutex poisoned").clone()
    }

    fn next_outcome(&self, record_id: &RecordId) -> Result<ChainAck, ReporterError> {
        let mut seen = self.seen.lock().expect("chain client mutex poisoned");
        if seen.contains(record_id) {
            return Ok(ChainAck::Duplicate);
        }
        let scripted = {
            let mut script = self.script.lock().expect("chain client mutex poisoned");
            if script.is_empty() { Scripted::Accepted } else { script.remove(0) }
        };
        match scripted {
            Scripted::Accepted => {
                seen.insert(record_id.clone());
                self.sent.lock().expect("chain client mutex poisoned").push(record_id.clone());
                Ok(ChainAck::Accepted)
            }
            Scripted::Duplicate => Ok(ChainAck::Duplicate),
            Scripted::Transient => Err(ReporterError::Transient("scripted transient failure".into())),
            Scripted::Permanent => Err(ReporterError::Permanent("scripted permanent failure".into())),
        }
    }
}

impl Default for InMemoryChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for InMemoryChainClient {
    async fn submit_usage_records(&self, records: &[UsageRecord]) -> Result<Vec<ChainAck>, ReporterError> {
        let mut acks = Vec::with_capacity(records.len());
        for record in records {
            acks.push(self.next_outcome(&record.record_id)?);
        }
        Ok(acks)
    }

    async fn submit_status_report(&self, report: &StatusReport) -> Result<ChainAck, ReporterError> {
        self.next_outcome(&RecordId::new(report.job_id.to_string()))
    }
}
