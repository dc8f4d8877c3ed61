use sha2::{Digest, Sha256};
use vproc_domain::{BackendType, CanonicalState, ContentHash, Metrics};

/// Serialize `value` to canonical JSON (object keys sorted) so struct
/// field ordering never affects the hash. Mirrors the teacher's
/// `compute_desired_hash` canonicalization recipe.
fn canonical_json<T: serde::Serialize>(value: &T) -> Vec<u8> {
    let v = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    let sorted = sort_json_keys(v);
    serde_json::to_vec(&sorted).unwrap_or_default()
}

fn sort_json_keys(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(sort_json_keys).collect())
        }
        other => other,
    }
}

fn hash(bytes: &[u8]) -> ContentHash {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    ContentHash(out)
}

/// The canonical payload for a `StatusReport` (spec §6):
/// `H(provider || job-id || backend-job-id || state-tag || exit-code-i32-be || timestamp-u64-be)`.
#[allow(clippy::too_many_arguments)]
pub fn status_report_payload(
    provider: &str,
    job_id: &str,
    backend_job_id: Option<&str>,
    backend_type: BackendType,
    state: CanonicalState,
    exit_code: Option<i32>,
    timestamp_unix: u64,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(provider.as_bytes());
    buf.push(0);
    buf.extend_from_slice(job_id.as_bytes());
    buf.push(0);
    buf.extend_from_slice(backend_job_id.unwrap_or("").as_bytes());
    buf.push(0);
    buf.extend_from_slice(backend_type.to_string().as_bytes());
    buf.push(0);
    buf.extend_from_slice(state.to_string().as_bytes());
    buf.push(0);
    buf.extend_from_slice(&exit_code.unwrap_or(0).to_be_bytes());
    buf.extend_from_slice(&timestamp_unix.to_be_bytes());
    buf
}

pub fn status_report_hash(
    provider: &str,
    job_id: &str,
    backend_job_id: Option<&str>,
    backend_type: BackendType,
    state: CanonicalState,
    exit_code: Option<i32>,
    timestamp_unix: u64,
) -> ContentHash {
    hash(&status_report_payload(
        provider,
        job_id,
        backend_job_id,
        backend_type,
        state,
        exit_code,
        timestamp_unix,
    ))
}

/// The canonical payload for a `UsageRecord` (spec §6):
/// `H(record-id || job-id || provider || customer || period-start-u64-be || period-end-u64-be || metrics-canonical || is-final-u8 || prev-record-hash)`.
#[allow(clippy::too_many_arguments)]
pub fn usage_record_payload(
    record_id: &str,
    job_id: &str,
    provider: &str,
    customer: &str,
    period_start_unix: u64,
    period_end_unix: u64,
    metrics: &Metrics,
    is_final: bool,
    prev_record_hash: &ContentHash,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(record_id.as_bytes());
    buf.push(0);
    buf.extend_from_slice(job_id.as_bytes());
    buf.push(0);
    buf.extend_from_slice(provider.as_bytes());
    buf.push(0);
    buf.extend_from_slice(customer.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&period_start_unix.to_be_bytes());
    buf.extend_from_slice(&period_end_unix.to_be_bytes());
    buf.extend_from_slice(&canonical_json(metrics));
    buf.push(if is_final { 1 } else { 0 });
    buf.extend_from_slice(&prev_record_hash.0);
    buf
}

#[allow(clippy::too_many_arguments)]
pub fn usage_record_hash(
    record_id: &str,
    job_id: &str,
    provider: &str,
    customer: &str,
    period_start_unix: u64,
    period_end_unix: u64,
    metrics: &Metrics,
    is_final: bool,
    prev_record_hash: &ContentHash,
) -> ContentHash {
    hash(&usage_record_payload(
        record_id,
        job_id,
        provider,
        customer,
        period_start_unix,
        period_end_unix,
        metrics,
        is_final,
        prev_record_hash,
    ))
}

/// The canonical payload for a `RoutingDecision` (spec §4.E):
/// `H(job-id || sorted(cluster-id:score) || selected-cluster || timestamp-bucket)`.
/// `scores` must already be sorted by cluster id so two independent
/// evaluators given identical inputs produce an identical hash.
pub fn routing_decision_payload(
    job_id: &str,
    sorted_scores: &[(String, f64)],
    selected_cluster: &str,
    timestamp_bucket_secs: u64,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(job_id.as_bytes());
    buf.push(0);
    for (cluster_id, score) in sorted_scores {
        buf.extend_from_slice(cluster_id.as_bytes());
        buf.push(b':');
        buf.extend_from_slice(score.to_bits().to_be_bytes().as_slice());
        buf.push(0);
    }
    buf.extend_from_slice(selected_cluster.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&timestamp_bucket_secs.to_be_bytes());
    buf
}

pub fn routing_decision_hash(
    job_id: &str,
    sorted_scores: &[(String, f64)],
    selected_cluster: &str,
    timestamp_bucket_secs: u64,
) -> ContentHash {
    hash(&routing_decision_payload(job_id, sorted_scores, selected_cluster, timestamp_bucket_secs))
}
