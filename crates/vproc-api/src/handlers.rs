use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use vproc_domain::{ClusterId, CustomerAddress, Job, JobId, OfferingId, ProviderAddress, Resources, Workload};
use vproc_routing::RoutingRequest;
use vproc_store::CapacityDelta;

use crate::error::ApiError;
use crate::state::AppState;

/// The capacity a job's resources reserve on its assigned cluster (spec
/// §4.D: the Scheduler Adapter's submit/terminate is what mutates a
/// cluster's available counts; here that mutation brackets the adapter
/// call on the request path so a job is never accepted without the
/// registry reflecting it).
fn reservation_delta(resources: &Resources) -> CapacityDelta {
    CapacityDelta {
        cpu: (resources.nodes * resources.cores_per_node) as i64,
        mem_gb: (resources.nodes * resources.memory_gb_per_node) as i64,
        gpus: (resources.nodes * resources.gpus_per_node) as i64,
    }
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ── Job submission ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub job_id: String,
    pub offering_id: String,
    pub provider_address: String,
    pub customer_address: String,
    pub workload: Workload,
    pub resources: Resources,
    #[serde(default)]
    pub queue_name: Option<String>,
    pub max_runtime_seconds: u64,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub customer_tier: u8,
    #[serde(default)]
    pub required_tier: u8,
    #[serde(default)]
    pub required_region: Option<String>,
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
}

/// Submits a job: always runs it through the Routing Engine (pinning an
/// explicit `cluster_id` if it passes the hard filter, otherwise picking
/// the best-scoring candidate), enforces the adapter's resource maxima
/// via the scheduler, and only registers it with the Lifecycle Engine
/// once the backend has accepted it — a rejected submission leaves no
/// `SchedulerJob` and no lifecycle events behind (spec S2).
pub async fn submit_job(State(state): State<AppState>, Json(body): Json<SubmitJobRequest>) -> Result<impl IntoResponse, ApiError> {
    let mut job = Job {
        job_id: JobId::new(body.job_id),
        cluster_id: body.cluster_id.clone().map(ClusterId::new),
        offering_id: OfferingId::new(body.offering_id),
        provider_address: ProviderAddress::new(body.provider_address),
        customer_address: CustomerAddress::new(body.customer_address),
        workload: body.workload,
        resources: body.resources,
        queue_name: body.queue_name,
        max_runtime_seconds: body.max_runtime_seconds,
        created_at: Utc::now(),
        priority: body.priority,
    };
    job.validate()?;

    // Always run the Routing Engine, even for an explicit cluster_id: it's
    // the only place the hard-filter (ClusterIneligible) check lives, and a
    // pinned cluster that fails it must be rejected here, not silently
    // accepted into capacity reservation.
    let clusters = state.cluster_registry.list_clusters().await;
    let request = RoutingRequest {
        job: job.clone(),
        customer_tier: body.customer_tier,
        required_tier: body.required_tier,
        required_region: body.required_region,
        allowed_regions: body.allowed_regions,
        gpu_type: job.resources.gpu_type.clone(),
    };
    let decision = vproc_routing::route(&request, &clusters, Utc::now(), "default")?;
    let cluster_id = decision.selected_cluster;
    job.cluster_id = Some(cluster_id.clone());

    let delta = reservation_delta(&job.resources);
    let reserve_delta = CapacityDelta { cpu: -delta.cpu, mem_gb: -delta.mem_gb, gpus: -delta.gpus };
    state.cluster_registry.update_capacity(&cluster_id, reserve_delta).await?;

    let scheduler_job = match state.scheduler.submit(&job).await {
        Ok(scheduler_job) => scheduler_job,
        Err(e) => {
            // Roll back the reservation — the backend never accepted this job.
            let _ = state.cluster_registry.update_capacity(&cluster_id, delta).await;
            return Err(e.into());
        }
    };
    state.lifecycle.submit_job(job.job_id.clone()).await?;
    state.jobs.write().await.insert(job.job_id.clone(), job);

    Ok((StatusCode::CREATED, Json(json!(scheduler_job))))
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Value>, ApiError> {
    let scheduler_job = state.scheduler.get_job_status(&job_id).await?;
    let lifecycle_state = state.lifecycle.current_state(&JobId::new(job_id.clone())).await;
    Ok(Json(json!({
        "scheduler_job": scheduler_job,
        "lifecycle_state": lifecycle_state,
    })))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Value> {
    let jobs = state.scheduler.list_active_jobs().await;
    Json(json!(jobs))
}

pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<StatusCode, ApiError> {
    state.scheduler.cancel_job(&job_id).await?;
    state.lifecycle.propose_transition(&JobId::new(job_id), vproc_domain::CanonicalState::Cancelled).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn job_events(State(state): State<AppState>, Path(job_id): Path<String>) -> Json<Value> {
    let events = state.audit.events_for_job(&JobId::new(job_id)).await;
    Json(json!(events))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub job_id: Option<String>,
}

pub async fn list_events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> Json<Value> {
    let events = match query.job_id {
        Some(job_id) => state.audit.events_for_job(&JobId::new(job_id)).await,
        None => state.audit.events().await,
    };
    Json(json!(events))
}

// ── Routing inspection ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RoutingInspectRequest {
    pub job_id: String,
    pub offering_id: String,
    pub provider_address: String,
    pub customer_address: String,
    pub resources: Resources,
    #[serde(default)]
    pub customer_tier: u8,
    #[serde(default)]
    pub required_tier: u8,
    #[serde(default)]
    pub required_region: Option<String>,
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
}

/// A dry-run of the Routing Engine against the live Cluster Registry —
/// never submits anything, purely useful for debugging why a job did or
/// would not land on a given cluster.
pub async fn inspect_routing(State(state): State<AppState>, Json(body): Json<RoutingInspectRequest>) -> Result<Json<Value>, ApiError> {
    let job = Job {
        job_id: JobId::new(body.job_id),
        cluster_id: None,
        offering_id: OfferingId::new(body.offering_id),
        provider_address: ProviderAddress::new(body.provider_address),
        customer_address: CustomerAddress::new(body.customer_address),
        workload: Workload { image: String::new(), command: String::new(), args: vec![], env: HashMap::new() },
        resources: body.resources.clone(),
        queue_name: None,
        max_runtime_seconds: 3600,
        created_at: Utc::now(),
        priority: 0,
    };
    let clusters = state.cluster_registry.list_clusters().await;
    let request = RoutingRequest {
        job,
        customer_tier: body.customer_tier,
        required_tier: body.required_tier,
        required_region: body.required_region,
        allowed_regions: body.allowed_regions,
        gpu_type: body.resources.gpu_type,
    };
    let decision = vproc_routing::route(&request, &clusters, Utc::now(), "default")?;
    Ok(Json(json!(decision)))
}
