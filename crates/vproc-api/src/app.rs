use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/jobs", post(handlers::submit_job).get(handlers::list_jobs))
        .route("/jobs/:id", get(handlers::get_job).delete(handlers::cancel_job))
        .route("/jobs/:id/events", get(handlers::job_events))
        .route("/events", get(handlers::list_events))
        .route("/routing/inspect", post(handlers::inspect_routing))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::util::ServiceExt;
    use vproc_audit::InMemoryAuditSink;
    use vproc_domain::{Capacity, Cluster, ClusterStatus};
    use vproc_scheduler::SimulatedAdapter;
    use vproc_store::ClusterRegistry;
    use vproc_usage::UsagePipeline;

    use super::*;

    const TEST_TOKEN: &str = "test-token";

    async fn test_state() -> AppState {
        let clock: Arc<dyn vproc_crypto::Clock> = Arc::new(vproc_crypto::SystemClock);
        let audit = Arc::new(InMemoryAuditSink::new());
        let (terminal_tx, _terminal_rx) = tokio::sync::mpsc::unbounded_channel();
        let lifecycle = Arc::new(vproc_lifecycle::LifecycleEngine::new(
            clock.clone(),
            audit.clone() as Arc<dyn vproc_audit::AuditSink>,
            Duration::from_secs(5),
            terminal_tx,
        ));

        let scheduler: Arc<dyn vproc_scheduler::SchedulerAdapter> =
            Arc::new(SimulatedAdapter::with_defaults());
        scheduler.start().await.unwrap();

        let cluster_registry = Arc::new(ClusterRegistry::new());
        cluster_registry
            .register_cluster(Cluster {
                cluster_id: vproc_domain::ClusterId::new("cluster-a"),
                provider_id: "provider-1".into(),
                region: "us-east".into(),
                partitions: vec![],
                total: Capacity { cpu: 1024, mem_gb: 4096, gpus: 16, gpu_types: vec!["a100".into()] },
                available: Capacity { cpu: 1024, mem_gb: 4096, gpus: 16, gpu_types: vec!["a100".into()] },
                endpoint: "http://cluster-a.local".into(),
                status: ClusterStatus::Up,
                identity_tier: 3,
                latency_score: 0.9,
                price_score: 0.9,
            })
            .await
            .unwrap();

        let signer: Arc<dyn vproc_crypto::Signer> = Arc::new(vproc_crypto::InMemorySigner::generate());
        let (record_tx, _record_rx) = tokio::sync::mpsc::unbounded_channel();
        let usage = Arc::new(UsagePipeline::new(
            clock,
            signer,
            audit.clone() as Arc<dyn vproc_audit::AuditSink>,
            vproc_domain::ProviderAddress::new("provider-1"),
            record_tx,
        ));

        AppState {
            scheduler,
            lifecycle,
            cluster_registry,
            usage,
            audit,
            auth_token: Arc::new(TEST_TOKEN.to_string()),
            high_mem_threshold_gb: 512,
            jobs: Arc::new(tokio::sync::RwLock::new(std::collections::HashMap::new())),
        }
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    #[tokio::test]
    async fn unauthenticated_request_is_rejected() {
        let app = build_app(test_state().await);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_with_valid_token_returns_200() {
        let app = build_app(test_state().await);
        let resp = app
            .oneshot(authed(Request::builder().uri("/health")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn submitting_a_well_formed_job_creates_it_and_registers_lifecycle() {
        let app = build_app(test_state().await);
        let body = json!({
            "job_id": "job-1",
            "offering_id": "offering-1",
            "provider_address": "provider-1",
            "customer_address": "customer-1",
            "workload": { "image": "ubuntu:22.04", "command": "true", "args": [], "env": {} },
            "resources": {
                "nodes": 2, "cores_per_node": 8, "memory_gb_per_node": 16,
                "gpus_per_node": 0, "gpu_type": null, "storage_gb": 10
            },
            "max_runtime_seconds": 3600,
            "cluster_id": "cluster-a"
        });
        let resp = app
            .oneshot(
                authed(Request::builder().method("POST").uri("/jobs").header("content-type", "application/json"))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn oversized_job_is_rejected_before_any_lifecycle_event_is_recorded() {
        let state = test_state().await;
        let audit = state.audit.clone();
        let app = build_app(state);
        let body = json!({
            "job_id": "job-huge",
            "offering_id": "offering-1",
            "provider_address": "provider-1",
            "customer_address": "customer-1",
            "workload": { "image": "ubuntu:22.04", "command": "true", "args": [], "env": {} },
            "resources": {
                "nodes": 100000, "cores_per_node": 128, "memory_gb_per_node": 1024,
                "gpus_per_node": 8, "gpu_type": "a100", "storage_gb": 1000
            },
            "max_runtime_seconds": 3600,
            "cluster_id": "cluster-a"
        });
        let resp = app
            .oneshot(
                authed(Request::builder().method("POST").uri("/jobs").header("content-type", "application/json"))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(audit.events_for_job(&vproc_domain::JobId::new("job-huge")).await.is_empty());
    }
}
