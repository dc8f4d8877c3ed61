mod cli;
mod supervisor;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vproc_audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
use vproc_crypto::{Clock, Ed25519Signer, InMemorySigner, Signer, SystemClock};
use vproc_domain::{Capacity, Cluster, ClusterStatus, CredentialStore, ProviderAddress};
use vproc_reporter::{ChainClient, HttpChainClient, InMemoryChainClient, ReporterQueue};
use vproc_scheduler::{AdapterLimits, KubernetesAdapter, SchedulerAdapter, SimulatedAdapter, SlurmAdapter};
use vproc_store::{ClusterRegistry, FileCredentialStore, InMemoryCredentialStore, PersistedLog};

use crate::cli::{Cli, Command};
use crate::supervisor::{Supervisor, SupervisorTiming};

/// Forwards every audit event to both an in-memory tail (so the admin API's
/// `/events` can read it back) and `tracing` (so an operator's log pipeline
/// sees it too). Mirrors the teacher's convention of composing sinks rather
/// than picking exactly one.
struct CompositeAuditSink {
    memory: Arc<InMemoryAuditSink>,
    tracing_sink: TracingAuditSink,
}

#[async_trait]
impl AuditSink for CompositeAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.tracing_sink.record(event.clone()).await;
        self.memory.record(event).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config, bind, port, token, signing_key_path, chain_url, credentials_dir, reporter_log_path } => {
            serve(config, bind, port, token, signing_key_path, chain_url, credentials_dir, reporter_log_path).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    config_path: std::path::PathBuf,
    bind: String,
    port: u16,
    token: Option<String>,
    signing_key_path: Option<std::path::PathBuf>,
    chain_url: Option<String>,
    credentials_dir: Option<std::path::PathBuf>,
    reporter_log_path: std::path::PathBuf,
) -> Result<()> {
    let config = vproc_config::load_config(&config_path).context("loading provider config")?;
    info!(cluster_id = %config.cluster_id, scheduler_type = %config.scheduler_type, "provider config loaded");

    // Clock
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Signer
    let signer: Arc<dyn Signer> = match signing_key_path {
        Some(path) => Arc::new(load_signer(&path).await.context("loading signing key")?),
        None => {
            if !config.simulation_mode {
                warn!("no --signing-key-path given outside simulation-mode; generating an ephemeral keypair unsuitable for production");
            }
            Arc::new(InMemorySigner::generate())
        }
    };

    // Credential Store
    let credential_store: Arc<dyn CredentialStore> = match &credentials_dir {
        Some(dir) => Arc::new(FileCredentialStore::new(dir.clone())),
        None => Arc::new(InMemoryCredentialStore::new()),
    };

    // Audit Log
    let audit_memory = Arc::new(InMemoryAuditSink::new());
    let audit: Arc<dyn AuditSink> = Arc::new(CompositeAuditSink { memory: audit_memory.clone(), tracing_sink: TracingAuditSink });

    // Chain Client
    let chain: Arc<dyn ChainClient> = match chain_url {
        Some(url) => {
            let cluster_id = vproc_domain::ClusterId::new(config.cluster_id.clone());
            match credential_store.get(&cluster_id, vproc_domain::CredentialType::ApiToken).await {
                Ok(creds) => {
                    info!(%url, "using HTTP chain client with a bearer token from the credential store");
                    let token = String::from_utf8_lossy(creds.reveal()).into_owned();
                    Arc::new(HttpChainClient::with_auth_token(url, token))
                }
                Err(_) => {
                    warn!(%url, "no chain-client credentials found; using HTTP chain client unauthenticated");
                    Arc::new(HttpChainClient::new(url))
                }
            }
        }
        None => {
            info!("no --chain-url given; using an in-memory stub chain client");
            Arc::new(InMemoryChainClient::new())
        }
    };

    // Cluster Registry — this process serves exactly one cluster, itself.
    let cluster_registry = Arc::new(ClusterRegistry::new());
    cluster_registry
        .register_cluster(Cluster {
            cluster_id: vproc_domain::ClusterId::new(config.cluster_id.clone()),
            provider_id: config.cluster_id.clone(),
            region: "local".into(),
            partitions: vec![],
            total: Capacity {
                cpu: (config.max_nodes_per_job * config.max_cores_per_node) as u64,
                mem_gb: (config.max_nodes_per_job * config.max_memory_gb_per_node) as u64,
                gpus: (config.max_nodes_per_job * config.max_gpus_per_node) as u64,
                gpu_types: vec![],
            },
            available: Capacity {
                cpu: (config.max_nodes_per_job * config.max_cores_per_node) as u64,
                mem_gb: (config.max_nodes_per_job * config.max_memory_gb_per_node) as u64,
                gpus: (config.max_nodes_per_job * config.max_gpus_per_node) as u64,
                gpu_types: vec![],
            },
            endpoint: format!("http://{bind}:{port}"),
            status: ClusterStatus::Up,
            identity_tier: 0,
            latency_score: 1.0,
            price_score: 1.0,
        })
        .await
        .context("registering this provider's own cluster")?;

    // Scheduler Adapter
    let limits = AdapterLimits {
        max_nodes_per_job: config.max_nodes_per_job,
        max_cores_per_node: config.max_cores_per_node,
        max_memory_gb_per_node: config.max_memory_gb_per_node,
        max_gpus_per_node: config.max_gpus_per_node,
    };
    let scheduler: Arc<dyn SchedulerAdapter> = match config.scheduler_type.as_str() {
        "slurm" => Arc::new(SlurmAdapter::new(limits, config.high_mem_threshold_gb)),
        "kubernetes" => Arc::new(KubernetesAdapter::new()),
        "simulated" => Arc::new(SimulatedAdapter::new(limits, config.high_mem_threshold_gb)),
        other => anyhow::bail!("unknown scheduler_type '{other}'"),
    };
    scheduler.start().await.context("starting scheduler adapter")?;

    // Lifecycle Engine
    let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();
    let lifecycle = Arc::new(vproc_lifecycle::LifecycleEngine::new(
        clock.clone(),
        audit.clone(),
        Duration::from_millis(config.callback_budget_ms),
        terminal_tx,
    ));

    // Usage Pipeline
    let provider = ProviderAddress::new(config.cluster_id.clone());
    let (record_tx, record_rx) = mpsc::unbounded_channel();
    let usage = Arc::new(vproc_usage::UsagePipeline::new(clock.clone(), signer.clone(), audit.clone(), provider.clone(), record_tx));

    // Reporter Queue
    let persisted = Arc::new(PersistedLog::open(reporter_log_path).await.context("opening reporter persisted log")?);
    let reporter = Arc::new(ReporterQueue::new(
        config.max_pending_records as usize,
        config.usage_report_batch_size as usize,
        config.max_retries,
        Duration::from_secs(config.retry_backoff_secs),
        persisted,
        audit.clone(),
        chain,
    ));

    let jobs = Arc::new(RwLock::new(HashMap::new()));

    let timing = SupervisorTiming {
        job_poll_interval: Duration::from_secs(config.job_poll_interval_secs),
        snapshot_interval: Duration::from_secs(config.snapshot_interval_secs),
        health_check_interval: Duration::from_secs(5),
        shutdown_drain_timeout: Duration::from_secs(config.shutdown_drain_timeout_secs),
        reporter_idle_poll: Duration::from_millis(200),
    };

    let supervisor = Arc::new(Supervisor::new(
        clock,
        signer,
        provider,
        audit,
        scheduler.clone(),
        lifecycle.clone(),
        usage.clone(),
        reporter,
        cluster_registry.clone(),
        jobs.clone(),
        terminal_rx,
        record_rx,
        timing,
    ));
    supervisor.start().await;

    let token = token.unwrap_or_else(|| {
        let generated = uuid::Uuid::new_v4().to_string();
        info!(token = %generated, "no --token given; generated a bearer token for this run");
        generated
    });

    let state = vproc_api::AppState {
        scheduler,
        lifecycle,
        cluster_registry,
        usage,
        audit: audit_memory,
        auth_token: Arc::new(token),
        high_mem_threshold_gb: config.high_mem_threshold_gb,
        jobs,
    };
    let app = vproc_api::build_app(state);

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, "admin API listening");

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await.context("serving admin API")?;

    supervisor.shutdown().await;
    Ok(())
}

/// Reads a raw 32-byte Ed25519 seed from disk. The file must contain
/// exactly 32 bytes — no PEM/DER envelope, matching the provider-config
/// convention of pointing at plain credential files (spec §6).
async fn load_signer(path: &Path) -> Result<Ed25519Signer> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("reading signing key at {}", path.display()))?;
    let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| anyhow::anyhow!("signing key at {} must be exactly 32 bytes, got {}", path.display(), b.len()))?;
    Ok(Ed25519Signer::from_bytes(&seed))
}
