use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vproc_audit::{AuditEvent, AuditSink};
use vproc_crypto::{Clock, Signer};
use vproc_domain::{CanonicalState, Job, JobId, ProviderAddress, UsageRecord};
use vproc_lifecycle::{LifecycleEngine, TerminalSignal};
use vproc_reporter::{QueuedRecord, ReporterQueue};
use vproc_scheduler::SchedulerAdapter;
use vproc_store::{CapacityDelta, ClusterRegistry};
use vproc_usage::{billable, UsagePipeline};

/// One component's last observed health (spec §4.J `GetHealth()`).
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub ok: bool,
    pub last_check: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorHealth {
    pub ok: bool,
    pub components: HashMap<String, ComponentHealth>,
}

/// Durations governing the Supervisor's long-lived workers, sourced from
/// `ProviderConfig` (spec §6).
pub struct SupervisorTiming {
    pub job_poll_interval: Duration,
    pub snapshot_interval: Duration,
    pub health_check_interval: Duration,
    pub shutdown_drain_timeout: Duration,
    pub reporter_idle_poll: Duration,
}

/// Orchestrates every other component's lifecycle (spec component J):
/// starts them in dependency order, runs the four long-lived workers that
/// drive jobs forward, bridges the Lifecycle Engine's terminal signal and
/// the Usage Pipeline's record stream into the Reporter Queue, and drains
/// the queue within a bounded timeout on shutdown. Does not itself own
/// submission — `vproc-api`'s handlers call the Scheduler Adapter and
/// Lifecycle Engine directly on the request path (spec §2's control flow)
/// and register the accepted `Job` into the registry this struct shares
/// with `AppState`, so the poll/snapshot loops can see it.
pub struct Supervisor {
    clock: Arc<dyn Clock>,
    signer: Arc<dyn Signer>,
    provider: ProviderAddress,
    audit: Arc<dyn AuditSink>,
    scheduler: Arc<dyn SchedulerAdapter>,
    lifecycle: Arc<LifecycleEngine>,
    usage: Arc<UsagePipeline>,
    reporter: Arc<ReporterQueue>,
    cluster_registry: Arc<ClusterRegistry>,
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    timing: SupervisorTiming,
    health: Arc<RwLock<HashMap<&'static str, ComponentHealth>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    terminal_rx: Mutex<Option<mpsc::UnboundedReceiver<TerminalSignal>>>,
    record_rx: Mutex<Option<mpsc::UnboundedReceiver<UsageRecord>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<dyn Clock>,
        signer: Arc<dyn Signer>,
        provider: ProviderAddress,
        audit: Arc<dyn AuditSink>,
        scheduler: Arc<dyn SchedulerAdapter>,
        lifecycle: Arc<LifecycleEngine>,
        usage: Arc<UsagePipeline>,
        reporter: Arc<ReporterQueue>,
        cluster_registry: Arc<ClusterRegistry>,
        jobs: Arc<RwLock<HashMap<JobId, Job>>>,
        terminal_rx: mpsc::UnboundedReceiver<TerminalSignal>,
        record_rx: mpsc::UnboundedReceiver<UsageRecord>,
        timing: SupervisorTiming,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Supervisor {
            clock,
            signer,
            provider,
            audit,
            scheduler,
            lifecycle,
            usage,
            reporter,
            cluster_registry,
            jobs,
            timing,
            health: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            shutdown_rx,
            terminal_rx: Mutex::new(Some(terminal_rx)),
            record_rx: Mutex::new(Some(record_rx)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Job registry shared with `vproc-api`'s `AppState`, so a job accepted
    /// over HTTP becomes visible to the poll and snapshot loops.
    pub fn jobs(&self) -> Arc<RwLock<HashMap<JobId, Job>>> {
        self.jobs.clone()
    }

    pub fn cluster_registry(&self) -> Arc<ClusterRegistry> {
        self.cluster_registry.clone()
    }

    pub fn scheduler(&self) -> Arc<dyn SchedulerAdapter> {
        self.scheduler.clone()
    }

    pub fn lifecycle(&self) -> Arc<LifecycleEngine> {
        self.lifecycle.clone()
    }

    pub fn usage(&self) -> Arc<UsagePipeline> {
        self.usage.clone()
    }

    /// Starts every long-lived worker. Components themselves (Scheduler
    /// Adapter, Reporter Queue's persisted log, etc.) are already
    /// constructed and started by the caller in the order spec §4.J
    /// prescribes — this only brings up the four workers that drive them.
    pub async fn start(self: &Arc<Self>) {
        info!("supervisor starting workers");
        let recovered = self.reporter.recover().await.unwrap_or_else(|e| {
            warn!(error = %e, "reporter queue recovery failed, starting with an empty queue");
            0
        });
        if recovered > 0 {
            info!(recovered, "reporter queue recovered pending records from prior run");
        }

        let mut workers = self.workers.lock().await;

        let reporter = self.reporter.clone();
        let reporter_shutdown = self.shutdown_rx.clone();
        let idle_poll = self.timing.reporter_idle_poll;
        workers.push(tokio::spawn(async move {
            reporter.run(reporter_shutdown, idle_poll).await;
        }));

        let this = self.clone();
        workers.push(tokio::spawn(async move { this.poll_worker().await }));

        let this = self.clone();
        workers.push(tokio::spawn(async move { this.snapshot_worker().await }));

        let this = self.clone();
        workers.push(tokio::spawn(async move { this.health_worker().await }));

        let this = self.clone();
        let terminal_rx = self.terminal_rx.lock().await.take().expect("terminal_rx taken twice");
        workers.push(tokio::spawn(async move { this.terminal_worker(terminal_rx).await }));

        let this = self.clone();
        let record_rx = self.record_rx.lock().await.take().expect("record_rx taken twice");
        workers.push(tokio::spawn(async move { this.record_worker(record_rx).await }));

        self.set_health("supervisor", true, "started").await;
    }

    /// Cancels every worker and waits up to `shutdown-drain-timeout` for
    /// the Reporter Queue to flush before returning. Components are not
    /// explicitly stopped in reverse order beyond this — each worker's own
    /// shutdown path (e.g. `ReporterQueue::run` observing `shutdown`) is
    /// the reverse-order teardown spec §4.J calls for, since start order
    /// places the Reporter Queue last and its drain is the only teardown
    /// step with a user-visible deadline.
    pub async fn shutdown(&self) {
        info!("supervisor shutting down, signalling workers");
        let _ = self.shutdown_tx.send(true);

        let deadline = self.timing.shutdown_drain_timeout;
        let drained = tokio::time::timeout(deadline, async {
            while !self.reporter.is_empty().await {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        if drained.is_err() {
            let remaining = self.reporter.len().await;
            warn!(remaining, "shutdown drain timeout elapsed with records still queued; left persisted for recovery");
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        info!("supervisor shutdown complete");
    }

    pub async fn health(&self) -> SupervisorHealth {
        let components = self.health.read().await;
        let ok = components.values().all(|c| c.ok);
        SupervisorHealth { ok, components: components.iter().map(|(k, v)| (k.to_string(), v.clone())).collect() }
    }

    async fn set_health(&self, component: &'static str, ok: bool, message: impl Into<String>) {
        self.health.write().await.insert(component, ComponentHealth { ok, last_check: self.clock.now(), message: message.into() });
    }

    // ── (a) poll loop ────────────────────────────────────────────────────────

    async fn poll_worker(self: Arc<Self>) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(self.timing.job_poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
            if *shutdown.borrow() {
                return;
            }
            self.poll_once().await;
        }
    }

    /// Queries the Scheduler Adapter directly for every job this
    /// Supervisor still considers non-terminal, rather than through
    /// `list_active_jobs` — an adapter stops reporting a job as active the
    /// instant it goes terminal, which would otherwise race the poll loop
    /// out of ever observing (and proposing) that final transition.
    async fn poll_once(&self) {
        let active_ids: Vec<JobId> = {
            let jobs = self.jobs.read().await;
            let mut ids = Vec::new();
            for job_id in jobs.keys() {
                match self.lifecycle.current_state(job_id).await {
                    Some(state) if !state.is_terminal() => ids.push(job_id.clone()),
                    _ => {}
                }
            }
            ids
        };

        let mut backend_ok = true;
        for job_id in active_ids {
            match self.scheduler.get_job_status(job_id.as_str()).await {
                Ok(scheduler_job) => {
                    let current = self.lifecycle.current_state(&job_id).await;
                    if current != Some(scheduler_job.state) {
                        if let Err(e) = self.lifecycle.propose_transition(&job_id, scheduler_job.state).await {
                            warn!(%job_id, to = ?scheduler_job.state, error = %e, "poll loop's proposed transition was rejected");
                        }
                    }
                }
                Err(e) => {
                    backend_ok = false;
                    warn!(%job_id, error = %e, "scheduler adapter status query failed during poll");
                }
            }
        }
        self.set_health("scheduler_adapter", backend_ok, if backend_ok { "ok" } else { "backend unavailable" }).await;
    }

    // ── (b) snapshot loop ────────────────────────────────────────────────────

    async fn snapshot_worker(self: Arc<Self>) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(self.timing.snapshot_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
            if *shutdown.borrow() {
                return;
            }
            self.snapshot_once().await;
        }
    }

    async fn snapshot_once(&self) {
        let jobs: Vec<Job> = {
            let mut running = Vec::new();
            let jobs = self.jobs.read().await;
            for (job_id, job) in jobs.iter() {
                if self.lifecycle.current_state(job_id).await == Some(CanonicalState::Running) {
                    running.push(job.clone());
                }
            }
            running
        };

        for job in jobs {
            if let Err(e) = self.emit_snapshot(&job, CanonicalState::Running, false).await {
                warn!(job_id = %job.job_id, error = %e, "periodic usage snapshot rejected");
            }
        }
    }

    /// The single path both the snapshot loop and the terminal worker use
    /// to turn a job's current accounting into a signed `UsageRecord` —
    /// keeps billable-metric derivation (running-seconds, GPU clamping) in
    /// one place regardless of which caller triggered it.
    async fn emit_snapshot(&self, job: &Job, state: CanonicalState, is_final: bool) -> Result<(), vproc_usage::UsageError> {
        let reported = self.scheduler.get_job_accounting(job.job_id.as_str()).await.unwrap_or_default();
        let start = self.lifecycle.start_time(&job.job_id).await;
        let now = self.clock.now();
        let end = if is_final { self.lifecycle.end_time(&job.job_id).await.unwrap_or(now) } else { now };
        let period_start = start.unwrap_or(job.created_at);
        let running_seconds = (end - period_start).num_seconds().max(0) as u64;
        let metrics = billable::derive_metrics(&job.resources, running_seconds, &reported);

        let _ = self.usage.emit(job, state, period_start, end, metrics, is_final).await?;
        Ok(())
    }

    // ── (c) reporter worker is spawned inline in `start` via `ReporterQueue::run` ──

    async fn record_worker(self: Arc<Self>, mut record_rx: mpsc::UnboundedReceiver<UsageRecord>) {
        while let Some(record) = record_rx.recv().await {
            if let Err(e) = self.reporter.enqueue(QueuedRecord::Usage(record.clone())).await {
                warn!(job_id = %record.job_id, record_id = %record.record_id, error = %e, "failed to enqueue usage record onto the reporter queue");
                self.audit
                    .log_security(AuditEvent::SecurityEvent {
                        id: uuid::Uuid::new_v4(),
                        at: self.clock.now(),
                        message: format!("usage record {} for job {} dropped: {e}", record.record_id, record.job_id),
                    })
                    .await;
            }
        }
    }

    // ── terminal signal bridge: Lifecycle → Usage (final) → Reporter ────────

    async fn terminal_worker(self: Arc<Self>, mut terminal_rx: mpsc::UnboundedReceiver<TerminalSignal>) {
        while let Some(signal) = terminal_rx.recv().await {
            let job = { self.jobs.read().await.get(&signal.job_id).cloned() };
            let Some(job) = job else {
                warn!(job_id = %signal.job_id, "terminal signal for a job not present in the registry");
                continue;
            };

            if let Err(e) = self.emit_snapshot(&job, signal.state, true).await {
                warn!(job_id = %job.job_id, error = %e, "final usage record was rejected");
            }

            if let Some(cluster_id) = &job.cluster_id {
                let r = &job.resources;
                let release = CapacityDelta {
                    cpu: (r.nodes * r.cores_per_node) as i64,
                    mem_gb: (r.nodes * r.memory_gb_per_node) as i64,
                    gpus: (r.nodes * r.gpus_per_node) as i64,
                };
                if let Err(e) = self.cluster_registry.update_capacity(cluster_id, release).await {
                    warn!(job_id = %job.job_id, error = %e, "failed to release reserved capacity on terminal transition");
                }
            }

            match self.scheduler.get_job_status(job.job_id.as_str()).await {
                Ok(scheduler_job) => {
                    let report = self.scheduler.create_status_report(&scheduler_job, &self.provider, self.signer.as_ref(), self.clock.as_ref()).await;
                    if let Err(e) = self.reporter.enqueue(QueuedRecord::Status(report)).await {
                        warn!(job_id = %job.job_id, error = %e, "failed to enqueue final status report");
                    }
                }
                Err(e) => warn!(job_id = %job.job_id, error = %e, "could not fetch final scheduler job status for status report"),
            }
        }
    }

    // ── (d) health worker ────────────────────────────────────────────────────

    async fn health_worker(self: Arc<Self>) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(self.timing.health_check_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
            if *shutdown.borrow() {
                return;
            }
            self.check_health_once().await;
        }
    }

    async fn check_health_once(&self) {
        self.set_health("clock", true, "ok").await;
        self.set_health("signer", true, "ok").await;

        let reporter_len = self.reporter.len().await;
        self.set_health("reporter_queue", true, format!("{reporter_len} pending")).await;

        let cluster_count = self.cluster_registry.list_clusters().await.len();
        self.set_health("cluster_registry", true, format!("{cluster_count} clusters registered")).await;
    }
}
