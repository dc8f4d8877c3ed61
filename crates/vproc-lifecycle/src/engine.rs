use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;
use vproc_audit::{AuditEvent, AuditSink};
use vproc_crypto::Clock;
use vproc_domain::{transition_allowed, CanonicalState, JobId, LifecycleEvent, LifecycleEventKind};

use crate::callback::LifecycleCallback;
use crate::error::LifecycleError;

/// Sent to the Usage Pipeline the moment a job reaches a terminal state
/// (spec §9, "cyclic references" — a one-directional channel in place of
/// a direct Lifecycle→Usage pointer).
#[derive(Debug, Clone)]
pub struct TerminalSignal {
    pub job_id: JobId,
    pub state: CanonicalState,
    pub at: DateTime<Utc>,
}

struct JobActor {
    state: CanonicalState,
    events: Vec<LifecycleEvent>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    /// Set while callbacks for this job are being dispatched. Checked
    /// (not locked on) by a nested/concurrent call for the same job so
    /// reentry is rejected rather than deadlocked (spec §5).
    dispatching: bool,
}

impl JobActor {
    fn new(now: DateTime<Utc>) -> Self {
        JobActor {
            state: CanonicalState::Pending,
            events: vec![LifecycleEvent {
                job_id: JobId::new(""), // overwritten by caller before push
                event_kind: LifecycleEventKind::JobSubmitted,
                from_state: None,
                to_state: CanonicalState::Pending,
                timestamp: now,
                attributes: HashMap::new(),
            }],
            start_time: None,
            end_time: None,
            dispatching: false,
        }
    }
}

/// Per-job authoritative state machine (spec component F / §4.F). Owns
/// `Job`-adjacent lifecycle bookkeeping only — the `Job`/`SchedulerJob`
/// value structs themselves are owned by whoever drives the poll loop
/// (the Supervisor); this engine is the sole arbiter of whether a
/// proposed transition is valid.
pub struct LifecycleEngine {
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    callback_budget: Duration,
    callbacks: RwLock<Vec<Arc<dyn LifecycleCallback>>>,
    jobs: RwLock<HashMap<JobId, Arc<Mutex<JobActor>>>>,
    terminal_tx: mpsc::UnboundedSender<TerminalSignal>,
}

impl LifecycleEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        callback_budget: Duration,
        terminal_tx: mpsc::UnboundedSender<TerminalSignal>,
    ) -> Self {
        LifecycleEngine {
            clock,
            audit,
            callback_budget,
            callbacks: RwLock::new(Vec::new()),
            jobs: RwLock::new(HashMap::new()),
            terminal_tx,
        }
    }

    pub async fn register_callback(&self, callback: Arc<dyn LifecycleCallback>) {
        self.callbacks.write().await.push(callback);
    }

    /// Registers a new job at `Pending` and emits `JobSubmitted`,
    /// dispatching callbacks for it. Spec §4.C: Submit success always
    /// puts the job in `Pending`.
    pub async fn submit_job(&self, job_id: JobId) -> Result<(), LifecycleError> {
        {
            let jobs = self.jobs.read().await;
            if jobs.contains_key(&job_id) {
                return Err(LifecycleError::AlreadyRegistered(job_id.to_string()));
            }
        }
        let now = self.clock.now();
        let mut actor = JobActor::new(now);
        actor.events[0].job_id = job_id.clone();
        let event = actor.events[0].clone();
        let handle = Arc::new(Mutex::new(actor));
        self.jobs.write().await.insert(job_id.clone(), handle);

        self.audit
            .log_job(AuditEvent::JobSubmitted { id: Uuid::new_v4(), at: now, job_id: job_id.clone(), cluster_id: None })
            .await;
        self.dispatch_callbacks(&event).await;
        Ok(())
    }

    pub async fn current_state(&self, job_id: &JobId) -> Option<CanonicalState> {
        let handle = self.jobs.read().await.get(job_id).cloned()?;
        Some(handle.lock().await.state)
    }

    pub async fn events_for(&self, job_id: &JobId) -> Vec<LifecycleEvent> {
        match self.jobs.read().await.get(job_id).cloned() {
            Some(handle) => handle.lock().await.events.clone(),
            None => Vec::new(),
        }
    }

    pub async fn start_time(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
        let handle = self.jobs.read().await.get(job_id).cloned()?;
        handle.lock().await.start_time
    }

    pub async fn end_time(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
        let handle = self.jobs.read().await.get(job_id).cloned()?;
        handle.lock().await.end_time
    }

    /// Validates and (if valid) applies `to` as the job's new canonical
    /// state, per the allowed-transition table of spec §4.C. Returns
    /// `TransitionRejected` (logged, non-fatal, no state change) or
    /// `ReentrantTransition` (dropped, logged) without mutating state.
    pub async fn propose_transition(&self, job_id: &JobId, to: CanonicalState) -> Result<(), LifecycleError> {
        let handle = {
            let jobs = self.jobs.read().await;
            jobs.get(job_id).cloned().ok_or_else(|| LifecycleError::JobNotFound(job_id.to_string()))?
        };

        let (from, event, now) = {
            let mut actor = handle.lock().await;
            if actor.dispatching {
                self.audit
                    .log_security(AuditEvent::CallbackFailed {
                        id: Uuid::new_v4(),
                        at: self.clock.now(),
                        job_id: job_id.clone(),
                        callback_id: "<reentrant>".into(),
                        message: format!("reentrant transition to {:?} dropped", to),
                    })
                    .await;
                return Err(LifecycleError::ReentrantTransition(job_id.to_string()));
            }

            let from = actor.state;
            if !transition_allowed(from, to) {
                self.audit
                    .log_job(AuditEvent::TransitionRejected { id: Uuid::new_v4(), at: self.clock.now(), job_id: job_id.clone(), from, to })
                    .await;
                return Err(LifecycleError::TransitionRejected { from, to });
            }

            let now = self.clock.now();
            actor.state = to;
            if to == CanonicalState::Running && actor.start_time.is_none() {
                actor.start_time = Some(now);
            }
            if to.is_terminal() && actor.end_time.is_none() {
                actor.end_time = Some(now);
            }

            let kind = LifecycleEventKind::for_transition(to);
            let event = kind.map(|k| LifecycleEvent {
                job_id: job_id.clone(),
                event_kind: k,
                from_state: Some(from),
                to_state: to,
                timestamp: now,
                attributes: HashMap::new(),
            });
            if let Some(ev) = &event {
                actor.events.push(ev.clone());
                actor.dispatching = true;
            }
            (from, event, now)
        };

        self.audit
            .log_job(AuditEvent::JobTransition { id: Uuid::new_v4(), at: now, job_id: job_id.clone(), from: Some(from), to })
            .await;

        if let Some(ev) = &event {
            self.dispatch_callbacks(ev).await;
            handle.lock().await.dispatching = false;
        }

        if to.is_terminal() {
            let _ = self.terminal_tx.send(TerminalSignal { job_id: job_id.clone(), state: to, at: now });
        }

        Ok(())
    }

    /// Invokes every registered callback in order, each bounded by
    /// `callback_budget`. A callback that exceeds its budget is logged
    /// (`CallbackOverBudget`) but left running in the background; its
    /// eventual success/panic is still recorded once it finishes, per
    /// spec §4.F ("logged but not aborted") and §9's callback-error open
    /// question ("log and continue").
    async fn dispatch_callbacks(&self, event: &LifecycleEvent) {
        let callbacks = self.callbacks.read().await.clone();
        for callback in callbacks {
            let callback_id = callback.id().to_string();
            let event_clone = event.clone();
            let job_id = event.job_id.clone();
            let mut join = tokio::spawn(async move { callback.on_event(&event_clone).await });

            tokio::select! {
                res = &mut join => {
                    if let Err(join_err) = res {
                        warn!(%job_id, callback_id = %callback_id, error = %join_err, "lifecycle callback panicked");
                        self.audit
                            .log_job(AuditEvent::CallbackFailed {
                                id: Uuid::new_v4(),
                                at: self.clock.now(),
                                job_id: job_id.clone(),
                                callback_id: callback_id.clone(),
                                message: join_err.to_string(),
                            })
                            .await;
                    }
                }
                _ = tokio::time::sleep(self.callback_budget) => {
                    let budget_ms = self.callback_budget.as_millis() as u64;
                    warn!(%job_id, callback_id = %callback_id, budget_ms, "lifecycle callback exceeded dispatch budget");
                    self.audit
                        .log_job(AuditEvent::CallbackOverBudget {
                            id: Uuid::new_v4(),
                            at: self.clock.now(),
                            job_id: job_id.clone(),
                            callback_id: callback_id.clone(),
                            budget_ms,
                        })
                        .await;
                    let audit = self.audit.clone();
                    let clock = self.clock.clone();
                    tokio::spawn(async move {
                        if let Err(join_err) = join.await {
                            warn!(%job_id, callback_id = %callback_id, error = %join_err, "over-budget lifecycle callback later panicked");
                            audit
                                .log_job(AuditEvent::CallbackFailed {
                                    id: Uuid::new_v4(),
                                    at: clock.now(),
                                    job_id,
                                    callback_id,
                                    message: join_err.to_string(),
                                })
                                .await;
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vproc_audit::InMemoryAuditSink;
    use vproc_crypto::FakeClock;

    struct CountingCallback {
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl LifecycleCallback for CountingCallback {
        fn id(&self) -> &str {
            "counting"
        }

        async fn on_event(&self, _event: &LifecycleEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SlowCallback;

    #[async_trait::async_trait]
    impl LifecycleCallback for SlowCallback {
        fn id(&self) -> &str {
            "slow"
        }

        async fn on_event(&self, _event: &LifecycleEvent) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn engine() -> (LifecycleEngine, mpsc::UnboundedReceiver<TerminalSignal>) {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let audit = Arc::new(InMemoryAuditSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (LifecycleEngine::new(clock, audit, Duration::from_millis(100), tx), rx)
    }

    #[tokio::test]
    async fn happy_path_emits_four_events_in_order() {
        let (engine, _rx) = engine();
        let job_id = JobId::new("j1");
        engine.submit_job(job_id.clone()).await.unwrap();
        engine.propose_transition(&job_id, CanonicalState::Queued).await.unwrap();
        engine.propose_transition(&job_id, CanonicalState::Starting).await.unwrap();
        engine.propose_transition(&job_id, CanonicalState::Running).await.unwrap();
        engine.propose_transition(&job_id, CanonicalState::Completed).await.unwrap();

        let events = engine.events_for(&job_id).await;
        let kinds: Vec<_> = events.iter().map(|e| e.event_kind).collect();
        assert_eq!(
            kinds,
            vec![
                LifecycleEventKind::JobSubmitted,
                LifecycleEventKind::JobQueued,
                LifecycleEventKind::JobStarted,
                LifecycleEventKind::JobCompleted,
            ]
        );
        assert_eq!(engine.current_state(&job_id).await, Some(CanonicalState::Completed));
        assert!(engine.start_time(&job_id).await.is_some());
        assert!(engine.end_time(&job_id).await.is_some());
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_without_state_change() {
        let (engine, _rx) = engine();
        let job_id = JobId::new("j1");
        engine.submit_job(job_id.clone()).await.unwrap();
        let result = engine.propose_transition(&job_id, CanonicalState::Running).await;
        assert!(matches!(result, Err(LifecycleError::TransitionRejected { .. })));
        assert_eq!(engine.current_state(&job_id).await, Some(CanonicalState::Pending));
    }

    #[tokio::test]
    async fn terminal_transition_emits_signal_exactly_once() {
        let (engine, mut rx) = engine();
        let job_id = JobId::new("j1");
        engine.submit_job(job_id.clone()).await.unwrap();
        engine.propose_transition(&job_id, CanonicalState::Queued).await.unwrap();
        engine.propose_transition(&job_id, CanonicalState::Failed).await.unwrap();

        let signal = rx.try_recv().expect("terminal signal should have been sent");
        assert_eq!(signal.job_id, job_id);
        assert_eq!(signal.state, CanonicalState::Failed);
        assert!(rx.try_recv().is_err(), "only one terminal signal expected");
    }

    #[tokio::test]
    async fn callbacks_fire_for_every_accepted_transition() {
        let (engine, _rx) = engine();
        let count = Arc::new(AtomicUsize::new(0));
        engine.register_callback(Arc::new(CountingCallback { count: count.clone() })).await;

        let job_id = JobId::new("j1");
        engine.submit_job(job_id.clone()).await.unwrap();
        engine.propose_transition(&job_id, CanonicalState::Queued).await.unwrap();

        // Give the spawned callback a moment to run.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2); // JobSubmitted + JobQueued
    }

    #[tokio::test]
    async fn slow_callback_does_not_block_transition_return() {
        let (engine, _rx) = engine();
        engine.register_callback(Arc::new(SlowCallback)).await;

        let job_id = JobId::new("j1");
        let start = std::time::Instant::now();
        engine.submit_job(job_id.clone()).await.unwrap();
        // Budget is 100ms but the callback sleeps 50ms, so this case stays
        // within budget; assert it still completes promptly either way.
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn unknown_job_returns_not_found() {
        let (engine, _rx) = engine();
        let result = engine.propose_transition(&JobId::new("ghost"), CanonicalState::Queued).await;
        assert!(matches!(result, Err(LifecycleError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_submit_is_rejected() {
        let (engine, _rx) = engine();
        let job_id = JobId::new("j1");
        engine.submit_job(job_id.clone()).await.unwrap();
        let result = engine.submit_job(job_id).await;
        assert!(matches!(result, Err(LifecycleError::AlreadyRegistered(_))));
    }
}
