use async_trait::async_trait;
use vproc_domain::LifecycleEvent;

/// A consumer of lifecycle transitions, invoked synchronously in
/// registration order on every accepted transition (spec §4.F). `id` is
/// used to identify the callback in audit events when it fails or runs
/// over its dispatch budget.
#[async_trait]
pub trait LifecycleCallback: Send + Sync {
    fn id(&self) -> &str;

    async fn on_event(&self, event: &LifecycleEvent);
}
