use std::collections::HashMap;
use std::sync::Arc;

use vproc_domain::BackendType;

use crate::adapter::SchedulerAdapter;
use crate::error::SchedulerError;

/// Resolves the configured `SchedulerAdapter` for a backend type. A
/// provider typically registers exactly one backend (its `scheduler_type`
/// config value) but the registry supports more for mixed-fleet testing.
#[derive(Default)]
pub struct SchedulerRegistry {
    adapters: HashMap<BackendType, Arc<dyn SchedulerAdapter>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: BackendType, adapter: Arc<dyn SchedulerAdapter>) -> &mut Self {
        self.adapters.insert(backend, adapter);
        self
    }

    pub fn for_backend(&self, backend: BackendType) -> Result<Arc<dyn SchedulerAdapter>, SchedulerError> {
        self.adapters.get(&backend).cloned().ok_or_else(|| SchedulerError::BackendError(format!("no adapter registered for {backend}")))
    }
}
