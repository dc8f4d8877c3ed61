use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("adapter is not running")]
    AdapterNotRunning,

    #[error("requested resources exceed adapter maxima: {0}")]
    InsufficientResources(String),

    #[error("partition unknown: {0}")]
    PartitionUnknown(String),

    #[error("cluster unknown: {0}")]
    ClusterUnknown(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("backend error: {0}")]
    BackendError(String),
}
