use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("reporter queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("chain client transient error: {0}")]
    Transient(String),

    #[error("chain client permanent error: {0}")]
    Permanent(String),

    #[error(transparent)]
    Store(#[from] vproc_store::StoreError),
}
