use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("cluster already registered: {0}")]
    ClusterAlreadyRegistered(String),

    #[error("insufficient capacity on cluster {cluster_id}")]
    InsufficientCapacity { cluster_id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
