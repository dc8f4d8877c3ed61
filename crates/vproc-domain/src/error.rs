use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("max-runtime-seconds must be > 0, got {0}")]
    InvalidMaxRuntime(i64),

    #[error("priority must be in [0..100], got {0}")]
    InvalidPriority(u8),

    #[error("period-end must be after period-start (start={start}, end={end})")]
    InvalidPeriod { start: u64, end: u64 },

    #[error("metric {name} regressed: previous={previous}, new={new}")]
    MetricRegressed {
        name: &'static str,
        previous: u64,
        new: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no credentials of type {kind:?} for cluster {cluster_id}")]
    CredentialsNotFound { cluster_id: String, kind: String },
}
