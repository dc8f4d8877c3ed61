use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("invalid usage record for job {job_id}: {reason}")]
    InvalidUsage { job_id: String, reason: String },

    #[error("final usage record already emitted for job {0}")]
    DuplicateFinal(String),

    #[error("unknown job {0}")]
    JobNotFound(String),
}
