use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no candidate cluster satisfies the job's hard constraints")]
    NoCandidatesFound,

    #[error("explicitly requested cluster '{0}' fails the hard filter")]
    ClusterIneligible(String),

    #[error("no candidate cluster meets the required identity tier {0}")]
    InsufficientTier(u8),
}
