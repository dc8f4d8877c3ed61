use thiserror::Error;
use vproc_domain::CanonicalState;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job already registered: {0}")]
    AlreadyRegistered(String),

    #[error("transition {from:?} -> {to:?} is not in the allowed-transition table")]
    TransitionRejected { from: CanonicalState, to: CanonicalState },

    #[error("reentrant transition for job {0} dropped (already dispatching callbacks)")]
    ReentrantTransition(String),
}
