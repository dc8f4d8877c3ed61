use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signer key unavailable")]
    KeyUnavailable,

    #[error("signature verification failed")]
    VerificationFailed,
}
