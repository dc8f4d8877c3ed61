use std::sync::Mutex;

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use vproc_domain::{PublicKeyBytes, Signature};

use crate::error::CryptoError;

/// A keyed signer producing detached signatures over canonical byte
/// payloads. Internally serialized per spec §5 — concurrent callers may
/// request signatures concurrently but signing itself is atomic.
pub trait Signer: Send + Sync {
    fn sign(&self, bytes: &[u8]) -> Signature;
    fn public_key(&self) -> PublicKeyBytes;
}

/// Production signer backed by an Ed25519 keypair supplied at construction
/// (key generation is out of scope per spec §1 — keys are supplied).
pub struct Ed25519Signer {
    key: Mutex<SigningKey>,
}

impl Ed25519Signer {
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Ed25519Signer { key: Mutex::new(SigningKey::from_bytes(seed)) }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.lock().expect("signer mutex poisoned").verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, bytes: &[u8]) -> Signature {
        let key = self.key.lock().expect("signer mutex poisoned");
        Signature(key.sign(bytes).to_bytes().to_vec())
    }

    fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.verifying_key().to_bytes().to_vec())
    }
}

/// Verify a detached signature against a public key. Used by property
/// tests (P5/P8) and by anything downstream of the Reporter Queue that
/// wants to double-check before submission (spec I5).
pub fn verify(public_key: &PublicKeyBytes, bytes: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = public_key
        .0
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::VerificationFailed)?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::VerificationFailed)?;
    let sig_bytes: [u8; 64] = signature
        .0
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::VerificationFailed)?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key
        .verify(bytes, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Ephemeral signer for tests — generates a fresh keypair per instance so
/// tests never share key material.
pub struct InMemorySigner {
    inner: Ed25519Signer,
}

impl InMemorySigner {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        InMemorySigner { inner: Ed25519Signer { key: Mutex::new(signing_key) } }
    }
}

impl Signer for InMemorySigner {
    fn sign(&self, bytes: &[u8]) -> Signature {
        self.inner.sign(bytes)
    }

    fn public_key(&self) -> PublicKeyBytes {
        self.inner.public_key()
    }
}
