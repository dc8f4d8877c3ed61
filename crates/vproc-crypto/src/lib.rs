pub mod clock;
pub mod error;
pub mod payload;
pub mod signer;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::CryptoError;
pub use signer::{verify, Ed25519Signer, InMemorySigner, Signer};
