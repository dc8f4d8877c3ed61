pub mod client;
pub mod error;
pub mod queue;

pub use client::{ChainAck, ChainClient, HttpChainClient, InMemoryChainClient, Scripted};
pub use error::ReporterError;
pub use queue::{QueuedRecord, ReporterQueue};
