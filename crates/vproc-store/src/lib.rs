pub mod credentials;
pub mod error;
pub mod persisted_log;
pub mod registry;

pub use credentials::{FileCredentialStore, InMemoryCredentialStore};
pub use error::StoreError;
pub use persisted_log::{PersistedLog, RecordState};
pub use registry::{CapacityDelta, ClusterRegistry};
