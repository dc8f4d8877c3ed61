pub mod credential_store;
pub mod error;
pub mod ids;
pub mod types;

pub use credential_store::CredentialStore;
pub use error::DomainError;
pub use ids::{ClusterId, CustomerAddress, JobId, OfferingId, PartitionName, ProviderAddress, RecordId};
pub use types::{
    BackendType, Capacity, CanonicalState, Cluster, ClusterScore, ClusterStatus, ContentHash,
    CredentialType, Credentials, Job, LifecycleEvent, LifecycleEventKind, Metrics, NodeHours,
    Partition, PartitionLiveState, PublicKeyBytes, Resources, RoutingDecision, SchedulerJob,
    Signature, StatusReport, UsageRecord, Workload, transition_allowed,
};
