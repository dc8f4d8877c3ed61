pub mod adapter;
pub mod error;
pub mod kubernetes;
pub mod partition;
pub mod registry;
pub mod simulated;
pub mod slurm;

pub use adapter::SchedulerAdapter;
pub use error::SchedulerError;
pub use kubernetes::KubernetesAdapter;
pub use partition::{check_resource_maxima, partition_select, AdapterLimits};
pub use registry::SchedulerRegistry;
pub use simulated::SimulatedAdapter;
pub use slurm::SlurmAdapter;
