use serde::{Deserialize, Serialize};

fn default_scheduler_type() -> String {
    "slurm".to_string()
}
fn default_job_poll_interval() -> u64 {
    5
}
fn default_snapshot_interval() -> u64 {
    10
}
fn default_usage_report_batch_size() -> u32 {
    10
}
fn default_max_concurrent_jobs() -> u32 {
    100
}
fn default_job_timeout() -> u64 {
    3600
}
fn default_high_mem_threshold_gb() -> u32 {
    256
}
fn default_max_pending_records() -> u32 {
    1000
}
fn default_retry_backoff() -> u64 {
    1
}
fn default_max_retries() -> u32 {
    3
}
fn default_shutdown_drain_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_callback_budget_ms() -> u64 {
    100
}
fn default_max_nodes_per_job() -> u32 {
    64
}
fn default_max_cores_per_node() -> u32 {
    128
}
fn default_max_memory_gb_per_node() -> u32 {
    1024
}
fn default_max_gpus_per_node() -> u32 {
    8
}

/// Recognized configuration options (spec §6), with the spec's defaults.
/// All duration-like fields are seconds unless otherwise noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub cluster_id: String,

    #[serde(default = "default_scheduler_type")]
    pub scheduler_type: String,

    #[serde(default = "default_job_poll_interval")]
    pub job_poll_interval_secs: u64,

    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    #[serde(default = "default_usage_report_batch_size")]
    pub usage_report_batch_size: u32,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,

    #[serde(default = "default_job_timeout")]
    pub default_job_timeout_secs: u64,

    #[serde(default = "default_high_mem_threshold_gb")]
    pub high_mem_threshold_gb: u32,

    #[serde(default = "default_max_pending_records")]
    pub max_pending_records: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub audit_enabled: bool,

    #[serde(default = "default_false")]
    pub simulation_mode: bool,

    #[serde(default = "default_callback_budget_ms")]
    pub callback_budget_ms: u64,

    /// Scheduler Adapter's own resource ceilings, checked before a Submit
    /// is delegated to the backend (spec §4.C, "configured maxima").
    /// Independent of a cluster's live capacity, which the Routing Engine
    /// checks separately.
    #[serde(default = "default_max_nodes_per_job")]
    pub max_nodes_per_job: u32,

    #[serde(default = "default_max_cores_per_node")]
    pub max_cores_per_node: u32,

    #[serde(default = "default_max_memory_gb_per_node")]
    pub max_memory_gb_per_node: u32,

    #[serde(default = "default_max_gpus_per_node")]
    pub max_gpus_per_node: u32,
}

impl ProviderConfig {
    /// `cluster-id` (required by spec §6) must be non-empty; `scheduler-type`
    /// must be one of the supported backends.
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        if self.cluster_id.trim().is_empty() {
            return Err(crate::error::ConfigError::Invalid("cluster_id is required".into()));
        }
        let known = ["slurm", "kubernetes", "simulated"];
        if !known.contains(&self.scheduler_type.as_str()) {
            return Err(crate::error::ConfigError::Invalid(format!(
                "unknown scheduler_type '{}', expected one of {:?}",
                self.scheduler_type, known
            )));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(crate::error::ConfigError::Invalid("max_concurrent_jobs must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let yaml = "cluster_id: cluster-a\n";
        let cfg: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.scheduler_type, "slurm");
        assert_eq!(cfg.job_poll_interval_secs, 5);
        assert_eq!(cfg.snapshot_interval_secs, 10);
        assert_eq!(cfg.usage_report_batch_size, 10);
        assert_eq!(cfg.max_concurrent_jobs, 100);
        assert_eq!(cfg.default_job_timeout_secs, 3600);
        assert_eq!(cfg.high_mem_threshold_gb, 256);
        assert_eq!(cfg.max_pending_records, 1000);
        assert_eq!(cfg.retry_backoff_secs, 1);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.shutdown_drain_timeout_secs, 30);
        assert!(cfg.audit_enabled);
        assert!(!cfg.simulation_mode);
        assert_eq!(cfg.max_nodes_per_job, 64);
        assert_eq!(cfg.max_cores_per_node, 128);
        assert_eq!(cfg.max_memory_gb_per_node, 1024);
        assert_eq!(cfg.max_gpus_per_node, 8);
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_cluster_id_is_rejected() {
        let yaml = "cluster_id: \"\"\n";
        let cfg: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_scheduler_type_is_rejected() {
        let yaml = "cluster_id: c1\nscheduler_type: lsf\n";
        let cfg: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validate().is_err());
    }
}
