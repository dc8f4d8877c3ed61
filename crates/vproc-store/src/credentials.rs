use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vproc_domain::{ClusterId, CredentialStore, CredentialType, Credentials, DomainError};

/// Test/simulated-backend credential store. Holds secrets in process
/// memory only (spec component B, in-memory configuration).
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    entries: Arc<RwLock<HashMap<(ClusterId, CredentialType), Vec<u8>>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, cluster_id: ClusterId, kind: CredentialType, secret_material: Vec<u8>) {
        self.entries.write().await.insert((cluster_id, kind), secret_material);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, cluster_id: &ClusterId, kind: CredentialType) -> Result<Credentials, DomainError> {
        let entries = self.entries.read().await;
        let secret_material = entries
            .get(&(cluster_id.clone(), kind))
            .cloned()
            .ok_or_else(|| DomainError::CredentialsNotFound {
                cluster_id: cluster_id.to_string(),
                kind: format!("{:?}", kind),
            })?;
        Ok(Credentials::new(cluster_id.clone(), kind, secret_material))
    }
}

/// Reads cluster credentials from files on disk, one file per
/// `(cluster-id, kind)` under a configured root directory. Matches the
/// provider-config convention of pointing at credential file paths
/// rather than embedding secrets in YAML (spec §6).
pub struct FileCredentialStore {
    root: std::path::PathBuf,
}

impl FileCredentialStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        FileCredentialStore { root: root.into() }
    }

    fn path_for(&self, cluster_id: &ClusterId, kind: CredentialType) -> std::path::PathBuf {
        self.root.join(cluster_id.as_str()).join(format!("{:?}", kind).to_lowercase())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, cluster_id: &ClusterId, kind: CredentialType) -> Result<Credentials, DomainError> {
        let path = self.path_for(cluster_id, kind);
        let secret_material = tokio::fs::read(&path).await.map_err(|_| DomainError::CredentialsNotFound {
            cluster_id: cluster_id.to_string(),
            kind: format!("{:?}", kind),
        })?;
        Ok(Credentials::new(cluster_id.clone(), kind, secret_material))
    }
}
