use async_trait::async_trait;

use crate::error::DomainError;
use crate::ids::ClusterId;
use crate::types::{CredentialType, Credentials};

/// Returns cluster credentials by `(cluster-id, credential-type)`. Never
/// logs secret material (see [`Credentials`]'s redacted `Debug`).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(
        &self,
        cluster_id: &ClusterId,
        kind: CredentialType,
    ) -> Result<Credentials, DomainError>;
}
