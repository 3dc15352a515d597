//! External account provisioner port.
//!
//! Provisioned credentials ("robot" accounts) grant read access to specific
//! product repositories. The core addresses them exclusively by the
//! deterministic [`RobotName`] derived from the subscription id and treats
//! the account itself as opaque.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::billing::RobotName;

/// Provisioner failures. `AlreadyExists` on create and `NotFound` on delete
/// are expected partial failures; callers treat them as success.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("account already exists")]
    AlreadyExists,

    #[error("account not found")]
    NotFound,

    #[error("provisioner request failed: {0}")]
    Request(String),
}

/// Port for the external credential provisioner.
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    /// Creates the robot account.
    async fn create_account(&self, name: &RobotName) -> Result<(), ProvisionerError>;

    /// Grants the robot read access to one product repository.
    async fn grant_read(&self, name: &RobotName, product: &str) -> Result<(), ProvisionerError>;

    /// Deletes the robot account. Absence is reported as `NotFound`, which
    /// callers must not treat as a failure (deletion is idempotent).
    async fn delete_account(&self, name: &RobotName) -> Result<(), ProvisionerError>;

    /// Regenerates the robot's credential, returning the new token.
    async fn regenerate_token(&self, name: &RobotName) -> Result<String, ProvisionerError>;
}
