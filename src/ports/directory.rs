//! External user directory port.
//!
//! Two narrow uses: ensuring a buyer account exists on activation
//! (create-if-absent, never duplicate) and resolving a buyer's personal
//! namespace for gitops-prefix validation on self-support SKUs.

use async_trait::async_trait;

use crate::domain::billing::BillingError;

#[async_trait]
pub trait Directory: Send + Sync {
    /// Ensures a platform account exists for the buyer identity.
    /// Idempotent: an existing account is success, not an error.
    async fn ensure_user(&self, identity: &str) -> Result<(), BillingError>;

    /// The buyer's verified personal namespace (login), if any.
    async fn personal_namespace(&self, identity: &str) -> Result<Option<String>, BillingError>;
}
