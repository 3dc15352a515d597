//! Error taxonomy for webhook ingestion and entitlement reconciliation.

use thiserror::Error;

/// Errors surfaced by the billing core.
///
/// The variants map directly onto the HTTP boundary: `Forbidden` becomes a
/// 403 with no ledger write, `MalformedPayload` a 400, everything else a 500.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Signature verification failed. Terminal for the request.
    #[error("signature verification failed")]
    Forbidden,

    /// The vendor payload could not be interpreted. This is the one place
    /// where silent fallback is disallowed: mis-billing is worse than
    /// failing loudly.
    #[error("malformed vendor payload: {0}")]
    MalformedPayload(String),

    /// Purchase ledger read/write failure.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Tenant registry query/update failure.
    #[error("tenant registry error: {0}")]
    Registry(String),

    /// External account provisioning failure that is not one of the
    /// tolerated partial failures (already exists / already absent).
    #[error("provisioning error: {0}")]
    Provisioning(String),

    /// Outbound vendor read API failure (renewal scan).
    #[error("vendor api error: {0}")]
    VendorApi(String),
}

impl BillingError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        BillingError::MalformedPayload(msg.into())
    }

    pub fn ledger(msg: impl std::fmt::Display) -> Self {
        BillingError::Ledger(msg.to_string())
    }

    pub fn registry(msg: impl std::fmt::Display) -> Self {
        BillingError::Registry(msg.to_string())
    }
}
