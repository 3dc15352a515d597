//! Tenant registry port.
//!
//! Tenants are external to this core: they are only ever referenced by
//! predicate match and the single permitted mutation is extending
//! `paid_until`. The core never creates or deletes tenants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::BillingError;

/// Narrowing predicate layered on top of the base filter "has a non-null
/// paid-until and is not the default/public tenant". Each vendor supplies
/// one variant (see the vendor adapters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantCriteria {
    /// Owner email or username among `identities` AND matching organization.
    OwnerInOrganization {
        identities: Vec<String>,
        organization: String,
    },
    /// Owner email/username among all sender addresses ever recorded for
    /// the subscription, or the tenant's auxiliary contact list contains
    /// the current sender (supports a designated non-owner billing contact).
    SubscriptionSenders {
        senders: Vec<String>,
        current_sender: String,
    },
    /// Owner email/username among the purchase's billing or technical
    /// contact addresses.
    ContactAddresses { identities: Vec<String> },
}

/// Minimal view of a matched tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRef {
    pub id: i64,
    pub organization: String,
    pub paid_until: Option<DateTime<Utc>>,
}

/// Port for the external tenant registry.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Finds a paid tenant matching the layered predicate, or None.
    /// "Not found" is an expected outcome, not an error.
    async fn find_paid_tenant(
        &self,
        criteria: &TenantCriteria,
    ) -> Result<Option<TenantRef>, BillingError>;

    /// Extends the tenant's paid-until date.
    async fn extend_paid_until(
        &self,
        tenant_id: i64,
        paid_until: DateTime<Utc>,
    ) -> Result<(), BillingError>;
}
