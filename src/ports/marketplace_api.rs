//! Marketplace read API port, used only by the renewal scanner.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::billing::BillingError;

/// Current subscription state for a marketplace account, as reported by the
/// vendor's read API.
#[derive(Debug, Clone)]
pub struct MarketplaceAccount {
    pub id: i64,
    pub login: String,
    pub email: Option<String>,
    pub organization_billing_email: Option<String>,
    pub account_type: String,
    pub url: String,
    /// The fresh `marketplace_purchase` sub-structure, kept verbatim so
    /// synthetic events can carry it unchanged.
    pub marketplace_purchase: Value,
}

/// Port for the authenticated marketplace read API.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Subscription state for an account id. A vendor "not found" response
    /// means "not currently a subscriber" and is returned as `Ok(None)`,
    /// never as an error.
    async fn account_subscription(
        &self,
        account_id: i64,
    ) -> Result<Option<MarketplaceAccount>, BillingError>;
}
