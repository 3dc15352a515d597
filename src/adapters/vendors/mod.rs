//! Vendor adapters - one implementation per purchase event source.
//!
//! Each vendor emits events in its own shape, on its own authentication
//! scheme, and with its own notion of "still active". The [`VendorAdapter`]
//! trait is the shared contract the orchestrator is written against; one
//! concrete type exists per vendor, so dispatch is static and no payload is
//! ever forced into a universal schema.

pub(crate) mod fastspring;
pub(crate) mod github;
mod github_cron;
mod manual;

pub use fastspring::FastspringAdapter;
pub use github::GithubAdapter;
pub use github_cron::GithubCronAdapter;
pub use manual::ManualAdapter;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::billing::{BillingCycle, BillingError, PurchaseEvent, Vendor};

/// An inbound webhook request, reduced to what verification and
/// normalization need.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// Header names lowercased.
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Payload attached by an internal caller replaying a request through
    /// the manual / cron routes. External callers cannot set this, which is
    /// exactly what the internal-replay verification relies on.
    pub internal_payload: Option<Vec<u8>>,
}

impl RawRequest {
    pub fn new(headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        RawRequest {
            headers,
            body,
            internal_payload: None,
        }
    }

    /// An internally replayed request: body and attached payload are the
    /// same bytes by construction.
    pub fn internal(body: Vec<u8>) -> Self {
        RawRequest {
            headers: HashMap::new(),
            body: body.clone(),
            internal_payload: Some(body),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Layered tenant-lookup predicate produced by an adapter for a persisted
/// record. Interpreted by the renewal executor on top of the base predicate
/// "non-null paid-until, not the public tenant".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantMatch {
    /// Marketplace: owner identity AND purchasing organization.
    OwnerInOrganization {
        identities: Vec<String>,
        organization: String,
    },
    /// Commerce platform: owner among every sender ever recorded for the
    /// subscription, or the current sender among the tenant's auxiliary
    /// contacts.
    SubscriptionSenders {
        subscription_id: String,
        current_sender: String,
    },
    /// Manual: owner among the operator-entered billing/technical contacts.
    ContactAddresses { identities: Vec<String> },
}

/// Shared contract every vendor adapter implements.
///
/// The `purchase_*` mappers run on one normalized sub-event (a vendor may
/// batch several into a single payload); the `action_is_*` predicates run on
/// the persisted record, since classification may depend on fields only
/// known after normalization.
pub trait VendorAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Authenticity check over the raw request. Failure is terminal.
    fn verify(&self, request: &RawRequest) -> Result<(), BillingError>;

    /// Optional short-circuit before any event processing (e.g. the
    /// marketplace connectivity ping). Returns the fixed response body.
    fn pre_process_request(&self, request: &RawRequest) -> Option<String> {
        let _ = request;
        None
    }

    /// Turns the vendor's batch/single payload shape into a uniform,
    /// ordered list of normalized sub-events (length >= 1).
    fn pre_process_payload(&self, payload: &Value) -> Result<Vec<Value>, BillingError>;

    /// Canonical action string; unrecognized vendor actions pass through
    /// verbatim so they are recorded, not dropped.
    fn purchase_action(&self, event: &Value) -> Result<String, BillingError>;

    fn purchase_effective_date(&self, event: &Value) -> Result<DateTime<Utc>, BillingError>;

    /// Buyer identity: email preferred, login/username fallback.
    fn purchase_sender(&self, event: &Value) -> Result<String, BillingError>;

    /// Namespaced cross-vendor subscription id.
    fn purchase_subscription(&self, event: &Value) -> Result<Option<String>, BillingError>;

    fn purchase_should_have_tenant(&self, event: &Value) -> bool;

    /// SKU lookup over a raw event. Must also work on persisted records
    /// (see [`VendorAdapter::find_sku_for`]) since provisioning happens
    /// post-persistence.
    fn find_sku(&self, event: &Value) -> Option<String>;

    fn find_sku_for(&self, record: &PurchaseEvent) -> Option<String> {
        self.find_sku(&record.payload)
    }

    fn action_is_activated(&self, record: &PurchaseEvent) -> bool;

    fn action_is_cancelled(&self, record: &PurchaseEvent) -> bool;

    fn action_is_recurring_billing(&self, record: &PurchaseEvent) -> bool;

    /// Billing cycle recorded on the persisted row.
    fn billing_cycle(&self, record: &PurchaseEvent) -> BillingCycle;

    /// Vendor-reported next billing date, if the payload carries one.
    fn next_billing_date(&self, record: &PurchaseEvent) -> Option<DateTime<Utc>>;

    /// Vendor-specific tenant-lookup predicate for the record.
    fn tenant_match(&self, record: &PurchaseEvent) -> Option<TenantMatch>;

    /// Contacts owed a fulfillment notification on activation; `None` when
    /// the vendor handles its own confirmation emails.
    fn fulfillment_recipients(&self, record: &PurchaseEvent) -> Option<Vec<String>> {
        let _ = record;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_request_headers_are_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("X-Hub-Signature".to_string(), "sha1=abc".to_string());
        let request = RawRequest::new(headers, b"{}".to_vec());

        assert_eq!(request.header("x-hub-signature"), Some("sha1=abc"));
        assert_eq!(request.header("X-HUB-SIGNATURE"), Some("sha1=abc"));
        assert_eq!(request.header("x-fs-signature"), None);
    }

    #[test]
    fn internal_request_attaches_its_own_body() {
        let request = RawRequest::internal(b"{\"action\":\"purchased\"}".to_vec());
        assert_eq!(request.internal_payload.as_deref(), Some(request.body.as_slice()));
    }
}
