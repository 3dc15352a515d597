//! Synthetic-renewal variant of the marketplace adapter.
//!
//! The marketplace never pushes renewal webhooks, so the renewal scanner
//! constructs `purchased` events itself and replays them through the same
//! orchestrator path. This adapter marks those rows with the dedicated
//! vendor so they stay distinguishable from genuine webhooks, and
//! reclassifies them as recurring billing instead of fresh activations.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::billing::{
    parse_vendor_date, verify_internal_replay, BillingCycle, BillingError, PurchaseEvent, Vendor,
    ACTION_CANCELLED,
};

use super::{github, RawRequest, TenantMatch, VendorAdapter};

pub struct GithubCronAdapter;

impl GithubCronAdapter {
    pub fn new() -> Self {
        GithubCronAdapter
    }
}

impl Default for GithubCronAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorAdapter for GithubCronAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::GithubCron
    }

    fn verify(&self, request: &RawRequest) -> Result<(), BillingError> {
        // Only the scanner constructs these requests; the attached payload
        // proves the request came from inside the process.
        verify_internal_replay(request.internal_payload.as_deref(), &request.body)
    }

    fn pre_process_payload(&self, payload: &Value) -> Result<Vec<Value>, BillingError> {
        Ok(vec![payload.clone()])
    }

    fn purchase_action(&self, event: &Value) -> Result<String, BillingError> {
        Ok(github::parse_payload(event)?.action)
    }

    fn purchase_effective_date(&self, event: &Value) -> Result<DateTime<Utc>, BillingError> {
        parse_vendor_date(&github::parse_payload(event)?.effective_date)
    }

    fn purchase_sender(&self, event: &Value) -> Result<String, BillingError> {
        let payload = github::parse_payload(event)?;
        Ok(payload.sender.email.unwrap_or(payload.sender.login))
    }

    fn purchase_subscription(&self, event: &Value) -> Result<Option<String>, BillingError> {
        let payload = github::parse_payload(event)?;
        Ok(Some(format!("gh-{}", payload.marketplace_purchase.account.id)))
    }

    fn purchase_should_have_tenant(&self, event: &Value) -> bool {
        github::parse_payload(event)
            .map(|p| p.marketplace_purchase.plan.monthly_price_in_cents > 0)
            .unwrap_or(false)
    }

    fn find_sku(&self, event: &Value) -> Option<String> {
        github::find_sku(event)
    }

    fn action_is_activated(&self, _record: &PurchaseEvent) -> bool {
        // Synthetic rows record a charge for an existing subscription; the
        // robot account was provisioned on the original activation.
        false
    }

    fn action_is_cancelled(&self, record: &PurchaseEvent) -> bool {
        record.action == ACTION_CANCELLED
    }

    fn action_is_recurring_billing(&self, record: &PurchaseEvent) -> bool {
        record.is_purchased() && record.marketplace_price_in_cents().unwrap_or(0) > 0
    }

    fn billing_cycle(&self, record: &PurchaseEvent) -> BillingCycle {
        github::record_billing_cycle(record)
    }

    fn next_billing_date(&self, record: &PurchaseEvent) -> Option<DateTime<Utc>> {
        github::record_next_billing_date(record)
    }

    fn tenant_match(&self, record: &PurchaseEvent) -> Option<TenantMatch> {
        github::record_tenant_match(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::ACTION_PURCHASED;
    use serde_json::json;

    fn record_for(action: &str, price: i64) -> PurchaseEvent {
        PurchaseEvent {
            id: 1,
            vendor: Vendor::GithubCron,
            action: action.to_string(),
            sender: "buyer@example.com".to_string(),
            subscription_id: Some("gh-18404719".to_string()),
            effective_date: Utc::now(),
            received_on: Utc::now(),
            should_have_tenant: true,
            gitops_prefix: None,
            payload: json!({
                "marketplace_purchase": {
                    "account": {"id": 18404719, "login": "kiwitcms"},
                    "billing_cycle": "monthly",
                    "plan": {"monthly_price_in_cents": price}
                },
                "sender": {"login": "atodorov", "email": "buyer@example.com"}
            }),
        }
    }

    #[test]
    fn synthetic_purchases_classify_as_recurring_not_activated() {
        let adapter = GithubCronAdapter::new();
        let record = record_for(ACTION_PURCHASED, 3200);
        assert!(adapter.action_is_recurring_billing(&record));
        assert!(!adapter.action_is_activated(&record));
    }

    #[test]
    fn zero_price_synthetic_rows_do_nothing() {
        let adapter = GithubCronAdapter::new();
        let record = record_for(ACTION_PURCHASED, 0);
        assert!(!adapter.action_is_recurring_billing(&record));
    }

    #[test]
    fn verify_rejects_external_callers() {
        let adapter = GithubCronAdapter::new();
        let request = RawRequest::new(Default::default(), b"{}".to_vec());
        assert!(matches!(
            adapter.verify(&request),
            Err(BillingError::Forbidden)
        ));

        let request = RawRequest::internal(b"{}".to_vec());
        assert!(adapter.verify(&request).is_ok());
    }
}
