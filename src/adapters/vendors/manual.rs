//! Back-office (manual invoice) vendor adapter.
//!
//! Manual purchases are entered by an operator and replayed internally as
//! a webhook so they flow through the same pipeline as real vendors. The
//! payload is flat operator input: every load-bearing field is checked up
//! front and a missing one is a hard error rather than a silent default.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::billing::{
    parse_vendor_date, sku_grants_tenant, verify_internal_replay, BillingCycle, BillingError,
    PurchaseEvent, Vendor, ACTION_CANCELLED, ACTION_PURCHASED,
};

use super::{RawRequest, TenantMatch, VendorAdapter};

/// Operator-entered action marking a renewal of an existing invoice.
const ACTION_RENEWED: &str = "renewed";

fn required_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, BillingError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BillingError::malformed(format!("manual purchase without {field}")))
}

/// Adapter for operator-submitted purchases replayed on the internal route.
#[derive(Default)]
pub struct ManualAdapter;

impl ManualAdapter {
    pub fn new() -> Self {
        ManualAdapter
    }
}

impl VendorAdapter for ManualAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Manual
    }

    fn verify(&self, request: &RawRequest) -> Result<(), BillingError> {
        // Only the back-office form constructs these requests; the attached
        // payload proves the request came from inside the process.
        verify_internal_replay(request.internal_payload.as_deref(), &request.body)
    }

    fn pre_process_payload(&self, payload: &Value) -> Result<Vec<Value>, BillingError> {
        // Operator input is validated in one place. The SKU is mandatory,
        // unlike the webhook vendors where it may be absent on free plans.
        required_str(payload, "action")?;
        required_str(payload, "sender")?;
        required_str(payload, "effective_date")?;
        required_str(payload, "sku")?;
        Ok(vec![payload.clone()])
    }

    fn purchase_action(&self, event: &Value) -> Result<String, BillingError> {
        Ok(required_str(event, "action")?.to_string())
    }

    fn purchase_effective_date(&self, event: &Value) -> Result<DateTime<Utc>, BillingError> {
        parse_vendor_date(required_str(event, "effective_date")?)
    }

    fn purchase_sender(&self, event: &Value) -> Result<String, BillingError> {
        Ok(required_str(event, "sender")?.to_string())
    }

    fn purchase_subscription(&self, event: &Value) -> Result<Option<String>, BillingError> {
        // No vendor-side subscription id exists; the buyer is the unit of
        // uniqueness for manual invoices.
        Ok(Some(format!("man-{}", required_str(event, "sender")?)))
    }

    fn purchase_should_have_tenant(&self, event: &Value) -> bool {
        self.find_sku(event)
            .is_some_and(|sku| sku_grants_tenant(&sku))
    }

    fn find_sku(&self, event: &Value) -> Option<String> {
        event
            .get("sku")
            .and_then(Value::as_str)
            .filter(|sku| !sku.is_empty())
            .map(str::to_string)
    }

    fn action_is_activated(&self, record: &PurchaseEvent) -> bool {
        record.action == ACTION_PURCHASED
    }

    fn action_is_cancelled(&self, record: &PurchaseEvent) -> bool {
        record.action == ACTION_CANCELLED
    }

    fn action_is_recurring_billing(&self, record: &PurchaseEvent) -> bool {
        record.action == ACTION_RENEWED
    }

    fn billing_cycle(&self, record: &PurchaseEvent) -> BillingCycle {
        match record.payload.get("billing_cycle").and_then(Value::as_str) {
            Some("monthly") => BillingCycle::Monthly,
            Some("yearly") => BillingCycle::Yearly,
            _ => BillingCycle::Unrecognized,
        }
    }

    fn next_billing_date(&self, record: &PurchaseEvent) -> Option<DateTime<Utc>> {
        let raw = record.payload.get("paid_until")?.as_str()?;
        parse_vendor_date(raw).ok()
    }

    fn tenant_match(&self, record: &PurchaseEvent) -> Option<TenantMatch> {
        let mut identities = vec![record.sender.clone()];
        if let Some(billing) = record
            .payload
            .get("billing_email")
            .and_then(Value::as_str)
            .filter(|email| !email.is_empty() && *email != record.sender)
        {
            identities.push(billing.to_string());
        }
        Some(TenantMatch::ContactAddresses { identities })
    }

    fn fulfillment_recipients(&self, record: &PurchaseEvent) -> Option<Vec<String>> {
        // Billing contact first, technical contact (the sender) second,
        // collapsed when the operator entered the same address for both.
        let mut recipients = Vec::new();
        if let Some(billing) = record
            .payload
            .get("billing_email")
            .and_then(Value::as_str)
            .filter(|email| !email.is_empty() && *email != record.sender)
        {
            recipients.push(billing.to_string());
        }
        recipients.push(record.sender.clone());
        Some(recipients)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn purchase_payload(sku: &str) -> Value {
        json!({
            "action": "purchased",
            "sender": "devops@example.com",
            "effective_date": "2023-04-14T00:00:00",
            "sku": sku,
            "billing_cycle": "yearly",
            "billing_email": "billing@example.com",
            "invoice": "TEST-2023-04-14",
            "price": 4800,
            "customer_name": "Testing Department",
            "address": "Bulgaria"
        })
    }

    fn record_for(payload: Value, action: &str) -> PurchaseEvent {
        PurchaseEvent {
            id: 1,
            vendor: Vendor::Manual,
            action: action.to_string(),
            sender: "devops@example.com".to_string(),
            subscription_id: Some("man-devops@example.com".to_string()),
            effective_date: Utc::now(),
            received_on: Utc::now(),
            should_have_tenant: true,
            gitops_prefix: None,
            payload,
        }
    }

    #[test]
    fn external_callers_are_rejected() {
        let adapter = ManualAdapter::new();
        let request = RawRequest::new(Default::default(), b"{}".to_vec());
        assert!(matches!(
            adapter.verify(&request),
            Err(BillingError::Forbidden)
        ));

        let request = RawRequest::internal(b"{}".to_vec());
        assert!(adapter.verify(&request).is_ok());
    }

    #[test]
    fn missing_operator_fields_are_hard_errors() {
        let adapter = ManualAdapter::new();
        for field in ["action", "sender", "effective_date", "sku"] {
            let mut payload = purchase_payload("x-tenant+version");
            payload.as_object_mut().unwrap().remove(field);
            let result = adapter.pre_process_payload(&payload);
            assert!(
                matches!(result, Err(BillingError::MalformedPayload(_))),
                "expected hard error without {field}"
            );
        }
    }

    #[test]
    fn mappers_normalize_operator_input() {
        let adapter = ManualAdapter::new();
        let payload = purchase_payload("x-tenant+version+enterprise");

        assert_eq!(adapter.purchase_action(&payload).unwrap(), "purchased");
        assert_eq!(
            adapter.purchase_sender(&payload).unwrap(),
            "devops@example.com"
        );
        assert_eq!(
            adapter.purchase_subscription(&payload).unwrap().as_deref(),
            Some("man-devops@example.com")
        );
        assert!(adapter.purchase_should_have_tenant(&payload));
        assert_eq!(
            adapter
                .purchase_effective_date(&payload)
                .unwrap()
                .to_rfc3339(),
            "2023-04-14T00:00:00+00:00"
        );
    }

    #[test]
    fn fulfillment_goes_to_billing_then_technical_contact() {
        let adapter = ManualAdapter::new();
        let record = record_for(purchase_payload("x-tenant+version"), "purchased");

        assert_eq!(
            adapter.fulfillment_recipients(&record),
            Some(vec![
                "billing@example.com".to_string(),
                "devops@example.com".to_string()
            ])
        );

        let mut payload = purchase_payload("x-tenant+version");
        payload["billing_email"] = json!("devops@example.com");
        let record = record_for(payload, "purchased");
        assert_eq!(
            adapter.fulfillment_recipients(&record),
            Some(vec!["devops@example.com".to_string()])
        );
    }

    #[test]
    fn self_support_sku_grants_no_tenant() {
        let adapter = ManualAdapter::new();
        assert!(!adapter.purchase_should_have_tenant(&purchase_payload("version")));
    }

    #[test]
    fn renewed_classifies_as_recurring_only() {
        let adapter = ManualAdapter::new();
        let mut payload = purchase_payload("x-tenant+version");
        payload["action"] = json!("renewed");
        let record = record_for(payload, "renewed");

        assert!(adapter.action_is_recurring_billing(&record));
        assert!(!adapter.action_is_activated(&record));
        assert!(!adapter.action_is_cancelled(&record));
    }

    #[test]
    fn billing_cycle_and_explicit_paid_until_come_from_operator_fields() {
        let adapter = ManualAdapter::new();
        let mut payload = purchase_payload("x-tenant+version");
        payload["paid_until"] = json!("2024-04-14T00:00:00");
        let record = record_for(payload, "purchased");

        assert_eq!(adapter.billing_cycle(&record), BillingCycle::Yearly);
        assert_eq!(
            adapter.next_billing_date(&record).unwrap().to_rfc3339(),
            "2024-04-14T00:00:00+00:00"
        );
    }

    #[test]
    fn tenant_match_collects_both_contacts_once() {
        let adapter = ManualAdapter::new();
        let record = record_for(purchase_payload("x-tenant+version"), "purchased");
        assert_eq!(
            adapter.tenant_match(&record),
            Some(TenantMatch::ContactAddresses {
                identities: vec![
                    "devops@example.com".to_string(),
                    "billing@example.com".to_string(),
                ],
            })
        );
    }
}
