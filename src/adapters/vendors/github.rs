//! Marketplace (GitHub) vendor adapter.
//!
//! The marketplace sends one event per payload, authenticated with
//! `X-Hub-Signature` (HMAC-SHA1). It has no structured SKU field: the list
//! of granted Docker repositories is published inside one of the plan
//! description bullets and extracted from there.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::billing::{
    parse_vendor_date, verify_marketplace_signature, BillingCycle, BillingError, PurchaseEvent,
    Vendor, ACTION_CANCELLED, ACTION_PURCHASED,
};

use super::{RawRequest, TenantMatch, VendorAdapter};

/// Header carrying the HMAC-SHA1 signature.
const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Header naming the event kind; `ping` short-circuits.
const EVENT_HEADER: &str = "x-github-event";

/// Bullet label marking the SKU line inside the plan description.
const SKU_BULLET_LABEL: &str = "Docker repositories";

/// Repository URL prefix stripped from SKU bullet entries.
const SKU_URL_PREFIX: &str = "quay.io/kiwitcms/";

/// Typed view of a marketplace purchase payload. Fields the mappers do not
/// need stay in the verbatim JSON only.
#[derive(Debug, Deserialize)]
pub(crate) struct GithubPayload {
    pub action: String,
    pub effective_date: String,
    pub sender: GithubSender,
    pub marketplace_purchase: MarketplacePurchase,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GithubSender {
    pub login: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarketplacePurchase {
    pub account: MarketplaceAccount,
    pub plan: MarketplacePlan,
    #[serde(default)]
    pub billing_cycle: Option<String>,
    #[serde(default)]
    pub next_billing_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarketplaceAccount {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarketplacePlan {
    #[serde(default)]
    pub monthly_price_in_cents: i64,
    #[serde(default)]
    pub bullets: Vec<String>,
}

pub(crate) fn parse_payload(event: &Value) -> Result<GithubPayload, BillingError> {
    serde_json::from_value(event.clone())
        .map_err(|e| BillingError::malformed(format!("marketplace payload: {e}")))
}

/// Extracts the SKU from the specially formatted plan bullet: strip the
/// label and URL prefixes, join remaining repository names with `+`.
pub(crate) fn find_sku(event: &Value) -> Option<String> {
    let bullets = event
        .get("marketplace_purchase")?
        .get("plan")?
        .get("bullets")?
        .as_array()?;

    let mut sku = None;
    for item in bullets.iter().filter_map(Value::as_str) {
        if item.contains(SKU_BULLET_LABEL) {
            sku = Some(
                item.replace(&format!("{SKU_BULLET_LABEL}:"), "")
                    .replace(' ', "")
                    .replace("https://", "")
                    .replace(SKU_URL_PREFIX, "")
                    .replace(',', "+"),
            );
        }
    }
    sku
}

pub(crate) fn record_billing_cycle(record: &PurchaseEvent) -> BillingCycle {
    let cycle = record
        .marketplace_purchase()
        .and_then(|mp| mp.get("billing_cycle"))
        .and_then(Value::as_str);
    match cycle {
        Some("monthly") => BillingCycle::Monthly,
        Some("yearly") => BillingCycle::Yearly,
        _ => BillingCycle::Unrecognized,
    }
}

pub(crate) fn record_next_billing_date(record: &PurchaseEvent) -> Option<DateTime<Utc>> {
    record
        .marketplace_next_billing_date()
        .and_then(|raw| parse_vendor_date(raw).ok())
}

pub(crate) fn record_tenant_match(record: &PurchaseEvent) -> Option<TenantMatch> {
    let organization = record
        .marketplace_purchase()?
        .get("account")?
        .get("login")?
        .as_str()?
        .to_string();

    let mut identities = Vec::new();
    if let Some(sender) = record.payload.get("sender") {
        if let Some(email) = sender.get("email").and_then(Value::as_str) {
            identities.push(email.to_string());
        }
        if let Some(login) = sender.get("login").and_then(Value::as_str) {
            identities.push(login.to_string());
        }
    }
    if identities.is_empty() {
        identities.push(record.sender.clone());
    }

    Some(TenantMatch::OwnerInOrganization {
        identities,
        organization,
    })
}

/// Adapter for genuine marketplace webhooks.
pub struct GithubAdapter {
    webhook_secret: SecretString,
}

impl GithubAdapter {
    pub fn new(webhook_secret: SecretString) -> Self {
        GithubAdapter { webhook_secret }
    }
}

impl VendorAdapter for GithubAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Github
    }

    fn verify(&self, request: &RawRequest) -> Result<(), BillingError> {
        verify_marketplace_signature(
            self.webhook_secret.expose_secret().as_bytes(),
            request.header(SIGNATURE_HEADER),
            &request.body,
        )
    }

    fn pre_process_request(&self, request: &RawRequest) -> Option<String> {
        // Connectivity check: acknowledge before touching the ledger.
        let is_ping = request.header(EVENT_HEADER) == Some("ping")
            || serde_json::from_slice::<Value>(&request.body)
                .ok()
                .is_some_and(|v| v.get("zen").is_some());
        is_ping.then(|| "pong".to_string())
    }

    fn pre_process_payload(&self, payload: &Value) -> Result<Vec<Value>, BillingError> {
        // The marketplace sends exactly one event per payload.
        Ok(vec![payload.clone()])
    }

    fn purchase_action(&self, event: &Value) -> Result<String, BillingError> {
        // Marketplace actions already use the canonical spellings
        // (`purchased`, `cancelled`); others pass through verbatim.
        Ok(parse_payload(event)?.action)
    }

    fn purchase_effective_date(&self, event: &Value) -> Result<DateTime<Utc>, BillingError> {
        parse_vendor_date(&parse_payload(event)?.effective_date)
    }

    fn purchase_sender(&self, event: &Value) -> Result<String, BillingError> {
        let payload = parse_payload(event)?;
        Ok(payload.sender.email.unwrap_or(payload.sender.login))
    }

    fn purchase_subscription(&self, event: &Value) -> Result<Option<String>, BillingError> {
        let payload = parse_payload(event)?;
        Ok(Some(format!("gh-{}", payload.marketplace_purchase.account.id)))
    }

    fn purchase_should_have_tenant(&self, event: &Value) -> bool {
        // The marketplace has no SKU field carrying a tenant marker; every
        // paid plan grants a private tenant, free plans grant nothing.
        parse_payload(event)
            .map(|p| p.marketplace_purchase.plan.monthly_price_in_cents > 0)
            .unwrap_or(false)
    }

    fn find_sku(&self, event: &Value) -> Option<String> {
        find_sku(event)
    }

    fn action_is_activated(&self, record: &PurchaseEvent) -> bool {
        // Zero-price plans are recorded for audit but never provisioned.
        record.is_purchased() && record.marketplace_price_in_cents().unwrap_or(0) > 0
    }

    fn action_is_cancelled(&self, record: &PurchaseEvent) -> bool {
        record.action == ACTION_CANCELLED
    }

    fn action_is_recurring_billing(&self, _record: &PurchaseEvent) -> bool {
        // The marketplace emits no renewal webhooks at all; renewals reach
        // the ledger only through the scanner's synthetic events.
        false
    }

    fn billing_cycle(&self, record: &PurchaseEvent) -> BillingCycle {
        record_billing_cycle(record)
    }

    fn next_billing_date(&self, record: &PurchaseEvent) -> Option<DateTime<Utc>> {
        record_next_billing_date(record)
    }

    fn tenant_match(&self, record: &PurchaseEvent) -> Option<TenantMatch> {
        record_tenant_match(record)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn purchased_payload(price_in_cents: i64, bullets: Vec<&str>) -> Value {
        json!({
            "action": "purchased",
            "effective_date": "2019-04-01T00:00:00+00:00",
            "sender": {"login": "atodorov", "email": "buyer@example.com"},
            "marketplace_purchase": {
                "account": {
                    "id": 18404719,
                    "login": "kiwitcms",
                    "organization_billing_email": "billing@example.com",
                    "type": "Organization",
                    "url": "https://api.github.com/orgs/kiwitcms"
                },
                "billing_cycle": "monthly",
                "next_billing_date": "2019-05-01T00:00:00+00:00",
                "plan": {
                    "monthly_price_in_cents": price_in_cents,
                    "name": "Private Tenant",
                    "bullets": bullets
                }
            }
        })
    }

    fn record_for(payload: Value, action: &str) -> PurchaseEvent {
        PurchaseEvent {
            id: 1,
            vendor: Vendor::Github,
            action: action.to_string(),
            sender: "buyer@example.com".to_string(),
            subscription_id: Some("gh-18404719".to_string()),
            effective_date: Utc::now(),
            received_on: Utc::now(),
            should_have_tenant: true,
            gitops_prefix: None,
            payload,
        }
    }

    fn adapter() -> GithubAdapter {
        GithubAdapter::new(SecretString::new("test-secret".to_string()))
    }

    #[test]
    fn sku_is_extracted_from_the_bullet_line() {
        let payload = purchased_payload(
            3200,
            vec![
                "Unlimited users",
                "Docker repositories: quay.io/kiwitcms/version, https://quay.io/kiwitcms/enterprise",
            ],
        );
        assert_eq!(find_sku(&payload).as_deref(), Some("version+enterprise"));
    }

    #[test]
    fn sku_is_none_without_the_bullet_line() {
        let payload = purchased_payload(0, vec!["Unlimited users"]);
        assert_eq!(find_sku(&payload), None);
    }

    #[test]
    fn mappers_normalize_the_purchase() {
        let adapter = adapter();
        let payload = purchased_payload(3200, vec![]);

        assert_eq!(adapter.purchase_action(&payload).unwrap(), "purchased");
        assert_eq!(
            adapter.purchase_sender(&payload).unwrap(),
            "buyer@example.com"
        );
        assert_eq!(
            adapter.purchase_subscription(&payload).unwrap().as_deref(),
            Some("gh-18404719")
        );
        assert!(adapter.purchase_should_have_tenant(&payload));

        let effective = adapter.purchase_effective_date(&payload).unwrap();
        assert_eq!(effective.to_rfc3339(), "2019-04-01T00:00:00+00:00");
    }

    #[test]
    fn sender_falls_back_to_login_without_email() {
        let adapter = adapter();
        let mut payload = purchased_payload(3200, vec![]);
        payload["sender"] = json!({"login": "atodorov"});
        assert_eq!(adapter.purchase_sender(&payload).unwrap(), "atodorov");
    }

    #[test]
    fn free_plans_are_recorded_but_not_activated() {
        let adapter = adapter();
        let payload = purchased_payload(0, vec![]);
        assert!(!adapter.purchase_should_have_tenant(&payload));

        let record = record_for(payload, ACTION_PURCHASED);
        assert!(!adapter.action_is_activated(&record));
        assert!(!adapter.action_is_cancelled(&record));
        assert!(!adapter.action_is_recurring_billing(&record));
    }

    #[test]
    fn paid_purchases_classify_as_activated() {
        let adapter = adapter();
        let record = record_for(purchased_payload(3200, vec![]), ACTION_PURCHASED);
        assert!(adapter.action_is_activated(&record));
    }

    #[test]
    fn cancellations_classify_as_cancelled() {
        let adapter = adapter();
        let record = record_for(purchased_payload(3200, vec![]), ACTION_CANCELLED);
        assert!(adapter.action_is_cancelled(&record));
        assert!(!adapter.action_is_activated(&record));
    }

    #[test]
    fn ping_short_circuits_with_pong() {
        let adapter = adapter();
        let mut headers = std::collections::HashMap::new();
        headers.insert("X-GitHub-Event".to_string(), "ping".to_string());
        let request = RawRequest::new(headers, b"{}".to_vec());
        assert_eq!(adapter.pre_process_request(&request).as_deref(), Some("pong"));

        let request = RawRequest::new(
            std::collections::HashMap::new(),
            br#"{"zen": "Design for failure."}"#.to_vec(),
        );
        assert_eq!(adapter.pre_process_request(&request).as_deref(), Some("pong"));

        let request = RawRequest::new(
            std::collections::HashMap::new(),
            br#"{"action": "purchased"}"#.to_vec(),
        );
        assert_eq!(adapter.pre_process_request(&request), None);
    }

    #[test]
    fn tenant_match_narrows_by_owner_and_organization() {
        let record = record_for(purchased_payload(3200, vec![]), ACTION_PURCHASED);
        assert_eq!(
            record_tenant_match(&record),
            Some(TenantMatch::OwnerInOrganization {
                identities: vec!["buyer@example.com".to_string(), "atodorov".to_string()],
                organization: "kiwitcms".to_string(),
            })
        );
    }

    #[test]
    fn billing_cycle_and_next_date_come_from_the_payload() {
        let record = record_for(purchased_payload(3200, vec![]), ACTION_PURCHASED);
        assert_eq!(record_billing_cycle(&record), BillingCycle::Monthly);
        assert_eq!(
            record_next_billing_date(&record).unwrap().to_rfc3339(),
            "2019-05-01T00:00:00+00:00"
        );
    }
}
