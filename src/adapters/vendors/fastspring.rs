//! Commerce platform (FastSpring) vendor adapter.
//!
//! FastSpring batches several events into one payload (`events: [...]`),
//! authenticates with `X-FS-Signature` (base64 HMAC-SHA256) and scatters
//! both the SKU and the billing interval across multiple payload shapes
//! depending on whether the event describes a product, an order or a
//! subscription. The lookup orders below are fixed and deliberate.

use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::domain::billing::{
    sku_grants_tenant, verify_commerce_signature, BillingCycle, BillingError, PurchaseEvent,
    Vendor, ACTION_CANCELLED, ACTION_PURCHASED,
};

use super::{RawRequest, TenantMatch, VendorAdapter};

/// Header carrying the base64 HMAC-SHA256 signature.
const SIGNATURE_HEADER: &str = "x-fs-signature";

/// Vendor event types that collapse into the canonical `purchased`.
const TYPE_ACTIVATED: &str = "subscription.activated";
const TYPE_CHARGE_COMPLETED: &str = "subscription.charge.completed";

/// Vendor event types that collapse into the canonical `cancelled`.
const TYPE_DEACTIVATED: &str = "subscription.deactivated";
const TYPE_CANCELED: &str = "subscription.canceled";

/// Legacy product-name markers and the SKUs they imply. A compatibility
/// shim for purchases that predate structured SKU fields; the enterprise
/// marker is checked second and overrides on purpose.
const LEGACY_SKUS: &[(&str, &str)] = &[
    ("kiwitcms-private-tenant", "x-tenant+version"),
    ("kiwitcms-enterprise", "x-tenant+version+enterprise"),
];

fn event_type(event: &Value) -> Option<&str> {
    event.get("type").and_then(Value::as_str)
}

fn data(event: &Value) -> Result<&Value, BillingError> {
    event
        .get("data")
        .ok_or_else(|| BillingError::malformed("commerce event without data"))
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// SKU lookup across the four structured locations, then the legacy
/// string-matching fallbacks. Works on raw events and persisted records
/// alike since both carry the same JSON.
pub(crate) fn find_sku(event: &Value) -> Option<String> {
    let data = event.get("data")?;

    for location in [
        data.get("sku"),
        data.get("product").and_then(|p| p.get("sku")),
        data.get("subscription").and_then(|s| s.get("sku")),
    ] {
        if let Some(sku) = location.and_then(Value::as_str) {
            if !sku.is_empty() {
                return Some(sku.to_string());
            }
        }
    }

    if let Some(items) = data.get("items").and_then(Value::as_array) {
        let sku: String = items
            .iter()
            .filter_map(|item| item.get("sku").and_then(Value::as_str))
            .collect();
        if !sku.is_empty() {
            return Some(sku);
        }
    }

    // Legacy purchases carry no SKU anywhere; recognize them by the
    // product name appearing somewhere in the serialized event.
    let serialized = event.to_string();
    let mut sku = None;
    for (marker, legacy) in LEGACY_SKUS {
        if serialized.contains(marker) {
            sku = Some(legacy.to_string());
        }
    }
    sku
}

/// Billing-interval detection across the five known payload locations, in
/// fixed priority order. Falls back to one-time/unrecognized rather than
/// raising, except when nothing resembling a subscription or order is
/// present at all, which is a hard error.
pub(crate) fn detect_interval(data: &Value) -> Result<BillingCycle, BillingError> {
    let locations = [
        data.get("subscription").and_then(|s| s.get("intervalUnit")),
        data.get("order").and_then(|o| o.get("items")).and_then(|items| {
            items.as_array()?.iter().find_map(|item| {
                item.get("subscription").and_then(|s| s.get("intervalUnit"))
            })
        }),
        data.get("product")
            .and_then(|p| p.get("pricing"))
            .and_then(|p| p.get("interval")),
        data.get("instructions").and_then(|instructions| {
            instructions
                .as_array()?
                .iter()
                .find_map(|line| line.get("intervalUnit"))
        }),
        data.get("intervalUnit"),
    ];

    for location in locations {
        if let Some(unit) = location.and_then(Value::as_str) {
            return Ok(match unit {
                "month" => BillingCycle::Monthly,
                "year" => BillingCycle::Yearly,
                "adhoc" => BillingCycle::OneTime,
                _ => BillingCycle::Unrecognized,
            });
        }
    }

    if data.get("order").is_some() || data.get("items").is_some() {
        // An order with no interval anywhere is a one-time purchase.
        return Ok(BillingCycle::OneTime);
    }
    if data.get("subscription").is_some() || data.get("product").is_some() {
        return Ok(BillingCycle::Unrecognized);
    }

    Err(BillingError::malformed(
        "commerce event carries no subscription, order or product shape",
    ))
}

/// Adapter for commerce-platform webhooks.
pub struct FastspringAdapter {
    webhook_secret: SecretString,
}

impl FastspringAdapter {
    pub fn new(webhook_secret: SecretString) -> Self {
        FastspringAdapter { webhook_secret }
    }
}

impl VendorAdapter for FastspringAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Fastspring
    }

    fn verify(&self, request: &RawRequest) -> Result<(), BillingError> {
        verify_commerce_signature(
            self.webhook_secret.expose_secret().as_bytes(),
            request.header(SIGNATURE_HEADER),
            &request.body,
        )
    }

    fn pre_process_payload(&self, payload: &Value) -> Result<Vec<Value>, BillingError> {
        let events = payload
            .get("events")
            .and_then(Value::as_array)
            .ok_or_else(|| BillingError::malformed("commerce payload without events list"))?;
        if events.is_empty() {
            return Err(BillingError::malformed("commerce payload with empty events list"));
        }
        Ok(events.to_vec())
    }

    fn purchase_action(&self, event: &Value) -> Result<String, BillingError> {
        let kind = event_type(event)
            .ok_or_else(|| BillingError::malformed("commerce event without type"))?;
        Ok(match kind {
            TYPE_ACTIVATED | TYPE_CHARGE_COMPLETED => ACTION_PURCHASED.to_string(),
            TYPE_DEACTIVATED | TYPE_CANCELED => ACTION_CANCELLED.to_string(),
            other => other.to_string(),
        })
    }

    fn purchase_effective_date(&self, event: &Value) -> Result<DateTime<Utc>, BillingError> {
        let data = data(event)?;
        data.get("changed")
            .or_else(|| data.get("begin"))
            .and_then(Value::as_i64)
            .and_then(millis_to_utc)
            .ok_or_else(|| BillingError::malformed("commerce event without changed/begin date"))
    }

    fn purchase_sender(&self, event: &Value) -> Result<String, BillingError> {
        let data = data(event)?;
        data.get("account")
            .and_then(|a| a.get("contact"))
            .and_then(|c| c.get("email"))
            .or_else(|| data.get("customer").and_then(|c| c.get("email")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BillingError::malformed("commerce event without buyer email"))
    }

    fn purchase_subscription(&self, event: &Value) -> Result<Option<String>, BillingError> {
        let data = data(event)?;
        let id = data
            .get("subscription")
            .and_then(|s| match s {
                Value::String(id) => Some(id.as_str()),
                other => other.get("id").and_then(Value::as_str),
            })
            .or_else(|| data.get("id").and_then(Value::as_str));
        Ok(id.map(|id| format!("fs-{id}")))
    }

    fn purchase_should_have_tenant(&self, event: &Value) -> bool {
        find_sku(event).is_some_and(|sku| sku_grants_tenant(&sku))
    }

    fn find_sku(&self, event: &Value) -> Option<String> {
        find_sku(event)
    }

    fn action_is_activated(&self, record: &PurchaseEvent) -> bool {
        if event_type(&record.payload) != Some(TYPE_ACTIVATED) {
            return false;
        }
        // Zero-price purchases never trigger provisioning.
        record
            .payload
            .get("data")
            .and_then(|d| d.get("price"))
            .and_then(Value::as_f64)
            .map(|price| price > 0.0)
            .unwrap_or(true)
    }

    fn action_is_cancelled(&self, record: &PurchaseEvent) -> bool {
        record.action == ACTION_CANCELLED
    }

    fn action_is_recurring_billing(&self, record: &PurchaseEvent) -> bool {
        event_type(&record.payload) == Some(TYPE_CHARGE_COMPLETED)
    }

    fn billing_cycle(&self, record: &PurchaseEvent) -> BillingCycle {
        record
            .payload
            .get("data")
            .map(|data| detect_interval(data).unwrap_or(BillingCycle::Unrecognized))
            .unwrap_or(BillingCycle::Unrecognized)
    }

    fn next_billing_date(&self, record: &PurchaseEvent) -> Option<DateTime<Utc>> {
        record
            .payload
            .get("data")?
            .get("next")?
            .as_i64()
            .and_then(millis_to_utc)
    }

    fn tenant_match(&self, record: &PurchaseEvent) -> Option<TenantMatch> {
        Some(TenantMatch::SubscriptionSenders {
            subscription_id: record.subscription_id.clone()?,
            current_sender: record.sender.clone(),
        })
    }
}
