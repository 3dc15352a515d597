//! Canonical purchase events - the ledger row shared by all vendors.
//!
//! Every webhook, regardless of origin, is normalized into a [`PurchaseEvent`]
//! before any side effect runs. Rows are append-only: cancellation is a new
//! row with `action = "cancelled"`, never a mutation of a prior one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical action recorded for a completed purchase or renewal charge.
pub const ACTION_PURCHASED: &str = "purchased";

/// Canonical action recorded when a subscription ends.
pub const ACTION_CANCELLED: &str = "cancelled";

/// Event source. `GithubCron` marks synthetic events produced by the renewal
/// scanner so they remain distinguishable from genuine webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    Github,
    Fastspring,
    Manual,
    GithubCron,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Github => "github",
            Vendor::Fastspring => "fastspring",
            Vendor::Manual => "manual",
            Vendor::GithubCron => "github-cron",
        }
    }

    /// True for both the genuine marketplace webhook source and the
    /// scanner's synthetic variant. The renewal scan selects rows from
    /// either (`vendor LIKE 'github%'`).
    pub fn is_marketplace(&self) -> bool {
        matches!(self, Vendor::Github | Vendor::GithubCron)
    }

    pub fn parse(s: &str) -> Option<Vendor> {
        match s {
            "github" => Some(Vendor::Github),
            "fastspring" => Some(Vendor::Fastspring),
            "manual" => Some(Vendor::Manual),
            "github-cron" => Some(Vendor::GithubCron),
            _ => None,
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchase event awaiting persistence. All fields are supplied by the
/// vendor adapter at normalization time; `received_on` and `id` are assigned
/// by the ledger.
#[derive(Debug, Clone)]
pub struct NewPurchaseEvent {
    pub vendor: Vendor,
    /// Canonical where recognized, verbatim vendor spelling otherwise.
    pub action: String,
    /// Buyer identity: email preferred, login/username fallback.
    pub sender: String,
    /// Namespaced per vendor (`gh-`, `fs-`, `man-`); None for legacy rows.
    pub subscription_id: Option<String>,
    pub effective_date: DateTime<Utc>,
    /// Computed from the purchased SKU at normalization time. Never mutated
    /// by the orchestrator after creation.
    pub should_have_tenant: bool,
    /// Full normalized event body, retained verbatim for audit and replay.
    pub payload: Value,
}

/// A persisted ledger row.
#[derive(Debug, Clone)]
pub struct PurchaseEvent {
    pub id: i64,
    pub vendor: Vendor,
    pub action: String,
    pub sender: String,
    pub subscription_id: Option<String>,
    pub effective_date: DateTime<Utc>,
    /// Server-assigned at persistence time; the tie-break for
    /// "most recent event wins" (secondary tie-break by `id`).
    pub received_on: DateTime<Utc>,
    pub should_have_tenant: bool,
    /// Buyer-settable exactly once; immutable once non-empty.
    pub gitops_prefix: Option<String>,
    pub payload: Value,
}

impl PurchaseEvent {
    pub fn is_purchased(&self) -> bool {
        self.action == ACTION_PURCHASED
    }

    /// The `marketplace_purchase` sub-structure for marketplace payloads.
    pub fn marketplace_purchase(&self) -> Option<&Value> {
        self.payload.get("marketplace_purchase")
    }

    /// Subscriber account id from a marketplace payload.
    pub fn marketplace_account_id(&self) -> Option<i64> {
        self.marketplace_purchase()?
            .get("account")?
            .get("id")?
            .as_i64()
    }

    /// Plan price in cents from a marketplace payload.
    pub fn marketplace_price_in_cents(&self) -> Option<i64> {
        self.marketplace_purchase()?
            .get("plan")?
            .get("monthly_price_in_cents")?
            .as_i64()
    }

    /// Raw `next_billing_date` string from a marketplace payload.
    pub fn marketplace_next_billing_date(&self) -> Option<&str> {
        self.marketplace_purchase()?
            .get("next_billing_date")?
            .as_str()
    }
}

/// Deterministic external-account name derived from a subscription id.
///
/// The provisioner only accepts lowercase alphanumerics and underscores, so
/// the id is case-folded and every other byte replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotName(String);

impl RobotName {
    pub fn from_subscription(subscription_id: &str) -> Self {
        let name = subscription_id
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        RobotName(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RobotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
