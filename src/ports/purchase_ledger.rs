//! Purchase ledger port - the persisted, queryable store of canonical events.
//!
//! The ledger is append-mostly: rows are never deleted and only the
//! `gitops_prefix` field is ever updated (exactly once). Its query contract
//! is load-bearing for idempotency: entitlement reads always select the most
//! recent `purchased` row by `received_on` (tie-break by id), which makes
//! duplicate webhook deliveries harmless without write-side locks.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::billing::{BillingError, NewPurchaseEvent, PurchaseEvent};

/// Rolling windows inspected by the renewal scanner.
///
/// Monthly subscriptions are re-checked between 29 and 50 days old, yearly
/// ones between 350 and 380 days old. Rows older than the lower bound are
/// considered expired; rows younger than the upper bound are still current.
#[derive(Debug, Clone, Copy)]
pub struct ScanWindows {
    pub monthly: (DateTime<Utc>, DateTime<Utc>),
    pub yearly: (DateTime<Utc>, DateTime<Utc>),
}

impl ScanWindows {
    pub fn ending_at(now: DateTime<Utc>) -> Self {
        ScanWindows {
            monthly: (now - Duration::days(50), now - Duration::days(29)),
            yearly: (now - Duration::days(380), now - Duration::days(350)),
        }
    }

    /// Upper bound of the monthly window; a row for the same account newer
    /// than this means a webhook or a previous scan already recorded the
    /// renewal.
    pub fn newer_than(&self) -> DateTime<Utc> {
        self.monthly.1
    }
}

/// Port for the canonical purchase-event store.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Appends a new row, assigning `id` and `received_on`.
    ///
    /// Concurrent appends for the same subscription are tolerated by
    /// design; deduplication happens on the read side.
    async fn append(&self, event: NewPurchaseEvent) -> Result<PurchaseEvent, BillingError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<PurchaseEvent>, BillingError>;

    /// The authoritative `purchased` row for a subscription: most recent by
    /// `received_on`, tie-break by id.
    async fn latest_purchase(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PurchaseEvent>, BillingError>;

    /// Every sender address ever recorded for a subscription. Buyers may
    /// change email across renewals; tenant matching considers them all.
    async fn senders_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<String>, BillingError>;

    /// Marketplace `purchased` rows with a non-zero plan price whose
    /// `received_on` falls inside either scan window, most recent first.
    async fn renewal_candidates(
        &self,
        windows: &ScanWindows,
    ) -> Result<Vec<PurchaseEvent>, BillingError>;

    /// Whether any row for the given marketplace account id was received
    /// after `after`.
    async fn has_rows_for_account_after(
        &self,
        account_id: i64,
        after: DateTime<Utc>,
    ) -> Result<bool, BillingError>;

    /// Sets `gitops_prefix` on a row. Fails if the row already carries a
    /// non-empty value; the field is settable exactly once.
    async fn set_gitops_prefix(&self, purchase_id: i64, prefix: &str)
        -> Result<(), BillingError>;

    /// Most recent paid `purchased` row whose `gitops_prefix` is a
    /// case-insensitive prefix of the given repository URL.
    async fn latest_paid_with_prefix_of(
        &self,
        repo_url: &str,
    ) -> Result<Option<PurchaseEvent>, BillingError>;
}
