//! Renewal scanner for the marketplace vendor.
//!
//! The marketplace sends no webhook on a successful recurring charge, so a
//! periodic job polls its read API for accounts whose purchase is about to
//! roll over and synthesizes `github-cron` events through the regular
//! orchestrator path. Tenant extension and bookkeeping stay uniform with
//! real webhooks that way.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::adapters::vendors::{GithubCronAdapter, RawRequest};
use crate::domain::billing::{parse_vendor_date, BillingError, PurchaseEvent};
use crate::ports::{MarketplaceAccount, MarketplaceApi, PurchaseLedger, ScanWindows};

use super::orchestrator::WebhookOrchestrator;

/// Counters for one scan run, logged and returned for tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Candidate rows examined (after per-account dedup).
    pub examined: usize,
    /// Synthetic renewal events fed through the orchestrator.
    pub synthesized: usize,
    /// Per-account failures, read API or synthesis (logged, never abort
    /// the run).
    pub failures: usize,
}

pub struct RenewalScanner {
    ledger: Arc<dyn PurchaseLedger>,
    api: Arc<dyn MarketplaceApi>,
    orchestrator: Arc<WebhookOrchestrator>,
    adapter: GithubCronAdapter,
}

impl RenewalScanner {
    pub fn new(
        ledger: Arc<dyn PurchaseLedger>,
        api: Arc<dyn MarketplaceApi>,
        orchestrator: Arc<WebhookOrchestrator>,
    ) -> Self {
        Self {
            ledger,
            api,
            orchestrator,
            adapter: GithubCronAdapter::new(),
        }
    }

    /// One scan pass. Assumed non-overlapping with itself; the "newer row
    /// exists" check bounds duplicate synthetic events if that assumption
    /// is ever violated.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ScanReport, BillingError> {
        let windows = ScanWindows::ending_at(now);
        let candidates = self.ledger.renewal_candidates(&windows).await?;
        info!(candidates = candidates.len(), "renewal scan started");

        let mut report = ScanReport::default();
        let mut processed: HashSet<i64> = HashSet::new();

        for row in candidates {
            let Some(account_id) = row.marketplace_account_id() else {
                warn!(purchase_id = row.id, "candidate row has no account id");
                continue;
            };

            // Most-recent-first ordering makes the first row per account
            // the authoritative one; older rows are historical duplicates.
            if !processed.insert(account_id) {
                continue;
            }
            report.examined += 1;

            // A newer row for this account means a later webhook or a
            // previous scan already recorded the renewal (or cancellation).
            if self
                .ledger
                .has_rows_for_account_after(account_id, windows.newer_than())
                .await?
            {
                continue;
            }

            // Per-account failure isolation: log and move on.
            let account = match self.api.account_subscription(account_id).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    debug!(account_id, "no longer a subscriber");
                    continue;
                }
                Err(e) => {
                    warn!(account_id, error = %e, "marketplace lookup failed");
                    report.failures += 1;
                    continue;
                }
            };

            if self.subscription_renewed(&row, &account) {
                match self.feed_synthetic_event(now, &row, &account).await {
                    Ok(()) => report.synthesized += 1,
                    Err(e) => {
                        warn!(account_id, error = %e, "synthetic renewal failed");
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            examined = report.examined,
            synthesized = report.synthesized,
            failures = report.failures,
            "renewal scan finished"
        );
        Ok(report)
    }

    /// A subscription renewed exactly when the vendor-reported next billing
    /// date advanced past the one stored on the row. Equal dates mean the
    /// charge has not happened yet (or this very row came from a previous
    /// scan run).
    fn subscription_renewed(&self, row: &PurchaseEvent, account: &MarketplaceAccount) -> bool {
        let stored = row
            .marketplace_next_billing_date()
            .and_then(|raw| parse_vendor_date(raw).ok());
        let fresh = account
            .marketplace_purchase
            .get("next_billing_date")
            .and_then(|v| v.as_str())
            .and_then(|raw| parse_vendor_date(raw).ok());
        matches!((stored, fresh), (Some(stored), Some(fresh)) if stored < fresh)
    }

    async fn feed_synthetic_event(
        &self,
        now: DateTime<Utc>,
        row: &PurchaseEvent,
        account: &MarketplaceAccount,
    ) -> Result<(), BillingError> {
        let mut marketplace_purchase = account.marketplace_purchase.clone();
        // The read API reports the account at the top level; the webhook
        // shape nests it inside marketplace_purchase.
        marketplace_purchase["account"] = json!({
            "id": account.id,
            "login": account.login,
            "organization_billing_email": account
                .organization_billing_email
                .as_deref()
                .or(account.email.as_deref()),
            "type": account.account_type,
            "url": account.url,
        });

        let event = json!({
            "action": "purchased",
            "effective_date": now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "sender": row.payload.get("sender").cloned().unwrap_or(json!(null)),
            "marketplace_purchase": marketplace_purchase,
        });

        let request = RawRequest::internal(event.to_string().into_bytes());
        self.orchestrator.process(&self.adapter, &request).await?;

        debug!(account_id = account.id, "synthetic renewal recorded");
        Ok(())
    }
}
