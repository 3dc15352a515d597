//! PostgreSQL implementation of the PurchaseLedger port.
//!
//! The `purchases` table stores the canonical payload as JSONB alongside the
//! normalized columns, so marketplace-specific queries (plan price, account
//! id) are expressed as JSON path extracts rather than extra columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{BillingError, NewPurchaseEvent, PurchaseEvent, Vendor};
use crate::ports::{PurchaseLedger, ScanWindows};

const SELECT_COLUMNS: &str = "id, vendor, action, sender, subscription_id, effective_date, \
     received_on, should_have_tenant, gitops_prefix, payload";

/// PostgreSQL implementation of the PurchaseLedger port.
pub struct PostgresPurchaseLedger {
    pool: PgPool,
}

impl PostgresPurchaseLedger {
    /// Creates a new PostgresPurchaseLedger with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a purchase event.
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: i64,
    vendor: String,
    action: String,
    sender: String,
    subscription_id: Option<String>,
    effective_date: DateTime<Utc>,
    received_on: DateTime<Utc>,
    should_have_tenant: bool,
    gitops_prefix: Option<String>,
    payload: serde_json::Value,
}

impl TryFrom<PurchaseRow> for PurchaseEvent {
    type Error = BillingError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let vendor = parse_vendor(&row.vendor)?;

        Ok(PurchaseEvent {
            id: row.id,
            vendor,
            action: row.action,
            sender: row.sender,
            subscription_id: row.subscription_id,
            effective_date: row.effective_date,
            received_on: row.received_on,
            should_have_tenant: row.should_have_tenant,
            gitops_prefix: row.gitops_prefix,
            payload: row.payload,
        })
    }
}

fn parse_vendor(s: &str) -> Result<Vendor, BillingError> {
    Vendor::parse(s).ok_or_else(|| BillingError::ledger(format!("Invalid vendor value: {}", s)))
}

#[async_trait]
impl PurchaseLedger for PostgresPurchaseLedger {
    async fn append(&self, event: NewPurchaseEvent) -> Result<PurchaseEvent, BillingError> {
        let row: PurchaseRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO purchases (
                vendor, action, sender, subscription_id, effective_date,
                received_on, should_have_tenant, payload
            ) VALUES ($1, $2, $3, $4, $5, NOW(), $6, $7)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(event.vendor.as_str())
        .bind(&event.action)
        .bind(&event.sender)
        .bind(&event.subscription_id)
        .bind(event.effective_date)
        .bind(event.should_have_tenant)
        .bind(&event.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to append purchase: {}", e)))?;

        row.try_into()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PurchaseEvent>, BillingError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM purchases
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to find purchase: {}", e)))?;

        row.map(PurchaseEvent::try_from).transpose()
    }

    async fn latest_purchase(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PurchaseEvent>, BillingError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM purchases
            WHERE subscription_id = $1 AND action = 'purchased'
            ORDER BY received_on DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to find latest purchase: {}", e)))?;

        row.map(PurchaseEvent::try_from).transpose()
    }

    async fn senders_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<String>, BillingError> {
        let senders: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT sender
            FROM purchases
            WHERE subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to list senders: {}", e)))?;

        Ok(senders.into_iter().map(|(s,)| s).collect())
    }

    async fn renewal_candidates(
        &self,
        windows: &ScanWindows,
    ) -> Result<Vec<PurchaseEvent>, BillingError> {
        let rows: Vec<PurchaseRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM purchases
            WHERE vendor LIKE 'github%'
              AND action = 'purchased'
              AND COALESCE(
                      (payload #>> '{{marketplace_purchase,plan,monthly_price_in_cents}}')::bigint,
                      0) > 0
              AND (received_on BETWEEN $1 AND $2 OR received_on BETWEEN $3 AND $4)
            ORDER BY received_on DESC, id DESC
            "#
        ))
        .bind(windows.monthly.0)
        .bind(windows.monthly.1)
        .bind(windows.yearly.0)
        .bind(windows.yearly.1)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to list renewal candidates: {}", e)))?;

        rows.into_iter().map(PurchaseEvent::try_from).collect()
    }

    async fn has_rows_for_account_after(
        &self,
        account_id: i64,
        after: DateTime<Utc>,
    ) -> Result<bool, BillingError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM purchases
                WHERE (payload #>> '{marketplace_purchase,account,id}')::bigint = $1
                  AND received_on > $2
            )
            "#,
        )
        .bind(account_id)
        .bind(after)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to check account rows: {}", e)))?;

        Ok(exists)
    }

    async fn set_gitops_prefix(
        &self,
        purchase_id: i64,
        prefix: &str,
    ) -> Result<(), BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET gitops_prefix = $2
            WHERE id = $1
              AND (gitops_prefix IS NULL OR gitops_prefix = '')
            "#,
        )
        .bind(purchase_id)
        .bind(prefix)
        .execute(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to set gitops prefix: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(BillingError::ledger(format!(
                "Purchase {} not found or its gitops prefix is already set",
                purchase_id
            )));
        }

        Ok(())
    }

    async fn latest_paid_with_prefix_of(
        &self,
        repo_url: &str,
    ) -> Result<Option<PurchaseEvent>, BillingError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM purchases
            WHERE action = 'purchased'
              AND gitops_prefix IS NOT NULL
              AND gitops_prefix <> ''
              AND LOWER($1) LIKE LOWER(gitops_prefix) || '%'
              AND COALESCE(
                      (payload #>> '{{marketplace_purchase,plan,monthly_price_in_cents}}')::bigint,
                      0) > 0
            ORDER BY received_on DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(repo_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to find covering purchase: {}", e)))?;

        row.map(PurchaseEvent::try_from).transpose()
    }
}
