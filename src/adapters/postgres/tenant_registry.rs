//! PostgreSQL implementation of the TenantRegistry port.
//!
//! Tenants belong to the wider platform; this adapter only reads the
//! matching columns and performs the single mutation the billing core is
//! allowed: extending `paid_until`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::BillingError;
use crate::ports::{TenantCriteria, TenantRef, TenantRegistry};

/// PostgreSQL implementation of the TenantRegistry port.
pub struct PostgresTenantRegistry {
    pool: PgPool,
}

impl PostgresTenantRegistry {
    /// Creates a new PostgresTenantRegistry with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: i64,
    organization: String,
    paid_until: Option<DateTime<Utc>>,
}

impl From<TenantRow> for TenantRef {
    fn from(row: TenantRow) -> Self {
        TenantRef {
            id: row.id,
            organization: row.organization,
            paid_until: row.paid_until,
        }
    }
}

#[async_trait]
impl TenantRegistry for PostgresTenantRegistry {
    async fn find_paid_tenant(
        &self,
        criteria: &TenantCriteria,
    ) -> Result<Option<TenantRef>, BillingError> {
        let row: Option<TenantRow> = match criteria {
            TenantCriteria::OwnerInOrganization {
                identities,
                organization,
            } => {
                sqlx::query_as(
                    r#"
                    SELECT id, organization, paid_until
                    FROM tenants
                    WHERE paid_until IS NOT NULL
                      AND owner = ANY($1)
                      AND organization = $2
                    ORDER BY id
                    LIMIT 1
                    "#,
                )
                .bind(identities)
                .bind(organization)
                .fetch_optional(&self.pool)
                .await
            }
            TenantCriteria::SubscriptionSenders {
                senders,
                current_sender,
            } => {
                sqlx::query_as(
                    r#"
                    SELECT id, organization, paid_until
                    FROM tenants
                    WHERE paid_until IS NOT NULL
                      AND (owner = ANY($1) OR $2 = ANY(extra_contacts))
                    ORDER BY id
                    LIMIT 1
                    "#,
                )
                .bind(senders)
                .bind(current_sender)
                .fetch_optional(&self.pool)
                .await
            }
            TenantCriteria::ContactAddresses { identities } => {
                sqlx::query_as(
                    r#"
                    SELECT id, organization, paid_until
                    FROM tenants
                    WHERE paid_until IS NOT NULL
                      AND owner = ANY($1)
                    ORDER BY id
                    LIMIT 1
                    "#,
                )
                .bind(identities)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(|e| BillingError::registry(format!("Failed to find tenant: {}", e)))?;

        Ok(row.map(TenantRef::from))
    }

    async fn extend_paid_until(
        &self,
        tenant_id: i64,
        paid_until: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET paid_until = $2
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(paid_until)
        .execute(&self.pool)
        .await
        .map_err(|e| BillingError::registry(format!("Failed to extend paid_until: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(BillingError::registry(format!(
                "Tenant {} not found",
                tenant_id
            )));
        }

        Ok(())
    }
}
