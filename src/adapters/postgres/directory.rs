//! PostgreSQL implementation of the Directory port.
//!
//! Buyer identities are email addresses. A freshly ensured account uses the
//! email as its username until the buyer claims a proper login, so the
//! insert is a no-op whenever either column already matches.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::BillingError;
use crate::ports::Directory;

/// PostgreSQL implementation of the Directory port.
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    /// Creates a new PostgresDirectory with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PostgresDirectory {
    async fn ensure_user(&self, identity: &str) -> Result<(), BillingError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users WHERE email = $1 OR username = $1
            )
            "#,
        )
        .bind(identity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to look up user: {}", e)))?;

        if exists {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO users (username, email, is_active, date_joined)
            VALUES ($1, $1, TRUE, NOW())
            ON CONFLICT (username) DO NOTHING
            "#,
        )
        .bind(identity)
        .execute(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to create user: {}", e)))?;

        Ok(())
    }

    async fn personal_namespace(&self, identity: &str) -> Result<Option<String>, BillingError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT username
            FROM users
            WHERE email = $1 OR username = $1
            LIMIT 1
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BillingError::ledger(format!("Failed to resolve namespace: {}", e)))?;

        Ok(row.map(|(username,)| username))
    }
}
