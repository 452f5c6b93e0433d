//! Processed webhook event ids.

use sqlx::PgPool;

use super::RepositoryError;

/// Repository for the webhook idempotency ledger.
pub struct WebhookEventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WebhookEventRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Whether an event id has already been handled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_processed(&self, event_id: &str) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processed_webhook_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Record an event as handled. Returns `false` if it was already recorded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record(&self, event_id: &str, event_type: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO processed_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            ",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
