use chrono::{DateTime, Utc};
use placement_core::{ChargeEvent, PendingCharge};
use sqlx::SqlitePool;

use crate::error::DataResult;
use crate::models::{kind_str, to_millis, PendingRow};

/// Repository for charges waiting to be replayed.
#[derive(Debug, Clone)]
pub struct PendingChargeRepository {
    pool: SqlitePool,
}

impl PendingChargeRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queues a charge. Re-queuing the same idempotency key bumps its attempts.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn enqueue(&self, event: &ChargeEvent, error: &str, now: DateTime<Utc>) -> DataResult<()> {
        sqlx::query(
            r"
            INSERT INTO pending_charges
                (campaign_id, broker_id, amount_cents, idempotency_key, kind, last_error, attempts, queued_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
            ON CONFLICT(idempotency_key) DO UPDATE SET
                last_error = excluded.last_error,
                attempts = pending_charges.attempts + 1,
                resolved_at = NULL
            ",
        )
        .bind(&event.campaign_id)
        .bind(&event.broker_id)
        .bind(event.amount_cents)
        .bind(&event.idempotency_key)
        .bind(kind_str(event.kind))
        .bind(error)
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Unresolved charges, oldest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn unresolved(&self, limit: i64) -> DataResult<Vec<PendingCharge>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r"
            SELECT id, campaign_id, broker_id, amount_cents, idempotency_key, kind,
                   last_error, attempts, queued_at
            FROM pending_charges
            WHERE resolved_at IS NULL
            ORDER BY id ASC
            LIMIT ?1
            ",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingCharge::try_from).collect()
    }

    /// Marks a queued charge as resolved.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn resolve(&self, id: i64, at: DateTime<Utc>) -> DataResult<()> {
        sqlx::query("UPDATE pending_charges SET resolved_at = ?1 WHERE id = ?2")
            .bind(to_millis(at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records another failed replay.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn bump(&self, id: i64, error: &str) -> DataResult<()> {
        sqlx::query(
            "UPDATE pending_charges SET attempts = attempts + 1, last_error = ?1 WHERE id = ?2",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
