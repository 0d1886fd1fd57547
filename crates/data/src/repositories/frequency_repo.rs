//! Frequency counter repository.
//!
//! Counters are best-effort. The upsert resets an expired window in the same
//! statement that increments it, so concurrent impressions never lose the
//! reset, but reads may trail writes slightly. Each reported event key is
//! counted at most once.

use chrono::{DateTime, Duration, Utc};
use placement_core::FrequencyState;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::error::DataResult;
use crate::models::{to_millis, FrequencyRow};

/// Repository for per-visitor impression counters.
#[derive(Debug, Clone)]
pub struct FrequencyRepository {
    pool: SqlitePool,
}

impl FrequencyRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Counts still inside their window at `now`, keyed by campaign ID.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn counts(
        &self,
        visitor_key: &str,
        placement: &str,
        campaign_ids: &[String],
        now: DateTime<Utc>,
        window: Duration,
    ) -> DataResult<HashMap<String, u32>> {
        if campaign_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT visitor_key, placement_slug, campaign_id, count, window_start \
             FROM frequency_state WHERE visitor_key = ",
        );
        qb.push_bind(visitor_key)
            .push(" AND placement_slug = ")
            .push_bind(placement)
            .push(" AND campaign_id IN (");
        let mut ids = qb.separated(", ");
        for id in campaign_ids {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(")");

        let rows = qb.build_query_as::<FrequencyRow>().fetch_all(&self.pool).await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let state = FrequencyState::try_from(row)?;
            let count = state.count_at(now, window);
            if count > 0 {
                counts.insert(state.campaign_id, count);
            }
        }
        Ok(counts)
    }

    /// Records one impression, opening a fresh window if the old one lapsed.
    ///
    /// Returns `None` and leaves the counter alone if `event_key` was already
    /// counted.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn record_impression(
        &self,
        event_key: &str,
        visitor_key: &str,
        placement: &str,
        campaign_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> DataResult<Option<FrequencyState>> {
        let mut tx = self.pool.begin().await?;

        let first_seen = sqlx::query(
            "INSERT INTO frequency_events (event_key, seen_at) VALUES (?1, ?2) ON CONFLICT(event_key) DO NOTHING",
        )
        .bind(event_key)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        if !first_seen {
            tx.commit().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, FrequencyRow>(
            r"
            INSERT INTO frequency_state (visitor_key, placement_slug, campaign_id, count, window_start)
            VALUES (?1, ?2, ?3, 1, ?4)
            ON CONFLICT(visitor_key, placement_slug, campaign_id) DO UPDATE SET
                count = CASE WHEN ?4 - frequency_state.window_start >= ?5
                             THEN 1 ELSE frequency_state.count + 1 END,
                window_start = CASE WHEN ?4 - frequency_state.window_start >= ?5
                                    THEN ?4 ELSE frequency_state.window_start END
            RETURNING visitor_key, placement_slug, campaign_id, count, window_start
            ",
        )
        .bind(visitor_key)
        .bind(placement)
        .bind(campaign_id)
        .bind(to_millis(now))
        .bind(window.num_milliseconds())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        FrequencyState::try_from(row).map(Some)
    }

    /// Deletes counters whose window started before `before`, and the event
    /// keys seen before it. Returns the number of counters removed.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn purge_expired(&self, before: DateTime<Utc>) -> DataResult<u64> {
        let cutoff = to_millis(before);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM frequency_state WHERE window_start < ?1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM frequency_events WHERE seen_at < ?1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
