use chrono::{DateTime, Utc};
use placement_core::BrokerRef;
use sqlx::SqlitePool;

use crate::error::DataResult;
use crate::models::{to_millis, BrokerRow};

/// Repository for broker listings.
#[derive(Debug, Clone)]
pub struct BrokerRepository {
    pool: SqlitePool,
}

impl BrokerRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or updates a broker.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn upsert(
        &self,
        broker: &BrokerRef,
        organic_listed: bool,
        at: DateTime<Utc>,
    ) -> DataResult<()> {
        sqlx::query(
            r"
            INSERT INTO brokers (broker_id, name, slug, sponsorship_tier, rating, organic_listed, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(broker_id) DO UPDATE SET
                name = excluded.name,
                slug = excluded.slug,
                sponsorship_tier = excluded.sponsorship_tier,
                rating = excluded.rating,
                organic_listed = excluded.organic_listed
            ",
        )
        .bind(&broker.broker_id)
        .bind(&broker.name)
        .bind(&broker.slug)
        .bind(broker.sponsorship_tier.as_str())
        .bind(broker.rating)
        .bind(organic_listed)
        .bind(to_millis(at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Brokers shown in organic listings. Unordered; callers rank them.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn organic(&self) -> DataResult<Vec<BrokerRef>> {
        let rows = sqlx::query_as::<_, BrokerRow>(
            r"
            SELECT broker_id, name, slug, sponsorship_tier, rating
            FROM brokers
            WHERE organic_listed = 1
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BrokerRef::try_from).collect()
    }
}
