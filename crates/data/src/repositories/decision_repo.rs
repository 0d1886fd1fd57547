//! Allocation decision repository.
//!
//! Decisions are insert-only; triggers reject updates and deletes. The
//! paginated listing and the aggregates share `push_filter`, so a filter
//! always selects the same rows for both.

use placement_core::{
    AllocationDecision, DecisionAggregates, DecisionFilter, DecisionPage, PageRequest,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::DataResult;
use crate::models::{to_millis, DecisionRow};

const DECISION_COLUMNS: &str = "decision_id, schema_version, placement_slug, visitor_key, \
     page_path, created_at, candidates, winners, rejection_log, fallback, fallback_used, duration_ms";

/// Appends the `WHERE` clause for `filter`.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &DecisionFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(placement) = &filter.placement {
        qb.push(" AND placement_slug = ").push_bind(placement.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(to_millis(from));
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at < ").push_bind(to_millis(to));
    }
}

/// Repository for the decision log.
#[derive(Debug, Clone)]
pub struct DecisionRepository {
    pool: SqlitePool,
}

impl DecisionRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a decision.
    ///
    /// # Errors
    /// Returns an error if serialization or the insert fails, including a
    /// duplicate `decision_id`.
    pub async fn append(&self, decision: &AllocationDecision) -> DataResult<()> {
        let candidates = serde_json::to_string(&decision.candidates)?;
        let winners = serde_json::to_string(&decision.winners)?;
        let rejection_log = serde_json::to_string(&decision.rejection_log)?;
        let fallback = decision
            .fallback
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO allocation_decisions
                (decision_id, schema_version, placement_slug, visitor_key, page_path, created_at,
                 candidates, winners, rejection_log, fallback, winner_count, fallback_used, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
        )
        .bind(decision.decision_id.to_string())
        .bind(i64::from(decision.schema_version))
        .bind(&decision.placement_slug)
        .bind(&decision.visitor_key)
        .bind(&decision.page_path)
        .bind(to_millis(decision.created_at))
        .bind(candidates)
        .bind(winners)
        .bind(rejection_log)
        .bind(fallback)
        .bind(i64::try_from(decision.winners.len()).unwrap_or(i64::MAX))
        .bind(decision.fallback_used)
        .bind(decision.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists decisions newest first, with the total count for the filter.
    ///
    /// Count and page are read in one transaction so they agree.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row cannot be decoded.
    pub async fn list(&self, filter: &DecisionFilter, page: PageRequest) -> DataResult<DecisionPage> {
        let mut tx = self.pool.begin().await?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM allocation_decisions");
        push_filter(&mut count_qb, filter);
        let (total_count,): (i64,) = count_qb.build_query_as().fetch_one(&mut *tx).await?;

        let mut page_qb = QueryBuilder::new(format!("SELECT {DECISION_COLUMNS} FROM allocation_decisions"));
        push_filter(&mut page_qb, filter);
        page_qb
            .push(" ORDER BY created_at DESC, decision_id DESC LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = page_qb
            .build_query_as::<DecisionRow>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let decisions = rows
            .into_iter()
            .map(AllocationDecision::try_from)
            .collect::<DataResult<Vec<_>>>()?;

        Ok(DecisionPage {
            decisions,
            total_count,
            page: page.page,
            page_size: page.page_size,
        })
    }

    /// Aggregates over the same rows `list` would return for `filter`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn aggregates(&self, filter: &DecisionFilter) -> DataResult<DecisionAggregates> {
        let mut qb = QueryBuilder::new(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN winner_count > 0 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(fallback_used), 0),
                   COALESCE(AVG(duration_ms), 0.0)
            FROM allocation_decisions
            ",
        );
        push_filter(&mut qb, filter);

        let (total, with_winners, fallback_count, avg_duration_ms): (i64, i64, i64, f64) =
            qb.build_query_as().fetch_one(&self.pool).await?;

        Ok(DecisionAggregates {
            total,
            with_winners,
            fallback_count,
            avg_duration_ms,
        })
    }

    /// Gets a decision by ID.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get(&self, decision_id: Uuid) -> DataResult<Option<AllocationDecision>> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM allocation_decisions WHERE decision_id = ?1");
        let row = sqlx::query_as::<_, DecisionRow>(&sql)
            .bind(decision_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(AllocationDecision::try_from).transpose()
    }
}
