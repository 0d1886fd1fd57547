//! Campaign repository.
//!
//! Reads the catalog for allocation and applies the status changes the
//! engine owns: lifecycle sweeps, billing-day roll-over, and force pauses.
//! Spend counters are only written by the ledger repository.

use chrono::{DateTime, NaiveDate, Utc};
use placement_core::{Campaign, CampaignSnapshot, CampaignStatus, LifecycleSweep};
use sqlx::SqlitePool;

use crate::error::DataResult;
use crate::models::{day_string, to_millis, CampaignRow, SnapshotRow, CAMPAIGN_COLUMNS};

/// Attempts for a compare-and-set status change before giving up.
const TRANSITION_ATTEMPTS: usize = 3;

/// Outcome of a requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(Campaign),
    Invalid { from: CampaignStatus },
    Missing,
}

/// Repository for campaign rows.
#[derive(Debug, Clone)]
pub struct CampaignRepository {
    pool: SqlitePool,
}

impl CampaignRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a campaign row.
    ///
    /// Used by the catalog owner and fixtures; the engine never calls it.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn upsert(&self, campaign: &Campaign) -> DataResult<()> {
        sqlx::query(
            r"
            INSERT INTO campaigns
                (campaign_id, broker_id, placement_slug, status, billing_model, bid_rate_cents,
                 monthly_fee_cents, daily_budget_cents, total_budget_cents, spent_total_cents,
                 spent_today_cents, spend_day, start_date, end_date, last_won_at,
                 featured_paid_until, flagged_for_review, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(campaign_id) DO UPDATE SET
                broker_id = excluded.broker_id,
                placement_slug = excluded.placement_slug,
                status = excluded.status,
                billing_model = excluded.billing_model,
                bid_rate_cents = excluded.bid_rate_cents,
                monthly_fee_cents = excluded.monthly_fee_cents,
                daily_budget_cents = excluded.daily_budget_cents,
                total_budget_cents = excluded.total_budget_cents,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&campaign.campaign_id)
        .bind(&campaign.broker_id)
        .bind(&campaign.placement_slug)
        .bind(campaign.status.as_str())
        .bind(campaign.billing_model.as_str())
        .bind(campaign.bid_rate_cents)
        .bind(campaign.monthly_fee_cents)
        .bind(campaign.daily_budget_cents)
        .bind(campaign.total_budget_cents)
        .bind(campaign.spent_total_cents)
        .bind(campaign.spent_today_cents)
        .bind(campaign.spend_day.map(day_string))
        .bind(to_millis(campaign.start_date))
        .bind(campaign.end_date.map(to_millis))
        .bind(campaign.last_won_at.map(to_millis))
        .bind(campaign.featured_paid_until.map(to_millis))
        .bind(campaign.flagged_for_review)
        .bind(to_millis(campaign.created_at))
        .bind(to_millis(campaign.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a campaign by ID.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, campaign_id: &str) -> DataResult<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns c WHERE c.campaign_id = ?1");
        let row = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    /// Non-terminal campaigns for a placement, joined with wallet and tier,
    /// ordered by campaign ID.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn snapshots_for_placement(&self, placement: &str) -> DataResult<Vec<CampaignSnapshot>> {
        let sql = format!(
            r"
            SELECT {CAMPAIGN_COLUMNS},
                   w.balance_cents AS wallet_balance_cents,
                   w.reserved_cents AS wallet_reserved_cents,
                   b.sponsorship_tier AS sponsorship_tier
            FROM campaigns c
            LEFT JOIN wallets w ON w.broker_id = c.broker_id
            LEFT JOIN brokers b ON b.broker_id = c.broker_id
            WHERE c.placement_slug = ?1 AND c.status NOT IN ('completed', 'cancelled')
            ORDER BY c.campaign_id ASC
            "
        );
        let rows = sqlx::query_as::<_, SnapshotRow>(&sql)
            .bind(placement)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(CampaignSnapshot::try_from).collect()
    }

    /// Stamps `last_won_at`, never moving it backwards.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn mark_won(&self, campaign_ids: &[String], at: DateTime<Utc>) -> DataResult<()> {
        let mut tx = self.pool.begin().await?;

        for campaign_id in campaign_ids {
            sqlx::query(
                r"
                UPDATE campaigns
                SET last_won_at = MAX(COALESCE(last_won_at, 0), ?1)
                WHERE campaign_id = ?2
                ",
            )
            .bind(to_millis(at))
            .bind(campaign_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Applies a status change if it is a legal lifecycle edge.
    ///
    /// The update is conditional on the status read, so a concurrent change
    /// forces a re-read instead of being overwritten.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn transition(
        &self,
        campaign_id: &str,
        to: CampaignStatus,
        at: DateTime<Utc>,
    ) -> DataResult<Transition> {
        for _ in 0..TRANSITION_ATTEMPTS {
            let Some(current) = self.get(campaign_id).await? else {
                return Ok(Transition::Missing);
            };
            if !current.status.can_transition_to(to) {
                return Ok(Transition::Invalid {
                    from: current.status,
                });
            }

            let result = sqlx::query(
                r"
                UPDATE campaigns
                SET status = ?1, updated_at = ?2
                WHERE campaign_id = ?3 AND status = ?4
                ",
            )
            .bind(to.as_str())
            .bind(to_millis(at))
            .bind(campaign_id)
            .bind(current.status.as_str())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(Transition::Applied(Campaign {
                    status: to,
                    updated_at: at,
                    ..current
                }));
            }
        }

        // Lost every race; report against whatever the row holds now.
        match self.get(campaign_id).await? {
            Some(current) => Ok(Transition::Invalid {
                from: current.status,
            }),
            None => Ok(Transition::Missing),
        }
    }

    /// Completes campaigns past their end date and activates approved ones
    /// whose start date has arrived.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn advance_lifecycle(&self, now: DateTime<Utc>) -> DataResult<LifecycleSweep> {
        let now_ms = to_millis(now);
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query(
            r"
            UPDATE campaigns
            SET status = 'completed', updated_at = ?1
            WHERE status IN ('active', 'paused', 'budget_exhausted')
              AND end_date IS NOT NULL AND end_date < ?1
            ",
        )
        .bind(now_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let activated = sqlx::query(
            r"
            UPDATE campaigns
            SET status = 'active', updated_at = ?1
            WHERE status = 'approved'
              AND start_date <= ?1
              AND (end_date IS NULL OR end_date >= ?1)
            ",
        )
        .bind(now_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(LifecycleSweep {
            activated,
            completed,
        })
    }

    /// Zeroes daily counters from earlier days and reactivates exhausted
    /// campaigns that can afford another charge under both caps.
    ///
    /// Returns the number of campaigns reactivated.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn roll_billing_day(&self, today: NaiveDate, at: DateTime<Utc>) -> DataResult<u64> {
        let day = day_string(today);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE campaigns
            SET spent_today_cents = 0, spend_day = ?1, updated_at = ?2
            WHERE spend_day IS NOT NULL AND spend_day <> ?1
            ",
        )
        .bind(&day)
        .bind(to_millis(at))
        .execute(&mut *tx)
        .await?;

        let reactivated = sqlx::query(
            r"
            UPDATE campaigns
            SET status = 'active', updated_at = ?2
            WHERE status = 'budget_exhausted'
              AND (total_budget_cents IS NULL
                   OR total_budget_cents - spent_total_cents >= MAX(1, COALESCE(
                        CASE billing_model WHEN 'cpc' THEN bid_rate_cents ELSE monthly_fee_cents END, 0)))
              AND (billing_model <> 'cpc'
                   OR daily_budget_cents IS NULL
                   OR daily_budget_cents
                        - (CASE WHEN spend_day = ?1 THEN spent_today_cents ELSE 0 END)
                        >= MAX(1, COALESCE(bid_rate_cents, 0)))
            ",
        )
        .bind(&day)
        .bind(to_millis(at))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(reactivated)
    }

    /// Pauses a campaign and flags it for review. Terminal campaigns are only flagged.
    ///
    /// Returns `false` if the campaign does not exist.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn force_pause(&self, campaign_id: &str, at: DateTime<Utc>) -> DataResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE campaigns
            SET flagged_for_review = 1,
                status = CASE WHEN status IN ('approved', 'active', 'budget_exhausted')
                              THEN 'paused' ELSE status END,
                updated_at = ?1
            WHERE campaign_id = ?2
            ",
        )
        .bind(to_millis(at))
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
