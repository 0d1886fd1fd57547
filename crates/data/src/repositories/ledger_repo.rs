//! Wallet ledger repository.
//!
//! Every change to a wallet balance or a campaign's spend counters happens in
//! here, inside a `BEGIN IMMEDIATE` transaction that also appends the matching
//! ledger entry. Taking the write lock up front serializes concurrent charges
//! so the idempotency lookup and the budget re-check see committed state.

use chrono::{DateTime, Utc};
use placement_core::{
    billing_period_end, BillingModel, Campaign, CampaignStatus, ChargeEvent, ChargeKind,
    ChargeOutcome, ChargeRejection, CreditReason, LedgerEntry, Reconciliation, Wallet,
    WalletCredit,
};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DataError, DataResult};
use crate::models::{day_string, to_millis, CampaignRow, LedgerRow, WalletRow, CAMPAIGN_COLUMNS};

/// Repository for wallets and ledger entries.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Charges
    // =========================================================================

    /// Applies a charge atomically.
    ///
    /// Rejections (duplicate key, exhausted budget, short wallet) commit any
    /// status or review flag they set and come back as a `ChargeOutcome`.
    ///
    /// # Errors
    /// Returns `DataError::Invalid` for a non-positive amount,
    /// `DataError::Integrity` if the spend update would break a cap despite
    /// the re-check, or a database error. Errors roll the transaction back.
    pub async fn apply_charge(
        &self,
        event: &ChargeEvent,
        now: DateTime<Utc>,
    ) -> DataResult<ChargeOutcome> {
        if event.amount_cents <= 0 {
            return Err(DataError::Invalid(format!(
                "charge amount must be positive, got {}",
                event.amount_cents
            )));
        }
        let mut conn = begin_immediate(&self.pool).await?;
        let result = match charge_in_tx(&mut conn, event, now).await {
            Ok(outcome) => commit(&mut conn).await.map(|()| outcome),
            Err(e) => Err(e),
        };
        if result.is_err() {
            rollback(&mut conn).await;
        }
        result
    }

    /// Credits a wallet and appends a positive ledger entry.
    ///
    /// Returns `false` without changes if the idempotency key was already used.
    ///
    /// # Errors
    /// Returns `DataError::Invalid` for a zero amount, a negative non-adjustment
    /// amount, or an adjustment that would take the balance below zero.
    pub async fn credit(&self, credit: &WalletCredit, now: DateTime<Utc>) -> DataResult<bool> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = match credit_in_tx(&mut conn, credit, now).await {
            Ok(applied) => commit(&mut conn).await.map(|()| applied),
            Err(e) => Err(e),
        };
        if result.is_err() {
            rollback(&mut conn).await;
        }
        result
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a broker's wallet.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn wallet(&self, broker_id: &str) -> DataResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(
            r"
            SELECT broker_id, balance_cents, reserved_cents, updated_at
            FROM wallets
            WHERE broker_id = ?1
            ",
        )
        .bind(broker_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Wallet::try_from).transpose()
    }

    /// Lists a campaign's ledger entries, oldest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn entries_for_campaign(&self, campaign_id: &str) -> DataResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r"
            SELECT entry_id, broker_id, campaign_id, delta_cents, reason, idempotency_key, created_at
            FROM ledger_entries
            WHERE campaign_id = ?1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    /// Sums charge entries for a campaign and compares them with its cached spend.
    ///
    /// Returns `None` if the campaign does not exist.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn reconcile_campaign(&self, campaign_id: &str) -> DataResult<Option<Reconciliation>> {
        let mut tx = self.pool.begin().await?;

        let cached: Option<(i64,)> =
            sqlx::query_as("SELECT spent_total_cents FROM campaigns WHERE campaign_id = ?1")
                .bind(campaign_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((cached_spend_cents,)) = cached else {
            return Ok(None);
        };

        let (ledger_spend_cents, entry_count): (i64, i64) = sqlx::query_as(
            r"
            SELECT COALESCE(SUM(-delta_cents), 0), COUNT(*)
            FROM ledger_entries
            WHERE campaign_id = ?1 AND reason IN ('cpc_click', 'featured_fee')
            ",
        )
        .bind(campaign_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Reconciliation {
            campaign_id: campaign_id.to_string(),
            ledger_spend_cents,
            cached_spend_cents,
            entry_count,
        }))
    }
}

// =============================================================================
// Transaction plumbing
// =============================================================================

async fn begin_immediate(pool: &SqlitePool) -> DataResult<PoolConnection<Sqlite>> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(conn)
}

async fn commit(conn: &mut SqliteConnection) -> DataResult<()> {
    sqlx::query("COMMIT").execute(&mut *conn).await?;
    Ok(())
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!(error = %e, "rollback failed");
    }
}

async fn key_used(conn: &mut SqliteConnection, idempotency_key: &str) -> DataResult<bool> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT entry_id FROM ledger_entries WHERE idempotency_key = ?1")
            .bind(idempotency_key)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(existing.is_some())
}

async fn append_entry(
    conn: &mut SqliteConnection,
    broker_id: &str,
    campaign_id: Option<&str>,
    delta_cents: i64,
    reason: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> DataResult<Uuid> {
    let entry_id = Uuid::new_v4();
    sqlx::query(
        r"
        INSERT INTO ledger_entries
            (entry_id, broker_id, campaign_id, delta_cents, reason, idempotency_key, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
    )
    .bind(entry_id.to_string())
    .bind(broker_id)
    .bind(campaign_id)
    .bind(delta_cents)
    .bind(reason)
    .bind(idempotency_key)
    .bind(to_millis(now))
    .execute(&mut *conn)
    .await?;
    Ok(entry_id)
}

/// Flags a campaign for review, moving it to `budget_exhausted` when asked and allowed.
async fn flag_campaign(
    conn: &mut SqliteConnection,
    campaign: &Campaign,
    exhaust: bool,
    now: DateTime<Utc>,
) -> DataResult<bool> {
    let exhausted =
        exhaust && campaign.status.can_transition_to(CampaignStatus::BudgetExhausted);
    let status = if exhausted {
        CampaignStatus::BudgetExhausted
    } else {
        campaign.status
    };
    sqlx::query(
        r"
        UPDATE campaigns
        SET status = ?1, flagged_for_review = 1, updated_at = ?2
        WHERE campaign_id = ?3
        ",
    )
    .bind(status.as_str())
    .bind(to_millis(now))
    .bind(&campaign.campaign_id)
    .execute(&mut *conn)
    .await?;
    Ok(exhausted)
}

async fn charge_in_tx(
    conn: &mut SqliteConnection,
    event: &ChargeEvent,
    now: DateTime<Utc>,
) -> DataResult<ChargeOutcome> {
    if key_used(conn, &event.idempotency_key).await? {
        debug!(key = %event.idempotency_key, "charge already processed");
        return Ok(ChargeOutcome::rejected(ChargeRejection::AlreadyProcessed, false));
    }

    let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns c WHERE c.campaign_id = ?1");
    let row = sqlx::query_as::<_, CampaignRow>(&sql)
        .bind(&event.campaign_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(ChargeOutcome::rejected(ChargeRejection::UnknownCampaign, false));
    };
    let campaign = Campaign::try_from(row)?;

    if campaign.broker_id != event.broker_id {
        return Ok(ChargeOutcome::rejected(ChargeRejection::BrokerMismatch, false));
    }
    if campaign.billing_model != event.kind.billing_model() {
        return Ok(ChargeOutcome::rejected(ChargeRejection::BillingMismatch, false));
    }

    let today = now.date_naive();
    let amount = event.amount_cents;

    // Only an exhausted campaign reports its cap; any other inactive status
    // is rejected before the cap check can flag it.
    if !matches!(
        campaign.status,
        CampaignStatus::Active | CampaignStatus::BudgetExhausted
    ) {
        return Ok(ChargeOutcome::rejected(ChargeRejection::CampaignNotActive, false));
    }

    if let Some(cap) = campaign.cap_blocking(amount, today) {
        let exhausted = flag_campaign(conn, &campaign, true, now).await?;
        return Ok(ChargeOutcome::rejected(cap.into(), exhausted));
    }

    if campaign.status != CampaignStatus::Active {
        return Ok(ChargeOutcome::rejected(ChargeRejection::CampaignNotActive, false));
    }

    let wallet = sqlx::query_as::<_, WalletRow>(
        "SELECT broker_id, balance_cents, reserved_cents, updated_at FROM wallets WHERE broker_id = ?1",
    )
    .bind(&event.broker_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(Wallet::try_from)
    .transpose()?;

    if !wallet.is_some_and(|w| w.covers(amount)) {
        flag_campaign(conn, &campaign, false, now).await?;
        return Ok(ChargeOutcome::rejected(ChargeRejection::InsufficientWallet, false));
    }

    let debited = sqlx::query(
        r"
        UPDATE wallets
        SET balance_cents = balance_cents - ?1, updated_at = ?2
        WHERE broker_id = ?3 AND balance_cents - reserved_cents >= ?1
        ",
    )
    .bind(amount)
    .bind(to_millis(now))
    .bind(&event.broker_id)
    .execute(&mut *conn)
    .await?;
    if debited.rows_affected() != 1 {
        return Err(DataError::integrity(
            &campaign.campaign_id,
            format!("wallet {} could not cover {amount} after re-check", event.broker_id),
        ));
    }

    let mut updated = campaign.clone();
    updated.spent_today_cents = campaign.spent_today_on(today) + amount;
    updated.spend_day = Some(today);
    updated.spent_total_cents = campaign.spent_total_cents + amount;
    if event.kind == ChargeKind::FeaturedFee {
        updated.featured_paid_until = billing_period_end(now)
            .max(campaign.featured_paid_until);
    }
    let exhausted = updated.is_exhausted_on(today);
    if exhausted {
        updated.status = CampaignStatus::BudgetExhausted;
    }

    // The WHERE guard re-checks the total cap against the committed row.
    let spent = sqlx::query(
        r"
        UPDATE campaigns
        SET spent_total_cents = spent_total_cents + ?1,
            spent_today_cents = ?2,
            spend_day = ?3,
            status = ?4,
            featured_paid_until = ?5,
            updated_at = ?6
        WHERE campaign_id = ?7
          AND (total_budget_cents IS NULL OR spent_total_cents + ?1 <= total_budget_cents)
        ",
    )
    .bind(amount)
    .bind(updated.spent_today_cents)
    .bind(day_string(today))
    .bind(updated.status.as_str())
    .bind(updated.featured_paid_until.map(to_millis))
    .bind(to_millis(now))
    .bind(&campaign.campaign_id)
    .execute(&mut *conn)
    .await?;
    if spent.rows_affected() != 1 {
        return Err(DataError::integrity(
            &campaign.campaign_id,
            format!(
                "charge of {amount} would exceed total budget {:?} at spend {}",
                campaign.total_budget_cents, campaign.spent_total_cents
            ),
        ));
    }
    if campaign.billing_model == BillingModel::Cpc {
        if let Some(cap) = updated.daily_budget_cents {
            if updated.spent_today_cents > cap {
                return Err(DataError::integrity(
                    &campaign.campaign_id,
                    format!("daily spend {} exceeds cap {cap}", updated.spent_today_cents),
                ));
            }
        }
    }

    let entry_id = append_entry(
        conn,
        &event.broker_id,
        Some(&event.campaign_id),
        -amount,
        event.kind.ledger_reason().as_str(),
        &event.idempotency_key,
        now,
    )
    .await?;

    Ok(ChargeOutcome::applied(entry_id, exhausted))
}

async fn credit_in_tx(
    conn: &mut SqliteConnection,
    credit: &WalletCredit,
    now: DateTime<Utc>,
) -> DataResult<bool> {
    if credit.amount_cents == 0 {
        return Err(DataError::Invalid("credit amount must be non-zero".to_string()));
    }
    if credit.amount_cents < 0 && credit.reason != CreditReason::AdminAdjustment {
        return Err(DataError::Invalid(format!(
            "{} credits must be positive",
            credit.reason.ledger_reason()
        )));
    }
    if key_used(conn, &credit.idempotency_key).await? {
        return Ok(false);
    }

    let balance: Option<(i64,)> =
        sqlx::query_as("SELECT balance_cents FROM wallets WHERE broker_id = ?1")
            .bind(&credit.broker_id)
            .fetch_optional(&mut *conn)
            .await?;
    let new_balance = balance.map_or(0, |(b,)| b) + credit.amount_cents;
    if new_balance < 0 {
        return Err(DataError::Invalid(format!(
            "adjustment of {} would leave wallet {} at {new_balance}",
            credit.amount_cents, credit.broker_id
        )));
    }

    sqlx::query(
        r"
        INSERT INTO wallets (broker_id, balance_cents, reserved_cents, updated_at)
        VALUES (?1, ?2, 0, ?3)
        ON CONFLICT(broker_id) DO UPDATE SET
            balance_cents = excluded.balance_cents,
            updated_at = excluded.updated_at
        ",
    )
    .bind(&credit.broker_id)
    .bind(new_balance)
    .bind(to_millis(now))
    .execute(&mut *conn)
    .await?;

    append_entry(
        conn,
        &credit.broker_id,
        credit.campaign_id.as_deref(),
        credit.amount_cents,
        credit.reason.ledger_reason().as_str(),
        &credit.idempotency_key,
        now,
    )
    .await?;

    Ok(true)
}
