use super::{from_millis, opt_from_millis, parse_day};
use crate::error::{DataError, DataResult};
use placement_core::{Campaign, CampaignSnapshot, SponsorshipTier};
use sqlx::FromRow;

/// Column list matching `CampaignRow`, for `SELECT` statements over `campaigns c`.
pub const CAMPAIGN_COLUMNS: &str = "c.campaign_id, c.broker_id, c.placement_slug, c.status, \
     c.billing_model, c.bid_rate_cents, c.monthly_fee_cents, c.daily_budget_cents, \
     c.total_budget_cents, c.spent_total_cents, c.spent_today_cents, c.spend_day, \
     c.start_date, c.end_date, c.last_won_at, c.featured_paid_until, c.flagged_for_review, \
     c.created_at, c.updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct CampaignRow {
    pub campaign_id: String,
    pub broker_id: String,
    pub placement_slug: String,
    pub status: String,
    pub billing_model: String,
    pub bid_rate_cents: Option<i64>,
    pub monthly_fee_cents: Option<i64>,
    pub daily_budget_cents: Option<i64>,
    pub total_budget_cents: Option<i64>,
    pub spent_total_cents: i64,
    pub spent_today_cents: i64,
    pub spend_day: Option<String>,
    pub start_date: i64,
    pub end_date: Option<i64>,
    pub last_won_at: Option<i64>,
    pub featured_paid_until: Option<i64>,
    pub flagged_for_review: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = DataError;

    fn try_from(row: CampaignRow) -> DataResult<Self> {
        Ok(Self {
            status: row.status.parse()?,
            billing_model: row.billing_model.parse()?,
            spend_day: row.spend_day.as_deref().map(parse_day).transpose()?,
            start_date: from_millis(row.start_date)?,
            end_date: opt_from_millis(row.end_date)?,
            last_won_at: opt_from_millis(row.last_won_at)?,
            featured_paid_until: opt_from_millis(row.featured_paid_until)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            campaign_id: row.campaign_id,
            broker_id: row.broker_id,
            placement_slug: row.placement_slug,
            bid_rate_cents: row.bid_rate_cents,
            monthly_fee_cents: row.monthly_fee_cents,
            daily_budget_cents: row.daily_budget_cents,
            total_budget_cents: row.total_budget_cents,
            spent_total_cents: row.spent_total_cents,
            spent_today_cents: row.spent_today_cents,
            flagged_for_review: row.flagged_for_review,
        })
    }
}

/// Campaign joined with its broker's wallet and tier.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    #[sqlx(flatten)]
    pub campaign: CampaignRow,
    pub wallet_balance_cents: Option<i64>,
    pub wallet_reserved_cents: Option<i64>,
    pub sponsorship_tier: Option<String>,
}

impl TryFrom<SnapshotRow> for CampaignSnapshot {
    type Error = DataError;

    fn try_from(row: SnapshotRow) -> DataResult<Self> {
        let wallet_available_cents = row
            .wallet_balance_cents
            .map(|balance| (balance - row.wallet_reserved_cents.unwrap_or(0)).max(0));
        let sponsorship_tier = match row.sponsorship_tier.as_deref() {
            Some(tier) => tier.parse()?,
            None => SponsorshipTier::None,
        };
        Ok(Self {
            campaign: row.campaign.try_into()?,
            wallet_available_cents,
            sponsorship_tier,
        })
    }
}
