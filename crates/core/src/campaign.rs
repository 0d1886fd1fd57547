//! Campaign records and their status lifecycle.
//!
//! A campaign is a broker's paid claim on one placement. The engine reads
//! campaigns from the catalog and only ever mutates their spend counters and
//! status, always inside the ledger transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Created by a broker, waiting for admin review.
    PendingReview,
    /// Approved by an admin, waiting for its start date.
    Approved,
    /// Live and eligible to win placements.
    Active,
    /// Paused by the broker, an admin, or an integrity check.
    Paused,
    /// A budget cap leaves no room for another charge.
    BudgetExhausted,
    /// End date has passed.
    Completed,
    /// Cancelled by the broker. Irreversible.
    Cancelled,
}

impl CampaignStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::PendingReview,
        Self::Approved,
        Self::Active,
        Self::Paused,
        Self::BudgetExhausted,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true if moving from `self` to `next` is a legal lifecycle edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use CampaignStatus::{
            Active, Approved, BudgetExhausted, Cancelled, Completed, Paused, PendingReview,
        };
        matches!(
            (self, next),
            (PendingReview, Approved | Cancelled)
                | (Approved, Active | Paused | Cancelled)
                | (Active, Paused | BudgetExhausted | Completed | Cancelled)
                | (Paused, Active | Cancelled | Completed)
                | (BudgetExhausted, Active | Paused | Completed | Cancelled)
        )
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown enum string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("campaign status", s))
    }
}

// =============================================================================
// Billing
// =============================================================================

/// How a campaign pays for its placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingModel {
    /// Charged `bid_rate_cents` per click.
    Cpc,
    /// Charged `monthly_fee_cents` once per calendar month.
    FeaturedMonthly,
}

impl BillingModel {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpc => "cpc",
            Self::FeaturedMonthly => "featured_monthly",
        }
    }
}

impl fmt::Display for BillingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingModel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpc" => Ok(Self::Cpc),
            "featured_monthly" => Ok(Self::FeaturedMonthly),
            other => Err(ParseEnumError::new("billing model", other)),
        }
    }
}

/// Which budget cap a charge runs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCap {
    Daily,
    Total,
}

// =============================================================================
// Campaign
// =============================================================================

/// A campaign row as held by the catalog.
///
/// `spent_total_cents` and `spent_today_cents` are cached projections of the
/// ledger. `spent_today_cents` only counts while `spend_day` is the current
/// billing day (UTC date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub campaign_id: String,
    pub broker_id: String,
    pub placement_slug: String,
    pub status: CampaignStatus,
    pub billing_model: BillingModel,
    pub bid_rate_cents: Option<i64>,
    pub monthly_fee_cents: Option<i64>,
    pub daily_budget_cents: Option<i64>,
    pub total_budget_cents: Option<i64>,
    pub spent_total_cents: i64,
    pub spent_today_cents: i64,
    pub spend_day: Option<NaiveDate>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Last time this campaign won an allocation; drives the fairness tie-break.
    pub last_won_at: Option<DateTime<Utc>>,
    /// Featured campaigns: end of the billing period already paid for.
    pub featured_paid_until: Option<DateTime<Utc>>,
    pub flagged_for_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Amount of one charge under this campaign's billing model.
    #[must_use]
    pub fn price_cents(&self) -> i64 {
        match self.billing_model {
            BillingModel::Cpc => self.bid_rate_cents.unwrap_or(0),
            BillingModel::FeaturedMonthly => self.monthly_fee_cents.unwrap_or(0),
        }
    }

    /// Daily spend counted against `today`; stale counters read as zero.
    #[must_use]
    pub fn spent_today_on(&self, today: NaiveDate) -> i64 {
        if self.spend_day == Some(today) {
            self.spent_today_cents
        } else {
            0
        }
    }

    /// Remaining daily headroom, `None` when uncapped.
    #[must_use]
    pub fn daily_remaining(&self, today: NaiveDate) -> Option<i64> {
        self.daily_budget_cents
            .map(|cap| cap - self.spent_today_on(today))
    }

    /// Remaining total headroom, `None` when uncapped.
    #[must_use]
    pub fn total_remaining(&self) -> Option<i64> {
        self.total_budget_cents
            .map(|cap| cap - self.spent_total_cents)
    }

    /// Returns true if `now` falls within `[start_date, end_date]`.
    #[must_use]
    pub fn is_running_at(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && self.end_date.map_or(true, |end| now <= end)
    }

    /// Returns the cap that charging `amount_cents` on `today` would break.
    ///
    /// The daily cap is checked before the total cap, matching the rejection
    /// order used by the eligibility filter. Daily caps do not apply to
    /// featured fees.
    #[must_use]
    pub fn cap_blocking(&self, amount_cents: i64, today: NaiveDate) -> Option<BudgetCap> {
        if self.billing_model == BillingModel::Cpc {
            if let Some(remaining) = self.daily_remaining(today) {
                if amount_cents > remaining {
                    return Some(BudgetCap::Daily);
                }
            }
        }
        match self.total_remaining() {
            Some(remaining) if amount_cents > remaining => Some(BudgetCap::Total),
            _ => None,
        }
    }

    /// Returns true if no further charge of `price_cents()` fits under a cap.
    ///
    /// Applied right after a successful charge to decide whether the campaign
    /// moves to `budget_exhausted` in the same transaction. Featured campaigns
    /// never exhaust here: the period just paid for must stay servable, and the
    /// next period's fee is rejected by the cap check when it is attempted.
    #[must_use]
    pub fn is_exhausted_on(&self, today: NaiveDate) -> bool {
        if self.billing_model == BillingModel::FeaturedMonthly {
            return false;
        }
        let price = self.price_cents().max(1);
        self.cap_blocking(price, today).is_some()
    }

    /// Returns true if a featured campaign is paid through `now`.
    #[must_use]
    pub fn is_paid_through(&self, now: DateTime<Utc>) -> bool {
        self.featured_paid_until.is_some_and(|until| now < until)
    }
}
