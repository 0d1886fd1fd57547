//! Ledger entries, charge events, and charge outcomes.
//!
//! The ledger is append-only and is the single source of truth for spend.
//! Charges debit a wallet and a campaign budget in one transaction; credits
//! top a wallet up.

use crate::campaign::{BillingModel, BudgetCap, ParseEnumError};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Why a ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    CpcClick,
    FeaturedFee,
    AdminAdjustment,
    Refund,
    TopUp,
}

impl LedgerReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CpcClick => "cpc_click",
            Self::FeaturedFee => "featured_fee",
            Self::AdminAdjustment => "admin_adjustment",
            Self::Refund => "refund",
            Self::TopUp => "top_up",
        }
    }

    /// Returns true for reasons that count as campaign spend.
    #[must_use]
    pub const fn is_spend(self) -> bool {
        matches!(self, Self::CpcClick | Self::FeaturedFee)
    }
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerReason {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpc_click" => Ok(Self::CpcClick),
            "featured_fee" => Ok(Self::FeaturedFee),
            "admin_adjustment" => Ok(Self::AdminAdjustment),
            "refund" => Ok(Self::Refund),
            "top_up" => Ok(Self::TopUp),
            other => Err(ParseEnumError::new("ledger reason", other)),
        }
    }
}

/// Immutable ledger row. Debits carry a negative `delta_cents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub broker_id: String,
    pub campaign_id: Option<String>,
    pub delta_cents: i64,
    pub reason: LedgerReason,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Charges
// =============================================================================

/// What a charge pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    CpcClick,
    FeaturedFee,
}

impl ChargeKind {
    #[must_use]
    pub const fn ledger_reason(self) -> LedgerReason {
        match self {
            Self::CpcClick => LedgerReason::CpcClick,
            Self::FeaturedFee => LedgerReason::FeaturedFee,
        }
    }

    /// Billing model this kind of charge applies to.
    #[must_use]
    pub const fn billing_model(self) -> BillingModel {
        match self {
            Self::CpcClick => BillingModel::Cpc,
            Self::FeaturedFee => BillingModel::FeaturedMonthly,
        }
    }
}

/// A request to debit a broker for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeEvent {
    pub campaign_id: String,
    pub broker_id: String,
    pub amount_cents: i64,
    pub idempotency_key: String,
    pub kind: ChargeKind,
}

/// Why a charge was not applied. These are business outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeRejection {
    /// The idempotency key was already processed.
    AlreadyProcessed,
    UnknownCampaign,
    /// Event broker does not own the campaign.
    BrokerMismatch,
    /// Charge kind does not match the campaign's billing model.
    BillingMismatch,
    CampaignNotActive,
    DailyBudgetExhausted,
    TotalBudgetExhausted,
    InsufficientWallet,
}

impl ChargeRejection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyProcessed => "already_processed",
            Self::UnknownCampaign => "unknown_campaign",
            Self::BrokerMismatch => "broker_mismatch",
            Self::BillingMismatch => "billing_mismatch",
            Self::CampaignNotActive => "campaign_not_active",
            Self::DailyBudgetExhausted => "daily_budget_exhausted",
            Self::TotalBudgetExhausted => "total_budget_exhausted",
            Self::InsufficientWallet => "insufficient_wallet",
        }
    }

    /// Returns true if the campaign should be flagged for admin review.
    #[must_use]
    pub const fn needs_review(self) -> bool {
        matches!(
            self,
            Self::DailyBudgetExhausted | Self::TotalBudgetExhausted | Self::InsufficientWallet
        )
    }
}

impl From<BudgetCap> for ChargeRejection {
    fn from(cap: BudgetCap) -> Self {
        match cap {
            BudgetCap::Daily => Self::DailyBudgetExhausted,
            BudgetCap::Total => Self::TotalBudgetExhausted,
        }
    }
}

impl fmt::Display for ChargeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a charge attempt that reached a definite outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub applied: bool,
    pub rejection: Option<ChargeRejection>,
    /// Set when this charge moved the campaign to `budget_exhausted`.
    pub exhausted: bool,
    pub entry_id: Option<Uuid>,
}

impl ChargeOutcome {
    #[must_use]
    pub const fn applied(entry_id: Uuid, exhausted: bool) -> Self {
        Self {
            applied: true,
            rejection: None,
            exhausted,
            entry_id: Some(entry_id),
        }
    }

    #[must_use]
    pub const fn rejected(reason: ChargeRejection, exhausted: bool) -> Self {
        Self {
            applied: false,
            rejection: Some(reason),
            exhausted,
            entry_id: None,
        }
    }
}

/// Calendar month label (`YYYY-MM`) of the featured billing period containing `at`.
#[must_use]
pub fn billing_period(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Exclusive end of the billing period containing `at`: midnight UTC on the
/// first day of the following month.
#[must_use]
pub fn billing_period_end(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let day = at.date_naive();
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc())
}

/// Idempotency key for a campaign's featured fee in the period containing `at`.
#[must_use]
pub fn featured_fee_key(campaign_id: &str, at: DateTime<Utc>) -> String {
    format!("featured:{campaign_id}:{}", billing_period(at))
}

// =============================================================================
// Credits
// =============================================================================

/// Reasons a wallet may be credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    TopUp,
    Refund,
    AdminAdjustment,
}

impl CreditReason {
    #[must_use]
    pub const fn ledger_reason(self) -> LedgerReason {
        match self {
            Self::TopUp => LedgerReason::TopUp,
            Self::Refund => LedgerReason::Refund,
            Self::AdminAdjustment => LedgerReason::AdminAdjustment,
        }
    }
}

/// A wallet credit. Only `AdminAdjustment` may carry a negative amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCredit {
    pub broker_id: String,
    pub campaign_id: Option<String>,
    pub amount_cents: i64,
    pub reason: CreditReason,
    pub idempotency_key: String,
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Cached spend compared against the ledger sum for one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub campaign_id: String,
    pub ledger_spend_cents: i64,
    pub cached_spend_cents: i64,
    pub entry_count: i64,
}

impl Reconciliation {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.ledger_spend_cents == self.cached_spend_cents
    }
}

/// A charge parked after its retries were exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCharge {
    pub id: i64,
    pub event: ChargeEvent,
    pub last_error: String,
    pub attempts: i64,
    pub queued_at: DateTime<Utc>,
}
