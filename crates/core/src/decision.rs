//! Allocation decisions and the audit query types over them.
//!
//! One `AllocationDecision` is written per allocate call and never updated.
//! Campaigns are referenced by id only so decisions stay readable after a
//! campaign is deleted.

use crate::broker::BrokerRef;
use crate::campaign::ParseEnumError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Current version of the persisted decision payload.
pub const DECISION_SCHEMA_VERSION: u16 = 1;

/// Why a candidate did not win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NotActive,
    DateOutOfRange,
    PlacementMismatch,
    DailyBudgetExhausted,
    TotalBudgetExhausted,
    InsufficientWallet,
    FrequencyCapped,
    /// Eligible, but ranked below the placement's slot count.
    Outranked,
}

impl RejectionReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotActive => "not_active",
            Self::DateOutOfRange => "date_out_of_range",
            Self::PlacementMismatch => "placement_mismatch",
            Self::DailyBudgetExhausted => "daily_budget_exhausted",
            Self::TotalBudgetExhausted => "total_budget_exhausted",
            Self::InsufficientWallet => "insufficient_wallet",
            Self::FrequencyCapped => "frequency_capped",
            Self::Outranked => "outranked",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectionReason {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::NotActive,
            Self::DateOutOfRange,
            Self::PlacementMismatch,
            Self::DailyBudgetExhausted,
            Self::TotalBudgetExhausted,
            Self::InsufficientWallet,
            Self::FrequencyCapped,
            Self::Outranked,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == s)
        .ok_or_else(|| ParseEnumError::new("rejection reason", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub campaign_id: String,
    pub reason: RejectionReason,
}

impl Rejection {
    #[must_use]
    pub fn new(campaign_id: impl Into<String>, reason: RejectionReason) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            reason,
        }
    }
}

/// One campaign considered by an allocation, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub campaign_id: String,
    pub eligible: bool,
    /// Display score; `None` for candidates filtered before ranking.
    pub rank_score: Option<i64>,
}

/// What to show when no campaign wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackResult {
    pub brokers: Vec<BrokerRef>,
    /// Caller should render a programmatic ad container instead.
    pub is_programmatic: bool,
}

impl FallbackResult {
    #[must_use]
    pub fn organic(brokers: Vec<BrokerRef>) -> Self {
        Self {
            brokers,
            is_programmatic: false,
        }
    }

    #[must_use]
    pub fn programmatic() -> Self {
        Self {
            brokers: Vec::new(),
            is_programmatic: true,
        }
    }

    /// Returns true if the caller should collapse the slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty() && !self.is_programmatic
    }
}

/// Immutable audit record of one allocate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDecision {
    pub decision_id: Uuid,
    pub schema_version: u16,
    pub placement_slug: String,
    pub visitor_key: String,
    pub page_path: String,
    pub created_at: DateTime<Utc>,
    pub candidates: Vec<CandidateRecord>,
    /// Winning campaign ids in rank order.
    pub winners: Vec<String>,
    pub rejection_log: Vec<Rejection>,
    pub fallback_used: bool,
    pub fallback: Option<FallbackResult>,
    pub duration_ms: f64,
}

impl AllocationDecision {
    /// Returns the rejection reason recorded for a campaign, if any.
    #[must_use]
    pub fn rejection_for(&self, campaign_id: &str) -> Option<RejectionReason> {
        self.rejection_log
            .iter()
            .find(|r| r.campaign_id == campaign_id)
            .map(|r| r.reason)
    }
}

// =============================================================================
// Audit queries
// =============================================================================

/// Filter shared by the paginated listing and the aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionFilter {
    pub placement: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Clamps `page` to at least 1 and `page_size` into `[1, max_page_size]`.
    #[must_use]
    pub fn clamped(page: Option<u32>, page_size: Option<u32>, default_size: u32, max_size: u32) -> Self {
        let max_size = max_size.max(1);
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(default_size).clamp(1, max_size),
        }
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPage {
    pub decisions: Vec<AllocationDecision>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionAggregates {
    pub total: i64,
    pub with_winners: i64,
    pub fallback_count: i64,
    pub avg_duration_ms: f64,
}
