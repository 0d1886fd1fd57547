//! Request and response types for allocation and event tracking.

use crate::broker::SponsorshipTier;
use crate::campaign::Campaign;
use crate::decision::FallbackResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A page asking which campaigns fill one placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub placement_slug: String,
    pub visitor_key: String,
    #[serde(default)]
    pub page_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub campaign_id: String,
    pub broker_id: String,
    pub bid_rate_cents: Option<i64>,
}

impl From<&Campaign> for Winner {
    fn from(campaign: &Campaign) -> Self {
        Self {
            campaign_id: campaign.campaign_id.clone(),
            broker_id: campaign.broker_id.clone(),
            bid_rate_cents: campaign.bid_rate_cents,
        }
    }
}

/// Allocation answer. `fallback` is always present when `winners` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResponse {
    pub decision_id: Uuid,
    pub winners: Vec<Winner>,
    pub fallback_used: bool,
    pub fallback: Option<FallbackResult>,
}

/// A campaign joined with the wallet and broker data the filters need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub campaign: Campaign,
    /// `None` when the broker has no wallet row.
    pub wallet_available_cents: Option<i64>,
    pub sponsorship_tier: SponsorshipTier,
}

// =============================================================================
// Tracking events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Impression,
    Click,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Click => "click",
        }
    }
}

/// Impression or click reported by client tracking or a broker postback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub campaign_id: String,
    pub broker_id: String,
    pub placement_slug: String,
    pub visitor_key: String,
    pub idempotency_key: String,
    pub event_kind: EventKind,
    /// Bid the winner was served with, echoed from the allocate response.
    /// Lets a click be queued at that price if the catalog is unreachable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_rate_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingResponse {
    pub applied: bool,
}
