//! Auction ranker.
//!
//! Sort key, best first:
//! 1. sponsorship tier weight, descending
//! 2. bid value in cents, descending (featured fees divided into a daily equivalent)
//! 3. least recently won, never-won first
//! 4. campaign ID, ascending
//!
//! The ranker is a pure function of its inputs.

use placement_core::{BillingModel, Campaign, CampaignSnapshot, RankingPolicy};
use std::cmp::Ordering;

/// Tier weight multiplier in `rank_score`; bids never reach it.
const TIER_SCALE: i64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCampaign {
    pub snapshot: CampaignSnapshot,
    pub tier_weight: u32,
    pub value_cents: i64,
    /// `tier_weight * 10^9 + value_cents`, recorded for auditing.
    pub rank_score: i64,
}

impl RankedCampaign {
    fn new(snapshot: CampaignSnapshot, policy: &RankingPolicy) -> Self {
        let tier_weight = policy.tier_weights.weight(snapshot.sponsorship_tier);
        let value_cents = normalized_value(&snapshot.campaign, policy);
        Self {
            rank_score: i64::from(tier_weight)
                .saturating_mul(TIER_SCALE)
                .saturating_add(value_cents),
            tier_weight,
            value_cents,
            snapshot,
        }
    }

    fn cmp_rank(&self, other: &Self) -> Ordering {
        other
            .tier_weight
            .cmp(&self.tier_weight)
            .then_with(|| other.value_cents.cmp(&self.value_cents))
            // `None < Some`, so never-won campaigns sort first.
            .then_with(|| {
                self.snapshot
                    .campaign
                    .last_won_at
                    .cmp(&other.snapshot.campaign.last_won_at)
            })
            .then_with(|| {
                self.snapshot
                    .campaign
                    .campaign_id
                    .cmp(&other.snapshot.campaign.campaign_id)
            })
    }
}

/// Bid per click for CPC, or the monthly fee spread over the configured days.
#[must_use]
pub fn normalized_value(campaign: &Campaign, policy: &RankingPolicy) -> i64 {
    match campaign.billing_model {
        BillingModel::Cpc => campaign.bid_rate_cents.unwrap_or(0),
        BillingModel::FeaturedMonthly => {
            let days = i64::from(policy.featured_days_per_month.max(1));
            campaign.monthly_fee_cents.unwrap_or(0) / days
        }
    }
}

/// Ranked winners plus the eligible campaigns that missed a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranking {
    pub winners: Vec<RankedCampaign>,
    pub outranked: Vec<RankedCampaign>,
}

/// Ranks `filtered` and takes the first `slots`. Fewer candidates than slots
/// returns all of them.
#[must_use]
pub fn rank(filtered: Vec<CampaignSnapshot>, slots: usize, policy: &RankingPolicy) -> Ranking {
    let mut ranked: Vec<RankedCampaign> = filtered
        .into_iter()
        .map(|snapshot| RankedCampaign::new(snapshot, policy))
        .collect();
    ranked.sort_by(RankedCampaign::cmp_rank);

    let outranked = ranked.split_off(slots.min(ranked.len()));
    Ranking {
        winners: ranked,
        outranked,
    }
}
