//! Fallback selector, used when the auction has no winner.

use placement_core::{
    BrokerDirectory, BrokerRef, FallbackResult, PlacementKind, ResolvedPlacement, TierWeights,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Orders organic brokers by tier weight, then rating, then name, and keeps `slots`.
#[must_use]
pub fn order_organic(mut brokers: Vec<BrokerRef>, weights: &TierWeights, slots: usize) -> Vec<BrokerRef> {
    brokers.sort_by(|a, b| {
        weights
            .weight(b.sponsorship_tier)
            .cmp(&weights.weight(a.sponsorship_tier))
            .then_with(|| b.rating.total_cmp(&a.rating))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.broker_id.cmp(&b.broker_id))
    });
    brokers.truncate(slots);
    brokers
}

#[derive(Clone)]
pub struct FallbackSelector {
    directory: Arc<dyn BrokerDirectory>,
}

impl FallbackSelector {
    #[must_use]
    pub fn new(directory: Arc<dyn BrokerDirectory>) -> Self {
        Self { directory }
    }

    /// Picks what to render instead of a campaign. Never fails; missing data
    /// yields an empty result and the caller collapses the slot.
    pub async fn select(&self, placement: &ResolvedPlacement, weights: &TierWeights) -> FallbackResult {
        if placement.kind == PlacementKind::Programmatic {
            debug!(placement = %placement.slug, "programmatic fallback");
            return FallbackResult::programmatic();
        }

        match self.directory.organic_brokers().await {
            Ok(brokers) => FallbackResult::organic(order_organic(brokers, weights, placement.slots)),
            Err(e) => {
                warn!(placement = %placement.slug, error = %e, "organic brokers unavailable");
                FallbackResult::default()
            }
        }
    }
}
