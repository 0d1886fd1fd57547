//! Frequency cap filter.
//!
//! Advisory only: counters may trail concurrent impressions slightly, and a
//! failed counter read lets every campaign through rather than blocking the
//! allocation. Spend is enforced by the charge transaction, not here.

use chrono::{DateTime, Duration, Utc};
use placement_core::{CampaignSnapshot, FrequencyStore, Rejection, RejectionReason};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Removes campaigns whose window count has reached `cap`. A cap of zero disables capping.
#[must_use]
pub fn apply_caps(
    eligible: Vec<CampaignSnapshot>,
    counts: &HashMap<String, u32>,
    cap: u32,
) -> (Vec<CampaignSnapshot>, Vec<Rejection>) {
    if cap == 0 {
        return (eligible, Vec::new());
    }

    let mut kept = Vec::with_capacity(eligible.len());
    let mut rejected = Vec::new();
    for snapshot in eligible {
        let seen = counts.get(&snapshot.campaign.campaign_id).copied().unwrap_or(0);
        if seen >= cap {
            rejected.push(Rejection::new(
                &snapshot.campaign.campaign_id,
                RejectionReason::FrequencyCapped,
            ));
        } else {
            kept.push(snapshot);
        }
    }
    (kept, rejected)
}

#[derive(Clone)]
pub struct FrequencyFilter {
    store: Arc<dyn FrequencyStore>,
}

impl FrequencyFilter {
    #[must_use]
    pub fn new(store: Arc<dyn FrequencyStore>) -> Self {
        Self { store }
    }

    /// Reads counters for `eligible` and applies the cap.
    pub async fn filter(
        &self,
        eligible: Vec<CampaignSnapshot>,
        visitor_key: &str,
        placement: &str,
        cap: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> (Vec<CampaignSnapshot>, Vec<Rejection>) {
        if eligible.is_empty() || cap == 0 {
            return (eligible, Vec::new());
        }

        let ids: Vec<String> = eligible
            .iter()
            .map(|s| s.campaign.campaign_id.clone())
            .collect();
        match self.store.counts(visitor_key, placement, &ids, now, window).await {
            Ok(counts) => apply_caps(eligible, &counts, cap),
            Err(e) => {
                warn!(placement = %placement, error = %e, "frequency read failed, skipping caps");
                (eligible, Vec::new())
            }
        }
    }

    /// Counts one impression under `event_key`. Returns false for a key that
    /// was already counted; failures are logged and swallowed.
    pub async fn touch(
        &self,
        event_key: &str,
        visitor_key: &str,
        placement: &str,
        campaign_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> bool {
        match self
            .store
            .record_impression(event_key, visitor_key, placement, campaign_id, now, window)
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(event_key = %event_key, "event already counted");
                false
            }
            Err(e) => {
                warn!(
                    placement = %placement,
                    campaign_id = %campaign_id,
                    error = %e,
                    "frequency write failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cpc_snapshot, ts, FailingStore};

    #[test]
    fn test_count_at_cap_is_rejected() {
        let eligible = vec![cpc_snapshot("c1", 400, 1_000), cpc_snapshot("c2", 400, 1_000)];
        let counts = HashMap::from([("c1".to_string(), 2), ("c2".to_string(), 1)]);

        let (kept, rejected) = apply_caps(eligible, &counts, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].campaign.campaign_id, "c2");
        assert_eq!(rejected, vec![Rejection::new("c1", RejectionReason::FrequencyCapped)]);
    }

    #[test]
    fn test_absent_state_counts_as_zero() {
        let eligible = vec![cpc_snapshot("c1", 400, 1_000)];
        let (kept, rejected) = apply_caps(eligible, &HashMap::new(), 1);
        assert_eq!(kept.len(), 1);
        assert!(rejected.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_lets_everything_through() {
        let filter = FrequencyFilter::new(Arc::new(FailingStore));
        let eligible = vec![cpc_snapshot("c1", 400, 1_000)];
        let (kept, rejected) = filter
            .filter(eligible, "v1", "compare-cpc", 1, Duration::hours(24), ts(5, 12))
            .await;
        assert_eq!(kept.len(), 1);
        assert!(rejected.is_empty());
    }
}
