//! Rolling per-visitor impression counters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Impressions of one campaign in one placement for one visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyState {
    pub visitor_key: String,
    pub placement_slug: String,
    pub campaign_id: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl FrequencyState {
    /// Count that still applies at `now`; an expired window reads as zero.
    #[must_use]
    pub fn count_at(&self, now: DateTime<Utc>, window: Duration) -> u32 {
        if now - self.window_start >= window {
            0
        } else {
            self.count
        }
    }

    /// Applies one impression at `now`, opening a new window if the old one lapsed.
    pub fn record(&mut self, now: DateTime<Utc>, window: Duration) {
        if now - self.window_start >= window {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count = self.count.saturating_add(1);
        }
    }
}
