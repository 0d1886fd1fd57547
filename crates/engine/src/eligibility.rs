//! Eligibility filter.
//!
//! A pure function of the catalog snapshot and `now`. Checks run in a fixed
//! order and the first failing check is the recorded reason, so the same
//! snapshot always yields the same eligible set and the same rejections.

use chrono::{DateTime, Utc};
use placement_core::{BillingModel, CampaignSnapshot, CampaignStatus, Rejection, RejectionReason};

/// Campaigns that passed, and one rejection per campaign that did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityOutcome {
    pub eligible: Vec<CampaignSnapshot>,
    pub rejected: Vec<Rejection>,
}

/// Returns the first check `snapshot` fails for `placement` at `now`.
#[must_use]
pub fn check(snapshot: &CampaignSnapshot, placement: &str, now: DateTime<Utc>) -> Option<RejectionReason> {
    let campaign = &snapshot.campaign;
    let today = now.date_naive();

    if campaign.status != CampaignStatus::Active {
        return Some(RejectionReason::NotActive);
    }
    if !campaign.is_running_at(now) {
        return Some(RejectionReason::DateOutOfRange);
    }
    if campaign.placement_slug != placement {
        return Some(RejectionReason::PlacementMismatch);
    }

    match campaign.billing_model {
        BillingModel::Cpc => {
            if campaign.daily_remaining(today).is_some_and(|left| left <= 0) {
                return Some(RejectionReason::DailyBudgetExhausted);
            }
            if campaign.total_remaining().is_some_and(|left| left <= 0) {
                return Some(RejectionReason::TotalBudgetExhausted);
            }
            if !wallet_covers(snapshot, campaign.bid_rate_cents.unwrap_or(0)) {
                return Some(RejectionReason::InsufficientWallet);
            }
        }
        // Featured wallets are only checked when a new period is due.
        BillingModel::FeaturedMonthly => {
            if !campaign.is_paid_through(now)
                && !wallet_covers(snapshot, campaign.monthly_fee_cents.unwrap_or(0))
            {
                return Some(RejectionReason::InsufficientWallet);
            }
        }
    }

    None
}

fn wallet_covers(snapshot: &CampaignSnapshot, amount_cents: i64) -> bool {
    snapshot
        .wallet_available_cents
        .is_some_and(|available| available >= amount_cents)
}

/// Splits `candidates` into eligible campaigns and rejections, preserving input order.
#[must_use]
pub fn filter(candidates: &[CampaignSnapshot], placement: &str, now: DateTime<Utc>) -> EligibilityOutcome {
    let mut outcome = EligibilityOutcome::default();
    for snapshot in candidates {
        match check(snapshot, placement, now) {
            None => outcome.eligible.push(snapshot.clone()),
            Some(reason) => outcome
                .rejected
                .push(Rejection::new(&snapshot.campaign.campaign_id, reason)),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cpc_snapshot, featured_snapshot, ts};
    use chrono::Duration;

    const PLACEMENT: &str = "compare-cpc";

    #[test]
    fn test_active_funded_campaign_is_eligible() {
        let snapshot = cpc_snapshot("c1", 400, 1_000);
        assert_eq!(check(&snapshot, PLACEMENT, ts(5, 12)), None);
    }

    #[test]
    fn test_status_checked_before_dates() {
        let mut snapshot = cpc_snapshot("c1", 400, 1_000);
        snapshot.campaign.status = CampaignStatus::Paused;
        snapshot.campaign.end_date = Some(ts(2, 0));
        assert_eq!(check(&snapshot, PLACEMENT, ts(5, 12)), Some(RejectionReason::NotActive));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let mut snapshot = cpc_snapshot("c1", 400, 1_000);
        snapshot.campaign.start_date = ts(5, 12);
        snapshot.campaign.end_date = Some(ts(6, 12));

        assert_eq!(check(&snapshot, PLACEMENT, ts(5, 12)), None);
        assert_eq!(check(&snapshot, PLACEMENT, ts(6, 12)), None);
        assert_eq!(
            check(&snapshot, PLACEMENT, ts(6, 12) + Duration::seconds(1)),
            Some(RejectionReason::DateOutOfRange)
        );
        assert_eq!(
            check(&snapshot, PLACEMENT, ts(5, 11)),
            Some(RejectionReason::DateOutOfRange)
        );
    }

    #[test]
    fn test_placement_mismatch() {
        let snapshot = cpc_snapshot("c1", 400, 1_000);
        assert_eq!(
            check(&snapshot, "home-featured", ts(5, 12)),
            Some(RejectionReason::PlacementMismatch)
        );
    }

    #[test]
    fn test_daily_cap_wins_over_total_and_wallet() {
        let now = ts(5, 12);
        let mut snapshot = cpc_snapshot("c1", 400, 0);
        snapshot.campaign.daily_budget_cents = Some(800);
        snapshot.campaign.spent_today_cents = 800;
        snapshot.campaign.spend_day = Some(now.date_naive());
        snapshot.campaign.total_budget_cents = Some(800);
        snapshot.campaign.spent_total_cents = 800;
        assert_eq!(check(&snapshot, PLACEMENT, now), Some(RejectionReason::DailyBudgetExhausted));

        // Yesterday's counter does not count today.
        snapshot.campaign.spend_day = now.date_naive().pred_opt();
        assert_eq!(check(&snapshot, PLACEMENT, now), Some(RejectionReason::TotalBudgetExhausted));

        snapshot.campaign.total_budget_cents = None;
        assert_eq!(check(&snapshot, PLACEMENT, now), Some(RejectionReason::InsufficientWallet));
    }

    #[test]
    fn test_missing_wallet_is_insufficient() {
        let mut snapshot = cpc_snapshot("c1", 400, 0);
        snapshot.wallet_available_cents = None;
        assert_eq!(check(&snapshot, PLACEMENT, ts(5, 12)), Some(RejectionReason::InsufficientWallet));
    }

    #[test]
    fn test_featured_wallet_checked_only_when_period_due() {
        let now = ts(5, 12);
        let mut snapshot = featured_snapshot("f1", 30_000, 100);
        snapshot.campaign.placement_slug = PLACEMENT.to_string();
        assert_eq!(check(&snapshot, PLACEMENT, now), Some(RejectionReason::InsufficientWallet));

        snapshot.campaign.featured_paid_until = Some(now + Duration::days(3));
        assert_eq!(check(&snapshot, PLACEMENT, now), None);
    }

    #[test]
    fn test_filter_is_deterministic() {
        let mut paused = cpc_snapshot("c2", 400, 1_000);
        paused.campaign.status = CampaignStatus::Paused;
        let candidates = vec![cpc_snapshot("c1", 400, 1_000), paused, cpc_snapshot("c3", 400, 0)];

        let first = filter(&candidates, PLACEMENT, ts(5, 12));
        let second = filter(&candidates, PLACEMENT, ts(5, 12));
        assert_eq!(first, second);
        assert_eq!(first.eligible.len(), 1);
        assert_eq!(
            first.rejected,
            vec![
                Rejection::new("c2", RejectionReason::NotActive),
                Rejection::new("c3", RejectionReason::InsufficientWallet),
            ]
        );
    }
}
