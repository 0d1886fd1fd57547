//! Fixtures and in-memory stores shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use placement_core::{
    AllocationDecision, BillingModel, BrokerDirectory, BrokerRef, Campaign, CampaignCatalog,
    CampaignSnapshot, CampaignStatus, ChargeEvent, ChargeOutcome, DecisionAggregates,
    DecisionFilter, DecisionLog, DecisionPage, FrequencyState, FrequencyStore, LedgerEntry,
    LifecycleSweep, PageRequest, PendingCharge, Reconciliation, SponsorshipTier, StoreError,
    Wallet, WalletCredit, WalletLedger, DECISION_SCHEMA_VERSION,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// `day` March 2026 at `hour`:00 UTC.
pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn campaign(campaign_id: &str, placement: &str, billing_model: BillingModel) -> Campaign {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Campaign {
        campaign_id: campaign_id.to_string(),
        broker_id: format!("broker-{campaign_id}"),
        placement_slug: placement.to_string(),
        status: CampaignStatus::Active,
        billing_model,
        bid_rate_cents: None,
        monthly_fee_cents: None,
        daily_budget_cents: None,
        total_budget_cents: None,
        spent_total_cents: 0,
        spent_today_cents: 0,
        spend_day: None,
        start_date: start,
        end_date: None,
        last_won_at: None,
        featured_paid_until: None,
        flagged_for_review: false,
        created_at: start,
        updated_at: start,
    }
}

/// Active CPC campaign on `compare-cpc` with no budget caps.
pub fn cpc_snapshot(campaign_id: &str, bid_cents: i64, wallet_cents: i64) -> CampaignSnapshot {
    let mut campaign = campaign(campaign_id, "compare-cpc", BillingModel::Cpc);
    campaign.bid_rate_cents = Some(bid_cents);
    CampaignSnapshot {
        campaign,
        wallet_available_cents: Some(wallet_cents),
        sponsorship_tier: SponsorshipTier::None,
    }
}

/// Active featured campaign on `home-featured`, not yet paid for this period.
pub fn featured_snapshot(campaign_id: &str, fee_cents: i64, wallet_cents: i64) -> CampaignSnapshot {
    let mut campaign = campaign(campaign_id, "home-featured", BillingModel::FeaturedMonthly);
    campaign.monthly_fee_cents = Some(fee_cents);
    CampaignSnapshot {
        campaign,
        wallet_available_cents: Some(wallet_cents),
        sponsorship_tier: SponsorshipTier::None,
    }
}

pub fn broker(broker_id: &str, name: &str, tier: SponsorshipTier, rating: f64) -> BrokerRef {
    BrokerRef {
        broker_id: broker_id.to_string(),
        name: name.to_string(),
        slug: name.to_lowercase(),
        sponsorship_tier: tier,
        rating,
    }
}

/// An empty fallback decision for `placement`.
pub fn decision(placement: &str) -> AllocationDecision {
    AllocationDecision {
        decision_id: Uuid::new_v4(),
        schema_version: DECISION_SCHEMA_VERSION,
        placement_slug: placement.to_string(),
        visitor_key: "v1".to_string(),
        page_path: "/".to_string(),
        created_at: ts(5, 12),
        candidates: Vec::new(),
        winners: Vec::new(),
        rejection_log: Vec::new(),
        fallback_used: true,
        fallback: None,
        duration_ms: 1.0,
    }
}

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("store offline".to_string()))
}

/// A store whose every call fails with `Unavailable`.
pub struct FailingStore;

#[async_trait]
impl CampaignCatalog for FailingStore {
    async fn snapshots_for_placement(&self, _placement: &str) -> Result<Vec<CampaignSnapshot>, StoreError> {
        unavailable()
    }

    async fn campaign(&self, _campaign_id: &str) -> Result<Option<Campaign>, StoreError> {
        unavailable()
    }

    async fn mark_won(&self, _campaign_ids: &[String], _at: DateTime<Utc>) -> Result<(), StoreError> {
        unavailable()
    }

    async fn transition(&self, _campaign_id: &str, _to: CampaignStatus, _at: DateTime<Utc>) -> Result<Campaign, StoreError> {
        unavailable()
    }

    async fn advance_lifecycle(&self, _now: DateTime<Utc>) -> Result<LifecycleSweep, StoreError> {
        unavailable()
    }
}

#[async_trait]
impl WalletLedger for FailingStore {
    async fn apply_charge(&self, _event: &ChargeEvent, _now: DateTime<Utc>) -> Result<ChargeOutcome, StoreError> {
        unavailable()
    }

    async fn credit(&self, _credit: &WalletCredit, _now: DateTime<Utc>) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn wallet(&self, _broker_id: &str) -> Result<Option<Wallet>, StoreError> {
        unavailable()
    }

    async fn entries_for_campaign(&self, _campaign_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        unavailable()
    }

    async fn reconcile_campaign(&self, _campaign_id: &str) -> Result<Reconciliation, StoreError> {
        unavailable()
    }

    async fn force_pause(&self, _campaign_id: &str, _at: DateTime<Utc>) -> Result<(), StoreError> {
        unavailable()
    }

    async fn roll_billing_day(&self, _today: NaiveDate, _at: DateTime<Utc>) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn enqueue_pending(&self, _event: &ChargeEvent, _error: &str, _now: DateTime<Utc>) -> Result<(), StoreError> {
        unavailable()
    }

    async fn pending_charges(&self, _limit: i64) -> Result<Vec<PendingCharge>, StoreError> {
        unavailable()
    }

    async fn resolve_pending(&self, _id: i64, _at: DateTime<Utc>) -> Result<(), StoreError> {
        unavailable()
    }

    async fn bump_pending(&self, _id: i64, _error: &str) -> Result<(), StoreError> {
        unavailable()
    }
}

#[async_trait]
impl FrequencyStore for FailingStore {
    async fn counts(
        &self,
        _visitor_key: &str,
        _placement: &str,
        _campaign_ids: &[String],
        _now: DateTime<Utc>,
        _window: Duration,
    ) -> Result<HashMap<String, u32>, StoreError> {
        unavailable()
    }

    async fn record_impression(
        &self,
        _event_key: &str,
        _visitor_key: &str,
        _placement: &str,
        _campaign_id: &str,
        _now: DateTime<Utc>,
        _window: Duration,
    ) -> Result<Option<FrequencyState>, StoreError> {
        unavailable()
    }

    async fn purge_expired(&self, _before: DateTime<Utc>) -> Result<u64, StoreError> {
        unavailable()
    }
}

#[async_trait]
impl DecisionLog for FailingStore {
    async fn append(&self, _decision: &AllocationDecision) -> Result<(), StoreError> {
        unavailable()
    }

    async fn list(&self, _filter: &DecisionFilter, _page: PageRequest) -> Result<DecisionPage, StoreError> {
        unavailable()
    }

    async fn aggregates(&self, _filter: &DecisionFilter) -> Result<DecisionAggregates, StoreError> {
        unavailable()
    }

    async fn get(&self, _decision_id: Uuid) -> Result<Option<AllocationDecision>, StoreError> {
        unavailable()
    }
}

#[async_trait]
impl BrokerDirectory for FailingStore {
    async fn organic_brokers(&self) -> Result<Vec<BrokerRef>, StoreError> {
        unavailable()
    }
}

/// A catalog and broker directory that never answer.
pub struct SlowStore;

async fn hang<T>() -> Result<T, StoreError> {
    tokio::time::sleep(std::time::Duration::from_secs(3_600)).await;
    unavailable()
}

#[async_trait]
impl CampaignCatalog for SlowStore {
    async fn snapshots_for_placement(&self, _placement: &str) -> Result<Vec<CampaignSnapshot>, StoreError> {
        hang().await
    }

    async fn campaign(&self, _campaign_id: &str) -> Result<Option<Campaign>, StoreError> {
        hang().await
    }

    async fn mark_won(&self, _campaign_ids: &[String], _at: DateTime<Utc>) -> Result<(), StoreError> {
        hang().await
    }

    async fn transition(&self, _campaign_id: &str, _to: CampaignStatus, _at: DateTime<Utc>) -> Result<Campaign, StoreError> {
        hang().await
    }

    async fn advance_lifecycle(&self, _now: DateTime<Utc>) -> Result<LifecycleSweep, StoreError> {
        hang().await
    }
}

#[async_trait]
impl BrokerDirectory for SlowStore {
    async fn organic_brokers(&self) -> Result<Vec<BrokerRef>, StoreError> {
        hang().await
    }
}

/// A ledger that is down for charges but still accepts the pending queue.
#[derive(Default)]
pub struct QueueOnlyStore {
    queued: Mutex<Vec<ChargeEvent>>,
}

impl QueueOnlyStore {
    pub fn queued(&self) -> Vec<ChargeEvent> {
        self.queued.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletLedger for QueueOnlyStore {
    async fn apply_charge(&self, _event: &ChargeEvent, _now: DateTime<Utc>) -> Result<ChargeOutcome, StoreError> {
        unavailable()
    }

    async fn credit(&self, _credit: &WalletCredit, _now: DateTime<Utc>) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn wallet(&self, _broker_id: &str) -> Result<Option<Wallet>, StoreError> {
        unavailable()
    }

    async fn entries_for_campaign(&self, _campaign_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        unavailable()
    }

    async fn reconcile_campaign(&self, _campaign_id: &str) -> Result<Reconciliation, StoreError> {
        unavailable()
    }

    async fn force_pause(&self, _campaign_id: &str, _at: DateTime<Utc>) -> Result<(), StoreError> {
        unavailable()
    }

    async fn roll_billing_day(&self, _today: NaiveDate, _at: DateTime<Utc>) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn enqueue_pending(&self, event: &ChargeEvent, _error: &str, _now: DateTime<Utc>) -> Result<(), StoreError> {
        self.queued.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn pending_charges(&self, _limit: i64) -> Result<Vec<PendingCharge>, StoreError> {
        unavailable()
    }

    async fn resolve_pending(&self, _id: i64, _at: DateTime<Utc>) -> Result<(), StoreError> {
        unavailable()
    }

    async fn bump_pending(&self, _id: i64, _error: &str) -> Result<(), StoreError> {
        unavailable()
    }
}

/// In-memory decision log that can fail its first few appends.
#[derive(Default)]
pub struct MemoryLog {
    decisions: Mutex<Vec<AllocationDecision>>,
    failures_left: AtomicU32,
}

impl MemoryLog {
    pub fn failing_first(failures: u32) -> Self {
        Self {
            decisions: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(failures),
        }
    }

    pub fn len(&self) -> usize {
        self.decisions.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionLog for MemoryLog {
    async fn append(&self, decision: &AllocationDecision) -> Result<(), StoreError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return unavailable();
        }
        self.decisions.lock().unwrap().push(decision.clone());
        Ok(())
    }

    async fn list(&self, filter: &DecisionFilter, page: PageRequest) -> Result<DecisionPage, StoreError> {
        let mut matching: Vec<AllocationDecision> = self
            .decisions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| filter.placement.as_ref().map_or(true, |p| &d.placement_slug == p))
            .filter(|d| filter.from.map_or(true, |from| d.created_at >= from))
            .filter(|d| filter.to.map_or(true, |to| d.created_at < to))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total_count = i64::try_from(matching.len()).unwrap();
        let offset = usize::try_from(page.offset()).unwrap();
        let decisions = matching
            .into_iter()
            .skip(offset)
            .take(page.page_size as usize)
            .collect();
        Ok(DecisionPage {
            decisions,
            total_count,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn aggregates(&self, _filter: &DecisionFilter) -> Result<DecisionAggregates, StoreError> {
        let decisions = self.decisions.lock().unwrap();
        let total = i64::try_from(decisions.len()).unwrap();
        Ok(DecisionAggregates {
            total,
            with_winners: i64::try_from(decisions.iter().filter(|d| !d.winners.is_empty()).count()).unwrap(),
            fallback_count: i64::try_from(decisions.iter().filter(|d| d.fallback_used).count()).unwrap(),
            avg_duration_ms: if total == 0 {
                0.0
            } else {
                decisions.iter().map(|d| d.duration_ms).sum::<f64>() / total as f64
            },
        })
    }

    async fn get(&self, decision_id: Uuid) -> Result<Option<AllocationDecision>, StoreError> {
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.decision_id == decision_id)
            .cloned())
    }
}
