use crate::allocation::CampaignSnapshot;
use crate::broker::{BrokerRef, Wallet};
use crate::campaign::{Campaign, CampaignStatus};
use crate::decision::{AllocationDecision, DecisionAggregates, DecisionFilter, DecisionPage, PageRequest};
use crate::error::StoreError;
use crate::frequency::FrequencyState;
use crate::ledger::{
    ChargeEvent, ChargeOutcome, LedgerEntry, PendingCharge, Reconciliation, WalletCredit,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Counts of campaigns moved by a lifecycle sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleSweep {
    pub activated: u64,
    pub completed: u64,
}

/// Read access to campaigns plus the engine-owned status writes.
#[async_trait]
pub trait CampaignCatalog: Send + Sync {
    /// Non-terminal campaigns targeting `placement`, joined with wallet and tier.
    async fn snapshots_for_placement(&self, placement: &str) -> Result<Vec<CampaignSnapshot>, StoreError>;

    async fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>, StoreError>;

    /// Stamps `last_won_at` for the given winners.
    async fn mark_won(&self, campaign_ids: &[String], at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Applies a validated status change.
    async fn transition(&self, campaign_id: &str, to: CampaignStatus, at: DateTime<Utc>) -> Result<Campaign, StoreError>;

    /// Activates due campaigns and completes expired ones.
    async fn advance_lifecycle(&self, now: DateTime<Utc>) -> Result<LifecycleSweep, StoreError>;
}

/// Wallet balances and the append-only ledger.
#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// Runs the atomic charge transaction.
    ///
    /// A successful featured fee also extends `featured_paid_until` to the
    /// start of the next calendar month.
    async fn apply_charge(&self, event: &ChargeEvent, now: DateTime<Utc>) -> Result<ChargeOutcome, StoreError>;

    /// Credits a wallet. Returns false if the idempotency key was already used.
    async fn credit(&self, credit: &WalletCredit, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn wallet(&self, broker_id: &str) -> Result<Option<Wallet>, StoreError>;

    async fn entries_for_campaign(&self, campaign_id: &str) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn reconcile_campaign(&self, campaign_id: &str) -> Result<Reconciliation, StoreError>;

    /// Pauses a campaign pending manual review.
    async fn force_pause(&self, campaign_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Zeroes stale daily counters and reactivates campaigns exhausted only by the daily cap.
    async fn roll_billing_day(&self, today: NaiveDate, at: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn enqueue_pending(&self, event: &ChargeEvent, error: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn pending_charges(&self, limit: i64) -> Result<Vec<PendingCharge>, StoreError>;

    async fn resolve_pending(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn bump_pending(&self, id: i64, error: &str) -> Result<(), StoreError>;
}

/// Per-visitor impression counters.
#[async_trait]
pub trait FrequencyStore: Send + Sync {
    /// Counts within the current window, keyed by campaign id. Missing means zero.
    async fn counts(
        &self,
        visitor_key: &str,
        placement: &str,
        campaign_ids: &[String],
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<HashMap<String, u32>, StoreError>;

    /// Counts one tracking event. Returns `None` without counting if
    /// `event_key` was already seen.
    async fn record_impression(
        &self,
        event_key: &str,
        visitor_key: &str,
        placement: &str,
        campaign_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Option<FrequencyState>, StoreError>;

    /// Deletes rows whose window started before `before`, along with the
    /// event keys seen before it.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Append-only decision log with the audit read API.
#[async_trait]
pub trait DecisionLog: Send + Sync {
    async fn append(&self, decision: &AllocationDecision) -> Result<(), StoreError>;

    async fn list(&self, filter: &DecisionFilter, page: PageRequest) -> Result<DecisionPage, StoreError>;

    async fn aggregates(&self, filter: &DecisionFilter) -> Result<DecisionAggregates, StoreError>;

    async fn get(&self, decision_id: Uuid) -> Result<Option<AllocationDecision>, StoreError>;
}

/// Organic broker listings used by the fallback.
#[async_trait]
pub trait BrokerDirectory: Send + Sync {
    async fn organic_brokers(&self) -> Result<Vec<BrokerRef>, StoreError>;
}
