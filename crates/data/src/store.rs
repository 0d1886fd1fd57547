//! `SQLite` implementation of the engine's store traits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use placement_core::{
    AllocationDecision, BrokerDirectory, BrokerRef, Campaign, CampaignCatalog, CampaignSnapshot,
    CampaignStatus, ChargeEvent, ChargeOutcome, DecisionAggregates, DecisionFilter, DecisionLog,
    DecisionPage, FrequencyState, FrequencyStore, LedgerEntry, LifecycleSweep, PageRequest,
    PendingCharge, Reconciliation, StoreError, Wallet, WalletCredit, WalletLedger,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::Database;
use crate::error::DataResult;
use crate::repositories::{Repositories, Transition};

/// All engine state behind one `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
    repos: Repositories,
}

impl SqliteStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        let repos = Repositories::new(db.pool().clone());
        Self { db, repos }
    }

    /// Opens a file-backed store.
    ///
    /// # Errors
    /// Returns error if the connection or migrations fail.
    pub async fn connect(database_url: &str, max_connections: u32) -> DataResult<Self> {
        Ok(Self::new(Database::connect(database_url, max_connections).await?))
    }

    /// Opens a migrated in-memory store.
    ///
    /// # Errors
    /// Returns error if the connection or migrations fail.
    pub async fn in_memory() -> DataResult<Self> {
        Ok(Self::new(Database::in_memory().await?))
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Direct repository access for catalog owners and fixtures.
    #[must_use]
    pub fn repos(&self) -> &Repositories {
        &self.repos
    }
}

#[async_trait]
impl CampaignCatalog for SqliteStore {
    async fn snapshots_for_placement(&self, placement: &str) -> Result<Vec<CampaignSnapshot>, StoreError> {
        Ok(self.repos.campaigns.snapshots_for_placement(placement).await?)
    }

    async fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>, StoreError> {
        Ok(self.repos.campaigns.get(campaign_id).await?)
    }

    async fn mark_won(&self, campaign_ids: &[String], at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(self.repos.campaigns.mark_won(campaign_ids, at).await?)
    }

    async fn transition(
        &self,
        campaign_id: &str,
        to: CampaignStatus,
        at: DateTime<Utc>,
    ) -> Result<Campaign, StoreError> {
        match self.repos.campaigns.transition(campaign_id, to, at).await? {
            Transition::Applied(campaign) => Ok(campaign),
            Transition::Invalid { from } => Err(StoreError::InvalidTransition { from, to }),
            Transition::Missing => Err(StoreError::not_found("campaign", campaign_id)),
        }
    }

    async fn advance_lifecycle(&self, now: DateTime<Utc>) -> Result<LifecycleSweep, StoreError> {
        Ok(self.repos.campaigns.advance_lifecycle(now).await?)
    }
}

#[async_trait]
impl WalletLedger for SqliteStore {
    async fn apply_charge(&self, event: &ChargeEvent, now: DateTime<Utc>) -> Result<ChargeOutcome, StoreError> {
        Ok(self.repos.ledger.apply_charge(event, now).await?)
    }

    async fn credit(&self, credit: &WalletCredit, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.repos.ledger.credit(credit, now).await?)
    }

    async fn wallet(&self, broker_id: &str) -> Result<Option<Wallet>, StoreError> {
        Ok(self.repos.ledger.wallet(broker_id).await?)
    }

    async fn entries_for_campaign(&self, campaign_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.repos.ledger.entries_for_campaign(campaign_id).await?)
    }

    async fn reconcile_campaign(&self, campaign_id: &str) -> Result<Reconciliation, StoreError> {
        self.repos
            .ledger
            .reconcile_campaign(campaign_id)
            .await?
            .ok_or_else(|| StoreError::not_found("campaign", campaign_id))
    }

    async fn force_pause(&self, campaign_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.repos.campaigns.force_pause(campaign_id, at).await? {
            Ok(())
        } else {
            Err(StoreError::not_found("campaign", campaign_id))
        }
    }

    async fn roll_billing_day(&self, today: NaiveDate, at: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.repos.campaigns.roll_billing_day(today, at).await?)
    }

    async fn enqueue_pending(&self, event: &ChargeEvent, error: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(self.repos.pending.enqueue(event, error, now).await?)
    }

    async fn pending_charges(&self, limit: i64) -> Result<Vec<PendingCharge>, StoreError> {
        Ok(self.repos.pending.unresolved(limit).await?)
    }

    async fn resolve_pending(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(self.repos.pending.resolve(id, at).await?)
    }

    async fn bump_pending(&self, id: i64, error: &str) -> Result<(), StoreError> {
        Ok(self.repos.pending.bump(id, error).await?)
    }
}

#[async_trait]
impl FrequencyStore for SqliteStore {
    async fn counts(
        &self,
        visitor_key: &str,
        placement: &str,
        campaign_ids: &[String],
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<HashMap<String, u32>, StoreError> {
        Ok(self
            .repos
            .frequency
            .counts(visitor_key, placement, campaign_ids, now, window)
            .await?)
    }

    async fn record_impression(
        &self,
        event_key: &str,
        visitor_key: &str,
        placement: &str,
        campaign_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Option<FrequencyState>, StoreError> {
        Ok(self
            .repos
            .frequency
            .record_impression(event_key, visitor_key, placement, campaign_id, now, window)
            .await?)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.repos.frequency.purge_expired(before).await?)
    }
}

#[async_trait]
impl DecisionLog for SqliteStore {
    async fn append(&self, decision: &AllocationDecision) -> Result<(), StoreError> {
        Ok(self.repos.decisions.append(decision).await?)
    }

    async fn list(&self, filter: &DecisionFilter, page: PageRequest) -> Result<DecisionPage, StoreError> {
        Ok(self.repos.decisions.list(filter, page).await?)
    }

    async fn aggregates(&self, filter: &DecisionFilter) -> Result<DecisionAggregates, StoreError> {
        Ok(self.repos.decisions.aggregates(filter).await?)
    }

    async fn get(&self, decision_id: Uuid) -> Result<Option<AllocationDecision>, StoreError> {
        Ok(self.repos.decisions.get(decision_id).await?)
    }
}

#[async_trait]
impl BrokerDirectory for SqliteStore {
    async fn organic_brokers(&self) -> Result<Vec<BrokerRef>, StoreError> {
        Ok(self.repos.brokers.organic().await?)
    }
}
