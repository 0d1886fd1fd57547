//! Periodic housekeeping.
//!
//! Each pass advances campaign lifecycles, rolls the billing day, purges
//! expired frequency windows, and replays parked charges. A failing step is
//! logged and the remaining steps still run.

use crate::charge::{ChargeProcessor, ReplaySummary};
use chrono::{DateTime, Duration, Utc};
use placement_core::{AppConfig, CampaignCatalog, FrequencyStore, LifecycleSweep, WalletLedger};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// What one maintenance pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub lifecycle: LifecycleSweep,
    pub reactivated: u64,
    pub purged: u64,
    pub replay: ReplaySummary,
}

#[derive(Clone)]
pub struct Maintenance {
    catalog: Arc<dyn CampaignCatalog>,
    ledger: Arc<dyn WalletLedger>,
    frequency: Arc<dyn FrequencyStore>,
    charges: ChargeProcessor,
    config: watch::Receiver<AppConfig>,
}

impl Maintenance {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CampaignCatalog>,
        ledger: Arc<dyn WalletLedger>,
        frequency: Arc<dyn FrequencyStore>,
        charges: ChargeProcessor,
        config: watch::Receiver<AppConfig>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            frequency,
            charges,
            config,
        }
    }

    /// Runs every step once.
    pub async fn run_once(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let (cutoff, replay_batch) = {
            let config = self.config.borrow();
            (now - longest_window(&config), config.maintenance.replay_batch)
        };
        let mut report = MaintenanceReport::default();

        match self.catalog.advance_lifecycle(now).await {
            Ok(sweep) => report.lifecycle = sweep,
            Err(e) => error!(error = %e, "lifecycle sweep failed"),
        }
        match self.ledger.roll_billing_day(now.date_naive(), now).await {
            Ok(count) => report.reactivated = count,
            Err(e) => error!(error = %e, "billing day roll failed"),
        }
        match self.frequency.purge_expired(cutoff).await {
            Ok(count) => report.purged = count,
            Err(e) => error!(error = %e, "frequency purge failed"),
        }
        match self.charges.replay_pending(replay_batch, now).await {
            Ok(summary) => report.replay = summary,
            Err(e) => error!(error = %e, "pending charge replay failed"),
        }

        if report != MaintenanceReport::default() {
            info!(
                activated = report.lifecycle.activated,
                completed = report.lifecycle.completed,
                reactivated = report.reactivated,
                purged = report.purged,
                replayed = report.replay.applied,
                "maintenance pass"
            );
        }
        report
    }

    /// Runs a pass every `maintenance.interval_secs` until the task is aborted.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let secs = self.config.borrow().maintenance.interval_secs.max(1);
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = secs, "maintenance task started");
            loop {
                interval.tick().await;
                self.run_once(Utc::now()).await;
            }
        })
    }
}

/// Longest frequency window in use; rows older than this are dead everywhere.
fn longest_window(config: &AppConfig) -> Duration {
    let allocation = &config.allocation;
    allocation
        .placements
        .iter()
        .map(|p| allocation.placement(&p.slug).frequency_window)
        .fold(
            allocation.placement("").frequency_window,
            std::cmp::max,
        )
}
