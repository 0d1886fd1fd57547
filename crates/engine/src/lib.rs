//! Placement allocation engine.
//!
//! This crate provides:
//! - Eligibility and frequency-cap filters, the auction ranker, and the fallback selector
//! - `Allocator`, the timeout-bounded allocate path
//! - `DecisionRecorder`, the asynchronous decision writer
//! - `ChargeProcessor` and `EventTracker` for impressions, clicks, and featured fees
//! - `AuditService` and the periodic `Maintenance` task

pub mod allocator;
pub mod audit;
pub mod charge;
pub mod eligibility;
pub mod fallback;
pub mod frequency;
pub mod maintenance;
pub mod ranker;
pub mod recorder;
pub mod retry;
pub mod tracking;

#[cfg(test)]
mod test_support;

pub use allocator::Allocator;
pub use audit::AuditService;
pub use charge::{ChargeError, ChargeProcessor, ReplaySummary};
pub use fallback::FallbackSelector;
pub use frequency::FrequencyFilter;
pub use maintenance::{Maintenance, MaintenanceReport};
pub use ranker::{RankedCampaign, Ranking};
pub use recorder::{DecisionRecorder, RecordError, RecorderStats};
pub use retry::Backoff;
pub use tracking::EventTracker;

use placement_core::{
    AppConfig, BrokerDirectory, CampaignCatalog, DecisionLog, FrequencyStore, WalletLedger,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Every engine component wired to one store.
#[derive(Clone)]
pub struct Engine {
    pub allocator: Allocator,
    pub tracker: EventTracker,
    pub charges: ChargeProcessor,
    pub audit: AuditService,
    pub maintenance: Maintenance,
    pub recorder: DecisionRecorder,
    pub ledger: Arc<dyn WalletLedger>,
    pub catalog: Arc<dyn CampaignCatalog>,
}

impl Engine {
    /// Builds the engine and starts the decision recorder.
    ///
    /// Must be called inside a tokio runtime. The returned handle is the
    /// recorder's worker task.
    pub fn start<S>(store: Arc<S>, config: watch::Receiver<AppConfig>) -> (Self, JoinHandle<()>)
    where
        S: CampaignCatalog + WalletLedger + FrequencyStore + DecisionLog + BrokerDirectory + 'static,
    {
        let snapshot = config.borrow().clone();
        let catalog: Arc<dyn CampaignCatalog> = store.clone();
        let ledger: Arc<dyn WalletLedger> = store.clone();
        let frequency_store: Arc<dyn FrequencyStore> = store.clone();
        let log: Arc<dyn DecisionLog> = store.clone();
        let directory: Arc<dyn BrokerDirectory> = store;

        let (recorder, recorder_task) = DecisionRecorder::spawn(Arc::clone(&log), snapshot.recorder);
        let frequency = FrequencyFilter::new(Arc::clone(&frequency_store));
        let charges = ChargeProcessor::new(Arc::clone(&ledger), Arc::clone(&catalog), &snapshot.charge);

        let engine = Self {
            allocator: Allocator::new(
                Arc::clone(&catalog),
                frequency.clone(),
                FallbackSelector::new(directory),
                recorder.clone(),
                config.clone(),
            ),
            tracker: EventTracker::new(frequency, charges.clone(), config.clone()),
            audit: AuditService::new(log, snapshot.audit),
            maintenance: Maintenance::new(
                Arc::clone(&catalog),
                Arc::clone(&ledger),
                frequency_store,
                charges.clone(),
                config,
            ),
            charges,
            recorder,
            ledger,
            catalog,
        };
        (engine, recorder_task)
    }
}
