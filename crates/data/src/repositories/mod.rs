//! Database repositories for the placement engine.
//!
//! Each repository provides typed access to one table or, for the ledger, to
//! the wallet/campaign/ledger trio it mutates atomically.

pub mod broker_repo;
pub mod campaign_repo;
pub mod decision_repo;
pub mod frequency_repo;
pub mod ledger_repo;
pub mod pending_repo;

pub use broker_repo::BrokerRepository;
pub use campaign_repo::{CampaignRepository, Transition};
pub use decision_repo::DecisionRepository;
pub use frequency_repo::FrequencyRepository;
pub use ledger_repo::LedgerRepository;
pub use pending_repo::PendingChargeRepository;

use sqlx::SqlitePool;

/// Creates all repositories from a single database pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub brokers: BrokerRepository,
    pub campaigns: CampaignRepository,
    pub decisions: DecisionRepository,
    pub frequency: FrequencyRepository,
    pub ledger: LedgerRepository,
    pub pending: PendingChargeRepository,
}

impl Repositories {
    /// Creates a new set of repositories from a database pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            brokers: BrokerRepository::new(pool.clone()),
            campaigns: CampaignRepository::new(pool.clone()),
            decisions: DecisionRepository::new(pool.clone()),
            frequency: FrequencyRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            pending: PendingChargeRepository::new(pool),
        }
    }
}
