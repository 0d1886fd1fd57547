//! Persistence for the placement allocation engine.
//!
//! This crate provides:
//! - `SQLite` connection setup with embedded migrations
//! - Row models for campaigns, wallets, the ledger, decisions, and frequency counters
//! - Repositories for typed database access
//! - `SqliteStore`, implementing every store trait from `placement-core`

pub mod database;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use database::Database;
pub use error::{DataError, DataResult};
pub use repositories::{
    BrokerRepository, CampaignRepository, DecisionRepository, FrequencyRepository,
    LedgerRepository, PendingChargeRepository, Repositories, Transition,
};
pub use store::SqliteStore;
