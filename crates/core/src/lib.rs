//! Core domain for the placement allocation engine.
//!
//! This crate provides:
//! - Campaign, wallet, ledger, decision, and frequency types
//! - Store traits implemented by the persistence crate
//! - Typed store errors
//! - Configuration loading and hot reload

pub mod allocation;
pub mod broker;
pub mod campaign;
pub mod config;
pub mod config_loader;
pub mod config_watcher;
pub mod decision;
pub mod error;
pub mod frequency;
pub mod ledger;
pub mod traits;

pub use allocation::{
    AllocationRequest, AllocationResponse, CampaignSnapshot, EventKind, TrackingEvent,
    TrackingResponse, Winner,
};
pub use broker::{BrokerRef, SponsorshipTier, Wallet};
pub use campaign::{BillingModel, BudgetCap, Campaign, CampaignStatus, ParseEnumError};
pub use config::{
    AllocationConfig, AppConfig, AuditConfig, ChargeConfig, DatabaseConfig, MaintenanceConfig,
    PlacementConfig, PlacementKind, RankingPolicy, RecorderConfig, ResolvedPlacement,
    ServerConfig, TierWeights,
};
pub use config_loader::ConfigLoader;
pub use config_watcher::ConfigWatcher;
pub use decision::{
    AllocationDecision, CandidateRecord, DecisionAggregates, DecisionFilter, DecisionPage,
    FallbackResult, PageRequest, Rejection, RejectionReason, DECISION_SCHEMA_VERSION,
};
pub use error::StoreError;
pub use frequency::FrequencyState;
pub use ledger::{
    billing_period, billing_period_end, featured_fee_key, ChargeEvent, ChargeKind, ChargeOutcome,
    ChargeRejection, CreditReason, LedgerEntry, LedgerReason, PendingCharge, Reconciliation,
    WalletCredit,
};
pub use traits::{
    BrokerDirectory, CampaignCatalog, DecisionLog, FrequencyStore, LifecycleSweep, WalletLedger,
};
