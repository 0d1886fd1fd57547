//! Error types shared across the store boundary.
//!
//! Business outcomes (rejections, exhausted budgets, caps) never travel as
//! errors. `StoreError` covers infrastructure failures and integrity faults.

use crate::campaign::CampaignStatus;
use thiserror::Error;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store cannot be reached or is busy.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Operation did not finish in time.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of row.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Requested status change is not a lifecycle edge.
    #[error("invalid campaign transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: CampaignStatus,
        /// Requested status.
        to: CampaignStatus,
    },

    /// Spend or balance state broke an invariant.
    #[error("integrity violation on campaign {campaign_id}: {detail}")]
    IntegrityViolation {
        /// Campaign whose state is inconsistent.
        campaign_id: String,
        /// What was detected.
        detail: String,
    },

    /// Request was malformed or would break a balance rule.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an integrity violation error.
    pub fn integrity(campaign_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            campaign_id: campaign_id.into(),
            detail: detail.into(),
        }
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}
