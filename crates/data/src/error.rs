//! Persistence errors and their mapping onto `StoreError`.

use placement_core::{ParseEnumError, StoreError};
use thiserror::Error;

/// SQLite result codes that mean the database is busy or locked.
///
/// `SQLITE_BUSY` (5), `SQLITE_LOCKED` (6) and their extended forms.
const BUSY_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

#[derive(Debug, Error)]
pub enum DataError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column held a value the domain types reject.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("integrity violation on campaign {campaign_id}: {detail}")]
    Integrity { campaign_id: String, detail: String },

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl DataError {
    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode(detail.into())
    }

    pub fn integrity(campaign_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Integrity {
            campaign_id: campaign_id.into(),
            detail: detail.into(),
        }
    }

    /// Returns true if the error is SQLite reporting a busy or locked database.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| BUSY_CODES.contains(&code.as_ref()))
                    || db.message().contains("database is locked")
            }
            _ => false,
        }
    }
}

impl From<ParseEnumError> for DataError {
    fn from(err: ParseEnumError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<DataError> for StoreError {
    fn from(err: DataError) -> Self {
        if err.is_busy() {
            return Self::Unavailable(err.to_string());
        }
        match err {
            DataError::Sqlx(sqlx::Error::PoolTimedOut) => Self::Timeout("connection pool".to_string()),
            DataError::Sqlx(
                e @ (sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed),
            ) => Self::Unavailable(e.to_string()),
            DataError::Sqlx(e) => Self::Database(e.to_string()),
            DataError::Migrate(e) => Self::Database(e.to_string()),
            DataError::Json(e) => Self::Corrupt(e.to_string()),
            DataError::Decode(detail) => Self::Corrupt(detail),
            DataError::Integrity {
                campaign_id,
                detail,
            } => Self::IntegrityViolation {
                campaign_id,
                detail,
            },
            DataError::Invalid(detail) => Self::InvalidInput(detail),
        }
    }
}

pub type DataResult<T> = Result<T, DataError>;
