//! Row types for the placement tables.
//!
//! Timestamps are stored as epoch milliseconds and enums as their snake_case
//! strings. Each row converts into its domain type with `TryFrom`, failing
//! with `DataError::Decode` on values the domain rejects.

pub mod campaign;
pub mod decision;
pub mod ledger;
pub mod wallet;

pub use campaign::{CampaignRow, SnapshotRow, CAMPAIGN_COLUMNS};
pub use decision::DecisionRow;
pub use ledger::{kind_str, FrequencyRow, LedgerRow, PendingRow};
pub use wallet::{BrokerRow, WalletRow};

use crate::error::{DataError, DataResult};
use chrono::{DateTime, NaiveDate, Utc};

/// Day format used for `campaigns.spend_day`.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

#[must_use]
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// # Errors
/// Returns `DataError::Decode` if `millis` is outside chrono's range.
pub fn from_millis(millis: i64) -> DataResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DataError::decode(format!("timestamp out of range: {millis}")))
}

/// # Errors
/// Returns `DataError::Decode` if `millis` is outside chrono's range.
pub fn opt_from_millis(millis: Option<i64>) -> DataResult<Option<DateTime<Utc>>> {
    millis.map(from_millis).transpose()
}

#[must_use]
pub fn day_string(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// # Errors
/// Returns `DataError::Decode` if `text` is not `YYYY-MM-DD`.
pub fn parse_day(text: &str) -> DataResult<NaiveDate> {
    NaiveDate::parse_from_str(text, DAY_FORMAT)
        .map_err(|e| DataError::decode(format!("bad spend day {text:?}: {e}")))
}
