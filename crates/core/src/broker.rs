//! Brokers, wallets, and sponsorship tiers.

use crate::campaign::ParseEnumError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sponsorship level a broker has bought. Ranked by configured weight.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SponsorshipTier {
    #[default]
    None,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl SponsorshipTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

impl fmt::Display for SponsorshipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SponsorshipTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(Self::None),
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "platinum" => Ok(Self::Platinum),
            other => Err(ParseEnumError::new("sponsorship tier", other)),
        }
    }
}

/// A broker as shown in organic listings and fallback rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerRef {
    pub broker_id: String,
    pub name: String,
    pub slug: String,
    pub sponsorship_tier: SponsorshipTier,
    /// Editorial rating, 0.0 to 5.0.
    pub rating: f64,
}

/// Per-broker prepaid balance.
///
/// `balance_cents` is never negative; every change is paired with a
/// ledger entry written in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub broker_id: String,
    pub balance_cents: i64,
    /// Soft hold for in-flight charges.
    pub reserved_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Balance not covered by a soft hold.
    #[must_use]
    pub fn available_cents(&self) -> i64 {
        (self.balance_cents - self.reserved_cents).max(0)
    }

    /// Returns true if the wallet can cover `amount_cents`.
    #[must_use]
    pub fn covers(&self, amount_cents: i64) -> bool {
        self.available_cents() >= amount_cents
    }
}
