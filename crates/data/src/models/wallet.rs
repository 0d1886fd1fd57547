use super::from_millis;
use crate::error::{DataError, DataResult};
use placement_core::{BrokerRef, Wallet};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct WalletRow {
    pub broker_id: String,
    pub balance_cents: i64,
    pub reserved_cents: i64,
    pub updated_at: i64,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = DataError;

    fn try_from(row: WalletRow) -> DataResult<Self> {
        Ok(Self {
            broker_id: row.broker_id,
            balance_cents: row.balance_cents,
            reserved_cents: row.reserved_cents,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BrokerRow {
    pub broker_id: String,
    pub name: String,
    pub slug: String,
    pub sponsorship_tier: String,
    pub rating: f64,
}

impl TryFrom<BrokerRow> for BrokerRef {
    type Error = DataError;

    fn try_from(row: BrokerRow) -> DataResult<Self> {
        Ok(Self {
            sponsorship_tier: row.sponsorship_tier.parse()?,
            broker_id: row.broker_id,
            name: row.name,
            slug: row.slug,
            rating: row.rating,
        })
    }
}
