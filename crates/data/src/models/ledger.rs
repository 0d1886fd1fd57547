use super::from_millis;
use crate::error::{DataError, DataResult};
use placement_core::{ChargeEvent, ChargeKind, FrequencyState, LedgerEntry, PendingCharge};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct LedgerRow {
    pub entry_id: String,
    pub broker_id: String,
    pub campaign_id: Option<String>,
    pub delta_cents: i64,
    pub reason: String,
    pub idempotency_key: String,
    pub created_at: i64,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DataError;

    fn try_from(row: LedgerRow) -> DataResult<Self> {
        Ok(Self {
            entry_id: Uuid::parse_str(&row.entry_id)
                .map_err(|e| DataError::decode(format!("bad entry id {}: {e}", row.entry_id)))?,
            reason: row.reason.parse()?,
            created_at: from_millis(row.created_at)?,
            broker_id: row.broker_id,
            campaign_id: row.campaign_id,
            delta_cents: row.delta_cents,
            idempotency_key: row.idempotency_key,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PendingRow {
    pub id: i64,
    pub campaign_id: String,
    pub broker_id: String,
    pub amount_cents: i64,
    pub idempotency_key: String,
    pub kind: String,
    pub last_error: String,
    pub attempts: i64,
    pub queued_at: i64,
}

#[must_use]
pub const fn kind_str(kind: ChargeKind) -> &'static str {
    kind.ledger_reason().as_str()
}

fn parse_kind(text: &str) -> DataResult<ChargeKind> {
    match text {
        "cpc_click" => Ok(ChargeKind::CpcClick),
        "featured_fee" => Ok(ChargeKind::FeaturedFee),
        other => Err(DataError::decode(format!("unknown charge kind: {other}"))),
    }
}

impl TryFrom<PendingRow> for PendingCharge {
    type Error = DataError;

    fn try_from(row: PendingRow) -> DataResult<Self> {
        Ok(Self {
            id: row.id,
            event: ChargeEvent {
                kind: parse_kind(&row.kind)?,
                campaign_id: row.campaign_id,
                broker_id: row.broker_id,
                amount_cents: row.amount_cents,
                idempotency_key: row.idempotency_key,
            },
            last_error: row.last_error,
            attempts: row.attempts,
            queued_at: from_millis(row.queued_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FrequencyRow {
    pub visitor_key: String,
    pub placement_slug: String,
    pub campaign_id: String,
    pub count: i64,
    pub window_start: i64,
}

impl TryFrom<FrequencyRow> for FrequencyState {
    type Error = DataError;

    fn try_from(row: FrequencyRow) -> DataResult<Self> {
        Ok(Self {
            count: u32::try_from(row.count)
                .map_err(|_| DataError::decode(format!("bad frequency count {}", row.count)))?,
            window_start: from_millis(row.window_start)?,
            visitor_key: row.visitor_key,
            placement_slug: row.placement_slug,
            campaign_id: row.campaign_id,
        })
    }
}
