use super::from_millis;
use crate::error::{DataError, DataResult};
use placement_core::AllocationDecision;
use sqlx::FromRow;
use uuid::Uuid;

/// Decision row. List columns are JSON text so the payload can evolve under
/// `schema_version` without a migration.
#[derive(Debug, Clone, FromRow)]
pub struct DecisionRow {
    pub decision_id: String,
    pub schema_version: i64,
    pub placement_slug: String,
    pub visitor_key: String,
    pub page_path: String,
    pub created_at: i64,
    pub candidates: String,
    pub winners: String,
    pub rejection_log: String,
    pub fallback: Option<String>,
    pub fallback_used: bool,
    pub duration_ms: f64,
}

impl TryFrom<DecisionRow> for AllocationDecision {
    type Error = DataError;

    fn try_from(row: DecisionRow) -> DataResult<Self> {
        Ok(Self {
            decision_id: Uuid::parse_str(&row.decision_id).map_err(|e| {
                DataError::decode(format!("bad decision id {}: {e}", row.decision_id))
            })?,
            schema_version: u16::try_from(row.schema_version).map_err(|_| {
                DataError::decode(format!("bad schema version {}", row.schema_version))
            })?,
            created_at: from_millis(row.created_at)?,
            candidates: serde_json::from_str(&row.candidates)?,
            winners: serde_json::from_str(&row.winners)?,
            rejection_log: serde_json::from_str(&row.rejection_log)?,
            fallback: row.fallback.as_deref().map(serde_json::from_str).transpose()?,
            placement_slug: row.placement_slug,
            visitor_key: row.visitor_key,
            page_path: row.page_path,
            fallback_used: row.fallback_used,
            duration_ms: row.duration_ms,
        })
    }
}
