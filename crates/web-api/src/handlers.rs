use crate::error::ApiError;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use placement_core::{
    AllocationDecision, AllocationRequest, AllocationResponse, DecisionAggregates, DecisionFilter,
    DecisionPage, EventKind, Reconciliation, TrackingEvent, TrackingResponse,
};
use placement_engine::Engine;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Body of an impression or click report. The route decides the kind.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub campaign_id: String,
    pub broker_id: String,
    pub placement_slug: String,
    pub visitor_key: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub bid_rate_cents: Option<i64>,
}

impl EventRequest {
    fn into_event(self, event_kind: EventKind) -> TrackingEvent {
        TrackingEvent {
            campaign_id: self.campaign_id,
            broker_id: self.broker_id,
            placement_slug: self.placement_slug,
            visitor_key: self.visitor_key,
            idempotency_key: self.idempotency_key,
            event_kind,
            bid_rate_cents: self.bid_rate_cents,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionQuery {
    pub placement: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl DecisionQuery {
    fn filter(&self) -> DecisionFilter {
        DecisionFilter {
            placement: self.placement.clone(),
            from: self.from,
            to: self.to,
        }
    }
}

/// Picks winners for one placement. Always answers; failures degrade to fallback.
///
/// # Errors
/// Returns `400` if the placement or visitor is missing.
pub async fn allocate(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<AllocationRequest>,
) -> Result<Json<AllocationResponse>, ApiError> {
    if req.placement_slug.trim().is_empty() || req.visitor_key.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "placement_slug and visitor_key are required".to_string(),
        ));
    }
    Ok(Json(engine.allocator.allocate(&req).await))
}

/// Records an impression against the visitor's frequency counter.
///
/// # Errors
/// Returns `400` for a malformed event.
pub async fn report_impression(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<EventRequest>,
) -> Result<Json<TrackingResponse>, ApiError> {
    let event = req.into_event(EventKind::Impression);
    Ok(Json(engine.tracker.report_impression(&event, Utc::now()).await?))
}

/// Records a click and charges the campaign's bid.
///
/// # Errors
/// Returns `400` for a malformed event and `503` when the charge could not be
/// completed; retrying with the same idempotency key is safe.
pub async fn report_click(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<EventRequest>,
) -> Result<Json<TrackingResponse>, ApiError> {
    let event = req.into_event(EventKind::Click);
    Ok(Json(engine.tracker.report_click(&event, Utc::now()).await?))
}

/// Lists decisions newest first.
///
/// # Errors
/// Returns `503` if the decision log cannot be read.
pub async fn list_decisions(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<DecisionPage>, ApiError> {
    let page = engine
        .audit
        .list(&query.filter(), query.page, query.page_size)
        .await?;
    Ok(Json(page))
}

/// Totals over the same filter as the listing.
///
/// # Errors
/// Returns `503` if the decision log cannot be read.
pub async fn decision_aggregates(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<DecisionAggregates>, ApiError> {
    Ok(Json(engine.audit.aggregates(&query.filter()).await?))
}

/// # Errors
/// Returns `404` if no decision has this id.
pub async fn get_decision(
    State(engine): State<Arc<Engine>>,
    Path(decision_id): Path<Uuid>,
) -> Result<Json<AllocationDecision>, ApiError> {
    engine
        .audit
        .get(decision_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("decision not found: {decision_id}")))
}

/// Compares a campaign's cached spend with its ledger.
///
/// # Errors
/// Returns `404` if the campaign does not exist.
pub async fn reconcile_campaign(
    State(engine): State<Arc<Engine>>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Reconciliation>, ApiError> {
    Ok(Json(engine.ledger.reconcile_campaign(&campaign_id).await?))
}
