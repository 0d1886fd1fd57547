//! Liveness endpoint.
//!
//! Reports the decision recorder's counters so a growing `dropped` or
//! `failed` count is visible without log access.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use placement_engine::Engine;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct RecorderHealth {
    pub recorded: u64,
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" once any decision has been lost.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub recorder: RecorderHealth,
}

pub async fn health(State(engine): State<Arc<Engine>>) -> Json<HealthResponse> {
    let stats = engine.recorder.stats();
    let recorder = RecorderHealth {
        recorded: stats.recorded(),
        dropped: stats.dropped(),
        failed: stats.failed(),
    };
    let status = if recorder.dropped + recorder.failed == 0 {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        timestamp: Utc::now(),
        recorder,
    })
}
