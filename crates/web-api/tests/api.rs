use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use placement_core::{
    AppConfig, BillingModel, Campaign, CampaignStatus, CreditReason, WalletCredit, WalletLedger,
};
use placement_data::SqliteStore;
use placement_engine::Engine;
use placement_web_api::ApiServer;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceExt;

fn campaign(campaign_id: &str, bid: i64) -> Campaign {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    Campaign {
        campaign_id: campaign_id.to_string(),
        broker_id: "b1".to_string(),
        placement_slug: "compare-cpc".to_string(),
        status: CampaignStatus::Active,
        billing_model: BillingModel::Cpc,
        bid_rate_cents: Some(bid),
        monthly_fee_cents: None,
        daily_budget_cents: None,
        total_budget_cents: None,
        spent_total_cents: 0,
        spent_today_cents: 0,
        spend_day: None,
        start_date: start,
        end_date: None,
        last_won_at: None,
        featured_paid_until: None,
        flagged_for_review: false,
        created_at: start,
        updated_at: start,
    }
}

async fn app() -> (Router, Arc<Engine>) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    store.repos().campaigns.upsert(&campaign("c1", 400)).await.unwrap();
    let credit = WalletCredit {
        broker_id: "b1".to_string(),
        campaign_id: None,
        amount_cents: 10_000,
        reason: CreditReason::TopUp,
        idempotency_key: "seed".to_string(),
    };
    store.credit(&credit, Utc::now()).await.unwrap();

    let mut config = AppConfig::default();
    config.allocation.timeout_ms = 2_000;
    config.allocation.catalog_timeout_ms = 1_000;
    let (_tx, rx) = watch::channel(config);
    let (engine, _recorder) = Engine::start(store, rx);
    let engine = Arc::new(engine);
    (ApiServer::new(engine.clone()).router(), engine)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn click(key: &str) -> Value {
    json!({
        "campaign_id": "c1",
        "broker_id": "b1",
        "placement_slug": "compare-cpc",
        "visitor_key": "v1",
        "idempotency_key": key,
    })
}

#[tokio::test]
async fn test_allocate_then_audit() {
    let (app, engine) = app().await;

    let (status, body) = send(
        &app,
        post("/api/allocate", &json!({ "placement_slug": "compare-cpc", "visitor_key": "v1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["winners"][0]["campaign_id"], "c1");
    assert_eq!(body["fallback_used"], false);
    let decision_id = body["decision_id"].as_str().unwrap().to_string();

    engine.recorder.flush().await.unwrap();
    let (status, body) = send(&app, get(&format!("/api/decisions/{decision_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["winners"][0], "c1");

    let (status, body) = send(&app, get("/api/decisions?placement=compare-cpc&page=1&page_size=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);

    let (status, body) = send(&app, get("/api/decisions/aggregates?placement=compare-cpc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["with_winners"], 1);
}

#[tokio::test]
async fn test_allocate_requires_visitor() {
    let (app, _engine) = app().await;
    let (status, _) = send(
        &app,
        post("/api/allocate", &json!({ "placement_slug": "compare-cpc", "visitor_key": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_click_is_idempotent_over_http() {
    let (app, _engine) = app().await;

    let (status, body) = send(&app, post("/api/events/click", &click("k1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);

    let (status, body) = send(&app, post("/api/events/click", &click("k1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);

    let (status, body) = send(&app, get("/api/campaigns/c1/reconciliation")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ledger_spend_cents"], 400);
    assert_eq!(body["cached_spend_cents"], 400);
}

#[tokio::test]
async fn test_impression_and_missing_resources() {
    let (app, _engine) = app().await;

    let (status, body) = send(&app, post("/api/events/impression", &click("imp-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);

    let (status, _) = send(&app, get("/api/campaigns/missing/reconciliation")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get(&format!("/api/decisions/{}", uuid::Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/decisions/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_recorder() {
    let (app, _engine) = app().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["recorder"]["dropped"], 0);
}
