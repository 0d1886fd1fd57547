//! Allocate, report events, and audit against an in-memory store.

mod common;

use common::{at, config, cpc, engine, featured, fund, seed, CPC_PLACEMENT};
use placement_core::{
    AllocationRequest, BrokerRef, CampaignCatalog, CampaignStatus, ChargeRejection, DecisionFilter,
    EventKind, FrequencyStore, RejectionReason, SponsorshipTier, TrackingEvent, WalletLedger,
};
use placement_data::SqliteStore;
use std::sync::Arc;

fn request(visitor: &str) -> AllocationRequest {
    AllocationRequest {
        placement_slug: CPC_PLACEMENT.to_string(),
        visitor_key: visitor.to_string(),
        page_path: "/compare".to_string(),
    }
}

fn event(campaign_id: &str, broker_id: &str, kind: EventKind, key: &str) -> TrackingEvent {
    TrackingEvent {
        campaign_id: campaign_id.to_string(),
        broker_id: broker_id.to_string(),
        placement_slug: CPC_PLACEMENT.to_string(),
        visitor_key: "v1".to_string(),
        idempotency_key: key.to_string(),
        event_kind: kind,
        bid_rate_cents: None,
    }
}

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().await.unwrap())
}

#[tokio::test]
async fn test_winner_is_recorded_and_stamped() {
    let store = store().await;
    seed(&store, &[cpc("low", "b1", 300), cpc("high", "b2", 500)]).await;
    fund(&store, "b1", 10_000).await;
    fund(&store, "b2", 10_000).await;
    let (engine, _config) = engine(&store, config(3));

    let now = at(5, 12);
    let response = engine.allocator.allocate_at(&request("v1"), now).await;
    assert!(!response.fallback_used);
    assert_eq!(response.winners.len(), 1);
    assert_eq!(response.winners[0].campaign_id, "high");

    engine.recorder.flush().await.unwrap();
    let decision = engine.audit.get(response.decision_id).await.unwrap().unwrap();
    assert_eq!(decision.winners, vec!["high".to_string()]);
    assert_eq!(decision.candidates.len(), 2);
    assert!(decision.candidates.iter().all(|c| c.eligible && c.rank_score.is_some()));
    assert_eq!(decision.rejection_for("low"), Some(RejectionReason::Outranked));

    let high = store.campaign("high").await.unwrap().unwrap();
    assert_eq!(high.last_won_at, Some(now));
}

#[tokio::test]
async fn test_equal_bids_rotate_by_least_recently_won() {
    let store = store().await;
    seed(&store, &[cpc("a", "b1", 400), cpc("b", "b2", 400)]).await;
    fund(&store, "b1", 10_000).await;
    fund(&store, "b2", 10_000).await;
    let (engine, _config) = engine(&store, config(0));

    let mut winners = Vec::new();
    for hour in 10..14 {
        let response = engine.allocator.allocate_at(&request("v1"), at(5, hour)).await;
        winners.push(response.winners[0].campaign_id.clone());
    }
    assert_eq!(winners, vec!["a", "b", "a", "b"]);
}

#[tokio::test]
async fn test_frequency_cap_excludes_after_impressions() {
    let store = store().await;
    seed(&store, &[cpc("c1", "b1", 400)]).await;
    fund(&store, "b1", 10_000).await;
    let (engine, _config) = engine(&store, config(2));

    for i in 0..2 {
        let now = at(5, 10 + i);
        let response = engine.allocator.allocate_at(&request("v1"), now).await;
        assert_eq!(response.winners[0].campaign_id, "c1");
        let seen = engine
            .tracker
            .report_impression(&event("c1", "b1", EventKind::Impression, &format!("imp-{i}")), now)
            .await
            .unwrap();
        assert!(seen.applied);
    }

    let response = engine.allocator.allocate_at(&request("v1"), at(5, 12)).await;
    assert!(response.winners.is_empty());
    assert!(response.fallback_used);

    engine.recorder.flush().await.unwrap();
    let decision = engine.audit.get(response.decision_id).await.unwrap().unwrap();
    assert_eq!(decision.rejection_for("c1"), Some(RejectionReason::FrequencyCapped));

    // Another visitor is unaffected.
    let response = engine.allocator.allocate_at(&request("v2"), at(5, 12)).await;
    assert_eq!(response.winners.len(), 1);
}

#[tokio::test]
async fn test_redelivered_impression_counts_once() {
    let store = store().await;
    seed(&store, &[cpc("c1", "b1", 400)]).await;
    fund(&store, "b1", 10_000).await;
    let (engine, _config) = engine(&store, config(2));

    let impression = event("c1", "b1", EventKind::Impression, "imp-1");
    let mut applied = Vec::new();
    for _ in 0..3 {
        let seen = engine.tracker.report_impression(&impression, at(5, 10)).await.unwrap();
        applied.push(seen.applied);
    }
    assert_eq!(applied, vec![true, false, false]);

    // One real view against a cap of two.
    let response = engine.allocator.allocate_at(&request("v1"), at(5, 11)).await;
    assert_eq!(response.winners[0].campaign_id, "c1");

    // A click that shares the impression's key is still a distinct event.
    let click = engine
        .tracker
        .report_click(&event("c1", "b1", EventKind::Click, "imp-1"), at(5, 10))
        .await
        .unwrap();
    assert!(click.applied);
    let replayed = engine
        .tracker
        .report_click(&event("c1", "b1", EventKind::Click, "imp-1"), at(5, 10))
        .await
        .unwrap();
    assert!(!replayed.applied);

    // The view and the click reach the cap; the replayed click did not count.
    let counts = store
        .counts("v1", CPC_PLACEMENT, &["c1".to_string()], at(5, 12), chrono::Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(counts.get("c1"), Some(&2));
    let response = engine.allocator.allocate_at(&request("v1"), at(5, 12)).await;
    assert!(response.fallback_used);
}

#[tokio::test]
async fn test_daily_budget_exhaustion_and_next_day_recovery() {
    let store = store().await;
    let mut campaign = cpc("c1", "b1", 400);
    campaign.daily_budget_cents = Some(1_000);
    seed(&store, &[campaign]).await;
    fund(&store, "b1", 10_000).await;
    let (engine, _config) = engine(&store, config(0));

    let now = at(5, 12);
    let first = engine
        .tracker
        .report_click(&event("c1", "b1", EventKind::Click, "k1"), now)
        .await
        .unwrap();
    let second = engine
        .tracker
        .report_click(&event("c1", "b1", EventKind::Click, "k2"), now)
        .await
        .unwrap();
    assert!(first.applied && second.applied);
    let c1 = store.campaign("c1").await.unwrap().unwrap();
    assert_eq!(c1.status, CampaignStatus::BudgetExhausted);
    assert_eq!(c1.spent_today_cents, 800);

    let third = engine
        .charges
        .charge_at(
            &placement_core::ChargeEvent {
                campaign_id: "c1".to_string(),
                broker_id: "b1".to_string(),
                amount_cents: 400,
                idempotency_key: "k3".to_string(),
                kind: placement_core::ChargeKind::CpcClick,
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(third.rejection, Some(ChargeRejection::DailyBudgetExhausted));

    let response = engine.allocator.allocate_at(&request("v1"), now).await;
    assert!(response.fallback_used);

    let report = engine.maintenance.run_once(at(6, 0)).await;
    assert_eq!(report.reactivated, 1);
    let response = engine.allocator.allocate_at(&request("v1"), at(6, 9)).await;
    assert_eq!(response.winners[0].campaign_id, "c1");
}

#[tokio::test]
async fn test_rejected_charge_does_not_touch_decisions() {
    let store = store().await;
    seed(&store, &[cpc("c1", "b1", 400)]).await;
    let (engine, _config) = engine(&store, config(0));

    // No wallet yet: the auction records the rejection and falls back.
    let response = engine.allocator.allocate_at(&request("v1"), at(5, 12)).await;
    assert!(response.fallback_used);

    let click = engine
        .tracker
        .report_click(&event("c1", "b1", EventKind::Click, "k1"), at(5, 12))
        .await
        .unwrap();
    assert!(!click.applied);
    assert!(store.campaign("c1").await.unwrap().unwrap().flagged_for_review);

    engine.recorder.flush().await.unwrap();
    let page = engine.audit.list(&DecisionFilter::default(), None, None).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(
        page.decisions[0].rejection_for("c1"),
        Some(RejectionReason::InsufficientWallet)
    );
}

#[tokio::test]
async fn test_fallback_lists_organic_brokers() {
    let store = store().await;
    for (id, name, tier, rating) in [
        ("b1", "Alpha", SponsorshipTier::None, 4.0),
        ("b2", "Beta", SponsorshipTier::Gold, 3.5),
    ] {
        let broker = BrokerRef {
            broker_id: id.to_string(),
            name: name.to_string(),
            slug: name.to_lowercase(),
            sponsorship_tier: tier,
            rating,
        };
        store.repos().brokers.upsert(&broker, true, at(1, 0)).await.unwrap();
    }
    let (engine, _config) = engine(&store, config(0));

    let response = engine.allocator.allocate_at(&request("v1"), at(5, 12)).await;
    let fallback = response.fallback.unwrap();
    assert_eq!(fallback.brokers.len(), 1);
    assert_eq!(fallback.brokers[0].name, "Beta");
}

#[tokio::test]
async fn test_catalog_outage_serves_last_good_snapshot() {
    let store = store().await;
    seed(&store, &[cpc("c1", "b1", 400)]).await;
    fund(&store, "b1", 10_000).await;
    let (engine, _config) = engine(&store, config(0));

    let response = engine.allocator.allocate_at(&request("v1"), at(5, 12)).await;
    assert_eq!(response.winners.len(), 1);

    store.database().close().await;
    let response = engine.allocator.allocate_at(&request("v1"), at(5, 13)).await;
    assert_eq!(response.winners[0].campaign_id, "c1");
}

#[tokio::test]
async fn test_featured_period_billed_once() {
    let store = store().await;
    seed(&store, &[featured("f1", "b1", 30_000)]).await;
    fund(&store, "b1", 50_000).await;
    let (engine, _config) = engine(&store, config(0));

    let first = engine.charges.bill_featured_period("f1", at(5, 12)).await.unwrap();
    assert!(first.applied);
    let again = engine.charges.bill_featured_period("f1", at(20, 12)).await.unwrap();
    assert_eq!(again.rejection, Some(ChargeRejection::AlreadyProcessed));

    let f1 = store.campaign("f1").await.unwrap().unwrap();
    assert_eq!(f1.featured_paid_until.unwrap().to_rfc3339(), "2026-04-01T00:00:00+00:00");
    assert_eq!(store.wallet("b1").await.unwrap().unwrap().balance_cents, 20_000);

    let april = f1.featured_paid_until.unwrap() + chrono::Duration::days(1);
    let next = engine.charges.bill_featured_period("f1", april).await.unwrap();
    assert_eq!(next.rejection, Some(ChargeRejection::InsufficientWallet));
}

#[tokio::test]
async fn test_featured_campaign_serves_the_month_its_budget_paid_for() {
    let store = store().await;
    let mut f1 = featured("f1", "b1", 30_000);
    f1.total_budget_cents = Some(30_000);
    seed(&store, &[f1]).await;
    fund(&store, "b1", 90_000).await;
    let (engine, _config) = engine(&store, config(0));

    let billed = engine.charges.bill_featured_period("f1", at(5, 12)).await.unwrap();
    assert!(billed.applied);
    assert!(!billed.exhausted);
    assert_eq!(store.campaign("f1").await.unwrap().unwrap().status, CampaignStatus::Active);

    let mut home = request("v1");
    home.placement_slug = "home-featured".to_string();
    let response = engine.allocator.allocate_at(&home, at(6, 12)).await;
    assert!(!response.fallback_used);
    assert_eq!(response.winners[0].campaign_id, "f1");

    // April's fee no longer fits the total budget.
    let april = at(2, 12) + chrono::Duration::days(31);
    let next = engine.charges.bill_featured_period("f1", april).await.unwrap();
    assert_eq!(next.rejection, Some(ChargeRejection::TotalBudgetExhausted));
    assert!(next.exhausted);
    assert_eq!(
        store.campaign("f1").await.unwrap().unwrap().status,
        CampaignStatus::BudgetExhausted
    );
}
