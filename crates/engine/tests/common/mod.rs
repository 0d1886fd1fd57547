#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use placement_core::{
    AppConfig, BillingModel, Campaign, CampaignStatus, CreditReason, PlacementConfig,
    PlacementKind, WalletCredit, WalletLedger,
};
use placement_data::SqliteStore;
use placement_engine::Engine;
use std::sync::Arc;
use tokio::sync::watch;

pub const CPC_PLACEMENT: &str = "compare-cpc";

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

pub fn cpc(campaign_id: &str, broker_id: &str, bid: i64) -> Campaign {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Campaign {
        campaign_id: campaign_id.to_string(),
        broker_id: broker_id.to_string(),
        placement_slug: CPC_PLACEMENT.to_string(),
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

pub fn featured(campaign_id: &str, broker_id: &str, fee: i64) -> Campaign {
    let mut campaign = cpc(campaign_id, broker_id, 0);
    campaign.placement_slug = "home-featured".to_string();
    campaign.billing_model = BillingModel::FeaturedMonthly;
    campaign.bid_rate_cents = None;
    campaign.monthly_fee_cents = Some(fee);
    campaign
}

pub async fn seed(store: &SqliteStore, campaigns: &[Campaign]) {
    for campaign in campaigns {
        store.repos().campaigns.upsert(campaign).await.unwrap();
    }
}

pub async fn fund(store: &SqliteStore, broker_id: &str, cents: i64) {
    let credit = WalletCredit {
        broker_id: broker_id.to_string(),
        campaign_id: None,
        amount_cents: cents,
        reason: CreditReason::TopUp,
        idempotency_key: format!("seed-{broker_id}-{cents}"),
    };
    assert!(store.credit(&credit, at(1, 0)).await.unwrap());
}

/// Config with fast retries and a generous allocation budget for slow CI.
pub fn config(frequency_cap: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.allocation.timeout_ms = 2_000;
    config.allocation.catalog_timeout_ms = 1_000;
    config.allocation.placements.push(PlacementConfig {
        slug: CPC_PLACEMENT.to_string(),
        slots: 1,
        kind: PlacementKind::Organic,
        frequency_cap: Some(frequency_cap),
        frequency_window_secs: None,
    });
    config.charge.base_backoff_ms = 1;
    config.charge.max_backoff_ms = 5;
    config.recorder.base_backoff_ms = 1;
    config
}

pub fn engine(store: &Arc<SqliteStore>, config: AppConfig) -> (Engine, watch::Sender<AppConfig>) {
    let (tx, rx) = watch::channel(config);
    let (engine, _recorder) = Engine::start(Arc::clone(store), rx);
    (engine, tx)
}
