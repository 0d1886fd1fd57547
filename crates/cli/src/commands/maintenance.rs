//! One-shot operational commands: migrate, sweep, replay, reconcile, featured billing.

use super::{open, ConfigArgs};
use anyhow::{bail, Result};
use chrono::Utc;
use clap::Args;
use placement_core::{CampaignCatalog, CampaignStatus, WalletLedger};
use placement_engine::Engine;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug, Clone)]
pub struct ReplayPendingArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Maximum queued charges to replay (defaults to `maintenance.replay_batch`)
    #[arg(long)]
    pub limit: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Campaign to check
    pub campaign_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct BillFeaturedArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Featured campaign to bill for the current month
    pub campaign_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct SetStatusArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Campaign to move
    pub campaign_id: String,

    /// Target status, e.g. `paused`, `active`, `cancelled`
    pub status: CampaignStatus,
}

async fn engine(args: &ConfigArgs) -> Result<Engine> {
    let (config, store) = open(args).await?;
    let (_tx, rx) = watch::channel(config);
    let (engine, _recorder) = Engine::start(Arc::clone(&store), rx);
    Ok(engine)
}

/// Applies pending migrations and exits.
///
/// # Errors
/// Returns an error if the database cannot be opened or migrated.
pub async fn run_migrate(args: ConfigArgs) -> Result<()> {
    let (config, store) = open(&args).await?;
    store.database().close().await;
    println!("Migrations applied to {}", config.database.url);
    Ok(())
}

/// Runs one maintenance pass.
///
/// # Errors
/// Returns an error if the database cannot be opened.
pub async fn run_sweep(args: ConfigArgs) -> Result<()> {
    let engine = engine(&args).await?;
    let report = engine.maintenance.run_once(Utc::now()).await;

    println!("Activated:     {}", report.lifecycle.activated);
    println!("Completed:     {}", report.lifecycle.completed);
    println!("Reactivated:   {}", report.reactivated);
    println!("Purged:        {}", report.purged);
    println!(
        "Replayed:      {} applied, {} rejected, {} failed",
        report.replay.applied, report.replay.rejected, report.replay.failed
    );
    Ok(())
}

/// Re-drives queued charges.
///
/// # Errors
/// Returns an error if the queue cannot be read.
pub async fn run_replay_pending(args: ReplayPendingArgs) -> Result<()> {
    let limit = match args.limit {
        Some(limit) => limit,
        None => args.config.load()?.maintenance.replay_batch,
    };
    let engine = engine(&args.config).await?;
    let summary = engine.charges.replay_pending(limit, Utc::now()).await?;
    println!(
        "{} applied, {} rejected, {} still failing",
        summary.applied, summary.rejected, summary.failed
    );
    Ok(())
}

/// Compares a campaign's cached spend with the ledger.
///
/// # Errors
/// Returns an error if the campaign is unknown or the two disagree.
pub async fn run_reconcile(args: ReconcileArgs) -> Result<()> {
    let (_config, store) = open(&args.config).await?;
    let reconciliation = store.reconcile_campaign(&args.campaign_id).await?;
    println!("{}", serde_json::to_string_pretty(&reconciliation)?);

    if !reconciliation.is_consistent() {
        bail!(
            "campaign {} spend mismatch: ledger {} vs cached {}",
            reconciliation.campaign_id,
            reconciliation.ledger_spend_cents,
            reconciliation.cached_spend_cents
        );
    }
    Ok(())
}

/// Charges a featured campaign's fee for the current month.
///
/// # Errors
/// Returns an error if the charge hit a store or integrity failure.
pub async fn run_bill_featured(args: BillFeaturedArgs) -> Result<()> {
    let engine = engine(&args.config).await?;
    let outcome = engine
        .charges
        .bill_featured_period(&args.campaign_id, Utc::now())
        .await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Applies a broker or admin status change (pause, resume, cancel, approve).
///
/// # Errors
/// Returns an error if the campaign is unknown or the transition is not allowed.
pub async fn run_set_status(args: SetStatusArgs) -> Result<()> {
    let (_config, store) = open(&args.config).await?;
    let campaign = store
        .transition(&args.campaign_id, args.status, Utc::now())
        .await?;
    println!("{} is now {}", campaign.campaign_id, campaign.status);
    Ok(())
}
