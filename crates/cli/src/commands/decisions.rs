//! `placement decisions`: query the audit log from the shell.

use super::{open, ConfigArgs};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use placement_core::DecisionFilter;
use placement_engine::AuditService;

#[derive(Args, Debug, Clone)]
pub struct DecisionsArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Only decisions for this placement
    #[arg(long)]
    pub placement: Option<String>,

    /// Inclusive lower bound, RFC 3339 (e.g. "2026-03-01T00:00:00Z")
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Exclusive upper bound, RFC 3339
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,

    /// 1-based page number
    #[arg(long)]
    pub page: Option<u32>,

    #[arg(long)]
    pub page_size: Option<u32>,

    /// Print totals instead of a page of decisions
    #[arg(long)]
    pub aggregates: bool,
}

/// Prints a page of decisions, or the aggregates, as JSON.
///
/// # Errors
/// Returns an error if the database cannot be read.
pub async fn run_decisions(args: DecisionsArgs) -> Result<()> {
    let (config, store) = open(&args.config).await?;
    let audit = AuditService::new(store, config.audit);
    let filter = DecisionFilter {
        placement: args.placement,
        from: args.from,
        to: args.to,
    };

    if args.aggregates {
        let totals = audit.aggregates(&filter).await?;
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else {
        let page = audit.list(&filter, args.page, args.page_size).await?;
        println!("{}", serde_json::to_string_pretty(&page)?);
    }
    Ok(())
}
