use clap::{Parser, Subcommand};

mod commands;

use commands::{
    BillFeaturedArgs, ConfigArgs, DecisionsArgs, ReconcileArgs, ReplayPendingArgs, SetStatusArgs,
};

#[derive(Parser)]
#[command(name = "placement")]
#[command(about = "Placement allocation engine for sponsored broker listings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API with background maintenance
    Serve(ConfigArgs),
    /// Apply database migrations and exit
    Migrate(ConfigArgs),
    /// Run one maintenance pass (lifecycle, billing day, frequency purge, replay)
    Sweep(ConfigArgs),
    /// Replay charges parked after failed retries
    ReplayPending(ReplayPendingArgs),
    /// Compare a campaign's cached spend with its ledger entries
    Reconcile(ReconcileArgs),
    /// Charge a featured campaign's fee for the current month
    BillFeatured(BillFeaturedArgs),
    /// Pause, resume, approve or cancel a campaign
    SetStatus(SetStatusArgs),
    /// Query allocation decisions
    Decisions(DecisionsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await?,
        Commands::Migrate(args) => commands::run_migrate(args).await?,
        Commands::Sweep(args) => commands::run_sweep(args).await?,
        Commands::ReplayPending(args) => commands::run_replay_pending(args).await?,
        Commands::Reconcile(args) => commands::run_reconcile(args).await?,
        Commands::BillFeatured(args) => commands::run_bill_featured(args).await?,
        Commands::SetStatus(args) => commands::run_set_status(args).await?,
        Commands::Decisions(args) => commands::run_decisions(args).await?,
    }

    Ok(())
}
