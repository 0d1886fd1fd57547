//! CLI command implementations.

pub mod decisions;
pub mod maintenance;
pub mod serve;

pub use decisions::{run_decisions, DecisionsArgs};
pub use maintenance::{
    run_bill_featured, run_migrate, run_reconcile, run_replay_pending, run_set_status, run_sweep,
    BillFeaturedArgs, ReconcileArgs, ReplayPendingArgs, SetStatusArgs,
};
pub use serve::run_serve;

use anyhow::Result;
use clap::Args;
use placement_core::{AppConfig, ConfigLoader};
use placement_data::SqliteStore;
use std::sync::Arc;

/// Where configuration comes from. Shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", env = "PLACEMENT_CONFIG")]
    pub config: String,

    /// Profile overlay, e.g. `staging` reads `Config.staging.toml`
    #[arg(long, env = "PLACEMENT_PROFILE")]
    pub profile: Option<String>,
}

impl ConfigArgs {
    /// Loads the merged configuration.
    ///
    /// # Errors
    /// Returns an error if a present config file cannot be parsed.
    pub fn load(&self) -> Result<AppConfig> {
        match &self.profile {
            Some(profile) => ConfigLoader::load_with_profile(&self.config, profile),
            None => ConfigLoader::load_from(&self.config),
        }
    }
}

/// Loads configuration and opens the migrated store it points at.
///
/// # Errors
/// Returns an error if configuration or the database cannot be opened.
pub async fn open(args: &ConfigArgs) -> Result<(AppConfig, Arc<SqliteStore>)> {
    let config = args.load()?;
    ensure_parent_dir(&config.database.url)?;
    let store = SqliteStore::connect(&config.database.url, config.database.max_connections).await?;
    Ok((config, Arc::new(store)))
}

/// Creates the directory holding a file-backed `SQLite` database.
fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let Some(rest) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file = rest.split('?').next().unwrap_or(rest);
    if let Some(parent) = std::path::Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
