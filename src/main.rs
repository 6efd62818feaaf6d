use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudsync_lib::commands;
use cloudsync_lib::config::{default_config_path, Settings};
use cloudsync_lib::logging::init_logging;
use cloudsync_lib::SyncEngine;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cloudsync")]
#[command(about = "Keeps a local vault in sync with S3, Azure Blob and GCS", version)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "CLOUDSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Vault directory (overrides vaultPath from the configuration)
    #[arg(long)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass against every enabled remote
    Sync,
    /// Sync repeatedly every autoSyncDelay minutes
    Watch,
    /// Show what a sync would do without changing anything
    Plan,
    /// Test connectivity to the vault and every enabled remote
    Test,
    /// Delete the per-remote sync caches
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut settings = Settings::load(&config_path)
        .with_context(|| format!("failed to load configuration from {:?}", config_path))?;
    if let Some(vault) = cli.vault {
        settings.vault_path = vault;
    }
    if settings.vault_path.as_os_str().is_empty() {
        anyhow::bail!(
            "no vault configured; set vaultPath in {:?} or pass --vault",
            config_path
        );
    }

    let _guard = init_logging(&settings.log, &settings.data_dir());

    let engine = SyncEngine::new(settings).context("failed to open the vault")?;

    let ok = match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => commands::sync::sync(&engine).await?,
        Commands::Watch => {
            commands::sync::watch(&engine).await?;
            true
        }
        Commands::Plan => commands::plan::plan(&engine).await?,
        Commands::Test => commands::test::test_connection(&engine)
            .await?
            .iter()
            .all(|r| r.success),
        Commands::ClearCache => {
            commands::cache::clear_cache(&engine)?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
