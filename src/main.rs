use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

use repo_mirror::config::default_api_url;
use repo_mirror::logging::init_logging;
use repo_mirror::{ConfigStore, GitCli, GitHubCatalog, Orchestrator, RunOutcome, RunSettings};

#[derive(Parser)]
#[command(name = "repo-mirror")]
#[command(about = "Mirror every repository of a GitHub account onto removable or local storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Log file path
    #[arg(long, global = true, default_value = "backup.log")]
    log_file: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one mirror pass (the default)
    Sync(SyncArgs),

    /// List the repositories a mirror pass would see
    List {
        /// Base URL of the GitHub API
        #[arg(long, default_value_t = default_api_url())]
        api_url: String,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Directory whose subdirectories are mounted devices (repeatable, in priority order)
    #[arg(long = "mount-root", value_name = "PATH")]
    mount_roots: Vec<PathBuf>,

    /// Mirror root used when no device is mounted
    #[arg(long, value_name = "PATH")]
    fallback_dir: Option<PathBuf>,

    /// Seconds allowed for a single clone or update
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    timeout: u64,

    /// Base URL of the GitHub API
    #[arg(long, default_value_t = default_api_url())]
    api_url: String,
}

impl Default for SyncArgs {
    fn default() -> Self {
        Self {
            mount_roots: Vec::new(),
            fallback_dir: None,
            timeout: 300,
            api_url: default_api_url(),
        }
    }
}

impl SyncArgs {
    fn into_settings(self) -> RunSettings {
        let mut settings = RunSettings::default();
        if !self.mount_roots.is_empty() {
            settings.mount_roots = self.mount_roots;
        }
        if let Some(fallback) = self.fallback_dir {
            settings.fallback_root = fallback;
        }
        settings.operation_timeout = Duration::from_secs(self.timeout);
        settings.api_url = self.api_url;
        settings
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose, &cli.log_file)?;
    info!("Starting repo-mirror v{}", env!("CARGO_PKG_VERSION"));

    let store = ConfigStore::new(cli.config);

    match cli.command.unwrap_or_else(|| Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => cmd_sync(store, args.into_settings()).await,
        Commands::List { api_url } => cmd_list(store, api_url).await,
    }
}

/// Run one pass inside its own task so a panic ends in a logged failure
async fn cmd_sync(store: ConfigStore, settings: RunSettings) -> Result<ExitCode> {
    let catalog = GitHubCatalog::new(settings.api_url.clone())?;
    let mut orchestrator = Orchestrator::new(store, settings, catalog, GitCli::new());

    let outcome = match tokio::spawn(async move { orchestrator.run().await }).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            error!("Mirror run panicked: {}", e);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => {
            error!("Mirror run was cancelled: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    match outcome {
        RunOutcome::Success(report) => {
            info!(
                "Mirror at {} is up to date with {} repositories ({} failed)",
                report.storage_root.display(),
                report.catalog_size,
                report.summary.failed
            );
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::SetupRequired { config_path } => {
            println!(
                "Created {}. Fill in github_name and token, then run again.",
                config_path.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Failure { reason, reached } => {
            error!("Run ended in failure after {:?}: {}", reached, reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_list(store: ConfigStore, api_url: String) -> Result<ExitCode> {
    let settings = RunSettings {
        api_url,
        ..RunSettings::default()
    };
    let catalog = GitHubCatalog::new(settings.api_url.clone())?;
    let orchestrator = Orchestrator::new(store, settings, catalog, GitCli::new());

    let repositories = orchestrator
        .preview_catalog()
        .await
        .context("Failed to list repositories")?;

    if repositories.is_empty() {
        println!("No repositories found.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Found {} repositories:", repositories.len());
    for repo in &repositories {
        let visibility = if repo.is_private { "private" } else { "public" };
        println!("  {:<40} {:<8} {}", repo.name, visibility, repo.remote_url);
    }

    Ok(ExitCode::SUCCESS)
}
