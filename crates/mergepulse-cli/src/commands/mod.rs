pub mod auth;
pub mod cleanup;
pub mod config;
pub mod history;
pub mod limits;
pub mod stats;
pub mod status;
pub mod sync;
pub mod weekly;

use std::sync::Arc;

use clap::Subcommand;
use mergepulse_auth::{resolve_token, KeyringTokenStore, TOKEN_ENV_VAR};
use mergepulse_core::config::PulseConfig;
use mergepulse_db::SqliteStore;
use mergepulse_host::github::GitHubSource;
use mergepulse_host::{CancellationToken, FetchSettings, RateLimitedFetcher};
use mergepulse_sync::{ProductivityAggregator, SyncOrchestrator};

#[derive(Subcommand)]
pub enum Command {
    /// Initialize and inspect mergepulse configuration
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
    /// Manage the API token
    Auth {
        #[command(subcommand)]
        action: auth::AuthAction,
    },
    /// Initial sync of the configured repositories
    Init(sync::InitArgs),
    /// Incremental sync since each repository's last sync
    Update(sync::UpdateArgs),
    /// Fetch pull requests merged within a date range
    Fetch(sync::FetchArgs),
    /// Show per-repository sync state
    Status,
    /// Show weekly productivity
    Weekly(weekly::WeeklyArgs),
    /// Show per-repository totals
    Stats,
    /// Show past sync runs
    History(history::HistoryArgs),
    /// Delete data older than a date
    Cleanup(cleanup::CleanupArgs),
    /// Show the API rate limit
    Limits,
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Config { action } => config::run(action),
        Command::Auth { action } => auth::run(action),
        Command::Init(args) => sync::run_init(args).await,
        Command::Update(args) => sync::run_update(args).await,
        Command::Fetch(args) => sync::run_fetch(args).await,
        Command::Status => status::run(),
        Command::Weekly(args) => weekly::run(args),
        Command::Stats => stats::run(),
        Command::History(args) => history::run(args),
        Command::Cleanup(args) => cleanup::run(args),
        Command::Limits => limits::run().await,
    }
}

/// Loads and validates the configuration.
pub fn load_config() -> anyhow::Result<PulseConfig> {
    let config = PulseConfig::load()?;
    config.validate()?;
    Ok(config)
}

pub fn open_store() -> anyhow::Result<Arc<SqliteStore>> {
    let db_path = PulseConfig::db_path()?;
    Ok(Arc::new(SqliteStore::open(&db_path)?))
}

/// Keychain entries are keyed by API host, so one token serves one server.
pub fn api_host(config: &PulseConfig) -> String {
    config
        .api_url
        .host_str()
        .unwrap_or("api.github.com")
        .to_string()
}

pub fn github_source(config: &PulseConfig) -> anyhow::Result<Arc<GitHubSource>> {
    let token = resolve_token(
        &KeyringTokenStore::new(),
        &api_host(config),
        std::env::var(TOKEN_ENV_VAR).ok(),
    )?;
    let source = GitHubSource::new(config.api_url.clone(), &token, config.request_timeout())?;
    Ok(Arc::new(source))
}

pub fn build_orchestrator(
    config: &PulseConfig,
    store: Arc<SqliteStore>,
    cancel: CancellationToken,
) -> anyhow::Result<Arc<SyncOrchestrator>> {
    let fetcher = RateLimitedFetcher::new(github_source(config)?, FetchSettings::from_config(config))
        .with_cancellation(cancel);
    let aggregator = ProductivityAggregator::new(config.display_timezone()?);
    Ok(Arc::new(SyncOrchestrator::new(
        Arc::new(fetcher),
        store,
        aggregator,
    )))
}

/// Repositories named on the command line, or the configured ones.
pub fn target_repos(config: &PulseConfig, explicit: Vec<String>) -> anyhow::Result<Vec<String>> {
    let repos = if explicit.is_empty() {
        config.repositories.clone()
    } else {
        explicit
    };
    if repos.is_empty() {
        anyhow::bail!(
            "No repositories configured. Add them to {} or pass them as arguments.",
            PulseConfig::config_path()?.display()
        );
    }
    Ok(repos)
}

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current request...");
            token.cancel();
        }
    })
}

pub fn dash() -> String {
    "—".to_string()
}
