mod analysis;
mod config_cmd;
mod ledger;
mod product;
mod tool;

pub use analysis::AnalysisCommand;
pub use config_cmd::ConfigCommand;
pub use ledger::LedgerCommand;
pub use product::ProductCommand;
pub use tool::ToolCommand;

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use trafego::analysis::{AnalysisError, CampaignAnalyzer, GeminiAnalyzer};
use trafego::backend::{
    AuthSession, BackendError, DashboardStore, RealtimeHub, RemoteBackend, SqliteBackend,
    ToolBackend,
};
use trafego::config::Config;
use trafego::db::init_db;
use trafego::ledger::LedgerError;
use trafego::models::User;
use trafego::products::ProductError;
use trafego::sync::{Notice, NoticeLevel, Notifier, SyncSettings};

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),
    #[error("Not signed in")]
    NoSession,
    #[error("Save failed")]
    SaveFailed,
    #[error("Could not load the stored {0} inputs; not saving over them")]
    LoadFailed(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Product(#[from] ProductError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Prints notices to stderr so stdout only carries command output.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => eprintln!("{}", notice.message),
            NoticeLevel::Warning => eprintln!("Warning: {}", notice.message),
            NoticeLevel::Error => eprintln!("Error: {}", notice.message),
        }
    }
}

/// Collaborators every command runs against.
pub struct Session {
    pub tools: Arc<dyn ToolBackend>,
    pub store: Arc<dyn DashboardStore>,
    pub auth: Arc<dyn AuthSession>,
    pub analyzer: Arc<dyn CampaignAnalyzer>,
    pub notifier: Arc<dyn Notifier>,
    pub user: User,
    pub settings: SyncSettings,
    pub autosave_delay: Duration,
}

impl Session {
    /// Connects to the configured server, or opens the local database
    /// acting as the configured local user.
    pub async fn open(config: &Config) -> Result<Self, CommandError> {
        let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
        let settings = config.sync.settings();
        let autosave_delay = config.sync.autosave_delay();

        if let (Some(url), Some(key)) = (&config.backend.server_url, &config.backend.api_key) {
            let remote = Arc::new(RemoteBackend::connect(url.as_str(), key.as_str()).await?);
            let user = remote.current_user().ok_or(CommandError::NoSession)?;
            tracing::debug!("Using server {} as {}", url, user.id);
            return Ok(Self {
                tools: remote.clone(),
                store: remote.clone(),
                auth: remote.clone(),
                analyzer: remote,
                notifier,
                user,
                settings,
                autosave_delay,
            });
        }

        let pool = init_db(&config.database_path.value).await?;
        let user = User::new(config.local_user.value.clone());
        let local =
            Arc::new(SqliteBackend::new(pool, Arc::new(RealtimeHub::new())).with_user(user.clone()));
        tracing::debug!(
            "Using local database {} as {}",
            config.database_path.value.display(),
            user.id
        );
        Ok(Self {
            tools: local.clone(),
            store: local.clone(),
            auth: local,
            analyzer: Arc::new(GeminiAnalyzer::from_env()),
            notifier,
            user,
            settings,
            autosave_delay,
        })
    }
}

/// Reads `path`, or stdin when no path is given.
pub fn read_input(path: Option<&std::path::Path>) -> Result<String, CommandError> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(std::io::read_to_string(std::io::stdin())?),
    }
}
