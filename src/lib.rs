pub mod db;
pub mod due;
pub mod errors;
pub mod models;
pub mod notifications;
pub mod query;
pub mod repository;
pub mod scheduler;
pub mod session;

use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, FilterKind, Scope, SortKind, Todo, TodoCount};
use crate::notifications::NotificationCapability;
use crate::repository::TodoRepository;
use crate::scheduler::{SchedulerConfig, SystemClock};
use crate::session::SessionManager;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

const DATABASE_FILE: &str = "our-tasks.db";

/// Everything the rendering layer talks to, wired against one data directory.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Database>,
    pub repository: Arc<TodoRepository>,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn open(data_dir: &Path, capability: Arc<dyn NotificationCapability>) -> AppResult<Self> {
        let store = Arc::new(Database::new(&data_dir.join(DATABASE_FILE))?);
        let settings = db::get_settings(store.as_ref())?;
        let repository = Arc::new(TodoRepository::new(store.clone()));
        let sessions = SessionManager::new(
            repository.clone(),
            store.clone(),
            capability,
            Arc::new(SystemClock),
            SchedulerConfig::from(&settings),
        );
        tracing::info!(path = %store.path().display(), "task store opened");

        Ok(Self {
            store,
            repository,
            sessions,
        })
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        db::get_settings(self.store.as_ref())
    }

    /// Settings changes apply to scopes activated afterwards.
    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        db::update_settings(self.store.as_ref(), update)
    }

    pub fn view(&self, scope: &Scope, filter: FilterKind, sort: SortKind) -> AppResult<Vec<Todo>> {
        let todos = self.repository.snapshot(scope)?;
        Ok(query::view(&todos, filter, sort))
    }

    /// Per-scope counts for the profile picker, read without activating.
    pub fn summaries(&self, scopes: &[Scope]) -> AppResult<Vec<(Scope, TodoCount)>> {
        scopes
            .iter()
            .map(|scope| Ok((scope.clone(), self.repository.summary(scope)?)))
            .collect()
    }

    pub fn known_scopes(&self) -> AppResult<Vec<Scope>> {
        let mut scopes = Vec::new();
        for key in self.store.keys_with_prefix(db::TODOS_KEY_PREFIX)? {
            match key[db::TODOS_KEY_PREFIX.len()..].parse::<Scope>() {
                Ok(scope) => scopes.push(scope),
                Err(error) => tracing::warn!(key = %key, error = %error, "skipping unrecognised todo key"),
            }
        }
        Ok(scopes)
    }
}

pub fn init_tracing(data_dir: &Path) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "our-tasks.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
