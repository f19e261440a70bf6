mod memory;

pub use memory::MemoryStore;

use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, Scope};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub const TODOS_KEY_PREFIX: &str = "todos:";

/// Keys of the logical store. Everything a scope owns is prefixed with its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Todos(Scope),
    Notifications(Scope),
    DueDateNotifications(Scope),
    AppSettings,
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Todos(scope) => write!(f, "{}{}", TODOS_KEY_PREFIX, scope),
            Self::Notifications(scope) => write!(f, "notifications:{}", scope),
            Self::DueDateNotifications(scope) => write!(f, "duedateNotifications:{}", scope),
            Self::AppSettings => f.write_str("settings:app"),
        }
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &StoreKey) -> AppResult<Option<String>>;
    fn put(&self, key: &StoreKey, value_json: &str) -> AppResult<()>;
    fn remove(&self, key: &StoreKey) -> AppResult<bool>;
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE key LIKE ?1 ORDER BY key")?;
        let rows = stmt.query_map([format!("{}%", prefix)], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        if self.get(&StoreKey::AppSettings)?.is_none() {
            self.put(
                &StoreKey::AppSettings,
                &serde_json::to_string(&AppSettings::default())?,
            )?;
        }
        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &StoreKey) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM kv WHERE key = ?1",
                [key.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn put(&self, key: &StoreKey, value_json: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![key.to_string(), value_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &StoreKey) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM kv WHERE key = ?1", [key.to_string()])?;
        Ok(changed > 0)
    }
}

pub fn get_settings(store: &dyn KeyValueStore) -> AppResult<AppSettings> {
    match store.get(&StoreKey::AppSettings)? {
        Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "stored app settings are malformed, using defaults");
            AppSettings::default()
        })),
        None => Ok(AppSettings::default()),
    }
}

pub fn update_settings(store: &dyn KeyValueStore, update: serde_json::Value) -> AppResult<AppSettings> {
    let current = get_settings(store)?;
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, update);
    let settings: AppSettings = serde_json::from_value(merged)
        .map_err(|error| AppError::InvalidInput(format!("invalid settings update: {}", error)))?;

    store.put(&StoreKey::AppSettings, &serde_json::to_string(&settings)?)?;
    Ok(settings)
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
