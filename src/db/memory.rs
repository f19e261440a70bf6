use super::{KeyValueStore, StoreKey};
use crate::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local store with the same semantics as [`super::Database`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &StoreKey) -> AppResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Internal("memory store mutex poisoned".to_string()))?;
        Ok(entries.get(&key.to_string()).cloned())
    }

    fn put(&self, key: &StoreKey, value_json: &str) -> AppResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Internal("memory store mutex poisoned".to_string()))?;
        entries.insert(key.to_string(), value_json.to_string());
        Ok(())
    }

    fn remove(&self, key: &StoreKey) -> AppResult<bool> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Internal("memory store mutex poisoned".to_string()))?;
        Ok(entries.remove(&key.to_string()).is_some())
    }
}
