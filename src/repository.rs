use crate::db::{KeyValueStore, StoreKey};
use crate::errors::{AppError, AppResult};
use crate::models::{Priority, Scope, Todo, TodoCount};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const DEMO_FAMILY_TASKS: [&str; 8] = [
    "Plan weekend family movie night",
    "Organize family photo album",
    "Plan vacation for next summer",
    "Create family emergency plan",
    "Set up family game tournament",
    "Plan and cook a special dinner together",
    "Organize family outdoor adventure",
    "Create family budget for next month",
];
const DEMO_TASK_COUNT: usize = 3;
const DEMO_TASK_SPACING_MINUTES: i64 = 5;

/// Per-scope todo collections mirrored to the key-value store.
///
/// Every mutation writes the full collection back before the in-memory copy
/// is replaced, so a failed write leaves both sides at the previous state.
pub struct TodoRepository {
    store: Arc<dyn KeyValueStore>,
    collections: Mutex<HashMap<Scope, Vec<Todo>>>,
}

impl TodoRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Rehydrates the scope from storage, replacing any cached copy.
    pub fn load(&self, scope: &Scope) -> AppResult<Vec<Todo>> {
        let todos = self.read_scope(scope)?;
        let mut collections = self.lock()?;
        collections.insert(scope.clone(), todos.clone());
        Ok(todos)
    }

    /// Current collection for the scope, loading it on first use.
    pub fn snapshot(&self, scope: &Scope) -> AppResult<Vec<Todo>> {
        {
            let collections = self.lock()?;
            if let Some(todos) = collections.get(scope) {
                return Ok(todos.clone());
            }
        }
        self.load(scope)
    }

    pub fn add(
        &self,
        scope: &Scope,
        text: &str,
        priority: Priority,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<Option<Todo>> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(scope = %scope, "ignoring todo with blank text");
            return Ok(None);
        }

        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            completed: false,
            priority,
            created_at: Utc::now(),
            due_date,
        };

        self.mutate(scope, |todos| {
            todos.insert(0, todo.clone());
            Some(todo)
        })
    }

    pub fn update(
        &self,
        scope: &Scope,
        id: &str,
        text: &str,
        priority: Priority,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        let updated = self.mutate(scope, |todos| {
            let todo = todos.iter_mut().find(|todo| todo.id == id)?;
            todo.text = text.to_string();
            todo.priority = priority;
            todo.due_date = due_date;
            Some(())
        })?;
        Ok(updated.is_some())
    }

    pub fn toggle_completed(&self, scope: &Scope, id: &str) -> AppResult<bool> {
        let toggled = self.mutate(scope, |todos| {
            let todo = todos.iter_mut().find(|todo| todo.id == id)?;
            todo.completed = !todo.completed;
            Some(())
        })?;
        Ok(toggled.is_some())
    }

    pub fn delete(&self, scope: &Scope, id: &str) -> AppResult<bool> {
        let removed = self.mutate(scope, |todos| {
            let index = todos.iter().position(|todo| todo.id == id)?;
            Some(todos.remove(index))
        })?;
        Ok(removed.is_some())
    }

    pub fn count(&self, scope: &Scope) -> AppResult<TodoCount> {
        let todos = self.snapshot(scope)?;
        Ok(TodoCount::of(&todos))
    }

    /// Counts for a scope straight from storage, without activating it.
    pub fn summary(&self, scope: &Scope) -> AppResult<TodoCount> {
        let todos = self.read_scope(scope)?;
        Ok(TodoCount::of(&todos))
    }

    /// Prepends the starter family goals to the scope.
    pub fn seed_demo_tasks(&self, scope: &Scope) -> AppResult<Vec<Todo>> {
        let now = Utc::now();
        let priorities = [Priority::High, Priority::Medium, Priority::Low];
        let seeded = DEMO_FAMILY_TASKS
            .iter()
            .take(DEMO_TASK_COUNT)
            .zip(priorities)
            .enumerate()
            .map(|(index, (text, priority))| Todo {
                id: format!("demo_{}_{}", now.timestamp_millis(), index),
                text: (*text).to_string(),
                completed: false,
                priority,
                created_at: now - Duration::minutes(DEMO_TASK_SPACING_MINUTES * index as i64),
                due_date: None,
            })
            .collect::<Vec<_>>();

        let inserted = self.mutate(scope, |todos| {
            let existing = todos.iter().map(|todo| todo.id.clone()).collect::<HashSet<_>>();
            let fresh = seeded
                .iter()
                .filter(|todo| !existing.contains(&todo.id))
                .cloned()
                .collect::<Vec<_>>();
            todos.splice(0..0, fresh.iter().cloned());
            Some(fresh)
        })?;
        tracing::info!(scope = %scope, "seeded demo tasks");
        Ok(inserted.unwrap_or_default())
    }

    /// Drops the cached copy; the next access rehydrates from storage.
    pub fn evict(&self, scope: &Scope) -> AppResult<()> {
        let mut collections = self.lock()?;
        collections.remove(scope);
        Ok(())
    }

    fn mutate<T>(
        &self,
        scope: &Scope,
        apply: impl FnOnce(&mut Vec<Todo>) -> Option<T>,
    ) -> AppResult<Option<T>> {
        let mut collections = self.lock()?;
        let mut next = match collections.get(scope) {
            Some(todos) => todos.clone(),
            None => self.read_scope(scope)?,
        };

        let Some(result) = apply(&mut next) else {
            return Ok(None);
        };

        let encoded = serde_json::to_string(&next)?;
        if let Err(error) = self.store.put(&StoreKey::Todos(scope.clone()), &encoded) {
            tracing::error!(scope = %scope, error = %error, "failed to persist todos");
            return Err(error);
        }
        collections.insert(scope.clone(), next);
        Ok(Some(result))
    }

    fn read_scope(&self, scope: &Scope) -> AppResult<Vec<Todo>> {
        let raw = self.store.get(&StoreKey::Todos(scope.clone()))?;
        Ok(raw.map(|raw| decode_todos(scope, &raw)).unwrap_or_default())
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, HashMap<Scope, Vec<Todo>>>> {
        self.collections
            .lock()
            .map_err(|_| AppError::Internal("todo collections mutex poisoned".to_string()))
    }
}

/// Decodes a stored collection, keeping only records that pass validation.
pub fn decode_todos(scope: &Scope, raw: &str) -> Vec<Todo> {
    let values = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(values)) => values,
        Ok(_) => {
            tracing::warn!(scope = %scope, "stored todos are not a list, starting empty");
            return Vec::new();
        }
        Err(error) => {
            tracing::warn!(scope = %scope, error = %error, "stored todos are malformed, starting empty");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut todos = Vec::with_capacity(values.len());
    let mut dropped = 0usize;
    for value in &values {
        match decode_record(value) {
            Some(todo) if seen.insert(todo.id.clone()) => todos.push(todo),
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::warn!(scope = %scope, dropped, "dropped malformed todo records");
    }
    todos
}

fn decode_record(value: &Value) -> Option<Todo> {
    let record = value.as_object()?;
    let id = match record.get("id")? {
        Value::String(id) if !id.trim().is_empty() => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let text = record.get("text")?.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let created_at = record.get("createdAt").and_then(Value::as_str).and_then(parse_time)?;

    Some(Todo {
        id,
        text: text.to_string(),
        completed: record.get("completed").and_then(Value::as_bool).unwrap_or(false),
        priority: record
            .get("priority")
            .and_then(Value::as_str)
            .and_then(Priority::parse)
            .unwrap_or_default(),
        created_at,
        due_date: record.get("dueDate").and_then(Value::as_str).and_then(parse_time),
    })
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
