use crate::db::KeyValueStore;
use crate::errors::{AppError, AppResult};
use crate::models::Scope;
use crate::notifications::NotificationCapability;
use crate::repository::TodoRepository;
use crate::scheduler::{Clock, ReminderScheduler, SchedulerConfig, SchedulerState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub scope: Scope,
    pub scheduler: Arc<ReminderScheduler>,
}

/// Active scopes and the reminder loops they own.
#[derive(Clone)]
pub struct SessionManager {
    repository: Arc<TodoRepository>,
    store: Arc<dyn KeyValueStore>,
    capability: Arc<dyn NotificationCapability>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    sessions: Arc<Mutex<HashMap<Scope, SessionHandle>>>,
}

impl SessionManager {
    pub fn new(
        repository: Arc<TodoRepository>,
        store: Arc<dyn KeyValueStore>,
        capability: Arc<dyn NotificationCapability>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repository,
            store,
            capability,
            clock,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Rehydrates the scope and arms its reminders. A previous session for the
    /// same scope is torn down first.
    pub async fn activate(&self, scope: Scope, display_name: Option<String>) -> AppResult<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        if let Some(previous) = sessions.remove(&scope) {
            previous.scheduler.shutdown()?;
        }

        self.repository.load(&scope)?;
        let scheduler = ReminderScheduler::new(
            scope.clone(),
            display_name,
            self.repository.clone(),
            self.store.clone(),
            self.capability.clone(),
            self.clock.clone(),
            self.config,
        )?;
        let state = scheduler.refresh()?;

        let handle = SessionHandle {
            session_id: Uuid::new_v4().to_string(),
            scope: scope.clone(),
            scheduler,
        };
        tracing::info!(scope = %scope, session_id = %handle.session_id, state = ?state, "scope activated");
        sessions.insert(scope, handle.clone());

        Ok(handle)
    }

    pub async fn session(&self, scope: &Scope) -> AppResult<SessionHandle> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(scope)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No active session for scope {}", scope)))
    }

    pub async fn scheduler_state(&self, scope: &Scope) -> Option<SchedulerState> {
        let sessions = self.sessions.lock().await;
        sessions.get(scope).map(|handle| handle.scheduler.state())
    }

    pub async fn deactivate(&self, scope: &Scope) -> AppResult<bool> {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(scope)
        };
        let Some(handle) = removed else {
            return Ok(false);
        };
        handle.scheduler.shutdown()?;
        self.repository.evict(scope)?;
        tracing::info!(scope = %scope, session_id = %handle.session_id, "scope deactivated");
        Ok(true)
    }

    pub async fn shutdown_all(&self) -> AppResult<()> {
        let drained = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, handle)| handle).collect::<Vec<_>>()
        };
        for handle in drained {
            handle.scheduler.shutdown()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SessionManager;
    use crate::db::{KeyValueStore, MemoryStore, StoreKey};
    use crate::errors::AppError;
    use crate::models::{NotificationSettings, Priority, Scope};
    use crate::notifications::{save_settings, TracingNotifier};
    use crate::repository::TodoRepository;
    use crate::scheduler::{SchedulerConfig, SchedulerState, SystemClock};
    use std::sync::Arc;

    fn manager() -> (Arc<MemoryStore>, Arc<TodoRepository>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        let repository = Arc::new(TodoRepository::new(store.clone()));
        let manager = SessionManager::new(
            repository.clone(),
            store.clone(),
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
            SchedulerConfig::default(),
        );
        (store, repository, manager)
    }

    #[tokio::test]
    async fn activation_rehydrates_from_storage() {
        let (store, repository, manager) = manager();
        let scope = Scope::user("user2");
        store
            .put(
                &StoreKey::Todos(scope.clone()),
                r#"[{"id":"1","text":"stored","completed":false,"priority":"low","createdAt":"2026-10-01T09:00:00.000Z"}]"#,
            )
            .expect("put");

        let handle = manager.activate(scope.clone(), Some("Giscard".to_string())).await.expect("activate");
        assert_eq!(handle.scope, scope);
        assert_eq!(repository.snapshot(&scope).expect("snapshot")[0].text, "stored");
        assert_eq!(handle.scheduler.state(), SchedulerState::Disabled);
    }

    #[tokio::test]
    async fn reactivation_replaces_the_previous_session() {
        let (store, _, manager) = manager();
        let scope = Scope::Shared;
        let settings = NotificationSettings {
            enabled: true,
            ..NotificationSettings::default()
        };
        save_settings(store.as_ref(), &scope, &settings).expect("save");

        let first = manager.activate(scope.clone(), None).await.expect("first");
        assert_eq!(first.scheduler.state(), SchedulerState::Armed);
        let second = manager.activate(scope.clone(), None).await.expect("second");

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(first.scheduler.state(), SchedulerState::Idle);
        assert!(!first.scheduler.is_running());
        assert_eq!(manager.scheduler_state(&scope).await, Some(SchedulerState::Armed));
        manager.shutdown_all().await.expect("shutdown");
        assert_eq!(second.scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn deactivation_cancels_and_evicts() {
        let (_, repository, manager) = manager();
        let scope = Scope::Global;
        let handle = manager.activate(scope.clone(), None).await.expect("activate");
        repository.add(&scope, "persisted", Priority::Medium, None).expect("add");

        assert!(manager.deactivate(&scope).await.expect("deactivate"));
        assert!(!manager.deactivate(&scope).await.expect("deactivate again"));
        assert_eq!(handle.scheduler.state(), SchedulerState::Idle);
        assert!(matches!(manager.session(&scope).await, Err(AppError::NotFound(_))));
        assert_eq!(repository.snapshot(&scope).expect("reload").len(), 1);
    }
}
