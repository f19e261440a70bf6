use crate::db::{KeyValueStore, StoreKey};
use crate::errors::AppResult;
use crate::models::{Notification, NotificationSettings, Permission, Scope, TodoCount};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const UNSUPPORTED_MESSAGE: &str = "This device does not support notifications";

/// Platform notification surface. Delivery is never confirmed back to the core.
pub trait NotificationCapability: Send + Sync {
    fn is_supported(&self) -> bool;
    fn current_permission(&self) -> Permission;
    fn request_permission(&self) -> Permission;
    fn emit(&self, notification: &Notification) -> AppResult<()>;
}

/// Headless capability: always granted, notifications go to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl NotificationCapability for TracingNotifier {
    fn is_supported(&self) -> bool {
        true
    }

    fn current_permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn emit(&self, notification: &Notification) -> AppResult<()> {
        tracing::info!(title = %notification.title, body = %notification.body, "notification");
        Ok(())
    }
}

/// Result of an explicit permission request from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
    Unsupported { message: String },
}

pub fn daily_summary(count: TodoCount, display_name: Option<&str>) -> Notification {
    let Some(name) = display_name else {
        return Notification::new(
            "📋 Daily Task Reminder",
            "Don't forget to check your tasks for today!",
        );
    };

    if count.total == 0 {
        Notification::new(
            format!("🌟 {}, you're all caught up!", name),
            "No pending tasks. Great job staying organized!",
        )
    } else if count.active == 0 {
        Notification::new(
            format!("✅ {}, all tasks completed!", name),
            format!("You've completed all {} tasks. Excellent work!", count.total),
        )
    } else {
        Notification::new(
            format!(
                "📝 {}, you have {} pending task{}",
                name,
                count.active,
                if count.active == 1 { "" } else { "s" }
            ),
            format!("{} of {} tasks remaining. You've got this!", count.active, count.total),
        )
    }
}

pub fn permission_granted(settings: &NotificationSettings) -> Notification {
    Notification::new(
        "Notifications Enabled! 🎉",
        format!("You'll now receive daily task reminders at {}", settings.time),
    )
}

pub fn load_settings(store: &dyn KeyValueStore, scope: &Scope) -> AppResult<NotificationSettings> {
    let Some(raw) = store.get(&StoreKey::Notifications(scope.clone()))? else {
        return Ok(NotificationSettings::default());
    };
    Ok(serde_json::from_str(&raw).unwrap_or_else(|error| {
        tracing::warn!(scope = %scope, error = %error, "notification settings are malformed, resetting to defaults");
        NotificationSettings::default()
    }))
}

pub fn save_settings(store: &dyn KeyValueStore, scope: &Scope, settings: &NotificationSettings) -> AppResult<()> {
    store.put(
        &StoreKey::Notifications(scope.clone()),
        &serde_json::to_string(settings)?,
    )
}

/// Which tasks already got their due-date alert on which day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueDateLog {
    entries: BTreeMap<String, bool>,
}

impl DueDateLog {
    pub fn load(store: &dyn KeyValueStore, scope: &Scope) -> AppResult<Self> {
        let Some(raw) = store.get(&StoreKey::DueDateNotifications(scope.clone()))? else {
            return Ok(Self::default());
        };
        let entries = serde_json::from_str::<BTreeMap<String, bool>>(&raw).unwrap_or_else(|error| {
            tracing::warn!(scope = %scope, error = %error, "due date log is malformed, starting fresh");
            BTreeMap::new()
        });
        Ok(Self { entries })
    }

    pub fn save(&self, store: &dyn KeyValueStore, scope: &Scope) -> AppResult<()> {
        store.put(
            &StoreKey::DueDateNotifications(scope.clone()),
            &serde_json::to_string(&self.entries)?,
        )
    }

    pub fn key(todo_id: &str, day: NaiveDate) -> String {
        format!("{}_{}", todo_id, day.format("%Y-%m-%d"))
    }

    pub fn was_sent(&self, todo_id: &str, day: NaiveDate) -> bool {
        self.entries.get(&Self::key(todo_id, day)).copied().unwrap_or(false)
    }

    pub fn mark_sent(&mut self, todo_id: &str, day: NaiveDate) {
        self.entries.insert(Self::key(todo_id, day), true);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
