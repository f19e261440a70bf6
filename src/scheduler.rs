use crate::db::KeyValueStore;
use crate::due::{classify, DueAlert};
use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, Notification, NotificationSettings, Permission, ReminderTime, Scope, TodoCount};
use crate::notifications::{
    daily_summary, load_settings, permission_granted, save_settings, DueDateLog, NotificationCapability,
    PermissionOutcome, UNSUPPORTED_MESSAGE,
};
use crate::repository::TodoRepository;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::JoinHandle;
use tokio::time::Duration;

const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const MIN_CHECK_DELAY: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Wall-clock reading of `instant` with the offset in force at that instant.
    fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset>;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.localize(Utc::now())
    }

    fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        let local = instant.with_timezone(&Local);
        local.with_timezone(local.offset())
    }
}

/// Clock that only moves when told to, reading time in a fixed zone.
#[derive(Debug)]
pub struct ManualClock<Z = FixedOffset> {
    zone: Z,
    now: Mutex<DateTime<Utc>>,
}

impl<Z: TimeZone> ManualClock<Z> {
    pub fn new(now: DateTime<Z>) -> Self {
        Self {
            zone: now.timezone(),
            now: Mutex::new(now.with_timezone(&Utc)),
        }
    }

    pub fn set(&self, now: DateTime<Z>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now.with_timezone(&Utc);
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        if let Ok(mut current) = self.now.lock() {
            *current = *current + by;
        }
    }
}

impl<Z> Clock for ManualClock<Z>
where
    Z: TimeZone + Send + Sync,
{
    fn now(&self) -> DateTime<FixedOffset> {
        let now = match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        };
        self.localize(now)
    }

    fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        let local = instant.with_timezone(&self.zone);
        local.with_timezone(&local.offset().fix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerState {
    Idle,
    Armed,
    Disabled,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub check_interval: Duration,
    pub initial_delay: Duration,
    pub due_soon_window: ChronoDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for SchedulerConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            check_interval: Duration::from_secs(settings.check_interval_secs.max(1)).min(MAX_CHECK_INTERVAL),
            initial_delay: Duration::from_millis(settings.initial_check_delay_ms),
            due_soon_window: ChronoDuration::minutes(settings.due_soon_window_minutes.max(0)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub daily: Option<Notification>,
    pub due_alerts: Vec<(String, DueAlert)>,
}

impl CheckReport {
    pub fn is_empty(&self) -> bool {
        self.daily.is_none() && self.due_alerts.is_empty()
    }
}

/// Whether the once-a-day summary should go out at `now`.
pub fn daily_reminder_due(settings: &NotificationSettings, now: &DateTime<FixedOffset>, clock: &dyn Clock) -> bool {
    let target = now.date_naive().and_time(settings.time.as_naive());
    if now.naive_local() < target {
        return false;
    }
    match settings.last_notification {
        Some(last) => clock.localize(last).date_naive() != now.date_naive(),
        None => true,
    }
}

/// Recurring reminder check for one scope.
///
/// The loop is a tokio task holding only a weak reference back to the
/// scheduler; any settings or permission change aborts the pending task
/// before a new one is spawned.
pub struct ReminderScheduler {
    scope: Scope,
    display_name: Option<String>,
    repository: Arc<TodoRepository>,
    store: Arc<dyn KeyValueStore>,
    capability: Arc<dyn NotificationCapability>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    settings: Mutex<NotificationSettings>,
    state: Mutex<SchedulerState>,
    task: Mutex<Option<JoinHandle<()>>>,
    check_guard: Mutex<()>,
}

impl ReminderScheduler {
    pub fn new(
        scope: Scope,
        display_name: Option<String>,
        repository: Arc<TodoRepository>,
        store: Arc<dyn KeyValueStore>,
        capability: Arc<dyn NotificationCapability>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> AppResult<Arc<Self>> {
        let settings = load_settings(store.as_ref(), &scope)?;
        Ok(Arc::new(Self {
            scope,
            display_name,
            repository,
            store,
            capability,
            clock,
            config,
            settings: Mutex::new(settings),
            state: Mutex::new(SchedulerState::Idle),
            task: Mutex::new(None),
            check_guard: Mutex::new(()),
        }))
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn state(&self) -> SchedulerState {
        self.state.lock().map(|state| *state).unwrap_or(SchedulerState::Disabled)
    }

    pub fn settings(&self) -> AppResult<NotificationSettings> {
        Ok(lock(&self.settings)?.clone())
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().map(|handle| !handle.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Re-evaluates permission and settings, arming or disarming the loop.
    pub fn refresh(self: &Arc<Self>) -> AppResult<SchedulerState> {
        if self.can_arm()? {
            tokio::runtime::Handle::try_current()
                .map_err(|error| AppError::Internal(format!("reminder loop needs a tokio runtime: {}", error)))?;
            self.reschedule()?;
            self.transition(SchedulerState::Armed);
        } else {
            self.cancel()?;
            self.transition(SchedulerState::Disabled);
        }
        Ok(self.state())
    }

    pub fn set_enabled(self: &Arc<Self>, enabled: bool) -> AppResult<SchedulerState> {
        if enabled
            && self.capability.current_permission() != Permission::Granted
            && self.request_permission()? != PermissionOutcome::Granted
        {
            return Ok(self.state());
        }
        self.update_settings(|settings| settings.enabled = enabled)?;
        self.refresh()
    }

    pub fn set_reminder_time(self: &Arc<Self>, time: ReminderTime) -> AppResult<SchedulerState> {
        self.update_settings(|settings| settings.time = time)?;
        self.refresh()
    }

    /// Explicit user request. An unsupported platform answers with a message
    /// instead of an error.
    pub fn request_permission(self: &Arc<Self>) -> AppResult<PermissionOutcome> {
        if !self.capability.is_supported() {
            tracing::info!(scope = %self.scope, "notifications unsupported on this platform");
            self.cancel()?;
            self.transition(SchedulerState::Disabled);
            return Ok(PermissionOutcome::Unsupported {
                message: UNSUPPORTED_MESSAGE.to_string(),
            });
        }

        let outcome = match self.capability.request_permission() {
            Permission::Granted => {
                let settings = self.settings()?;
                self.deliver(&permission_granted(&settings));
                PermissionOutcome::Granted
            }
            Permission::Denied | Permission::Unset => PermissionOutcome::Denied,
        };
        self.refresh()?;
        Ok(outcome)
    }

    /// Sends the daily summary right away, or asks for permission first.
    pub fn send_test_notification(self: &Arc<Self>) -> AppResult<PermissionOutcome> {
        if self.capability.is_supported() && self.capability.current_permission() == Permission::Granted {
            let count = self.repository.count(&self.scope)?;
            self.deliver(&daily_summary(count, self.display_name.as_deref()));
            return Ok(PermissionOutcome::Granted);
        }
        self.request_permission()
    }

    /// Runs one evaluation cycle against the current snapshot.
    pub fn run_check(&self) -> AppResult<CheckReport> {
        let _guard = lock(&self.check_guard)?;
        if !self.can_arm()? {
            return Ok(CheckReport::default());
        }

        let now = self.clock.now();
        let daily = self.check_daily(&now)?;
        let due_alerts = self.check_due_dates(&now)?;
        Ok(CheckReport { daily, due_alerts })
    }

    /// Cancels the pending check and returns to `Idle`.
    pub fn shutdown(&self) -> AppResult<()> {
        self.cancel()?;
        self.transition(SchedulerState::Idle);
        Ok(())
    }

    fn check_daily(&self, now: &DateTime<FixedOffset>) -> AppResult<Option<Notification>> {
        let mut settings = lock(&self.settings)?;
        if !daily_reminder_due(&settings, now, self.clock.as_ref()) {
            return Ok(None);
        }

        let count = TodoCount::of(&self.repository.snapshot(&self.scope)?);
        let notification = daily_summary(count, self.display_name.as_deref());
        self.deliver(&notification);

        // Memory records the send before the write can fail.
        settings.last_notification = Some(now.with_timezone(&Utc));
        save_settings(self.store.as_ref(), &self.scope, &settings)?;
        tracing::info!(scope = %self.scope, total = count.total, active = count.active, "daily reminder sent");
        Ok(Some(notification))
    }

    fn check_due_dates(&self, now: &DateTime<FixedOffset>) -> AppResult<Vec<(String, DueAlert)>> {
        let todos = self.repository.snapshot(&self.scope)?;
        let today = now.date_naive();
        let mut log = DueDateLog::load(self.store.as_ref(), &self.scope)?;
        let mut sent = Vec::new();

        for todo in todos.iter().filter(|todo| !todo.completed) {
            let Some(due) = todo.due_date else {
                continue;
            };
            if log.was_sent(&todo.id, today) {
                continue;
            }
            let due = self.clock.localize(due);
            let Some(alert) = classify(&due, now, self.config.due_soon_window) else {
                continue;
            };

            self.deliver(&alert.notification(&todo.text, &due));
            log.mark_sent(&todo.id, today);
            tracing::info!(scope = %self.scope, todo_id = %todo.id, alert = ?alert, "due date alert sent");
            sent.push((todo.id.clone(), alert));
        }

        if !sent.is_empty() {
            log.save(self.store.as_ref(), &self.scope)?;
        }
        Ok(sent)
    }

    fn deliver(&self, notification: &Notification) {
        if let Err(error) = self.capability.emit(notification) {
            tracing::warn!(scope = %self.scope, title = %notification.title, error = %error, "notification emit failed");
        }
    }

    fn can_arm(&self) -> AppResult<bool> {
        Ok(self.capability.is_supported()
            && self.capability.current_permission() == Permission::Granted
            && lock(&self.settings)?.enabled)
    }

    fn update_settings(&self, apply: impl FnOnce(&mut NotificationSettings)) -> AppResult<()> {
        let mut settings = lock(&self.settings)?;
        let mut next = settings.clone();
        apply(&mut next);
        save_settings(self.store.as_ref(), &self.scope, &next)?;
        *settings = next;
        Ok(())
    }

    fn next_delay(&self) -> AppResult<Duration> {
        let now = self.clock.now();
        let time = lock(&self.settings)?.time.as_naive();
        let today_target = now.date_naive().and_time(time);
        let target = if now.naive_local() < today_target {
            today_target
        } else {
            today_target + ChronoDuration::days(1)
        };
        let until_target = (target - now.naive_local()).to_std().unwrap_or(MIN_CHECK_DELAY);
        Ok(until_target.max(MIN_CHECK_DELAY).min(self.config.check_interval))
    }

    fn reschedule(self: &Arc<Self>) -> AppResult<()> {
        let mut task = lock(&self.task)?;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(spawn_loop(Arc::downgrade(self), self.config.initial_delay));
        Ok(())
    }

    fn cancel(&self) -> AppResult<()> {
        if let Some(previous) = lock(&self.task)?.take() {
            previous.abort();
        }
        Ok(())
    }

    /// Clears the task slot only while it still holds loop `id`.
    fn release_task(&self, id: tokio::task::Id) -> bool {
        let Ok(mut task) = self.task.lock() else {
            return false;
        };
        if task.as_ref().is_some_and(|handle| handle.id() == id) {
            task.take();
            true
        } else {
            false
        }
    }

    fn transition(&self, next: SchedulerState) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if *state != next {
            tracing::info!(scope = %self.scope, from = ?*state, to = ?next, "reminder scheduler state changed");
            *state = next;
        }
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

fn spawn_loop(scheduler: Weak<ReminderScheduler>, initial_delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        loop {
            let Some(active) = scheduler.upgrade() else {
                break;
            };

            match active.can_arm() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(scope = %active.scope, "permission or setting withdrawn, stopping reminder loop");
                    if active.release_task(tokio::task::id()) {
                        active.transition(SchedulerState::Disabled);
                    }
                    break;
                }
                Err(error) => {
                    tracing::warn!(scope = %active.scope, error = %error, "reminder loop stopped");
                    break;
                }
            }

            if let Err(error) = active.run_check() {
                tracing::warn!(scope = %active.scope, error = %error, "reminder check failed");
            }
            let delay = active.next_delay().unwrap_or(MIN_CHECK_DELAY);
            drop(active);
            tokio::time::sleep(delay).await;
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("reminder scheduler mutex poisoned".to_string()))
}
