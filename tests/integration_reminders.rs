use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use our_tasks_lib::db::Database;
use our_tasks_lib::due::DueAlert;
use our_tasks_lib::errors::AppResult;
use our_tasks_lib::models::{FilterKind, Notification, NotificationSettings, Permission, Priority, Scope, SortKind};
use our_tasks_lib::notifications::{save_settings, NotificationCapability};
use our_tasks_lib::query::view;
use our_tasks_lib::repository::TodoRepository;
use our_tasks_lib::scheduler::{ManualClock, ReminderScheduler, SchedulerConfig, SchedulerState};
use our_tasks_lib::session::SessionManager;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inbox {
    received: Mutex<Vec<Notification>>,
}

impl Inbox {
    fn titles(&self) -> Vec<String> {
        self.received
            .lock()
            .expect("inbox")
            .iter()
            .map(|notification| notification.title.clone())
            .collect()
    }
}

impl NotificationCapability for Inbox {
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
        self.received.lock().expect("inbox").push(notification.clone());
        Ok(())
    }
}

fn local(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .expect("offset")
        .with_ymd_and_hms(2026, 10, day, hour, minute, 0)
        .single()
        .expect("local time")
}

fn open_scheduler(
    db_path: &Path,
    scope: &Scope,
    inbox: Arc<Inbox>,
    clock: Arc<ManualClock>,
) -> (Arc<TodoRepository>, Arc<ReminderScheduler>) {
    let store = Arc::new(Database::new(db_path).expect("db"));
    let repository = Arc::new(TodoRepository::new(store.clone()));
    repository.load(scope).expect("load");
    let scheduler = ReminderScheduler::new(
        scope.clone(),
        Some("Giscard".to_string()),
        repository.clone(),
        store,
        inbox,
        clock,
        SchedulerConfig::default(),
    )
    .expect("scheduler");
    (repository, scheduler)
}

#[test]
fn reminders_survive_a_restart_without_duplicates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("tasks.db");
    let scope = Scope::user("user2");
    {
        let store = Database::new(&db_path).expect("db");
        let settings = NotificationSettings {
            enabled: true,
            time: "09:00".parse().expect("time"),
            last_notification: Some(local(17, 9, 0).with_timezone(&Utc)),
        };
        save_settings(&store, &scope, &settings).expect("settings");
    }

    let inbox = Arc::new(Inbox::default());
    let clock = Arc::new(ManualClock::new(local(18, 9, 1)));
    let (repository, scheduler) = open_scheduler(&db_path, &scope, inbox.clone(), clock.clone());
    let todo = repository
        .add(&scope, "renew passport", Priority::High, Some(local(19, 17, 0).with_timezone(&Utc)))
        .expect("add")
        .expect("created");

    let report = scheduler.run_check().expect("check");
    assert!(report.daily.is_some());
    assert_eq!(report.due_alerts, vec![(todo.id.clone(), DueAlert::DueTomorrow)]);
    drop(scheduler);
    drop(repository);

    clock.advance(Duration::minutes(1));
    let (_, restarted) = open_scheduler(&db_path, &scope, inbox.clone(), clock.clone());
    assert!(restarted.run_check().expect("check after restart").is_empty());
    assert_eq!(
        inbox.titles(),
        vec![
            "📝 Giscard, you have 1 pending task".to_string(),
            "📅 Task Due Tomorrow".to_string(),
        ]
    );

    clock.set(local(19, 16, 30));
    let next_day = restarted.run_check().expect("next day");
    assert_eq!(next_day.due_alerts, vec![(todo.id, DueAlert::DueSoon { minutes: 30 })]);
}

#[test]
fn repository_and_query_engine_cooperate_across_scopes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(Database::new(&dir.path().join("tasks.db")).expect("db"));
    let repository = TodoRepository::new(store.clone());
    let mine = Scope::user("user1");
    let ours = Scope::Shared;

    let now = Utc::now();
    let a = repository
        .add(&mine, "A", Priority::Low, Some(now + Duration::days(2)))
        .expect("add")
        .expect("created");
    let b = repository.add(&mine, "B", Priority::High, None).expect("add").expect("created");
    let c = repository
        .add(&mine, "C", Priority::Medium, Some(now + Duration::days(1)))
        .expect("add")
        .expect("created");
    repository.toggle_completed(&mine, &b.id).expect("toggle");
    repository.seed_demo_tasks(&ours).expect("seed");

    let reloaded = TodoRepository::new(store).load(&mine).expect("load");
    let by_due = view(&reloaded, FilterKind::All, SortKind::DueDate);
    assert_eq!(
        by_due.iter().map(|todo| todo.id.as_str()).collect::<Vec<_>>(),
        vec![c.id.as_str(), a.id.as_str(), b.id.as_str()]
    );
    let active = view(&reloaded, FilterKind::Active, SortKind::Priority);
    assert_eq!(active.iter().map(|todo| todo.text.as_str()).collect::<Vec<_>>(), vec!["C", "A"]);
    assert_eq!(repository.count(&ours).expect("count").total, 3);
    assert_eq!(repository.count(&mine).expect("count").completed(), 1);
}

#[tokio::test]
async fn sessions_arm_per_scope() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(Database::new(&dir.path().join("tasks.db")).expect("db"));
    let repository = Arc::new(TodoRepository::new(store.clone()));
    let inbox = Arc::new(Inbox::default());
    let manager = SessionManager::new(
        repository,
        store.clone(),
        inbox.clone(),
        Arc::new(ManualClock::new(local(18, 8, 0))),
        SchedulerConfig::default(),
    );

    let enabled = NotificationSettings {
        enabled: true,
        ..NotificationSettings::default()
    };
    save_settings(store.as_ref(), &Scope::Shared, &enabled).expect("settings");

    let shared = manager.activate(Scope::Shared, None).await.expect("shared");
    let global = manager.activate(Scope::Global, None).await.expect("global");
    assert_eq!(shared.scheduler.state(), SchedulerState::Armed);
    assert_eq!(global.scheduler.state(), SchedulerState::Disabled);

    assert_eq!(
        global.scheduler.set_enabled(true).expect("enable"),
        SchedulerState::Armed
    );
    manager.shutdown_all().await.expect("shutdown");
    assert_eq!(shared.scheduler.state(), SchedulerState::Idle);
    assert!(inbox.titles().is_empty());
}
