use crate::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

static REMINDER_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").expect("valid reminder time regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Global,
    User(String),
    Shared,
}

impl Scope {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Shared => f.write_str("shared"),
            Self::User(id) => write!(f, "user/{}", id),
        }
    }
}

impl FromStr for Scope {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "global" => Ok(Self::Global),
            "shared" => Ok(Self::Shared),
            other => match other.strip_prefix("user/") {
                Some(id) if !id.trim().is_empty() => Ok(Self::User(id.trim().to_string())),
                _ => Err(AppError::InvalidInput(format!("unknown scope '{}'", raw))),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoCount {
    pub total: usize,
    pub active: usize,
}

impl TodoCount {
    pub fn of(todos: &[Todo]) -> Self {
        Self {
            total: todos.len(),
            active: todos.iter().filter(|todo| !todo.completed).count(),
        }
    }

    pub fn completed(&self) -> usize {
        self.total - self.active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    All,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKind {
    #[default]
    Newest,
    Oldest,
    Alphabetical,
    Priority,
    #[serde(rename = "duedate")]
    DueDate,
}

/// Wall-clock time of day, stored as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReminderTime {
    hour: u32,
    minute: u32,
}

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> AppResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(AppError::InvalidInput(format!(
                "reminder time {}:{} is out of range",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }

    /// Half-hour slots offered by the reminder picker.
    pub fn options() -> Vec<Self> {
        (0..24)
            .flat_map(|hour| [Self { hour, minute: 0 }, Self { hour, minute: 30 }])
            .collect()
    }
}

impl Default for ReminderTime {
    fn default() -> Self {
        Self { hour: 9, minute: 0 }
    }
}

impl From<NaiveTime> for ReminderTime {
    fn from(value: NaiveTime) -> Self {
        Self {
            hour: value.hour(),
            minute: value.minute(),
        }
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ReminderTime {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let caps = REMINDER_TIME_RE
            .captures(raw.trim())
            .ok_or_else(|| AppError::InvalidInput(format!("invalid time '{}', expected HH:MM", raw)))?;
        let hour = caps[1]
            .parse::<u32>()
            .map_err(|error| AppError::InvalidInput(error.to_string()))?;
        let minute = caps[2]
            .parse::<u32>()
            .map_err(|error| AppError::InvalidInput(error.to_string()))?;
        Self::new(hour, minute)
    }
}

impl Serialize for ReminderTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReminderTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    pub time: ReminderTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notification: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    Unset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub check_interval_secs: u64,
    pub initial_check_delay_ms: u64,
    pub due_soon_window_minutes: i64,
    pub default_due_time: ReminderTime,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            initial_check_delay_ms: 1_000,
            due_soon_window_minutes: 60,
            default_due_time: ReminderTime {
                hour: 23,
                minute: 59,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Priority, ReminderTime, Scope, SortKind, TodoCount};

    #[test]
    fn scope_round_trips_through_display() {
        for scope in [Scope::Global, Scope::Shared, Scope::user("user1")] {
            let parsed: Scope = scope.to_string().parse().expect("parse scope");
            assert_eq!(parsed, scope);
        }
        assert!("user/".parse::<Scope>().is_err());
        assert!("family".parse::<Scope>().is_err());
    }

    #[test]
    fn reminder_time_accepts_only_wall_clock_values() {
        let time: ReminderTime = "09:00".parse().expect("parse time");
        assert_eq!((time.hour(), time.minute()), (9, 0));
        assert_eq!("7:05".parse::<ReminderTime>().expect("short hour").to_string(), "07:05");
        assert!("24:00".parse::<ReminderTime>().is_err());
        assert!("12:60".parse::<ReminderTime>().is_err());
        assert!("noon".parse::<ReminderTime>().is_err());
    }

    #[test]
    fn reminder_options_cover_every_half_hour() {
        let options = ReminderTime::options();
        assert_eq!(options.len(), 48);
        assert_eq!(options[0].to_string(), "00:00");
        assert_eq!(options[47].to_string(), "23:30");
    }

    #[test]
    fn enums_use_stored_spelling() {
        assert_eq!(serde_json::to_string(&Priority::High).expect("json"), "\"high\"");
        assert_eq!(serde_json::to_string(&SortKind::DueDate).expect("json"), "\"duedate\"");
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn count_reports_completed_remainder() {
        let count = TodoCount { total: 5, active: 2 };
        assert_eq!(count.completed(), 3);
    }
}
