use crate::models::{Notification, ReminderTime};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const BADGE_HORIZON_DAYS: i64 = 7;

/// Why a task deserves an alert right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DueAlert {
    Overdue { days: i64 },
    OverdueToday,
    DueSoon { minutes: i64 },
    DueToday,
    DueTomorrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DueTone {
    Urgent,
    Soon,
    Upcoming,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueLabel {
    pub text: String,
    pub tone: DueTone,
}

/// Calendar days between two wall-clock readings.
///
/// Both sides must already carry the offset in force at their own instant,
/// otherwise a date across a DST change lands on the wrong day.
pub fn day_difference<Tz: TimeZone>(due: &DateTime<Tz>, now: &DateTime<Tz>) -> i64 {
    (due.date_naive() - now.date_naive()).num_days()
}

pub fn classify<Tz: TimeZone>(
    due: &DateTime<Tz>,
    now: &DateTime<Tz>,
    due_soon_window: Duration,
) -> Option<DueAlert> {
    let days = day_difference(due, now);
    let due_utc = due.with_timezone(&Utc);
    let now_utc = now.with_timezone(&Utc);

    match days {
        d if d < 0 => Some(DueAlert::Overdue { days: -d }),
        0 if now_utc > due_utc => Some(DueAlert::OverdueToday),
        0 => {
            let minutes = minutes_until(due_utc, now_utc);
            if minutes <= due_soon_window.num_minutes() {
                Some(DueAlert::DueSoon { minutes })
            } else {
                Some(DueAlert::DueToday)
            }
        }
        1 => Some(DueAlert::DueTomorrow),
        _ => None,
    }
}

impl DueAlert {
    pub fn notification<Tz: TimeZone>(&self, text: &str, due: &DateTime<Tz>) -> Notification
    where
        Tz::Offset: std::fmt::Display,
    {
        let time = format_time(due);
        match *self {
            Self::Overdue { days } => Notification::new(
                "⚠️ Task Overdue!",
                format!("\"{}\" was due {} day{} ago at {}", text, days, plural(days), time),
            ),
            Self::OverdueToday => Notification::new(
                "⚠️ Task Overdue!",
                format!("\"{}\" was due today at {}", text, time),
            ),
            Self::DueSoon { minutes } => Notification::new(
                "🔔 Task Due Soon!",
                format!("\"{}\" is due in {} minute{} at {}", text, minutes, plural(minutes), time),
            ),
            Self::DueToday => Notification::new(
                "🔔 Task Due Today!",
                format!("\"{}\" is due today at {}", text, time),
            ),
            Self::DueTomorrow => Notification::new(
                "📅 Task Due Tomorrow",
                format!("\"{}\" is due tomorrow at {}", text, time),
            ),
        }
    }
}

/// Badge shown next to a task in the list.
pub fn due_label<Tz: TimeZone>(due: &DateTime<Tz>, now: &DateTime<Tz>) -> DueLabel
where
    Tz::Offset: std::fmt::Display,
{
    let days = day_difference(due, now);
    let time = format_time(due);
    let (text, tone) = match days {
        d if d < 0 => (
            format!("Overdue {} day{} • {}", -d, plural(-d), time),
            DueTone::Urgent,
        ),
        0 if now.with_timezone(&Utc) > due.with_timezone(&Utc) => (format!("Overdue • {}", time), DueTone::Urgent),
        0 => (format!("Due today • {}", time), DueTone::Urgent),
        1 => (format!("Due tomorrow • {}", time), DueTone::Soon),
        d if d <= BADGE_HORIZON_DAYS => (format!("Due in {} days • {}", d, time), DueTone::Upcoming),
        _ => (format!("{} • {}", due.format("%b %-d, %Y"), time), DueTone::Neutral),
    };
    DueLabel { text, tone }
}

/// Due instant for a picked calendar date, falling back to `default_time`.
pub fn compose_due_date<Tz: TimeZone>(
    date: NaiveDate,
    time: Option<ReminderTime>,
    default_time: ReminderTime,
    zone: &Tz,
) -> Option<DateTime<Utc>> {
    let time = time.unwrap_or(default_time);
    zone.from_local_datetime(&date.and_time(time.as_naive()))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn minutes_until(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (due - now).num_milliseconds().max(0);
    (millis + 59_999) / 60_000
}

fn format_time<Tz: TimeZone>(due: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    due.format("%-I:%M %p").to_string()
}

fn plural(count: i64) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
