//! Limited cron expression evaluation.
//!
//! Expressions must have five whitespace-separated fields
//! (`minute hour day-of-month month day-of-week`), but only four exact
//! shapes are computed:
//!
//! | Expression      | Next run                                   |
//! |-----------------|--------------------------------------------|
//! | `0 * * * *`     | top of the next hour                       |
//! | `0 0 * * *`     | next midnight (UTC)                        |
//! | `M * * * *`     | minute `M` of the following hour           |
//! | `M H * * *`     | `H:M` on the following day                 |
//!
//! Every other well-formed expression falls back to "one hour from now".
//! This is a scope limit, not a partial cron implementation: step values,
//! lists, ranges and the day/month fields are deliberately not interpreted.

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::error::{Result, SchedulerError};

/// Number of fields in a cron expression.
const FIELD_COUNT: usize = 5;

/// The computable subset of cron expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronShape {
    /// `0 * * * *`
    TopOfHour,
    /// `0 0 * * *`
    Midnight,
    /// `M * * * *`
    MinuteOfHour { minute: u32 },
    /// `M H * * *`
    DailyAt { hour: u32, minute: u32 },
    /// Any other five-field expression.
    Unsupported,
}

impl CronShape {
    /// Parse an expression into its shape.
    ///
    /// Fails only when the expression does not have exactly five fields.
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(SchedulerError::Validation(format!(
                "cron expression '{}' has {} fields, expected {} (minute hour day-of-month month day-of-week)",
                expression,
                fields.len(),
                FIELD_COUNT
            )));
        }

        let shape = match fields.as_slice() {
            ["0", "*", "*", "*", "*"] => CronShape::TopOfHour,
            ["0", "0", "*", "*", "*"] => CronShape::Midnight,
            [minute, "*", "*", "*", "*"] => match parse_bounded(minute, 59) {
                Some(minute) => CronShape::MinuteOfHour { minute },
                None => CronShape::Unsupported,
            },
            [minute, hour, "*", "*", "*"] => {
                match (parse_bounded(minute, 59), parse_bounded(hour, 23)) {
                    (Some(minute), Some(hour)) => CronShape::DailyAt { hour, minute },
                    _ => CronShape::Unsupported,
                }
            }
            _ => CronShape::Unsupported,
        };

        Ok(shape)
    }

    /// Compute the next run strictly after `from`, with seconds zeroed.
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            CronShape::TopOfHour => truncate_to_hour(from) + Duration::hours(1),
            CronShape::MinuteOfHour { minute } => {
                truncate_to_hour(from) + Duration::hours(1) + Duration::minutes(minute as i64)
            }
            CronShape::Midnight => truncate_to_day(from) + Duration::days(1),
            CronShape::DailyAt { hour, minute } => {
                truncate_to_day(from)
                    + Duration::days(1)
                    + Duration::hours(hour as i64)
                    + Duration::minutes(minute as i64)
            }
            CronShape::Unsupported => truncate_to_minute(from + Duration::hours(1)),
        }
    }

    /// Whether `now` falls on a minute this shape fires at.
    ///
    /// Unsupported shapes are never due through this path.
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        match *self {
            CronShape::TopOfHour => now.minute() == 0,
            CronShape::Midnight => now.hour() == 0 && now.minute() == 0,
            CronShape::MinuteOfHour { minute } => now.minute() == minute,
            CronShape::DailyAt { hour, minute } => now.hour() == hour && now.minute() == minute,
            CronShape::Unsupported => false,
        }
    }

    /// Whether next-run computation for this shape is exact rather than
    /// the one-hour fallback.
    pub fn is_supported(&self) -> bool {
        !matches!(self, CronShape::Unsupported)
    }
}

/// Compute the next due time for `expression` strictly after `from`.
pub fn next_run_time(expression: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Ok(CronShape::parse(expression)?.next_after(from))
}

/// Whether `expression` is due at `now`. Malformed expressions are never due.
pub fn is_due_now(expression: &str, now: DateTime<Utc>) -> bool {
    CronShape::parse(expression)
        .map(|shape| shape.matches(now))
        .unwrap_or(false)
}

/// Human-readable description of an expression.
pub fn describe(expression: &str) -> String {
    match CronShape::parse(expression) {
        Ok(CronShape::TopOfHour) => "Every hour".to_string(),
        Ok(CronShape::Midnight) => "Every day at midnight".to_string(),
        Ok(CronShape::MinuteOfHour { minute }) => {
            format!("Every hour at minute {}", minute)
        }
        Ok(CronShape::DailyAt { hour, minute }) => {
            format!("Every day at {:02}:{:02}", hour, minute)
        }
        Ok(CronShape::Unsupported) => format!("Custom schedule: {}", expression.trim()),
        Err(_) => format!("Invalid cron expression: {}", expression.trim()),
    }
}

/// Whether `expression` has the five required fields.
pub fn validate(expression: &str) -> bool {
    CronShape::parse(expression).is_ok()
}

/// Parse a plain decimal field no greater than `max`.
fn parse_bounded(field: &str, max: u32) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse::<u32>().ok().filter(|value| *value <= max)
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::seconds(t.second() as i64) - Duration::nanoseconds(t.nanosecond() as i64)
}

fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(t) - Duration::minutes(t.minute() as i64)
}

fn truncate_to_day(t: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_hour(t) - Duration::hours(t.hour() as i64)
}
