//! Schedule descriptors and next-due computation.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cron_expr::CronSchedule;
use crate::error::ScheduleError;

/// When a job should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleDescriptor {
    /// Fires on every match of a cron expression.
    Recurring { cron: String },

    /// Fires once at a fixed instant.
    OneShot { run_at: DateTime<Utc> },

    /// Fires every `period_secs` seconds after the previous due time.
    Interval { period_secs: u64 },
}

impl ScheduleDescriptor {
    /// Recurring schedule from a cron expression.
    pub fn recurring(cron: impl Into<String>) -> Self {
        ScheduleDescriptor::Recurring { cron: cron.into() }
    }

    /// One-shot schedule.
    pub fn one_shot(run_at: DateTime<Utc>) -> Self {
        ScheduleDescriptor::OneShot { run_at }
    }

    /// Interval schedule.
    pub fn every(period: std::time::Duration) -> Self {
        ScheduleDescriptor::Interval {
            period_secs: period.as_secs(),
        }
    }

    /// Whether the job runs at most once.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, ScheduleDescriptor::OneShot { .. })
    }

    /// Check the descriptor without evaluating it.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable cron expressions and for intervals that
    /// are zero or too large to add to a timestamp.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            ScheduleDescriptor::Recurring { cron } => CronSchedule::parse(cron).map(|_| ()),
            ScheduleDescriptor::OneShot { .. } => Ok(()),
            ScheduleDescriptor::Interval { period_secs } => interval_period(*period_secs).map(|_| ()),
        }
    }

    /// Next due instant after `after`. See [`next_due`].
    pub fn next_due(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        next_due(self, after)
    }
}

impl fmt::Display for ScheduleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleDescriptor::Recurring { cron } => write!(f, "cron '{}'", cron),
            ScheduleDescriptor::OneShot { run_at } => write!(f, "once at {}", run_at.to_rfc3339()),
            ScheduleDescriptor::Interval { period_secs } => write!(f, "every {}s", period_secs),
        }
    }
}

/// Compute when a job with this schedule is next due.
///
/// - `Recurring`: the earliest cron match strictly after `after`, or `None`
///   if the expression never fires again.
/// - `Interval`: `after + period`.
/// - `OneShot`: the fixed `run_at`, whatever `after` is. Callers disable the
///   job once it has run.
pub fn next_due(
    descriptor: &ScheduleDescriptor,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    match descriptor {
        ScheduleDescriptor::Recurring { cron } => {
            Ok(CronSchedule::parse(cron)?.next_after(&after))
        }
        ScheduleDescriptor::OneShot { run_at } => Ok(Some(*run_at)),
        ScheduleDescriptor::Interval { period_secs } => {
            let period = interval_period(*period_secs)?;
            after
                .checked_add_signed(period)
                .map(Some)
                .ok_or_else(|| ScheduleError::InvalidInterval("next due time overflows".to_string()))
        }
    }
}

fn interval_period(period_secs: u64) -> Result<Duration, ScheduleError> {
    if period_secs == 0 {
        return Err(ScheduleError::InvalidInterval(
            "period must be at least one second".to_string(),
        ));
    }
    i64::try_from(period_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| ScheduleError::InvalidInterval(format!("period {}s is too large", period_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_interval_adds_period() {
        let d = ScheduleDescriptor::Interval { period_secs: 60 };
        assert_eq!(d.next_due(t0()).unwrap(), Some(t0() + Duration::seconds(60)));
    }

    #[test]
    fn test_interval_zero_rejected() {
        let d = ScheduleDescriptor::Interval { period_secs: 0 };
        assert!(matches!(d.validate(), Err(ScheduleError::InvalidInterval(_))));
        assert!(d.next_due(t0()).is_err());
    }

    #[test]
    fn test_interval_too_large_rejected() {
        let d = ScheduleDescriptor::Interval { period_secs: u64::MAX };
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_one_shot_returns_run_at() {
        let run_at = t0() + Duration::hours(2);
        let d = ScheduleDescriptor::one_shot(run_at);
        assert_eq!(d.next_due(t0()).unwrap(), Some(run_at));
        assert_eq!(d.next_due(run_at + Duration::hours(1)).unwrap(), Some(run_at));
        assert!(d.is_one_shot());
    }

    #[test]
    fn test_recurring_validates() {
        assert!(ScheduleDescriptor::recurring("* * * * *").validate().is_ok());
        assert!(ScheduleDescriptor::recurring("not a cron").validate().is_err());
    }

    #[test]
    fn test_recurring_next_due() {
        let d = ScheduleDescriptor::recurring("0 * * * *");
        assert_eq!(
            d.next_due(t0()).unwrap(),
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_every_constructor() {
        let d = ScheduleDescriptor::every(std::time::Duration::from_secs(90));
        assert_eq!(d, ScheduleDescriptor::Interval { period_secs: 90 });
    }

    #[test]
    fn test_serde_tagging() {
        let d = ScheduleDescriptor::recurring("* * * * *");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "recurring");
        assert_eq!(json["cron"], "* * * * *");

        let back: ScheduleDescriptor =
            serde_json::from_str(r#"{"kind":"interval","period_secs":30}"#).unwrap();
        assert_eq!(back, ScheduleDescriptor::Interval { period_secs: 30 });
    }

    #[test]
    fn test_display() {
        assert_eq!(ScheduleDescriptor::recurring("* * * * *").to_string(), "cron '* * * * *'");
        assert_eq!(ScheduleDescriptor::Interval { period_secs: 5 }.to_string(), "every 5s");
    }
}
