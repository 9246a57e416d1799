//! Cron expression parsing and evaluation.
//!
//! Expressions are accepted in the standard 5-field form
//! (`minute hour day_of_month month day_of_week`) or with a leading seconds
//! field. They are evaluated with the `cron` crate after two adjustments:
//!
//! - day-of-week numbers are read the standard way (`0`-`6` = Sunday to
//!   Saturday, `7` = Sunday) and rewritten to the `cron` crate's 1-based
//!   numbering
//! - when both day-of-month and day-of-week are restricted, a day matches if
//!   either field matches, so the expression is split into two schedules and
//!   the earlier firing wins. A field starting with `*` (including `*/n`)
//!   counts as unrestricted, as in Vixie cron
//!
//! Every field is range-checked before translation so errors always refer to
//! the expression the caller wrote.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::ScheduleError;

const SECOND: usize = 0;
const DAY_OF_MONTH: usize = 3;
const DAY_OF_WEEK: usize = 5;

/// Name and inclusive numeric bounds of each field, seconds first.
const FIELDS: [(&str, u32, u32); 6] = [
    ("second", 0, 59),
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day-of-month", 1, 31),
    ("month", 1, 12),
    ("day-of-week", 0, 7),
];

/// A parsed cron expression.
#[derive(Clone)]
pub struct CronSchedule {
    /// Expression as supplied by the caller.
    expression: String,

    /// One schedule, or two when day-of-month and day-of-week are OR-ed.
    schedules: Vec<Schedule>,
}

impl CronSchedule {
    /// Parse a 5- or 6-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidCron`] when the field count is wrong or
    /// any field fails to parse.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let mut fields: Vec<String> = expression
            .split_whitespace()
            .map(str::to_string)
            .collect();

        match fields.len() {
            5 => fields.insert(SECOND, "0".to_string()),
            6 => {}
            n => {
                return Err(ScheduleError::cron(
                    expression,
                    format!("expected 5 or 6 fields, found {}", n),
                ))
            }
        }

        for field in &mut fields {
            if field == "?" {
                *field = "*".to_string();
            }
        }

        for (field, &(name, min, max)) in fields.iter().zip(FIELDS.iter()) {
            check_field(expression, field, name, min, max)?;
        }

        let dom_restricted = !fields[DAY_OF_MONTH].starts_with('*');
        let dow_restricted = !fields[DAY_OF_WEEK].starts_with('*');
        fields[DAY_OF_WEEK] = translate_day_of_week(expression, &fields[DAY_OF_WEEK])?;

        let variants = if dom_restricted && dow_restricted {
            let mut by_month_day = fields.clone();
            by_month_day[DAY_OF_WEEK] = "*".to_string();
            let mut by_week_day = fields;
            by_week_day[DAY_OF_MONTH] = "*".to_string();
            vec![by_month_day, by_week_day]
        } else {
            vec![fields]
        };

        let schedules = variants
            .iter()
            .map(|f| {
                // The crate's message quotes the rewritten fields, so it is not
                // passed through.
                Schedule::from_str(&f.join(" "))
                    .map_err(|_| ScheduleError::cron(expression, "unsupported field syntax"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: expression.trim().to_string(),
            schedules,
        })
    }

    /// The expression as supplied.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Earliest firing strictly after `after`, or `None` if the expression
    /// never fires again.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(after).find(|t| t > after))
            .min()
    }

    /// Successive firings after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let mut cursor = after;
        std::iter::from_fn(move || {
            let next = self.next_after(&cursor)?;
            cursor = next;
            Some(next)
        })
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronSchedule")
            .field("expression", &self.expression)
            .finish()
    }
}

/// Check the shape and numeric bounds of one field. Names are only accepted
/// in the month and day-of-week fields and are left to the `cron` crate.
fn check_field(
    expression: &str,
    field: &str,
    name: &str,
    min: u32,
    max: u32,
) -> Result<(), ScheduleError> {
    let invalid = |item: &str| {
        ScheduleError::cron(expression, format!("invalid {} value '{}'", name, item))
    };
    let names_allowed = name == "month" || name == "day-of-week";

    for item in field.split(',') {
        let base = match item.split_once('/') {
            Some((base, step)) => {
                match step.parse::<u32>() {
                    Ok(step) if step > 0 => {}
                    _ => {
                        return Err(ScheduleError::cron(
                            expression,
                            format!("invalid step in {} field '{}'", name, item),
                        ))
                    }
                }
                base
            }
            None => item,
        };
        if base == "*" {
            continue;
        }

        let bounds: Vec<&str> = base.split('-').collect();
        if bounds.len() > 2 {
            return Err(invalid(item));
        }
        let mut numbers = Vec::with_capacity(2);
        for bound in &bounds {
            if let Ok(n) = bound.parse::<u32>() {
                if n < min || n > max {
                    return Err(ScheduleError::cron(
                        expression,
                        format!("{} value {} is outside {}-{}", name, n, min, max),
                    ));
                }
                numbers.push(n);
            } else if !(names_allowed
                && !bound.is_empty()
                && bound.chars().all(|c| c.is_ascii_alphabetic()))
            {
                return Err(invalid(item));
            }
        }
        if let [start, end] = numbers[..] {
            if start > end {
                return Err(ScheduleError::cron(
                    expression,
                    format!("{} range '{}' runs backwards", name, base),
                ));
            }
        }
    }

    Ok(())
}

/// Rewrite a standard day-of-week field (`0`/`7` = Sunday) into the `cron`
/// crate's numbering (`1` = Sunday). Names pass through unchanged.
fn translate_day_of_week(expression: &str, field: &str) -> Result<String, ScheduleError> {
    if field == "*" {
        return Ok(field.to_string());
    }

    let mut items = Vec::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step.parse().map_err(|_| {
                    ScheduleError::cron(expression, format!("invalid step in '{}'", item))
                })?;
                if step == 0 {
                    return Err(ScheduleError::cron(expression, "step must be positive"));
                }
                (base, Some(step))
            }
            None => (item, None),
        };
        let suffix = step.map(|s| format!("/{}", s)).unwrap_or_default();

        if base == "*" {
            items.push(format!("*{}", suffix));
            continue;
        }

        match base.split_once('-') {
            Some((start, end)) => match (weekday_number(start), weekday_number(end)) {
                (Some(start), Some(7)) if start > 0 => {
                    // Sunday wraps around to the front of the crate's week.
                    items.push(format!("{}-7{}", start + 1, suffix));
                    let step = step.unwrap_or(1);
                    if (7 - start) % step == 0 {
                        items.push("1".to_string());
                    }
                }
                (Some(start), Some(end)) => {
                    if start > end {
                        return Err(ScheduleError::cron(
                            expression,
                            format!("day-of-week range '{}' runs backwards", base),
                        ));
                    }
                    let end = if end == 7 { 7 } else { end + 1 };
                    items.push(format!("{}-{}{}", start + 1, end, suffix));
                }
                _ => items.push(item.to_string()),
            },
            None => match weekday_number(base) {
                Some(day) => items.push(format!("{}{}", crate_weekday(day), suffix)),
                None => items.push(item.to_string()),
            },
        }
    }

    Ok(items.join(","))
}

/// Parse a numeric day of week in the standard 0-7 range.
fn weekday_number(token: &str) -> Option<u32> {
    token.parse::<u32>().ok().filter(|d| *d <= 7)
}

fn crate_weekday(day: u32) -> u32 {
    if day == 7 {
        1
    } else {
        day + 1
    }
}

#[cfg(test)]
#[path = "cron_expr_tests.rs"]
mod tests;
