//! Common cron expressions.

/// Every minute.
pub const EVERY_MINUTE: &str = "* * * * *";

/// Every hour, on the hour.
pub const HOURLY: &str = "0 * * * *";

/// Every day at midnight UTC.
pub const DAILY: &str = "0 0 * * *";

/// Every Sunday at midnight UTC.
pub const WEEKLY: &str = "0 0 * * 0";

/// First day of each month at midnight UTC.
pub const MONTHLY: &str = "0 0 1 * *";

/// January 1st at midnight UTC.
pub const YEARLY: &str = "0 0 1 1 *";

/// Every `minutes` minutes.
pub fn every_minutes(minutes: u32) -> String {
    format!("*/{} * * * *", minutes)
}

/// Every `hours` hours, on the hour.
pub fn every_hours(hours: u32) -> String {
    format!("0 */{} * * *", hours)
}

/// Every day at `hour:minute` UTC.
pub fn daily_at(hour: u32, minute: u32) -> String {
    format!("{} {} * * *", minute, hour)
}
