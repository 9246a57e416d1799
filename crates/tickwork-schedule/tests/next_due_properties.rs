//! Property tests for next-due computation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use tickwork_schedule::{next_due, CronSchedule, ScheduleDescriptor};

const EXPRESSIONS: &[&str] = &[
    "* * * * *",
    "*/5 * * * *",
    "15 3 * * *",
    "0 0 1 * *",
    "0 9 * * 1-5",
    "0 0 13 * 5",
    "30 */2 * * 0,6",
    "10 * * * * *",
];

fn instant(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs)
}

proptest! {
    #[test]
    fn cron_next_due_is_strictly_after(idx in 0..EXPRESSIONS.len(), offset in 0i64..(4 * 365 * 86_400)) {
        let descriptor = ScheduleDescriptor::recurring(EXPRESSIONS[idx]);
        let after = instant(offset);
        let next = next_due(&descriptor, after).unwrap().unwrap();
        prop_assert!(next > after);
    }

    #[test]
    fn cron_next_due_chain_is_increasing(idx in 0..EXPRESSIONS.len(), offset in 0i64..(365 * 86_400)) {
        let descriptor = ScheduleDescriptor::recurring(EXPRESSIONS[idx]);
        let first = next_due(&descriptor, instant(offset)).unwrap().unwrap();
        let second = next_due(&descriptor, first).unwrap().unwrap();
        let third = next_due(&descriptor, second).unwrap().unwrap();
        prop_assert!(first < second);
        prop_assert!(second < third);
    }

    #[test]
    fn cron_next_due_has_no_earlier_match(idx in 0..EXPRESSIONS.len(), offset in 0i64..(365 * 86_400)) {
        // Stepping forward from `after` one firing at a time never lands
        // before the first reported firing.
        let cron = CronSchedule::parse(EXPRESSIONS[idx]).unwrap();
        let after = instant(offset);
        let next = cron.next_after(&after).unwrap();
        let probe = after + (next - after) / 2;
        if probe > after {
            prop_assert_eq!(cron.next_after(&probe), Some(next));
        }
    }

    #[test]
    fn interval_next_due_adds_period(period in 1u64..1_000_000, offset in 0i64..1_000_000_000) {
        let descriptor = ScheduleDescriptor::Interval { period_secs: period };
        let after = instant(offset);
        let next = next_due(&descriptor, after).unwrap().unwrap();
        prop_assert_eq!(next - after, Duration::seconds(period as i64));
    }
}
