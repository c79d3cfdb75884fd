use crate::models::{Record, StreakState};
use chrono::{Duration, NaiveDate};

/// Recompute the streak from chronologically sorted records.
///
/// The current streak is the run of consecutive days ending at the latest
/// record, and drops to zero once that record is older than yesterday.
/// `previous_longest` keeps the longest streak from shrinking when records
/// are deleted.
pub fn compute_streak(records: &[Record], previous_longest: u32, today: NaiveDate) -> StreakState {
    let mut run = 0u32;
    let mut longest_run = 0u32;
    let mut prev: Option<NaiveDate> = None;

    for record in records {
        run = match prev {
            Some(date) if record.date == date => run,
            Some(date) if record.date == date + Duration::days(1) => run + 1,
            _ => 1,
        };
        longest_run = longest_run.max(run);
        prev = Some(record.date);
    }

    let last_record_date = records.last().map(|record| record.date);
    let current_streak = match last_record_date {
        Some(date) if date >= today - Duration::days(1) => run,
        _ => 0,
    };

    StreakState {
        current_streak,
        longest_streak: previous_longest.max(longest_run).max(current_streak),
        last_record_date,
        today_completed: records.iter().any(|record| record.date == today),
    }
}
