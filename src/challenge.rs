use crate::models::{ChallengeState, Record};
use chrono::NaiveDate;

pub fn new_challenge(target: u64, start_date: NaiveDate, end_date: NaiveDate) -> ChallengeState {
    ChallengeState {
        target,
        start_date,
        end_date,
        current_progress: 0,
        completed: false,
        completed_date: None,
    }
}

/// Progress tracks the latest record's value; it is not accumulated.
/// Completion is sticky once reached.
pub fn refresh_challenge(challenge: &mut ChallengeState, records: &[Record]) {
    let Some(latest) = records.last() else {
        challenge.current_progress = 0;
        return;
    };

    challenge.current_progress = latest.value;
    let in_window = latest.date >= challenge.start_date && latest.date <= challenge.end_date;
    if !challenge.completed && in_window && latest.value >= challenge.target {
        challenge.completed = true;
        challenge.completed_date = Some(latest.date);
    }
}
