//! Reconciliation of the remote document with the local snapshot.
//!
//! Records merge per date (newer timestamp wins, remote wins ties) and user
//! profiles per id (remote wins). The challenge definition is taken from the
//! remote when present. Streak and challenge progress are recomputed from the
//! merged records rather than copied from either side, and achievements merge
//! as a monotonic union.

use crate::achievements::merge_achievements;
use crate::challenge::refresh_challenge;
use crate::models::{Record, RemoteSnapshot, Snapshot, UserProfile};
use crate::streak::compute_streak;
use crate::tracker::recompute_deltas;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Merge two record lists by date. The result is sorted newest first.
pub fn merge_records(remote: &[Record], local: &[Record]) -> Vec<Record> {
    let mut by_date: BTreeMap<NaiveDate, Record> = BTreeMap::new();
    for record in local {
        by_date.insert(record.date, record.clone());
    }
    for record in remote {
        match by_date.get(&record.date) {
            Some(existing) if existing.timestamp > record.timestamp => {}
            _ => {
                by_date.insert(record.date, record.clone());
            }
        }
    }
    by_date.into_values().rev().collect()
}

/// Union of profiles by id; remote entries replace local ones.
pub fn merge_profiles(remote: &[UserProfile], local: &[UserProfile]) -> Vec<UserProfile> {
    let mut merged: Vec<UserProfile> = remote.to_vec();
    for profile in local {
        if !merged.iter().any(|existing| existing.id == profile.id) {
            merged.push(profile.clone());
        }
    }
    merged
}

pub fn merge(remote: Option<&RemoteSnapshot>, local: &Snapshot, today: NaiveDate) -> Snapshot {
    let Some(remote) = remote else {
        return local.clone();
    };

    let mut records = merge_records(&remote.records, &local.records);
    records.reverse();
    recompute_deltas(&mut records, 0);

    let previous_longest = remote
        .streak
        .as_ref()
        .map(|streak| streak.longest_streak)
        .unwrap_or(0)
        .max(local.streak.longest_streak);
    let streak = compute_streak(&records, previous_longest, today);

    let achievements = match &remote.achievements {
        Some(theirs) => merge_achievements(theirs, &local.achievements),
        None => local.achievements.clone(),
    };

    let mut challenge = remote.challenge.clone().or_else(|| local.challenge.clone());
    if let Some(challenge) = challenge.as_mut() {
        let completed_locally = local.challenge.as_ref().is_some_and(|c| {
            c.completed && c.start_date == challenge.start_date && c.target == challenge.target
        });
        if completed_locally && !challenge.completed {
            challenge.completed = true;
            challenge.completed_date = local.challenge.as_ref().and_then(|c| c.completed_date);
        }
        refresh_challenge(challenge, &records);
    }

    Snapshot {
        records,
        streak,
        achievements,
        challenge,
        users: merge_profiles(&remote.users, &local.users),
    }
}
