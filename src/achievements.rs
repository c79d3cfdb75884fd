use crate::models::{Achievement, AchievementId, AchievementSet, ChallengeState, Record, StreakState};

fn earned(
    id: AchievementId,
    records: &[Record],
    streak: &StreakState,
    challenge: Option<&ChallengeState>,
) -> bool {
    let best_streak = streak.longest_streak.max(streak.current_streak);
    match id {
        AchievementId::FirstRecord => !records.is_empty(),
        AchievementId::Streak3 => best_streak >= 3,
        AchievementId::Streak7 => best_streak >= 7,
        AchievementId::Streak30 => best_streak >= 30,
        AchievementId::Records10 => records.len() >= 10,
        AchievementId::Records50 => records.len() >= 50,
        AchievementId::Records100 => records.len() >= 100,
        AchievementId::Value1000 => records.iter().any(|record| record.value >= 1000),
        AchievementId::ChallengeComplete => challenge.is_some_and(|c| c.completed),
    }
}

/// Unlock every achievement whose condition now holds and return the ones
/// that were newly unlocked. Unlocked entries are never reverted.
pub fn evaluate(
    set: &mut AchievementSet,
    records: &[Record],
    streak: &StreakState,
    challenge: Option<&ChallengeState>,
    now_millis: i64,
) -> Vec<AchievementId> {
    let mut unlocked = Vec::new();
    for id in AchievementId::ALL {
        let entry = set.entry(id).or_default();
        if !entry.unlocked && earned(id, records, streak, challenge) {
            *entry = Achievement {
                unlocked: true,
                unlocked_date: Some(now_millis),
            };
            unlocked.push(id);
        }
    }
    unlocked
}

/// Union of two sets: unlocked on either side stays unlocked, keeping the
/// earliest unlock time.
pub fn merge_achievements(remote: &AchievementSet, local: &AchievementSet) -> AchievementSet {
    let mut merged = local.clone();
    for (id, theirs) in remote {
        let entry = merged.entry(*id).or_default();
        *entry = match (entry.unlocked, theirs.unlocked) {
            (true, true) => Achievement {
                unlocked: true,
                unlocked_date: match (entry.unlocked_date, theirs.unlocked_date) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                },
            },
            (false, true) => *theirs,
            _ => *entry,
        };
    }
    merged
}
