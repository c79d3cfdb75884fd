use crate::errors::RemoteError;
use crate::models::RemoteSnapshot;
use crate::remote::BlobStore;
use crate::streak::compute_streak;
use chrono::NaiveDate;
use futures_util::future::try_join_all;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: String,
    pub username: Option<String>,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub latest_value: Option<u64>,
    pub records: usize,
}

fn entry_for(id: &str, mut doc: RemoteSnapshot, today: NaiveDate) -> LeaderboardEntry {
    doc.records.sort_by_key(|record| record.date);
    let previous_longest = doc.streak.as_ref().map(|s| s.longest_streak).unwrap_or(0);
    let streak = compute_streak(&doc.records, previous_longest, today);
    LeaderboardEntry {
        rank: 0,
        id: id.to_string(),
        username: doc.users.first().map(|user| user.username.clone()),
        current_streak: streak.current_streak,
        longest_streak: streak.longest_streak,
        latest_value: doc.records.last().map(|record| record.value),
        records: doc.records.len(),
    }
}

/// Fetch every participant's document concurrently and rank them by current
/// streak, then latest value. One failed fetch fails the whole board.
pub async fn build_leaderboard(
    remote: &dyn BlobStore,
    ids: &[String],
    today: NaiveDate,
) -> Result<Vec<LeaderboardEntry>, RemoteError> {
    let docs = try_join_all(ids.iter().map(|id| async move {
        let doc = remote.read(id).await?;
        let parsed: RemoteSnapshot =
            serde_json::from_value(doc).map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok::<_, RemoteError>(entry_for(id, parsed, today))
    }))
    .await?;

    let mut entries = docs;
    entries.sort_by(|a, b| {
        b.current_streak
            .cmp(&a.current_streak)
            .then(b.latest_value.cmp(&a.latest_value))
            .then(a.id.cmp(&b.id))
    });
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index + 1;
    }
    Ok(entries)
}
