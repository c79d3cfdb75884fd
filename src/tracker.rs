use crate::achievements::evaluate;
use crate::challenge::{new_challenge, refresh_challenge};
use crate::clock::Clock;
use crate::errors::{StoreError, TrackerError};
use crate::models::{
    AchievementId, AchievementSet, ChallengeRequest, ChangeKind, EditRecordRequest,
    MutationResponse, Record, Snapshot, StreakState, SubmitRecordRequest,
};
use crate::state::SharedSnapshot;
use crate::storage::LocalStore;
use crate::streak::compute_streak;
use crate::sync::SyncOrchestrator;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

pub const MAX_NOTE_CHARS: usize = 280;

/// `delta[i] = value[i] - value[i - 1]` for every index from `from` on;
/// the first record's delta is 0.
/// Differences beyond the `i64` range saturate.
pub fn recompute_deltas(records: &mut [Record], from: usize) {
    for i in from..records.len() {
        records[i].delta = if i == 0 {
            0
        } else {
            let diff = i128::from(records[i].value) - i128::from(records[i - 1].value);
            diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
        };
    }
}

/// Apply one change to a chronologically sorted snapshot. Upserts and
/// deletes only take effect when they are at least as new as the record they
/// replace. Returns whether anything changed.
pub fn apply_change(snapshot: &mut Snapshot, kind: &ChangeKind, timestamp: i64) -> bool {
    let records = &mut snapshot.records;
    match kind {
        ChangeKind::Upsert(record) => {
            match records.binary_search_by_key(&record.date, |r| r.date) {
                Ok(index) => {
                    if records[index].timestamp > record.timestamp {
                        return false;
                    }
                    records[index] = record.clone();
                    recompute_deltas(records, index);
                }
                Err(index) => {
                    records.insert(index, record.clone());
                    recompute_deltas(records, index);
                }
            }
            true
        }
        ChangeKind::Delete(date) => match records.binary_search_by_key(date, |r| r.date) {
            Ok(index) if records[index].timestamp <= timestamp => {
                records.remove(index);
                recompute_deltas(records, index);
                true
            }
            _ => false,
        },
        ChangeKind::Challenge(challenge) => {
            snapshot.challenge = challenge.clone();
            true
        }
    }
}

/// Recompute deltas, streak and challenge progress and unlock achievements.
pub fn refresh_derived(snapshot: &mut Snapshot, today: NaiveDate, now_millis: i64) -> Vec<AchievementId> {
    recompute_deltas(&mut snapshot.records, 0);
    snapshot.streak = compute_streak(&snapshot.records, snapshot.streak.longest_streak, today);
    if let Some(challenge) = snapshot.challenge.as_mut() {
        refresh_challenge(challenge, &snapshot.records);
    }
    evaluate(
        &mut snapshot.achievements,
        &snapshot.records,
        &snapshot.streak,
        snapshot.challenge.as_ref(),
        now_millis,
    )
}

fn validate_value(value: i64) -> Result<u64, TrackerError> {
    u64::try_from(value)
        .map_err(|_| TrackerError::Validation("value must be a non-negative integer".to_string()))
}

fn validate_note(note: Option<String>) -> Result<Option<String>, TrackerError> {
    let Some(note) = note else {
        return Ok(None);
    };
    let note = note.trim();
    if note.chars().count() > MAX_NOTE_CHARS {
        return Err(TrackerError::Validation(format!(
            "note must be at most {MAX_NOTE_CHARS} characters"
        )));
    }
    Ok(Some(note.to_string()))
}

/// Timestamp for a local mutation. It is never older than the record it
/// replaces, so the change passes the replay guard and wins a later merge
/// even when the stored record came from a clock running ahead.
fn local_stamp(snapshot: &Snapshot, kind: &ChangeKind, now: i64) -> i64 {
    let date = match kind {
        ChangeKind::Upsert(record) => record.date,
        ChangeKind::Delete(date) => *date,
        ChangeKind::Challenge(_) => return now,
    };
    snapshot
        .records
        .iter()
        .find(|record| record.date == date)
        .map_or(now, |existing| now.max(existing.timestamp.saturating_add(1)))
}

/// Owns every mutation of the record list. Each mutation updates the shared
/// snapshot, persists it, and then hands the change to the sync queue.
pub struct RecordTracker {
    store: LocalStore,
    data: SharedSnapshot,
    sync: Arc<SyncOrchestrator>,
    clock: Arc<dyn Clock>,
}

impl RecordTracker {
    pub fn new(
        store: LocalStore,
        data: SharedSnapshot,
        sync: Arc<SyncOrchestrator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            data,
            sync,
            clock,
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.data.lock().await.clone()
    }

    /// Records newest first.
    pub async fn records(&self) -> Vec<Record> {
        let data = self.data.lock().await;
        data.records.iter().rev().cloned().collect()
    }

    pub async fn streak(&self) -> StreakState {
        self.data.lock().await.streak.clone()
    }

    pub async fn achievements(&self) -> AchievementSet {
        self.data.lock().await.achievements.clone()
    }

    /// Add a record, or update the existing one when the date was already
    /// logged.
    pub async fn submit(&self, request: SubmitRecordRequest) -> Result<MutationResponse, TrackerError> {
        let value = validate_value(request.value)?;
        let note = validate_note(request.note)?;
        let today = self.clock.today();
        let date = request.date.unwrap_or(today);
        if date > today {
            return Err(TrackerError::Validation(
                "date cannot be in the future".to_string(),
            ));
        }

        let now = self.clock.now_millis();
        let existing = {
            let data = self.data.lock().await;
            data.records.iter().find(|r| r.date == date).cloned()
        };
        let record = match existing {
            Some(existing) => Record {
                value,
                note: note.unwrap_or(existing.note),
                timestamp: now,
                ..existing
            },
            None => Record {
                date,
                value,
                delta: 0,
                note: note.unwrap_or_default(),
                timestamp: now,
            },
        };

        self.mutate(ChangeKind::Upsert(record), Some(date)).await
    }

    pub async fn edit(
        &self,
        date: NaiveDate,
        request: EditRecordRequest,
    ) -> Result<MutationResponse, TrackerError> {
        let value = request.value.map(validate_value).transpose()?;
        let note = validate_note(request.note)?;

        let existing = {
            let data = self.data.lock().await;
            data.records.iter().find(|r| r.date == date).cloned()
        }
        .ok_or(TrackerError::NotFound(date))?;

        let record = Record {
            value: value.unwrap_or(existing.value),
            note: note.unwrap_or(existing.note),
            timestamp: self.clock.now_millis(),
            ..existing
        };
        self.mutate(ChangeKind::Upsert(record), Some(date)).await
    }

    pub async fn delete(&self, date: NaiveDate) -> Result<MutationResponse, TrackerError> {
        let known = {
            let data = self.data.lock().await;
            data.records.iter().any(|r| r.date == date)
        };
        if !known {
            return Err(TrackerError::NotFound(date));
        }
        self.mutate(ChangeKind::Delete(date), None).await
    }

    pub async fn set_challenge(&self, request: ChallengeRequest) -> Result<MutationResponse, TrackerError> {
        let target = validate_value(request.target)?;
        if target == 0 {
            return Err(TrackerError::Validation("target must be positive".to_string()));
        }
        let start = request.start_date.unwrap_or_else(|| self.clock.today());
        if request.end_date < start {
            return Err(TrackerError::Validation(
                "end_date must not be before start_date".to_string(),
            ));
        }

        let challenge = new_challenge(target, start, request.end_date);
        self.mutate(ChangeKind::Challenge(Some(challenge)), None).await
    }

    pub async fn clear_challenge(&self) -> Result<MutationResponse, TrackerError> {
        self.mutate(ChangeKind::Challenge(None), None).await
    }

    /// Day-rollover recompute, run at startup and whenever the date may have
    /// changed since the last mutation.
    pub async fn roll_over(&self) -> Result<StreakState, StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        refresh_derived(&mut next, self.clock.today(), self.clock.now_millis());
        if next != *data {
            self.store.save_snapshot(&next).await?;
            *data = next;
        }
        Ok(data.streak.clone())
    }

    async fn mutate(
        &self,
        mut kind: ChangeKind,
        touched: Option<NaiveDate>,
    ) -> Result<MutationResponse, TrackerError> {
        let now = self.clock.now_millis();
        let (stamp, record, streak, challenge, unlocked) = {
            let mut data = self.data.lock().await;
            let stamp = local_stamp(&data, &kind, now);
            if let ChangeKind::Upsert(record) = &mut kind {
                record.timestamp = stamp;
            }
            let mut next = data.clone();
            if !apply_change(&mut next, &kind, stamp) {
                if let ChangeKind::Delete(date) = kind {
                    return Err(TrackerError::NotFound(date));
                }
            }
            let unlocked = refresh_derived(&mut next, self.clock.today(), now);
            self.store.save_snapshot(&next).await?;
            *data = next;

            let record = touched.and_then(|date| data.records.iter().find(|r| r.date == date).cloned());
            (stamp, record, data.streak.clone(), data.challenge.clone(), unlocked)
        };

        if !unlocked.is_empty() {
            info!("unlocked achievements: {unlocked:?}");
        }
        let pending = self.sync.enqueue(kind, stamp).await;

        Ok(MutationResponse {
            record,
            streak,
            challenge,
            unlocked,
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::remote::{BlobStore, MemoryBlobStore};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: LocalStore,
        data: SharedSnapshot,
        clock: Arc<FixedClock>,
        sync: Arc<SyncOrchestrator>,
        tracker: RecordTracker,
    }

    async fn harness(remote: Option<Arc<dyn BlobStore>>) -> Harness {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = LocalStore::open(dir.path()).await.unwrap();
        let data: SharedSnapshot = Arc::default();
        let clock = Arc::new(FixedClock::new(day(1), 1_000));
        let sync = Arc::new(SyncOrchestrator::new(
            store.clone(),
            Arc::clone(&data),
            remote,
            clock.clone(),
            true,
        ));
        let tracker = RecordTracker::new(
            store.clone(),
            Arc::clone(&data),
            Arc::clone(&sync),
            clock.clone(),
        );
        Harness {
            _dir: dir,
            store,
            data,
            clock,
            sync,
            tracker,
        }
    }

    fn submit(date: NaiveDate, value: i64) -> SubmitRecordRequest {
        SubmitRecordRequest {
            date: Some(date),
            value,
            note: None,
        }
    }

    fn expected_delta(records: &[Record], i: usize) -> i64 {
        if i == 0 {
            return 0;
        }
        let diff = i128::from(records[i].value) - i128::from(records[i - 1].value);
        i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
    }

    fn assert_deltas_consistent(records: &[Record]) {
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.delta, expected_delta(records, i), "delta mismatch at {}", record.date);
        }
    }

    #[tokio::test]
    async fn second_day_gets_delta_and_streak() {
        let h = harness(None).await;
        h.tracker.submit(submit(day(1), 100)).await.unwrap();
        h.clock.set_today(day(2));

        let response = h.tracker.submit(submit(day(2), 150)).await.unwrap();
        let record = response.record.unwrap();
        assert_eq!(record.delta, 50);
        assert_eq!(response.streak.current_streak, 2);
        assert!(response.streak.longest_streak >= response.streak.current_streak);
    }

    #[tokio::test]
    async fn same_day_resubmission_updates_in_place() {
        let h = harness(None).await;
        h.tracker.submit(submit(day(1), 100)).await.unwrap();
        let response = h
            .tracker
            .submit(SubmitRecordRequest {
                date: Some(day(1)),
                value: 120,
                note: Some("recount".to_string()),
            })
            .await
            .unwrap();

        let records = h.tracker.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 120);
        assert_eq!(records[0].note, "recount");
        assert_eq!(response.record.unwrap().delta, 0);
    }

    #[tokio::test]
    async fn deleting_middle_record_recomputes_following_delta() {
        let h = harness(None).await;
        h.clock.set_today(day(3));
        for (d, value) in [(1, 100), (2, 150), (3, 120)] {
            h.tracker.submit(submit(day(d), value)).await.unwrap();
        }

        h.tracker.delete(day(2)).await.unwrap();

        let snapshot = h.tracker.snapshot().await;
        let remaining: Vec<_> = snapshot.records.iter().map(|r| (r.date, r.value, r.delta)).collect();
        assert_eq!(remaining, vec![(day(1), 100, 0), (day(3), 120, 20)]);
        assert_eq!(snapshot.streak.current_streak, 1);
        assert!(snapshot.streak.longest_streak >= 3);
    }

    #[tokio::test]
    async fn editing_earlier_record_updates_successor_delta() {
        let h = harness(None).await;
        h.clock.set_today(day(3));
        for (d, value) in [(1, 100), (2, 150), (3, 120)] {
            h.tracker.submit(submit(day(d), value)).await.unwrap();
        }

        h.tracker
            .edit(
                day(1),
                EditRecordRequest {
                    value: Some(200),
                    note: None,
                },
            )
            .await
            .unwrap();

        let snapshot = h.tracker.snapshot().await;
        assert_deltas_consistent(&snapshot.records);
        assert_eq!(snapshot.records[1].delta, -50);
    }

    #[tokio::test]
    async fn backfilled_record_lands_in_order() {
        let h = harness(None).await;
        h.clock.set_today(day(5));
        h.tracker.submit(submit(day(5), 50)).await.unwrap();
        h.tracker.submit(submit(day(2), 20)).await.unwrap();
        h.tracker.submit(submit(day(3), 35)).await.unwrap();

        let snapshot = h.tracker.snapshot().await;
        let dates: Vec<_> = snapshot.records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(2), day(3), day(5)]);
        assert_deltas_consistent(&snapshot.records);
    }

    #[tokio::test]
    async fn invalid_input_leaves_state_untouched() {
        let h = harness(None).await;
        h.tracker.submit(submit(day(1), 10)).await.unwrap();

        let err = h.tracker.submit(submit(day(1), -5)).await.unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        let err = h.tracker.submit(submit(day(9), 5)).await.unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        let err = h
            .tracker
            .submit(SubmitRecordRequest {
                date: None,
                value: 1,
                note: Some("x".repeat(MAX_NOTE_CHARS + 1)),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));

        let records = h.tracker.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 10);
    }

    #[tokio::test]
    async fn unknown_dates_are_not_found() {
        let h = harness(None).await;
        assert!(matches!(
            h.tracker.delete(day(1)).await.unwrap_err(),
            TrackerError::NotFound(_)
        ));
        assert!(matches!(
            h.tracker
                .edit(day(1), EditRecordRequest { value: Some(1), note: None })
                .await
                .unwrap_err(),
            TrackerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let h = harness(None).await;
        h.tracker.submit(submit(day(1), 42)).await.unwrap();

        let stored = h.store.load_snapshot().await;
        assert_eq!(stored.records.len(), 1);
        assert_eq!(stored.records[0].value, 42);
        assert_eq!(stored.streak.current_streak, 1);
    }

    #[tokio::test]
    async fn challenge_progress_follows_latest_value() {
        let h = harness(None).await;
        h.clock.set_today(day(2));
        h.tracker
            .set_challenge(ChallengeRequest {
                target: 300,
                start_date: Some(day(1)),
                end_date: day(31),
            })
            .await
            .unwrap();

        h.tracker.submit(submit(day(1), 200)).await.unwrap();
        let response = h.tracker.submit(submit(day(2), 310)).await.unwrap();

        let challenge = response.challenge.unwrap();
        assert_eq!(challenge.current_progress, 310);
        assert!(challenge.completed);
        assert!(response.unlocked.contains(&AchievementId::ChallengeComplete));
    }

    #[tokio::test]
    async fn first_record_unlocks_achievement() {
        let h = harness(None).await;
        let response = h.tracker.submit(submit(day(1), 5)).await.unwrap();
        assert!(response.unlocked.contains(&AchievementId::FirstRecord));
        let achievements = h.tracker.achievements().await;
        assert!(achievements[&AchievementId::FirstRecord].unlocked);
    }

    #[tokio::test]
    async fn rollover_breaks_stale_streak() {
        let h = harness(None).await;
        h.tracker.submit(submit(day(1), 5)).await.unwrap();
        h.clock.set_today(day(4));

        let streak = h.tracker.roll_over().await.unwrap();
        assert_eq!(streak.current_streak, 0);
        assert_eq!(streak.longest_streak, 1);
        assert!(!streak.today_completed);
    }

    #[tokio::test]
    async fn mutations_flow_into_the_sync_queue() {
        let remote = Arc::new(MemoryBlobStore::new());
        let h = harness(Some(remote.clone() as Arc<dyn BlobStore>)).await;

        let response = h.tracker.submit(submit(day(1), 5)).await.unwrap();
        assert_eq!(response.pending, 1, "signed out: change waits in the queue");

        h.sync.set_authenticated(true);
        let response = h.tracker.submit(submit(day(1), 6)).await.unwrap();
        assert_eq!(response.pending, 0);
        let id = h.store.remote_id().await.unwrap();
        let doc = remote.document(&id).unwrap();
        assert_eq!(doc["records"][0]["value"], serde_json::json!(6));
    }

    #[tokio::test]
    async fn edits_win_over_records_stamped_ahead_of_the_clock() {
        let h = harness(None).await;
        {
            let mut data = h.data.lock().await;
            data.records.push(Record {
                date: day(1),
                value: 100,
                delta: 0,
                note: String::new(),
                timestamp: 10_000,
            });
        }

        let response = h
            .tracker
            .edit(day(1), EditRecordRequest { value: Some(80), note: None })
            .await
            .unwrap();
        let record = response.record.unwrap();
        assert_eq!(record.value, 80);
        assert!(record.timestamp > 10_000);

        let response = h.tracker.submit(submit(day(1), 90)).await.unwrap();
        assert_eq!(response.record.unwrap().value, 90);

        h.tracker.delete(day(1)).await.unwrap();
        assert!(h.tracker.records().await.is_empty());
    }

    #[tokio::test]
    async fn queued_change_carries_the_bumped_timestamp() {
        let remote = Arc::new(MemoryBlobStore::new());
        let h = harness(Some(remote as Arc<dyn BlobStore>)).await;
        {
            let mut data = h.data.lock().await;
            data.records.push(Record {
                date: day(1),
                value: 100,
                delta: 0,
                note: String::new(),
                timestamp: 10_000,
            });
        }

        h.tracker.delete(day(1)).await.unwrap();
        let queued = h.sync.pending();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].timestamp > 10_000);
    }

    #[tokio::test]
    async fn note_length_is_checked_after_trimming() {
        let h = harness(None).await;
        let padded = format!("{}counted twice{}", " ".repeat(200), " ".repeat(200));
        let response = h
            .tracker
            .submit(SubmitRecordRequest {
                date: Some(day(1)),
                value: 7,
                note: Some(padded),
            })
            .await
            .unwrap();
        assert_eq!(response.record.unwrap().note, "counted twice");
    }

    #[test]
    fn huge_values_saturate_the_delta() {
        let mut records = vec![
            Record {
                date: day(1),
                value: u64::MAX,
                delta: 0,
                note: String::new(),
                timestamp: 1,
            },
            Record {
                date: day(2),
                value: 0,
                delta: 0,
                note: String::new(),
                timestamp: 1,
            },
            Record {
                date: day(3),
                value: u64::MAX,
                delta: 0,
                note: String::new(),
                timestamp: 1,
            },
        ];
        recompute_deltas(&mut records, 0);
        assert_eq!(records[1].delta, i64::MIN);
        assert_eq!(records[2].delta, i64::MAX);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Upsert { day: u32, value: u64 },
            Delete { day: u32 },
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1u32..=28, any::<u64>()).prop_map(|(day, value)| Op::Upsert { day, value }),
                (1u32..=28, 0u64..10_000).prop_map(|(day, value)| Op::Upsert { day, value }),
                (1u32..=28).prop_map(|day| Op::Delete { day }),
            ]
        }

        proptest! {
            #[test]
            fn deltas_follow_predecessors_after_any_sequence(ops in prop::collection::vec(op(), 0..60)) {
                let mut snapshot = Snapshot::default();
                for (stamp, op) in ops.into_iter().enumerate() {
                    let stamp = stamp as i64 + 1;
                    let kind = match op {
                        Op::Upsert { day: d, value } => ChangeKind::Upsert(Record {
                            date: day(d),
                            value,
                            delta: 0,
                            note: String::new(),
                            timestamp: stamp,
                        }),
                        Op::Delete { day: d } => ChangeKind::Delete(day(d)),
                    };
                    apply_change(&mut snapshot, &kind, stamp);
                    refresh_derived(&mut snapshot, day(28), stamp);

                    let records = &snapshot.records;
                    prop_assert!(records.windows(2).all(|pair| pair[0].date < pair[1].date));
                    for i in 0..records.len() {
                        prop_assert_eq!(records[i].delta, expected_delta(records, i));
                    }
                    prop_assert!(snapshot.streak.longest_streak >= snapshot.streak.current_streak);
                }
            }
        }
    }
}
