use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One logged value for a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub value: u64,
    pub delta: i64,
    #[serde(default)]
    pub note: String,
    /// Creation instant in unix milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_record_date: Option<NaiveDate>,
    pub today_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementId {
    FirstRecord,
    Streak3,
    Streak7,
    Streak30,
    Records10,
    Records50,
    Records100,
    Value1000,
    ChallengeComplete,
}

impl AchievementId {
    pub const ALL: [AchievementId; 9] = [
        AchievementId::FirstRecord,
        AchievementId::Streak3,
        AchievementId::Streak7,
        AchievementId::Streak30,
        AchievementId::Records10,
        AchievementId::Records50,
        AchievementId::Records100,
        AchievementId::Value1000,
        AchievementId::ChallengeComplete,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub unlocked: bool,
    pub unlocked_date: Option<i64>,
}

pub type AchievementSet = BTreeMap<AchievementId, Achievement>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeState {
    pub target: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub current_progress: u64,
    pub completed: bool,
    pub completed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub credential_hash: String,
    pub salt: String,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

/// Everything the device holds locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Snapshot {
    /// Chronological order, oldest first.
    pub records: Vec<Record>,
    pub streak: StreakState,
    pub achievements: AchievementSet,
    pub challenge: Option<ChallengeState>,
    pub users: Vec<UserProfile>,
}

/// The document stored in the remote blob store. Fields may be missing when
/// another client wrote the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievements: Option<AchievementSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeState>,
    #[serde(default)]
    pub users: Vec<UserProfile>,
}

impl From<&Snapshot> for RemoteSnapshot {
    fn from(local: &Snapshot) -> Self {
        Self {
            records: local.records.clone(),
            streak: Some(local.streak.clone()),
            achievements: Some(local.achievements.clone()),
            challenge: local.challenge.clone(),
            users: local.users.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChangeKind {
    Upsert(Record),
    Delete(NaiveDate),
    Challenge(Option<ChallengeState>),
}

/// A local mutation waiting to be pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRecordRequest {
    pub date: Option<NaiveDate>,
    pub value: i64,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditRecordRequest {
    pub value: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub target: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub ids: String,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub record: Option<Record>,
    pub streak: StreakState,
    pub challenge: Option<ChallengeState>,
    pub unlocked: Vec<AchievementId>,
    pub pending: usize,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

impl From<&UserProfile> for ProfileResponse {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            username: profile.username.clone(),
            created_at: profile.created_at,
            last_login: profile.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub value: Option<u64>,
    pub delta: i64,
}

#[derive(Debug, Serialize)]
pub struct WeeklyPoint {
    pub week: String,
    pub start_date: String,
    pub end_date: String,
    pub records: u8,
    pub net_delta: i64,
}

#[derive(Debug, Serialize)]
pub struct WeeklyAveragePoint {
    pub week: String,
    pub days_counted: u8,
    pub avg_value: f64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub last_7_days: Vec<DailyPoint>,
    pub weekly_totals: Vec<WeeklyPoint>,
    pub weekly_averages: Vec<WeeklyAveragePoint>,
}
