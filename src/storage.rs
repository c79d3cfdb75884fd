//! File-backed key/value store. Every key lives in `<data_dir>/<key>.json`.

use crate::errors::StoreError;
use crate::models::{AchievementSet, ChallengeState, Record, Snapshot, StreakState, UserProfile};
use crate::tracker::recompute_deltas;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Records,
    Streak,
    Achievements,
    Challenge,
    Users,
    CurrentUser,
    RemoteId,
    MigrationDone,
}

impl StoreKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::Records => "records",
            StoreKey::Streak => "streak",
            StoreKey::Achievements => "achievements",
            StoreKey::Challenge => "challenge",
            StoreKey::Users => "users",
            StoreKey::CurrentUser => "current_user",
            StoreKey::RemoteId => "remote_id",
            StoreKey::MigrationDone => "migration_done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| StoreError::Io {
            key: "data_dir",
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: StoreKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    /// Missing or unreadable keys yield the type's default.
    pub async fn load<T>(&self, key: StoreKey) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(key);
        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(err) => {
                    error!("failed to parse {}: {err}", key.as_str());
                    T::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(err) => {
                error!("failed to read {}: {err}", key.as_str());
                T::default()
            }
        }
    }

    pub async fn save<T>(&self, key: StoreKey, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            key: key.as_str(),
            source,
        })?;
        fs::write(self.path(key), payload)
            .await
            .map_err(|source| StoreError::Io {
                key: key.as_str(),
                source,
            })
    }

    pub async fn load_snapshot(&self) -> Snapshot {
        let records: Vec<Record> = self.load(StoreKey::Records).await;
        let streak: StreakState = self.load(StoreKey::Streak).await;
        let achievements: AchievementSet = self.load(StoreKey::Achievements).await;
        let challenge: Option<ChallengeState> = self.load(StoreKey::Challenge).await;
        let users: Vec<UserProfile> = self.load(StoreKey::Users).await;

        let mut snapshot = Snapshot {
            records,
            streak,
            achievements,
            challenge,
            users,
        };
        snapshot.records.sort_by_key(|record| record.date);
        recompute_deltas(&mut snapshot.records, 0);
        snapshot
    }

    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.save(StoreKey::Records, &snapshot.records).await?;
        self.save(StoreKey::Streak, &snapshot.streak).await?;
        self.save(StoreKey::Achievements, &snapshot.achievements).await?;
        self.save(StoreKey::Challenge, &snapshot.challenge).await?;
        self.save(StoreKey::Users, &snapshot.users).await?;
        Ok(())
    }

    pub async fn remote_id(&self) -> Option<String> {
        self.load(StoreKey::RemoteId).await
    }

    pub async fn set_remote_id(&self, id: Option<&str>) -> Result<(), StoreError> {
        self.save(StoreKey::RemoteId, &id).await
    }

    pub async fn migration_done(&self) -> bool {
        self.load(StoreKey::MigrationDone).await
    }

    pub async fn mark_migration_done(&self) -> Result<(), StoreError> {
        self.save(StoreKey::MigrationDone, &true).await
    }
}
