use crate::clock::Clock;
use crate::errors::AuthError;
use crate::events::{AppEvent, EventBus};
use crate::models::UserProfile;
use crate::state::SharedSnapshot;
use crate::storage::{LocalStore, StoreKey};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const MIN_PASSWORD_LEN: usize = 6;

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub fn credential_hash(salt: &str, password: &str) -> String {
    sha256_hex(&[salt, password])
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '@');
    if !(3..=64).contains(&username.len()) || !valid_chars {
        return Err(AuthError::Validation(
            "username must be 3-64 characters of letters, digits, '_', '-', '.', '@'".to_string(),
        ));
    }
    Ok(())
}

/// Local user profiles and the active login. Login and logout are published
/// on the [`EventBus`] so the sync orchestrator can react.
pub struct SessionService {
    store: LocalStore,
    data: SharedSnapshot,
    events: EventBus,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<String>>,
}

impl SessionService {
    pub fn new(store: LocalStore, data: SharedSnapshot, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            data,
            events,
            clock,
            current: Mutex::new(None),
        }
    }

    /// Resume the login persisted by a previous run.
    pub async fn restore(&self) -> Option<UserProfile> {
        let user_id: Option<String> = self.store.load(StoreKey::CurrentUser).await;
        let user_id = user_id?;
        let profile = {
            let data = self.data.lock().await;
            data.users.iter().find(|user| user.id == user_id).cloned()
        };
        match profile {
            Some(profile) => {
                *self.current.lock().await = Some(profile.id.clone());
                self.events.publish(AppEvent::LoggedIn {
                    user_id: profile.id.clone(),
                });
                info!("restored session for {}", profile.username);
                Some(profile)
            }
            None => {
                warn!("stored session {user_id} has no matching profile");
                None
            }
        }
    }

    pub async fn current(&self) -> Option<UserProfile> {
        let user_id = self.current.lock().await.clone()?;
        let data = self.data.lock().await;
        data.users.iter().find(|user| user.id == user_id).cloned()
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<UserProfile, AuthError> {
        let username = username.trim();
        validate_username(username)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let now = self.clock.now_millis();
        let profile = {
            let mut data = self.data.lock().await;
            if data
                .users
                .iter()
                .any(|user| user.username.eq_ignore_ascii_case(username))
            {
                return Err(AuthError::UsernameTaken(username.to_string()));
            }

            let stamp = now.to_string();
            let salt = sha256_hex(&["salt", username, stamp.as_str()])[..16].to_string();
            let profile = UserProfile {
                id: format!("user-{}", &sha256_hex(&["id", username, stamp.as_str()])[..12]),
                username: username.to_string(),
                credential_hash: credential_hash(&salt, password),
                salt,
                created_at: now,
                last_login: Some(now),
            };
            let mut users = data.users.clone();
            users.push(profile.clone());
            self.store.save(StoreKey::Users, &users).await?;
            data.users = users;
            profile
        };

        self.activate(&profile).await?;
        info!("registered {}", profile.username);
        Ok(profile)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, AuthError> {
        let username = username.trim();
        let now = self.clock.now_millis();
        let profile = {
            let mut data = self.data.lock().await;
            let index = data
                .users
                .iter()
                .position(|user| user.username.eq_ignore_ascii_case(username))
                .ok_or(AuthError::InvalidCredentials)?;
            let user = &data.users[index];
            if credential_hash(&user.salt, password) != user.credential_hash {
                return Err(AuthError::InvalidCredentials);
            }

            let mut users = data.users.clone();
            users[index].last_login = Some(now);
            self.store.save(StoreKey::Users, &users).await?;
            data.users = users;
            data.users[index].clone()
        };

        self.activate(&profile).await?;
        info!("{} logged in", profile.username);
        Ok(profile)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        let previous = self.current.lock().await.take();
        if previous.is_none() {
            return Err(AuthError::NotLoggedIn);
        }
        self.store.save(StoreKey::CurrentUser, &None::<String>).await?;
        self.events.publish(AppEvent::LoggedOut);
        Ok(())
    }

    async fn activate(&self, profile: &UserProfile) -> Result<(), AuthError> {
        self.store
            .save(StoreKey::CurrentUser, &Some(profile.id.clone()))
            .await?;
        *self.current.lock().await = Some(profile.id.clone());
        self.events.publish(AppEvent::LoggedIn {
            user_id: profile.id.clone(),
        });
        Ok(())
    }
}
