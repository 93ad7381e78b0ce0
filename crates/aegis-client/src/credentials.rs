//! Credential storage.
//!
//! Tokens are stored with an expiry timestamp and read back as absent once it
//! passes, mirroring the dashboard's cookie lifetimes (1 day access, 7 days
//! refresh). The cached user has no expiry and only goes away on `clear`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TokenLifetimes;
use crate::types::SessionUser;

pub const SESSION_FILE: &str = "session.json";
pub const USER_FILE: &str = "user.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no state directory available")]
    NoStateDir,
}

/// Owner of the session credentials.
///
/// Reads never fail: an unreadable or expired credential is reported as absent.
pub trait CredentialStore: Send + Sync {
    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError>;
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    /// Drops both tokens and the cached user. Idempotent.
    fn clear(&self) -> Result<(), StoreError>;
    fn cache_user(&self, user: &SessionUser) -> Result<(), StoreError>;
    fn cached_user(&self) -> Option<SessionUser>;
}

pub fn memory(lifetimes: TokenLifetimes) -> Arc<dyn CredentialStore> {
    Arc::new(MemoryCredentialStore::new(lifetimes))
}

pub fn file(dir: impl Into<PathBuf>, lifetimes: TokenLifetimes) -> Arc<dyn CredentialStore> {
    Arc::new(FileCredentialStore::new(dir, lifetimes))
}

/// `<data dir>/aegis`, where the CLI keeps its session by default.
pub fn default_state_dir() -> Result<PathBuf, StoreError> {
    dirs::data_dir()
        .map(|dir| dir.join("aegis"))
        .ok_or(StoreError::NoStateDir)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    fn issue(value: &str, lifetime: chrono::Duration, now: DateTime<Utc>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now + lifetime,
        }
    }

    fn live_value(&self, now: DateTime<Utc>) -> Option<String> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<StoredToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<StoredToken>,
}

impl StoredTokens {
    fn issue(access_token: &str, refresh_token: &str, lifetimes: TokenLifetimes) -> Self {
        let now = Utc::now();
        Self {
            access_token: Some(StoredToken::issue(access_token, lifetimes.access, now)),
            refresh_token: Some(StoredToken::issue(refresh_token, lifetimes.refresh, now)),
        }
    }

    fn access(&self) -> Option<String> {
        self.access_token
            .as_ref()
            .and_then(|token| token.live_value(Utc::now()))
    }

    fn refresh(&self) -> Option<String> {
        self.refresh_token
            .as_ref()
            .and_then(|token| token.live_value(Utc::now()))
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    tokens: StoredTokens,
    user: Option<SessionUser>,
}

/// Process-local store; each instance is an isolated session.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    lifetimes: TokenLifetimes,
    inner: Mutex<MemoryInner>,
}

impl MemoryCredentialStore {
    pub fn new(lifetimes: TokenLifetimes) -> Self {
        Self {
            lifetimes,
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new(TokenLifetimes::default())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        self.lock().tokens = StoredTokens::issue(access_token, refresh_token, self.lifetimes);
        Ok(())
    }

    fn access_token(&self) -> Option<String> {
        self.lock().tokens.access()
    }

    fn refresh_token(&self) -> Option<String> {
        self.lock().tokens.refresh()
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.lock() = MemoryInner::default();
        Ok(())
    }

    fn cache_user(&self, user: &SessionUser) -> Result<(), StoreError> {
        self.lock().user = Some(user.clone());
        Ok(())
    }

    fn cached_user(&self) -> Option<SessionUser> {
        self.lock().user.clone()
    }
}

/// JSON files in a state directory: `session.json` for the tokens and
/// `user.json` for the cached profile.
#[derive(Debug)]
pub struct FileCredentialStore {
    dir: PathBuf,
    lifetimes: TokenLifetimes,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>, lifetimes: TokenLifetimes) -> Self {
        Self {
            dir: dir.into(),
            lifetimes,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn user_path(&self) -> PathBuf {
        self.dir.join(USER_FILE)
    }

    fn load_tokens(&self) -> StoredTokens {
        read_json(&self.session_path()).unwrap_or_default()
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_vec_pretty(value)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        let tokens = StoredTokens::issue(access_token, refresh_token, self.lifetimes);
        self.write_json(&self.session_path(), &tokens)
    }

    fn access_token(&self) -> Option<String> {
        self.load_tokens().access()
    }

    fn refresh_token(&self) -> Option<String> {
        self.load_tokens().refresh()
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        remove_if_present(&self.session_path())?;
        remove_if_present(&self.user_path())?;
        Ok(())
    }

    fn cache_user(&self, user: &SessionUser) -> Result<(), StoreError> {
        self.write_json(&self.user_path(), user)
    }

    fn cached_user(&self) -> Option<SessionUser> {
        read_json(&self.user_path())
    }
}

fn read_json<T>(path: &Path) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
{
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
        Err(error) => {
            tracing::warn!(error = %error, path = %path.display(), "credential file unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(error = %error, path = %path.display(), "credential file corrupt");
            None
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
