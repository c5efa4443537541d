//! Persisted login session.
//!
//! The session file is read once at startup by [`SessionStore::hydrate`].
//! After that the in-memory copy is authoritative and only three events
//! change it: a successful login, an explicit logout, and a 401 from a
//! protected call. Every clone of the store shares the same state.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::{LoginResponse, UserRecord};
use crate::core::errors::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: UserRecord,
    #[serde(default = "Utc::now")]
    pub logged_in_at: DateTime<Utc>,
}

impl From<LoginResponse> for Session {
    fn from(response: LoginResponse) -> Self {
        Session {
            token: response.access_token,
            token_type: response.token_type,
            user: response.user,
            logged_in_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    current: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    /// Loads the persisted session, if any. An unreadable or corrupt file is
    /// discarded rather than treated as fatal.
    pub fn hydrate(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let current = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Session>(&contents) {
                Ok(session) if !session.token.trim().is_empty() => {
                    tracing::info!("Restored session for {}", session.user.username);
                    Some(session)
                }
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!("Discarding unreadable session file: {}", err);
                    let _ = fs::remove_file(&path);
                    None
                }
            },
            Err(_) => None,
        };

        Self {
            path,
            current: Arc::new(RwLock::new(current)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.token.clone()))
    }

    pub fn user(&self) -> Option<UserRecord> {
        self.current
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.user.clone()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn login(&self, session: Session) -> Result<(), ClientError> {
        persist_session(&self.path, &session)?;
        let mut guard = self.current.write().map_err(ClientError::storage)?;
        tracing::info!("Logged in as {}", session.user.username);
        *guard = Some(session);
        Ok(())
    }

    /// Drops the session from memory and disk. Returns whether a session was
    /// present. Safe to call repeatedly.
    pub fn logout(&self) -> bool {
        let previous = match self.current.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if self.path.exists() {
            if let Err(err) = fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove session file: {}", err);
            }
        }
        if let Some(session) = &previous {
            tracing::info!("Session cleared for {}", session.user.username);
        }
        previous.is_some()
    }
}

fn persist_session(path: &Path, session: &Session) -> Result<(), ClientError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let body = serde_json::to_string_pretty(session).map_err(ClientError::storage)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(ClientError::storage)?;

    // `mode` only applies on creation; tighten a file left by an older run
    // before the token is written into it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(ClientError::storage)?;
    }

    file.write_all(body.as_bytes()).map_err(ClientError::storage)?;
    Ok(())
}

fn default_token_type() -> String {
    "bearer".to_string()
}
