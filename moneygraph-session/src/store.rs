//! Session Storage - Persistence layer for the authenticated session
//!
//! The session is stored as a single JSON file readable by the owning user only.

use chrono::{DateTime, Utc};
use moneygraph_core::{MoneygraphError, MoneygraphResult, Session};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk shape, lenient so that partially written files degrade to "no session"
#[derive(Debug, Deserialize)]
struct StoredSession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    device_uuid: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl StoredSession {
    fn into_session(self) -> Option<Session> {
        let token = self.token.filter(|token| !token.trim().is_empty())?;
        Some(Session {
            token,
            expires_at: self.expires_at,
            device_uuid: self
                .device_uuid
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            user_id: self.user_id,
            email: self.email,
            name: self.name,
        })
    }
}

/// Session file manager
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the session with owner-only permissions
    pub fn save(&self, session: &Session) -> MoneygraphResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MoneygraphError::storage(
                        "session_store",
                        format!("Failed to create {}: {}", parent.display(), e),
                        e,
                    )
                })?;
            }
        }

        let json_data = serde_json::to_string_pretty(session)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path).map_err(|e| {
            MoneygraphError::storage(
                "session_store",
                format!("Failed to open {}: {}", self.path.display(), e),
                e,
            )
        })?;
        file.write_all(json_data.as_bytes()).map_err(|e| {
            MoneygraphError::storage(
                "session_store",
                format!("Failed to write {}: {}", self.path.display(), e),
                e,
            )
        })?;

        // A pre-existing file keeps its old mode through `open`, so tighten it explicitly
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).map_err(
                |e| {
                    MoneygraphError::storage(
                        "session_store",
                        format!("Failed to restrict permissions on {}: {}", self.path.display(), e),
                        e,
                    )
                },
            )?;
        }

        debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    /// Read the stored session.
    ///
    /// A missing file, unreadable content and a missing token all yield `None`.
    pub fn load(&self) -> Option<Session> {
        let json_data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                debug!("No session loaded from {}: {}", self.path.display(), e);
                return None;
            }
        };

        let stored: StoredSession = match serde_json::from_str(&json_data) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring malformed session file {}: {}", self.path.display(), e);
                return None;
            }
        };

        let session = stored.into_session();
        if session.is_none() {
            warn!("Ignoring session file {} without a token", self.path.display());
        } else {
            info!("Loaded session from {}", self.path.display());
        }
        session
    }

    /// Best-effort removal; failures are logged, never returned
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted session file: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete session file {}: {}", self.path.display(), e),
        }
    }
}
