//! Core data type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated session against the upstream API
///
/// Owned by a [`crate::SessionProvider`]; the transport only reads it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer credential
    pub token: String,
    /// Credential expiry, when the provider reported one
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Device identity sent with every request
    pub device_uuid: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, device_uuid: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
            device_uuid: device_uuid.into(),
            created_at: Utc::now(),
            user_id: None,
            email: None,
            name: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// A session without an expiry is never considered expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("device_uuid", &self.device_uuid)
            .field("created_at", &self.created_at)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("name", &self.name)
            .finish()
    }
}

/// Configuration root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneygraphConfig {
    pub api: ApiConfig,
    pub identity: IdentityConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the upstream API
    pub base_url: String,
    /// Path of the GraphQL endpoint relative to `base_url`
    pub graphql_path: String,
    /// Path of the login endpoint relative to `base_url`
    pub auth_path: String,
    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
    /// Minimum interval between network call starts in milliseconds
    pub min_interval_ms: u64,
    /// First retry delay in milliseconds
    pub backoff_initial_ms: u64,
    /// Cap on the retry delay in milliseconds
    pub backoff_max_ms: u64,
    /// Collapse concurrent identical requests
    pub dedupe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub user_agent: String,
    pub client_platform: String,
    /// Scheme prefix of the Authorization header
    pub auth_scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session file location, `~` is expanded to the home directory
    pub session_file: String,
    /// Fixed device identifier; a random one is generated per login when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_uuid: Option<String>,
}
