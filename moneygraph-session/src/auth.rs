//! Login against the upstream auth endpoint

use chrono::{DateTime, Utc};
use moneygraph_core::{
    validation_error, ErrorContext, IdentityConfig, MoneygraphConfig, MoneygraphError,
    MoneygraphResult, Session,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Credentials for a password login
#[derive(Clone, Default)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
    /// One-time code for accounts with MFA enabled
    pub totp: Option<String>,
    pub trusted_device: bool,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            totp: None,
            trusted_device: false,
        }
    }

    pub fn with_totp(mut self, totp: impl Into<String>) -> Self {
        self.totp = Some(totp.into());
        self
    }

    pub fn trusted(mut self, trusted_device: bool) -> Self {
        self.trusted_device = trusted_device;
        self
    }

    fn validate(&self) -> MoneygraphResult<()> {
        if self.username.trim().is_empty() {
            return Err(validation_error!("Username is required", "username", "auth_client"));
        }
        if self.password.is_empty() {
            return Err(validation_error!("Password is required", "password", "auth_client"));
        }
        if let Some(totp) = &self.totp {
            if totp.trim().is_empty() {
                return Err(validation_error!(
                    "TOTP code must not be empty when provided",
                    "totp",
                    "auth_client"
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("totp", &self.totp.as_ref().map(|_| "<redacted>"))
            .field("trusted_device", &self.trusted_device)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    supports_mfa: bool,
    trusted_device: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    totp: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenExpiration")]
    token_expiration: Option<serde_json::Value>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// HTTP client for the login endpoint
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    auth_url: String,
    identity: IdentityConfig,
}

impl AuthClient {
    pub fn new(config: &MoneygraphConfig) -> MoneygraphResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.identity.user_agent).map_err(|e| {
                MoneygraphError::Config {
                    message: format!("Invalid user agent: {}", e),
                    source: Some(Arc::new(e)),
                    context: ErrorContext::new("auth_client").with_operation("create_client"),
                }
            })?,
        );

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| MoneygraphError::Config {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Arc::new(e)),
                context: ErrorContext::new("auth_client").with_operation("create_client"),
            })?;

        Ok(Self {
            http,
            auth_url: config.auth_url(),
            identity: config.identity.clone(),
        })
    }

    /// Exchange credentials for a session
    pub async fn login(
        &self,
        credentials: &LoginCredentials,
        device_uuid: &str,
    ) -> MoneygraphResult<Session> {
        credentials.validate()?;

        let body = LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
            supports_mfa: true,
            trusted_device: credentials.trusted_device,
            totp: credentials.totp.as_deref(),
        };

        debug!(url = %self.auth_url, mfa = credentials.totp.is_some(), "Sending login request");

        let response = self
            .http
            .post(&self.auth_url)
            .header("device-uuid", device_uuid)
            .header("Client-Platform", &self.identity.client_platform)
            .json(&body)
            .send()
            .await
            .map_err(|e| MoneygraphError::Network {
                message: format!("Login request failed: {}", e),
                timed_out: e.is_timeout(),
                source: Some(Arc::new(e)),
                context: ErrorContext::new("auth_client").with_operation("login"),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| MoneygraphError::Network {
            message: format!("Failed to read login response: {}", e),
            timed_out: e.is_timeout(),
            source: Some(Arc::new(e)),
            context: ErrorContext::new("auth_client").with_operation("login"),
        })?;

        if status == StatusCode::FORBIDDEN {
            return Err(MoneygraphError::Auth {
                message: "Multi-factor authentication required or the verification code was rejected"
                    .to_string(),
                source: None,
                context: ErrorContext::new("auth_client")
                    .with_operation("login")
                    .with_metadata("status", "403")
                    .with_metadata("body", &text)
                    .with_suggestion("Provide a current TOTP code from your authenticator"),
            });
        }

        if !status.is_success() {
            return Err(MoneygraphError::Auth {
                message: format!("Login failed (HTTP {}): {}", status.as_u16(), text),
                source: None,
                context: ErrorContext::new("auth_client")
                    .with_operation("login")
                    .with_metadata("status", status.as_str())
                    .with_suggestion("Check your username and password"),
            });
        }

        let parsed: LoginResponse = serde_json::from_str(&text).map_err(|e| MoneygraphError::Auth {
            message: format!("Unexpected login response: {}", text),
            source: Some(Arc::new(e)),
            context: ErrorContext::new("auth_client").with_operation("parse_login_response"),
        })?;

        let token = parsed
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| MoneygraphError::Auth {
                message: format!("Login response did not include a token: {}", text),
                source: None,
                context: ErrorContext::new("auth_client").with_operation("parse_login_response"),
            })?;

        let mut session = Session::new(token, device_uuid);
        session.expires_at = parsed.token_expiration.as_ref().and_then(parse_expiration);
        session.user_id = parsed.id.as_ref().and_then(id_to_string);
        session.email = parsed.email;
        session.name = parsed.name;
        Ok(session)
    }
}

fn parse_expiration(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring unparsable tokenExpiration '{}': {}", raw, e);
            None
        }
    }
}

fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
