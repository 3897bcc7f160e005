//! Configuration management

use crate::error::{ErrorContext, MoneygraphError, MoneygraphResult};
use crate::types::{ApiConfig, IdentityConfig, MoneygraphConfig, SessionConfig};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

impl Default for MoneygraphConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "https://api.monarchmoney.com".to_string(),
                graphql_path: "/graphql".to_string(),
                auth_path: "/auth/login/".to_string(),
                timeout_secs: 30,
                max_retries: 2,
                min_interval_ms: 250,
                backoff_initial_ms: 250,
                backoff_max_ms: 2000,
                dedupe: true,
            },
            identity: IdentityConfig {
                user_agent: format!("moneygraph/{}", env!("CARGO_PKG_VERSION")),
                client_platform: "web".to_string(),
                auth_scheme: "Token".to_string(),
            },
            session: SessionConfig {
                session_file: "~/.moneygraph/session.json".to_string(),
                device_uuid: None,
            },
        }
    }
}

impl MoneygraphConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> MoneygraphResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MoneygraphError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Arc::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: MoneygraphConfig =
            toml::from_str(&content).map_err(|e| MoneygraphError::Config {
                message: format!("Failed to parse config: {}", e),
                source: Some(Arc::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("parse_toml")
                    .with_suggestion("Check TOML syntax in config file"),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> MoneygraphResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| MoneygraphError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Arc::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| MoneygraphError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Arc::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> MoneygraphResult<()> {
        if let Err(e) = url::Url::parse(&self.api.base_url) {
            return Err(MoneygraphError::Config {
                message: format!("Invalid api.base_url '{}': {}", self.api.base_url, e),
                source: Some(Arc::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set api.base_url to an absolute http(s) URL"),
            });
        }

        if self.api.timeout_secs == 0 {
            return Err(MoneygraphError::Config {
                message: "api.timeout_secs must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set api.timeout_secs to a positive value"),
            });
        }

        if self.api.backoff_initial_ms > self.api.backoff_max_ms {
            return Err(MoneygraphError::Config {
                message: format!(
                    "api.backoff_initial_ms ({}) exceeds api.backoff_max_ms ({})",
                    self.api.backoff_initial_ms, self.api.backoff_max_ms
                ),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Lower backoff_initial_ms or raise backoff_max_ms"),
            });
        }

        if self.identity.user_agent.trim().is_empty() {
            return Err(MoneygraphError::Config {
                message: "identity.user_agent must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }

    pub fn graphql_url(&self) -> String {
        join_url(&self.api.base_url, &self.api.graphql_path)
    }

    pub fn auth_url(&self) -> String {
        join_url(&self.api.base_url, &self.api.auth_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Resolved session file path
    pub fn session_path(&self) -> PathBuf {
        expand_home(&self.session.session_file)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
