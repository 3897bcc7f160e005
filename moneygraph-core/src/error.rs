//! Unified error handling system
//!
//! Provides the closed error taxonomy used by the transport and session layers,
//! with context, recovery suggestions and a `CauseCategory` discriminator that
//! retry logic can branch on without string matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

pub type MoneygraphResult<T> = Result<T, MoneygraphError>;

/// Underlying cause of an error. Shared so that errors stay cheap to clone.
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Discriminator for the kind of failure behind an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseCategory {
    Auth,
    Validation,
    Network,
    RateLimit,
    DependencyDown,
    Api,
    EmptyResponse,
    Config,
    Storage,
    Internal,
}

impl CauseCategory {
    /// Whether the transport retries failures of this category
    pub fn is_retryable(self) -> bool {
        matches!(self, CauseCategory::RateLimit | CauseCategory::DependencyDown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CauseCategory::Auth => "auth",
            CauseCategory::Validation => "validation",
            CauseCategory::Network => "network",
            CauseCategory::RateLimit => "rate_limit",
            CauseCategory::DependencyDown => "dependency_down",
            CauseCategory::Api => "api",
            CauseCategory::EmptyResponse => "empty_response",
            CauseCategory::Config => "config",
            CauseCategory::Storage => "storage",
            CauseCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for CauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the moneygraph client
#[derive(Error, Debug, Clone)]
pub enum MoneygraphError {
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<ErrorSource>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        timed_out: bool,
        #[source]
        source: Option<ErrorSource>,
        context: ErrorContext,
    },

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("Upstream service unavailable (HTTP {status}): {message}")]
    DependencyDown {
        message: String,
        status: u16,
        context: ErrorContext,
    },

    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
        context: ErrorContext,
    },

    #[error("Empty response: {message}")]
    EmptyResponse {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<ErrorSource>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<ErrorSource>,
        context: ErrorContext,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<ErrorSource>,
        context: ErrorContext,
    },
}

impl MoneygraphError {
    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            MoneygraphError::Auth { context, .. }
            | MoneygraphError::Validation { context, .. }
            | MoneygraphError::Network { context, .. }
            | MoneygraphError::RateLimit { context, .. }
            | MoneygraphError::DependencyDown { context, .. }
            | MoneygraphError::Api { context, .. }
            | MoneygraphError::EmptyResponse { context, .. }
            | MoneygraphError::Config { context, .. }
            | MoneygraphError::Storage { context, .. }
            | MoneygraphError::Internal { context, .. } => context,
        }
    }

    /// Human-readable message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            MoneygraphError::Auth { message, .. }
            | MoneygraphError::Validation { message, .. }
            | MoneygraphError::Network { message, .. }
            | MoneygraphError::RateLimit { message, .. }
            | MoneygraphError::DependencyDown { message, .. }
            | MoneygraphError::Api { message, .. }
            | MoneygraphError::EmptyResponse { message, .. }
            | MoneygraphError::Config { message, .. }
            | MoneygraphError::Storage { message, .. }
            | MoneygraphError::Internal { message, .. } => message,
        }
    }

    pub fn cause_category(&self) -> CauseCategory {
        match self {
            MoneygraphError::Auth { .. } => CauseCategory::Auth,
            MoneygraphError::Validation { .. } => CauseCategory::Validation,
            MoneygraphError::Network { .. } => CauseCategory::Network,
            MoneygraphError::RateLimit { .. } => CauseCategory::RateLimit,
            MoneygraphError::DependencyDown { .. } => CauseCategory::DependencyDown,
            MoneygraphError::Api { .. } => CauseCategory::Api,
            MoneygraphError::EmptyResponse { .. } => CauseCategory::EmptyResponse,
            MoneygraphError::Config { .. } => CauseCategory::Config,
            MoneygraphError::Storage { .. } => CauseCategory::Storage,
            MoneygraphError::Internal { .. } => CauseCategory::Internal,
        }
    }

    /// Whether the transport retry loop may attempt the call again
    pub fn is_retryable(&self) -> bool {
        self.cause_category().is_retryable()
    }

    /// Check if error is recoverable by the caller (retryable kinds plus network faults)
    pub fn is_recoverable(&self) -> bool {
        self.is_retryable() || matches!(self, MoneygraphError::Network { .. })
    }

    pub fn auth(component: &str, message: impl Into<String>) -> Self {
        MoneygraphError::Auth {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component)
                .with_suggestion("Log in again to obtain a fresh session"),
        }
    }

    pub fn api(component: &str, message: impl Into<String>, status: Option<u16>) -> Self {
        MoneygraphError::Api {
            message: message.into(),
            status,
            context: ErrorContext::new(component),
        }
    }

    pub fn storage(
        component: &str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        MoneygraphError::Storage {
            message: message.into(),
            source: Some(Arc::new(source)),
            context: ErrorContext::new(component),
        }
    }

    pub fn internal(component: &str, message: impl Into<String>) -> Self {
        MoneygraphError::Internal {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component),
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = &self.context().error_id;
        let category = self.cause_category();
        match self {
            MoneygraphError::Internal { .. } => {
                error!(error_id = %error_id, %category, error = %self, "Internal error occurred");
            }
            MoneygraphError::Config { .. } | MoneygraphError::Validation { .. } => {
                error!(
                    error_id = %error_id,
                    %category,
                    error = %self,
                    "Configuration or validation error"
                );
            }
            MoneygraphError::Network { .. }
            | MoneygraphError::RateLimit { .. }
            | MoneygraphError::DependencyDown { .. } => {
                warn!(
                    error_id = %error_id,
                    %category,
                    error = %self,
                    "Upstream error (may be recoverable)"
                );
            }
            _ => {
                error!(error_id = %error_id, %category, error = %self, "Error occurred");
            }
        }
    }
}

impl From<std::io::Error> for MoneygraphError {
    fn from(err: std::io::Error) -> Self {
        MoneygraphError::storage("io", err.to_string(), err)
    }
}

impl From<serde_json::Error> for MoneygraphError {
    fn from(err: serde_json::Error) -> Self {
        MoneygraphError::Internal {
            message: format!("Serialization error: {}", err),
            source: Some(Arc::new(err)),
            context: ErrorContext::new("serde_json"),
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! auth_error {
    ($msg:expr, $component:expr) => {
        $crate::MoneygraphError::Auth {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Log in again to obtain a fresh session"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::MoneygraphError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::MoneygraphError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}
