//! Per-call policy for optional features

use std::sync::OnceLock;

use moneygraph_core::{MoneygraphError, MoneygraphResult};
use regex::Regex;
use tracing::debug;

/// How a domain call treats failures that signal a missing feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPolicy {
    /// Core data: every error propagates
    Required,
    /// Optional feature: "no data" and unsupported-feature errors
    /// become `None`, everything else still propagates
    BestEffort,
}

impl QueryPolicy {
    pub fn apply<T>(self, result: MoneygraphResult<T>) -> MoneygraphResult<Option<T>> {
        match (self, result) {
            (_, Ok(value)) => Ok(Some(value)),
            (QueryPolicy::BestEffort, Err(err)) if is_unsupported_feature(&err) => {
                debug!(
                    category = %err.cause_category(),
                    error = %err,
                    "Feature unavailable for this account; treating as empty"
                );
                Ok(None)
            }
            (_, Err(err)) => Err(err),
        }
    }
}

/// True for errors that mean "this feature is not available here"
pub fn is_unsupported_feature(err: &MoneygraphError) -> bool {
    match err {
        MoneygraphError::EmptyResponse { .. } => true,
        MoneygraphError::Api { message, .. } => {
            unsupported_pattern().is_some_and(|pattern| pattern.is_match(message))
        }
        _ => false,
    }
}

/// Feature-availability wording only; unknown-field and missing-entity
/// errors are schema drift or caller faults and must propagate
fn unsupported_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(not (enabled|available|supported)|feature (is )?(disabled|unavailable))\b",
            )
            .ok()
        })
        .as_ref()
}
