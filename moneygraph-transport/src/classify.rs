//! Maps raw HTTP and GraphQL failure signals onto the closed error taxonomy

use std::sync::OnceLock;
use std::time::Duration;

use moneygraph_core::{ErrorContext, ErrorSource, MoneygraphError};
use regex::Regex;

use crate::request::GraphqlError;

const COMPONENT: &str = "graphql_transport";
const MAX_BODY_LEN: usize = 4096;

/// A failure observed while executing one network attempt
#[derive(Debug)]
pub enum FailureSignal<'a> {
    /// Non-2xx HTTP response
    HttpStatus {
        status: u16,
        body: &'a str,
        retry_after: Option<Duration>,
    },
    /// Connection failure, timeout or abort before a response arrived
    Network {
        message: &'a str,
        timed_out: bool,
        source: Option<ErrorSource>,
    },
    /// HTTP 200 whose body is not a GraphQL response
    MalformedBody { message: &'a str },
    /// HTTP 200 with a non-empty `errors` array
    GraphqlErrors(&'a [GraphqlError]),
    /// HTTP 200 with neither `data` nor `errors`
    EmptyData,
}

/// Classify a failure signal into a [`MoneygraphError`]
pub fn classify(signal: FailureSignal<'_>) -> MoneygraphError {
    match signal {
        FailureSignal::HttpStatus {
            status,
            body,
            retry_after,
        } => classify_status(status, body, retry_after),
        FailureSignal::Network {
            message,
            timed_out,
            source,
        } => MoneygraphError::Network {
            message: if timed_out {
                format!("Request timed out: {}", message)
            } else {
                message.to_string()
            },
            timed_out,
            source,
            context: ErrorContext::new(COMPONENT)
                .with_operation("send")
                .with_suggestion("Check network connectivity"),
        },
        FailureSignal::MalformedBody { message } => MoneygraphError::Api {
            message: format!("Response is not valid GraphQL JSON: {}", message),
            status: Some(200),
            context: ErrorContext::new(COMPONENT).with_operation("decode"),
        },
        FailureSignal::GraphqlErrors(errors) => classify_graphql_errors(errors),
        FailureSignal::EmptyData => MoneygraphError::EmptyResponse {
            message: "Response contained neither data nor errors".to_string(),
            context: ErrorContext::new(COMPONENT)
                .with_operation("decode")
                .with_suggestion("The operation may no longer match the upstream schema"),
        },
    }
}

fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> MoneygraphError {
    let body = truncate_body(body);
    match status {
        401 | 403 => MoneygraphError::Auth {
            message: format!("Session invalid or expired (HTTP {})", status),
            source: None,
            context: ErrorContext::new(COMPONENT)
                .with_operation("send")
                .with_metadata("status", &status.to_string())
                .with_metadata("body", &body)
                .with_suggestion("Log in again to obtain a fresh session"),
        },
        429 => MoneygraphError::RateLimit {
            message: if body.is_empty() {
                "Too many requests (HTTP 429)".to_string()
            } else {
                body
            },
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            context: ErrorContext::new(COMPONENT).with_operation("send"),
        },
        s if s >= 500 => MoneygraphError::DependencyDown {
            message: if body.is_empty() {
                format!("Upstream returned HTTP {}", s)
            } else {
                body
            },
            status: s,
            context: ErrorContext::new(COMPONENT)
                .with_operation("send")
                .with_suggestion("The upstream service is unavailable; try again later"),
        },
        s => MoneygraphError::Api {
            message: if body.is_empty() {
                format!("Upstream returned HTTP {}", s)
            } else {
                body
            },
            status: Some(s),
            context: ErrorContext::new(COMPONENT).with_operation("send"),
        },
    }
}

fn classify_graphql_errors(errors: &[GraphqlError]) -> MoneygraphError {
    let Some(first) = errors.first() else {
        return classify(FailureSignal::EmptyData);
    };
    let message = first.message.clone();
    let code = first.code().unwrap_or_default();

    if matches!(code, "UNAUTHENTICATED" | "FORBIDDEN") || matches(auth_pattern(), &message) {
        return MoneygraphError::Auth {
            message,
            source: None,
            context: ErrorContext::new(COMPONENT)
                .with_operation("graphql")
                .with_suggestion("Log in again to obtain a fresh session"),
        };
    }

    if matches!(code, "RATE_LIMITED" | "TOO_MANY_REQUESTS") || matches(rate_limit_pattern(), &message)
    {
        return MoneygraphError::RateLimit {
            message,
            retry_after_ms: None,
            context: ErrorContext::new(COMPONENT).with_operation("graphql"),
        };
    }

    let mut context = ErrorContext::new(COMPONENT).with_operation("graphql");
    if errors.len() > 1 {
        context = context.with_metadata("error_count", &errors.len().to_string());
    }
    if !code.is_empty() {
        context = context.with_metadata("code", code);
    }
    MoneygraphError::Api {
        message,
        status: Some(200),
        context,
    }
}

fn auth_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(unauthori[sz]ed|unauthenticated|not authenticated|authentication (required|failed)|invalid token|(token|session) (has )?expired)\b",
            )
            .ok()
        })
        .as_ref()
}

fn rate_limit_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(rate.?limit(ed)?|too many requests|throttl(ed|ing))\b").ok()
        })
        .as_ref()
}

fn matches(pattern: Option<&Regex>, text: &str) -> bool {
    pattern.is_some_and(|pattern| pattern.is_match(text))
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use moneygraph_core::CauseCategory;

    fn status(status: u16, body: &str) -> MoneygraphError {
        classify(FailureSignal::HttpStatus {
            status,
            body,
            retry_after: None,
        })
    }

    fn gql(message: &str, code: Option<&str>) -> MoneygraphError {
        let errors = vec![GraphqlError {
            message: message.to_string(),
            path: None,
            extensions: code.map(|c| serde_json::json!({ "code": c })),
        }];
        classify(FailureSignal::GraphqlErrors(&errors))
    }

    #[test]
    fn http_statuses_map_to_categories() {
        assert_eq!(status(401, "").cause_category(), CauseCategory::Auth);
        assert_eq!(status(403, "nope").cause_category(), CauseCategory::Auth);
        assert_eq!(status(429, "").cause_category(), CauseCategory::RateLimit);
        assert_eq!(status(500, "").cause_category(), CauseCategory::DependencyDown);
        assert_eq!(status(503, "down").cause_category(), CauseCategory::DependencyDown);
        assert_eq!(status(400, "bad").cause_category(), CauseCategory::Api);
        assert_eq!(status(404, "").cause_category(), CauseCategory::Api);
    }

    #[test]
    fn client_errors_surface_raw_body() {
        match status(422, "variables invalid") {
            MoneygraphError::Api { message, status, .. } => {
                assert_eq!(message, "variables invalid");
                assert_eq!(status, Some(422));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn retry_after_is_kept_on_rate_limit() {
        let err = classify(FailureSignal::HttpStatus {
            status: 429,
            body: "",
            retry_after: Some(Duration::from_secs(3)),
        });
        match err {
            MoneygraphError::RateLimit { retry_after_ms, .. } => {
                assert_eq!(retry_after_ms, Some(3000))
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[test]
    fn network_failures_record_timeouts() {
        let err = classify(FailureSignal::Network {
            message: "operation timed out",
            timed_out: true,
            source: None,
        });
        assert_eq!(err.cause_category(), CauseCategory::Network);
        assert!(matches!(err, MoneygraphError::Network { timed_out: true, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn graphql_errors_are_verbatim_api_errors_by_default() {
        let err = gql("Something went wrong", None);
        assert_eq!(err.cause_category(), CauseCategory::Api);
        assert_eq!(err.message(), "Something went wrong");
        assert!(!err.is_retryable());
    }

    #[test]
    fn graphql_auth_and_rate_limit_patterns_are_recognised() {
        assert_eq!(
            gql("User is not authenticated", None).cause_category(),
            CauseCategory::Auth
        );
        assert_eq!(gql("denied", Some("UNAUTHENTICATED")).cause_category(), CauseCategory::Auth);
        assert_eq!(
            gql("Rate limit exceeded, slow down", None).cause_category(),
            CauseCategory::RateLimit
        );
        assert!(gql("Too many requests", None).is_retryable());
    }

    #[test]
    fn message_patterns_compile() {
        assert!(auth_pattern().is_some());
        assert!(rate_limit_pattern().is_some());
    }

    #[test]
    fn unrelated_words_do_not_trigger_auth() {
        assert_eq!(
            gql("Field 'authorizedUsers' does not exist", None).cause_category(),
            CauseCategory::Api
        );
    }

    #[test]
    fn empty_data_is_distinct() {
        let err = classify(FailureSignal::EmptyData);
        assert_eq!(err.cause_category(), CauseCategory::EmptyResponse);
        assert!(!err.is_retryable());
        assert_eq!(
            classify(FailureSignal::GraphqlErrors(&[])).cause_category(),
            CauseCategory::EmptyResponse
        );
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(MAX_BODY_LEN);
        let truncated = truncate_body(&body);
        assert!(truncated.len() <= MAX_BODY_LEN + '…'.len_utf8());
        assert!(truncated.ends_with('…'));
    }
}
