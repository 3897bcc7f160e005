//! GraphQL transport
//!
//! Every call goes through the same pipeline: credential gate, in-flight
//! deduplication, pacing, the attempt loop with bounded retries, and failure
//! classification. The network call itself runs on a spawned task so that a
//! caller going away never cancels a call other callers may be waiting on.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use moneygraph_core::{
    validation_error, BackoffPolicy, ErrorContext, IdentityConfig, MoneygraphConfig, MoneygraphError,
    MoneygraphResult, PacingGate, Session, SessionProvider,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::classify::{classify, FailureSignal};
use crate::dedupe::{dedupe_key, InFlightRequests, Registration, SharedOutcome};
use crate::request::{ExecuteOptions, GraphqlRequest, GraphqlResponse, ResolvedOptions};

const COMPONENT: &str = "graphql_transport";

/// Process-wide coordination shared by every transport built on it
///
/// Holds the pacing gate and the in-flight map. Two transports sharing one
/// state are paced and deduplicated together.
#[derive(Debug)]
pub struct TransportState {
    pacing: PacingGate,
    in_flight: InFlightRequests,
}

impl TransportState {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            pacing: PacingGate::new(min_interval),
            in_flight: InFlightRequests::new(),
        }
    }

    pub fn from_config(config: &MoneygraphConfig) -> Self {
        Self::new(Duration::from_millis(config.api.min_interval_ms))
    }

    pub fn pacing(&self) -> &PacingGate {
        &self.pacing
    }

    /// Number of deduplicated calls currently pending
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn in_flight_requests(&self) -> &InFlightRequests {
        &self.in_flight
    }
}

/// Builder for [`GraphqlTransport`]
pub struct GraphqlTransportBuilder {
    config: MoneygraphConfig,
    session: Option<Arc<dyn SessionProvider>>,
    state: Option<Arc<TransportState>>,
    backoff: Option<BackoffPolicy>,
}

impl GraphqlTransportBuilder {
    pub fn new(config: MoneygraphConfig) -> Self {
        Self {
            config,
            session: None,
            state: None,
            backoff: None,
        }
    }

    pub fn with_session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(provider);
        self
    }

    /// Share pacing and deduplication with other transports
    pub fn with_shared_state(mut self, state: Arc<TransportState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn build(self) -> MoneygraphResult<GraphqlTransport> {
        self.config.validate()?;

        let session = self.session.ok_or_else(|| MoneygraphError::Config {
            message: "A session provider is required".to_string(),
            source: None,
            context: ErrorContext::new(COMPONENT).with_operation("build"),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.identity.user_agent).map_err(|e| {
                MoneygraphError::Config {
                    message: format!("Invalid user agent: {}", e),
                    source: Some(Arc::new(e)),
                    context: ErrorContext::new(COMPONENT).with_operation("build"),
                }
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MoneygraphError::Config {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Arc::new(e)),
                context: ErrorContext::new(COMPONENT).with_operation("build"),
            })?;

        let state = self
            .state
            .unwrap_or_else(|| Arc::new(TransportState::from_config(&self.config)));
        let backoff = self
            .backoff
            .unwrap_or_else(|| BackoffPolicy::from_api_config(&self.config.api));

        Ok(GraphqlTransport {
            inner: Arc::new(TransportInner {
                endpoint: self.config.graphql_url(),
                http,
                identity: self.config.identity.clone(),
                defaults: ResolvedOptions {
                    timeout: self.config.request_timeout(),
                    max_retries: self.config.api.max_retries,
                    dedupe: self.config.api.dedupe,
                },
                backoff,
                session,
                state,
            }),
        })
    }
}

/// Paced, deduplicating, retrying GraphQL client
#[derive(Clone)]
pub struct GraphqlTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    endpoint: String,
    http: reqwest::Client,
    identity: IdentityConfig,
    defaults: ResolvedOptions,
    backoff: BackoffPolicy,
    session: Arc<dyn SessionProvider>,
    state: Arc<TransportState>,
}

impl GraphqlTransport {
    pub fn builder(config: MoneygraphConfig) -> GraphqlTransportBuilder {
        GraphqlTransportBuilder::new(config)
    }

    pub fn state(&self) -> &Arc<TransportState> {
        &self.inner.state
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Run a read operation with the configured defaults
    pub async fn query(&self, operation: &str, variables: Value) -> MoneygraphResult<Arc<Value>> {
        self.execute(operation, variables, ExecuteOptions::default())
            .await
    }

    /// Run a write operation with the configured defaults
    ///
    /// Mutations go through the same pipeline as queries, deduplication included.
    pub async fn mutate(&self, operation: &str, variables: Value) -> MoneygraphResult<Arc<Value>> {
        self.execute(operation, variables, ExecuteOptions::default())
            .await
    }

    pub async fn query_with_options(
        &self,
        operation: &str,
        variables: Value,
        options: ExecuteOptions,
    ) -> MoneygraphResult<Arc<Value>> {
        self.execute(operation, variables, options).await
    }

    pub async fn mutate_with_options(
        &self,
        operation: &str,
        variables: Value,
        options: ExecuteOptions,
    ) -> MoneygraphResult<Arc<Value>> {
        self.execute(operation, variables, options).await
    }

    /// Run a query and deserialize its `data` payload
    pub async fn query_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        variables: Value,
    ) -> MoneygraphResult<T> {
        let data = self.query(operation, variables).await?;
        decode_payload(&data)
    }

    /// Run a mutation and deserialize its `data` payload
    pub async fn mutate_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        variables: Value,
    ) -> MoneygraphResult<T> {
        let data = self.mutate(operation, variables).await?;
        decode_payload(&data)
    }

    /// Execute an operation and return the `data` payload.
    ///
    /// Concurrent callers with the same operation and variables share one
    /// network call and receive the same payload or the same error. A caller
    /// that joins an in-flight call inherits the options of the call it joined.
    pub async fn execute(
        &self,
        operation: &str,
        variables: Value,
        options: ExecuteOptions,
    ) -> MoneygraphResult<Arc<Value>> {
        let variables = match variables {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(validation_error!(
                    format!("variables must be a JSON object, got {}", json_kind(&other)),
                    "variables",
                    COMPONENT
                ));
            }
        };
        let options = self.resolve(&options);
        let session = self.authorized_session().await?;

        let outcome = if options.dedupe {
            let key = dedupe_key(operation, &variables);
            let (outcome, joined) = self.inner.state.in_flight.join_or_start(&key, |id| {
                let registration = Registration {
                    requests: Arc::clone(&self.inner.state),
                    key: key.clone(),
                    id,
                };
                self.spawn_call(
                    session,
                    operation.to_string(),
                    variables,
                    options,
                    Some(registration),
                )
            });
            if joined {
                debug!("Joined in-flight request");
            }
            outcome
        } else {
            self.spawn_call(session, operation.to_string(), variables, options, None)
        };

        outcome.await
    }

    fn resolve(&self, options: &ExecuteOptions) -> ResolvedOptions {
        let defaults = self.inner.defaults;
        ResolvedOptions {
            timeout: options.timeout.unwrap_or(defaults.timeout),
            max_retries: options.max_retries.unwrap_or(defaults.max_retries),
            dedupe: options.dedupe.unwrap_or(defaults.dedupe),
        }
    }

    /// Fetch a usable session without touching the network
    async fn authorized_session(&self) -> MoneygraphResult<Session> {
        let provider = &self.inner.session;
        let session = match provider.get_session() {
            Some(session) => session,
            None => provider.load_session().await.ok_or_else(|| {
                MoneygraphError::auth(COMPONENT, "No session available; log in first")
            })?,
        };

        if provider.is_expired(&session) {
            warn!("Session expired; invalidating");
            provider.invalidate().await;
            return Err(MoneygraphError::auth(
                COMPONENT,
                "Session expired; log in again",
            ));
        }
        Ok(session)
    }

    fn spawn_call(
        &self,
        session: Session,
        operation: String,
        variables: Value,
        options: ResolvedOptions,
        registration: Option<Registration>,
    ) -> SharedOutcome {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _registration = registration;
            let result = inner
                .send_with_retry(&session, &operation, &variables, options)
                .await;
            inner.state.pacing.record_call();
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(MoneygraphError::internal(
                    COMPONENT,
                    format!("GraphQL call task failed: {}", e),
                ))
            })
        }
        .boxed()
        .shared()
    }
}

impl TransportInner {
    async fn send_with_retry(
        &self,
        session: &Session,
        operation: &str,
        variables: &Value,
        options: ResolvedOptions,
    ) -> MoneygraphResult<Arc<Value>> {
        let mut retry = 0u32;
        loop {
            let waited = self.state.pacing.wait_turn().await;
            debug!(
                attempt = retry + 1,
                paced_ms = waited.as_millis() as u64,
                min_interval_ms = self.state.pacing.min_interval().as_millis() as u64,
                "Sending GraphQL request"
            );

            match self.send_once(session, operation, variables, options).await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_retryable() && retry < options.max_retries => {
                    let delay = self.backoff.delay_for_retry(retry);
                    warn!(
                        attempt = retry + 1,
                        max_retries = options.max_retries,
                        category = %err.cause_category(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying GraphQL request"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => {
                    err.log();
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(
        &self,
        session: &Session,
        operation: &str,
        variables: &Value,
        options: ResolvedOptions,
    ) -> MoneygraphResult<Arc<Value>> {
        let body = GraphqlRequest {
            query: operation,
            variables,
            operation_name: None,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(
                AUTHORIZATION,
                format!("{} {}", self.identity.auth_scheme, session.token),
            )
            .header("device-uuid", &session.device_uuid)
            .header("Client-Platform", &self.identity.client_platform)
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let bytes = response.bytes().await.map_err(network_error)?;

        if !status.is_success() {
            return Err(classify(FailureSignal::HttpStatus {
                status: status.as_u16(),
                body: &String::from_utf8_lossy(&bytes),
                retry_after,
            }));
        }

        let decoded: GraphqlResponse = serde_json::from_slice(&bytes).map_err(|e| {
            classify(FailureSignal::MalformedBody {
                message: &e.to_string(),
            })
        })?;

        if let Some(errors) = decoded.errors.as_deref().filter(|e| !e.is_empty()) {
            return Err(classify(FailureSignal::GraphqlErrors(errors)));
        }

        match decoded.data {
            Some(data) if !is_empty_payload(&data) => Ok(Arc::new(data)),
            _ => Err(classify(FailureSignal::EmptyData)),
        }
    }
}

fn network_error(e: reqwest::Error) -> MoneygraphError {
    let message = e.to_string();
    let timed_out = e.is_timeout();
    classify(FailureSignal::Network {
        message: &message,
        timed_out,
        source: Some(Arc::new(e)),
    })
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn decode_payload<T: DeserializeOwned>(data: &Value) -> MoneygraphResult<T> {
    <T as serde::Deserialize>::deserialize(data).map_err(|e| MoneygraphError::Api {
        message: format!("Unexpected response shape: {}", e),
        status: Some(200),
        context: ErrorContext::new(COMPONENT)
            .with_operation("decode")
            .with_suggestion("The operation may no longer match the upstream schema"),
    })
}
