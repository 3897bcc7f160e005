//! End-to-end behaviour of the transport against a mock GraphQL server

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moneygraph_core::{
    BackoffPolicy, CauseCategory, MoneygraphConfig, MoneygraphError, Session, SessionProvider,
};
use moneygraph_session::{SessionManager, SessionStore};
use moneygraph_transport::{ExecuteOptions, GraphqlTransport, TransportState};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNTS: &str = "query GetAccounts { accounts { id } }";

struct FixedSession {
    session: Mutex<Option<Session>>,
    invalidations: AtomicUsize,
}

impl FixedSession {
    fn new(session: Option<Session>) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            invalidations: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionProvider for FixedSession {
    fn get_session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    async fn load_session(&self) -> Option<Session> {
        None
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
    }
}

fn test_config(server: &MockServer, min_interval_ms: u64) -> MoneygraphConfig {
    let mut config = MoneygraphConfig::default();
    config.api.base_url = server.uri();
    config.api.min_interval_ms = min_interval_ms;
    config.api.backoff_initial_ms = 10;
    config.api.backoff_max_ms = 40;
    config.api.timeout_secs = 5;
    config
}

fn transport_with(
    config: MoneygraphConfig,
    provider: Arc<dyn SessionProvider>,
) -> GraphqlTransport {
    GraphqlTransport::builder(config)
        .with_session_provider(provider)
        .build()
        .expect("transport")
}

fn transport_for(server: &MockServer, min_interval_ms: u64) -> GraphqlTransport {
    transport_with(
        test_config(server, min_interval_ms),
        FixedSession::new(Some(Session::new("tok-1", "dev-1"))),
    )
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

fn ok_body() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"data": {"accounts": [{"id": "1"}]}}))
}

#[tokio::test]
async fn sends_expected_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Token tok-1"))
        .and(header("device-uuid", "dev-1"))
        .and(header("client-platform", "web"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_json(json!({
            "query": ACCOUNTS,
            "variables": {"limit": 5},
            "operationName": null
        })))
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let data = transport
        .query(ACCOUNTS, json!({"limit": 5}))
        .await
        .expect("query");
    assert_eq!(data["accounts"][0]["id"], "1");
}

#[tokio::test]
async fn null_variables_are_sent_as_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(json!({
            "query": ACCOUNTS,
            "variables": {},
            "operationName": null
        })))
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    transport_for(&server, 0)
        .query(ACCOUNTS, serde_json::Value::Null)
        .await
        .expect("query");
}

#[tokio::test]
async fn concurrent_identical_queries_share_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body().set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let (a, b) = tokio::join!(
        transport.query(ACCOUNTS, json!({"a": 1, "b": 2})),
        transport.query(ACCOUNTS, json!({"b": 2, "a": 1})),
    );
    let (a, b) = (a.expect("first"), b.expect("second"));

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(request_count(&server).await, 1);
    assert_eq!(transport.state().in_flight(), 0);
}

#[tokio::test]
async fn concurrent_identical_failures_share_one_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(150)))
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let options = ExecuteOptions::new().with_max_retries(0);
    let (a, b) = tokio::join!(
        transport.execute(ACCOUNTS, json!({}), options.clone()),
        transport.execute(ACCOUNTS, json!({}), options),
    );

    let (a, b) = (a.unwrap_err(), b.unwrap_err());
    assert_eq!(a.cause_category(), CauseCategory::DependencyDown);
    assert_eq!(a.context().error_id, b.context().error_id);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn different_variables_are_not_merged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body().set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let (a, b) = tokio::join!(
        transport.query(ACCOUNTS, json!({"id": 1})),
        transport.query(ACCOUNTS, json!({"id": 2})),
    );
    a.expect("first");
    b.expect("second");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn dedupe_can_be_disabled_per_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body().set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let options = ExecuteOptions::new().with_dedupe(false);
    let (a, b) = tokio::join!(
        transport.execute(ACCOUNTS, json!({}), options.clone()),
        transport.execute(ACCOUNTS, json!({}), options),
    );
    a.expect("first");
    b.expect("second");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn sequential_calls_respect_min_interval() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .mount(&server)
        .await;

    let transport = transport_for(&server, 150);
    let started = Instant::now();
    transport.query(ACCOUNTS, json!({"n": 1})).await.expect("first");
    transport.query(ACCOUNTS, json!({"n": 2})).await.expect("second");

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn concurrent_distinct_calls_are_spaced_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .mount(&server)
        .await;

    let transport = transport_for(&server, 100);
    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        transport.query(ACCOUNTS, json!({"n": 1})),
        transport.query(ACCOUNTS, json!({"n": 2})),
        transport.query(ACCOUNTS, json!({"n": 3})),
    );
    a.expect("a");
    b.expect("b");
    c.expect("c");

    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn shared_state_paces_across_transports() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .mount(&server)
        .await;

    let state = Arc::new(TransportState::new(Duration::from_millis(150)));
    let provider: Arc<dyn SessionProvider> =
        FixedSession::new(Some(Session::new("tok-1", "dev-1")));
    let build = || {
        GraphqlTransport::builder(test_config(&server, 0))
            .with_session_provider(Arc::clone(&provider))
            .with_shared_state(Arc::clone(&state))
            .build()
            .expect("transport")
    };
    let (first, second) = (build(), build());

    let started = Instant::now();
    let (a, b) = tokio::join!(
        first.query(ACCOUNTS, json!({"n": 1})),
        second.query(ACCOUNTS, json!({"n": 2})),
    );
    a.expect("first");
    b.expect("second");

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(Arc::ptr_eq(first.state(), second.state()));
}

#[tokio::test]
async fn upstream_outage_is_retried_up_to_the_bound() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let err = transport
        .mutate_with_options(ACCOUNTS, json!({}), ExecuteOptions::new().with_max_retries(2))
        .await
        .unwrap_err();

    assert_eq!(err.cause_category(), CauseCategory::DependencyDown);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let err = transport.query(ACCOUNTS, json!({})).await.unwrap_err();

    match err {
        MoneygraphError::Api { status, message, .. } => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "bad request");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn rate_limit_then_success_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let data = transport.query(ACCOUNTS, json!({})).await.expect("retried");
    assert_eq!(data["accounts"][0]["id"], "1");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn unauthorized_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = transport_for(&server, 0)
        .query(ACCOUNTS, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.cause_category(), CauseCategory::Auth);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn graphql_errors_surface_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "Cannot query field \"foo\" on type \"Query\"."}]
        })))
        .mount(&server)
        .await;

    let err = transport_for(&server, 0)
        .query(ACCOUNTS, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.cause_category(), CauseCategory::Api);
    assert_eq!(err.message(), "Cannot query field \"foo\" on type \"Query\".");
}

#[tokio::test]
async fn empty_data_is_reported_distinctly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": null, "errors": []})),
        )
        .mount(&server)
        .await;

    let err = transport_for(&server, 0)
        .query(ACCOUNTS, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.cause_category(), CauseCategory::EmptyResponse);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn non_json_success_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = transport_for(&server, 0)
        .query(ACCOUNTS, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.cause_category(), CauseCategory::Api);
}

#[tokio::test]
async fn slow_responses_time_out_as_network_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body().set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let err = transport_for(&server, 0)
        .query_with_options(
            ACCOUNTS,
            json!({}),
            ExecuteOptions::new().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MoneygraphError::Network { timed_out: true, .. }));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn missing_session_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .expect(0)
        .mount(&server)
        .await;

    let transport = transport_with(test_config(&server, 0), FixedSession::new(None));
    let err = transport.query(ACCOUNTS, json!({})).await.unwrap_err();
    assert_eq!(err.cause_category(), CauseCategory::Auth);
}

#[tokio::test]
async fn expired_session_is_invalidated_without_a_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .expect(0)
        .mount(&server)
        .await;

    let expired = Session::new("tok-old", "dev-1")
        .with_expiry(chrono::Utc::now() - chrono::Duration::hours(1));
    let provider = FixedSession::new(Some(expired));
    let transport = transport_with(test_config(&server, 0), provider.clone());

    let err = transport.query(ACCOUNTS, json!({})).await.unwrap_err();
    assert_eq!(err.cause_category(), CauseCategory::Auth);
    assert_eq!(provider.invalidations.load(Ordering::SeqCst), 1);
    assert!(provider.get_session().is_none());
}

#[tokio::test]
async fn stored_session_is_loaded_on_demand() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Token tok-stored"))
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store
        .save(&Session::new("tok-stored", "dev-1"))
        .expect("seed session");

    let config = test_config(&server, 0);
    let manager = SessionManager::with_store(&config, store).expect("manager");
    let transport = transport_with(config, Arc::new(manager));

    transport.query(ACCOUNTS, json!({})).await.expect("query");
}

#[tokio::test]
async fn dropped_caller_does_not_cancel_shared_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body().set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    let leader = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.query(ACCOUNTS, json!({})).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    leader.abort();

    // The call keeps running, so a new identical caller joins it
    let data = transport
        .query(ACCOUNTS, json!({}))
        .await
        .expect("joined call");
    assert_eq!(data["accounts"][0]["id"], "1");
    assert_eq!(request_count(&server).await, 1);
    assert_eq!(transport.state().in_flight(), 0);
}

#[tokio::test]
async fn typed_queries_deserialize_payload() {
    #[derive(serde::Deserialize)]
    struct Accounts {
        accounts: Vec<Account>,
    }
    #[derive(serde::Deserialize)]
    struct Account {
        id: String,
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .mount(&server)
        .await;

    let transport = GraphqlTransport::builder(test_config(&server, 0))
        .with_session_provider(FixedSession::new(Some(Session::new("tok-1", "dev-1"))))
        .with_backoff(BackoffPolicy::default())
        .build()
        .expect("transport");
    let accounts: Accounts = transport
        .query_as(ACCOUNTS, json!({}))
        .await
        .expect("typed query");
    assert_eq!(accounts.accounts[0].id, "1");
}

#[tokio::test]
async fn non_object_variables_are_rejected_before_any_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_body())
        .expect(0)
        .mount(&server)
        .await;

    let transport = transport_for(&server, 0);
    for variables in [json!([1, 2]), json!(7), json!("id"), json!(true)] {
        match transport.query(ACCOUNTS, variables).await {
            Err(MoneygraphError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("variables"))
            }
            other => panic!("expected Validation error, got {other:?}"),
        }
    }
    assert_eq!(request_count(&server).await, 0);
    assert_eq!(transport.state().in_flight(), 0);
}
