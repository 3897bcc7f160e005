//! Client facade
//!
//! Wires a [`SessionManager`] into a [`GraphqlTransport`] and hands out the
//! domain clients. All clients made from one facade share the session, the
//! pacing gate and the in-flight map.

use std::sync::Arc;

use moneygraph_core::{
    log_operation_start, log_operation_success, MoneygraphConfig, MoneygraphResult, Session,
};
use moneygraph_session::{LoginCredentials, SessionManager, SessionStore};
use moneygraph_transport::{GraphqlTransport, TransportState};

use crate::accounts::AccountsClient;
use crate::credit::CreditClient;
use crate::transactions::TransactionsClient;

pub struct MoneygraphClient {
    config: MoneygraphConfig,
    session: Arc<SessionManager>,
    transport: GraphqlTransport,
}

impl MoneygraphClient {
    /// Client persisting its session to the configured session file
    pub fn new(config: MoneygraphConfig) -> MoneygraphResult<Self> {
        let session = Arc::new(SessionManager::new(&config)?);
        Self::from_parts(config, session, None)
    }

    pub fn with_session_store(
        config: MoneygraphConfig,
        store: SessionStore,
    ) -> MoneygraphResult<Self> {
        let session = Arc::new(SessionManager::with_store(&config, store)?);
        Self::from_parts(config, session, None)
    }

    /// Assemble from an existing session manager, optionally sharing
    /// transport state with other clients in the process
    pub fn from_parts(
        config: MoneygraphConfig,
        session: Arc<SessionManager>,
        state: Option<Arc<TransportState>>,
    ) -> MoneygraphResult<Self> {
        log_operation_start!("client_init", endpoint = %config.graphql_url());

        let mut builder = GraphqlTransport::builder(config.clone())
            .with_session_provider(session.clone());
        if let Some(state) = state {
            builder = builder.with_shared_state(state);
        }
        let transport = builder.build()?;

        log_operation_success!("client_init");
        Ok(Self {
            config,
            session,
            transport,
        })
    }

    pub fn config(&self) -> &MoneygraphConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn transport(&self) -> &GraphqlTransport {
        &self.transport
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> MoneygraphResult<Session> {
        self.session.login(credentials).await
    }

    pub fn use_token(&self, token: impl Into<String>) -> MoneygraphResult<Session> {
        self.session.use_token(token)
    }

    pub async fn logout(&self) {
        self.session.logout().await
    }

    pub fn accounts(&self) -> AccountsClient {
        AccountsClient::new(self.transport.clone())
    }

    pub fn transactions(&self) -> TransactionsClient {
        TransactionsClient::new(self.transport.clone())
    }

    pub fn credit(&self) -> CreditClient {
        CreditClient::new(self.transport.clone())
    }
}
