//! Session Manager - owns the authenticated session
//!
//! Implements [`SessionProvider`] for the transport and adds login, token
//! import and logout on top of [`SessionStore`].

use crate::auth::{AuthClient, LoginCredentials};
use crate::store::SessionStore;
use async_trait::async_trait;
use moneygraph_core::{
    log_operation_error, log_operation_start, log_operation_success, MoneygraphConfig,
    MoneygraphError, MoneygraphResult, Session, SessionProvider,
};
use std::sync::RwLock;
use tracing::{info, warn};

pub struct SessionManager {
    current: RwLock<Option<Session>>,
    store: SessionStore,
    auth: AuthClient,
    /// Device identifier pinned by configuration
    device_uuid: Option<String>,
}

impl SessionManager {
    /// Create a manager persisting to the configured session file
    pub fn new(config: &MoneygraphConfig) -> MoneygraphResult<Self> {
        Self::with_store(config, SessionStore::new(config.session_path()))
    }

    pub fn with_store(config: &MoneygraphConfig, store: SessionStore) -> MoneygraphResult<Self> {
        Ok(Self {
            current: RwLock::new(None),
            store,
            auth: AuthClient::new(config)?,
            device_uuid: config.session.device_uuid.clone(),
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Log in with a password (and optional TOTP) and persist the new session.
    ///
    /// A failed write is logged; the session stays usable in memory.
    pub async fn login(&self, credentials: &LoginCredentials) -> MoneygraphResult<Session> {
        log_operation_start!("login", username = %credentials.username);

        let device_uuid = self.device_uuid();
        let session = match self.auth.login(credentials, &device_uuid).await {
            Ok(session) => session,
            Err(e) => {
                log_operation_error!("login", e, category = %e.cause_category());
                return Err(e);
            }
        };

        self.set_session(session.clone());
        if let Err(e) = self.store.save(&session) {
            warn!(error = %e, "Logged in but failed to persist session");
        }

        log_operation_success!(
            "login",
            expires = session.expires_at.is_some(),
            user_id = ?session.user_id
        );
        Ok(session)
    }

    /// Adopt an externally obtained token as the current session
    pub fn use_token(&self, token: impl Into<String>) -> MoneygraphResult<Session> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(moneygraph_core::validation_error!(
                "Token must not be empty",
                "token",
                "session_manager"
            ));
        }

        let session = Session::new(token, self.device_uuid());
        self.set_session(session.clone());
        info!("Imported session token");
        Ok(session)
    }

    /// Persist the held session
    pub fn save_session(&self) -> MoneygraphResult<()> {
        let session = self.get_session().ok_or_else(|| {
            MoneygraphError::auth("session_manager", "No session to save; log in first")
        })?;
        self.store.save(&session)
    }

    pub async fn logout(&self) {
        self.invalidate().await;
        info!("Logged out");
    }

    fn set_session(&self, session: Session) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(session);
    }

    fn device_uuid(&self) -> String {
        if let Some(device_uuid) = &self.device_uuid {
            return device_uuid.clone();
        }
        self.get_session()
            .map(|session| session.device_uuid)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl SessionProvider for SessionManager {
    fn get_session(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn load_session(&self) -> Option<Session> {
        if let Some(session) = self.get_session() {
            return Some(session);
        }

        let session = self.store.load()?;
        self.set_session(session.clone());
        Some(session)
    }

    async fn invalidate(&self) {
        {
            let mut current = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *current = None;
        }
        self.store.remove();
    }
}
