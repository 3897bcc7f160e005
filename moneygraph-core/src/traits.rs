//! Core trait definitions

use crate::types::Session;
use async_trait::async_trait;

/// Supplies the bearer credential to the transport
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Currently held session, without I/O
    fn get_session(&self) -> Option<Session>;

    /// Materialize a session from durable storage when none is held.
    ///
    /// Returns `None` when nothing usable is stored.
    async fn load_session(&self) -> Option<Session>;

    /// True iff the session carries an expiry in the past
    fn is_expired(&self, session: &Session) -> bool {
        session.is_expired()
    }

    /// Clear the held session and best-effort remove durable storage. Never fails.
    async fn invalidate(&self);
}
