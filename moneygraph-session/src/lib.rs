//! Moneygraph Session - authentication and session lifecycle
//!
//! - [`AuthClient`] exchanges credentials for a [`Session`](moneygraph_core::Session)
//! - [`SessionStore`] persists it to an owner-only JSON file
//! - [`SessionManager`] holds the current session and implements
//!   [`SessionProvider`](moneygraph_core::SessionProvider) for the transport

pub mod auth;
pub mod manager;
pub mod store;

pub use auth::{AuthClient, LoginCredentials};
pub use manager::SessionManager;
pub use store::SessionStore;
