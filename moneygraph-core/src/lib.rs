//! Moneygraph Core - Core data structures and trait definitions
//!
//! This crate defines the error taxonomy, configuration, logging and the
//! session contract shared by the transport, session and domain crates.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
