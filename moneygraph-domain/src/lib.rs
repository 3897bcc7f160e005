//! Moneygraph Domain - typed clients for accounts, transactions and credit
//!
//! Core data calls propagate every error. Optional-feature checks run under
//! [`QueryPolicy::BestEffort`] and report a missing feature as `None`.

pub mod accounts;
pub mod client;
pub mod credit;
pub mod policy;
pub mod transactions;

pub use accounts::{Account, AccountsClient, Institution, Label};
pub use client::MoneygraphClient;
pub use credit::{CreditClient, CreditScoreSnapshot, SpinwheelUser};
pub use policy::{is_unsupported_feature, QueryPolicy};
pub use transactions::{Transaction, TransactionPage, TransactionsClient, MAX_PAGE_SIZE};

pub use moneygraph_core::{MoneygraphConfig, MoneygraphError, MoneygraphResult, Session};
pub use moneygraph_session::LoginCredentials;
