//! Moneygraph Transport - the request pipeline for the upstream GraphQL API
//!
//! [`GraphqlTransport`] gates each call on a valid session, collapses
//! concurrent identical requests, spaces out network calls through a shared
//! [`TransportState`], retries rate limits and upstream outages with
//! exponential backoff, and classifies every failure into a
//! [`MoneygraphError`](moneygraph_core::MoneygraphError).

pub mod classify;
pub mod dedupe;
pub mod request;
pub mod transport;

pub use classify::{classify, FailureSignal};
pub use dedupe::{dedupe_key, InFlightRequests};
pub use request::{ExecuteOptions, GraphqlError, GraphqlRequest, GraphqlResponse};
pub use transport::{GraphqlTransport, GraphqlTransportBuilder, TransportState};
