//! In-flight request deduplication

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use moneygraph_core::MoneygraphResult;
use serde_json::Value;

/// Outcome of one network call, shared by every caller with the same key
pub type SharedOutcome = Shared<BoxFuture<'static, MoneygraphResult<Arc<Value>>>>;

/// Deterministic key for an (operation, variables) pair.
///
/// Object keys are sorted recursively so that key order never splits a key.
pub fn dedupe_key(operation: &str, variables: &Value) -> String {
    format!("{}\u{1f}{}", operation, canonicalize(variables))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

struct InFlightEntry {
    id: u64,
    outcome: SharedOutcome,
}

/// Map from dedupe key to the pending outcome of the call that owns it
///
/// The map is only touched inside short critical sections that never span an
/// await point.
#[derive(Default)]
pub struct InFlightRequests {
    entries: Mutex<HashMap<String, InFlightEntry>>,
    next_id: AtomicU64,
}

impl InFlightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending call for `key`, or register the one produced by `start`.
    ///
    /// `start` receives the registration id that must later be passed to
    /// [`InFlightRequests::complete`]. The boolean is true when an existing
    /// call was joined.
    pub(crate) fn join_or_start<F>(&self, key: &str, start: F) -> (SharedOutcome, bool)
    where
        F: FnOnce(u64) -> SharedOutcome,
    {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(entry) = entries.get(key) {
            return (entry.outcome.clone(), true);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let outcome = start(id);
        entries.insert(
            key.to_string(),
            InFlightEntry {
                id,
                outcome: outcome.clone(),
            },
        );
        (outcome, false)
    }

    /// Remove the entry registered under `id`; a newer entry for the same key is left alone
    pub(crate) fn complete(&self, key: &str, id: u64) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.get(key).is_some_and(|entry| entry.id == id) {
            entries.remove(key);
        }
    }

    /// Number of calls currently in flight
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InFlightRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightRequests")
            .field("in_flight", &self.len())
            .finish()
    }
}

/// Unregisters a dedupe entry when dropped, including on panic
pub(crate) struct Registration {
    pub(crate) requests: Arc<crate::transport::TransportState>,
    pub(crate) key: String,
    pub(crate) id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.requests.in_flight_requests().complete(&self.key, self.id);
    }
}
