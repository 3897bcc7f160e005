//! Async utilities and patterns
//!
//! Backoff schedule for retries and the pacing gate that spaces out outbound calls

use std::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use crate::types::ApiConfig;

/// Exponential backoff schedule
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add +/-10% jitter to delays
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 2000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub fn from_api_config(api: &ApiConfig) -> Self {
        Self {
            initial_delay_ms: api.backoff_initial_ms,
            max_delay_ms: api.backoff_max_ms,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.min(32) as i32);
        let delay = ((self.initial_delay_ms as f64) * factor).min(self.max_delay_ms as f64);

        let delay = if self.jitter {
            let jitter_factor = 0.1;
            let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
            (delay * (1.0 + jitter)).min(self.max_delay_ms as f64)
        } else {
            delay
        };

        Duration::from_millis(delay.max(0.0) as u64)
    }
}

/// Global minimum spacing between outbound call starts
///
/// Every caller reserves the next free start slot under a short critical
/// section that never spans an await, so slots are handed out in the order
/// callers reach the gate.
#[derive(Debug)]
pub struct PacingGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl PacingGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspend until at least `min_interval` has passed since the previous call start.
    ///
    /// Returns how long the caller was held back.
    pub async fn wait_turn(&self) -> Duration {
        let slot = {
            let mut last_call = self
                .last_call
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = match *last_call {
                Some(last) if last + self.min_interval > now => last + self.min_interval,
                _ => now,
            };
            *last_call = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(
                sleep_ms = wait.as_millis() as u64,
                "Pacing: sleeping to enforce minimum interval"
            );
            sleep_until(slot).await;
        }
        wait
    }

    /// Record that an attempt sequence finished now
    pub fn record_call(&self) {
        let mut last_call = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        if last_call.map_or(true, |last| last < now) {
            *last_call = Some(now);
        }
    }
}
