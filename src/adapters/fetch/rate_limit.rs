//! Per-source request spacing

use crate::domain::ids::SourceKey;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Keeps consecutive requests to the same source at least a minimum
/// interval apart. Slots are reserved under the lock and waited for outside
/// it, so concurrent callers queue up in order.
#[derive(Debug, Default)]
pub struct RateLimiter {
    next_slot: Mutex<HashMap<SourceKey, Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a request to `source_key` is allowed
    pub async fn acquire(&self, source_key: &SourceKey, min_interval: Duration) {
        if min_interval.is_zero() {
            return;
        }

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next_slot
                .get(source_key)
                .copied()
                .filter(|at| *at > now)
                .unwrap_or(now);
            next_slot.insert(source_key.clone(), slot + min_interval);
            slot
        };

        if slot > Instant::now() {
            tracing::debug!(source = %source_key, "Waiting for request slot");
            tokio::time::sleep_until(slot).await;
        }
    }
}
