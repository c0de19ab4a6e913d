//! In-memory token cache with a single expiry policy
//!
//! Holds at most one record per credential key. Expiry is judged here and
//! only here: a record is returned only while `now + buffer < expires_at`,
//! so no caller ever does its own wall-clock math against a token. The
//! cache also hands out per-key refresh gates; concurrent callers that
//! miss on the same key serialize behind the gate and reuse the winner's
//! record instead of each fetching upstream.
//!
//! Writes replace the record wholesale. A caller that times out mid-fetch
//! therefore leaves no partially-updated state behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::constants::DEFAULT_EXPIRY_BUFFER_SECS;
use crate::token::{TokenRecord, unix_millis};

/// Shared token cache keyed by credential set.
pub struct TokenCache {
    buffer_millis: u64,
    slots: Mutex<HashMap<String, Slot>>,
}

#[derive(Default)]
struct Slot {
    record: Option<TokenRecord>,
    refresh_gate: Arc<Mutex<()>>,
}

/// A record inside the buffer window counts as absent, not stale.
fn is_live(record: &TokenRecord, now_millis: u64, buffer_millis: u64) -> bool {
    now_millis + buffer_millis < record.expires_at
}

impl TokenCache {
    /// Cache treating records as expired `buffer` before their real expiry.
    pub fn new(buffer: Duration) -> Self {
        Self {
            buffer_millis: buffer.as_millis() as u64,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the record for `key` only while it is comfortably unexpired.
    pub async fn get(&self, key: &str) -> Option<TokenRecord> {
        let slots = self.slots.lock().await;
        let record = slots.get(key)?.record.as_ref()?;
        if is_live(record, unix_millis(), self.buffer_millis) {
            Some(record.clone())
        } else {
            None
        }
    }

    /// Replace the record for `key` unconditionally.
    pub async fn put(&self, key: &str, record: TokenRecord) {
        let mut slots = self.slots.lock().await;
        slots.entry(key.to_string()).or_default().record = Some(record);
        debug!(key, "token cached");
    }

    /// Drop the record for `key` unconditionally. The refresh gate
    /// survives so an in-flight refresh keeps serializing followers.
    pub async fn invalidate(&self, key: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(key) {
            slot.record = None;
            debug!(key, "token invalidated");
        }
    }

    /// Per-key gate serializing the miss-check/fetch/store sequence.
    /// Callers that lose the race re-check the cache after acquiring the
    /// gate and reuse the winner's record instead of fetching again.
    pub async fn refresh_gate(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().await;
        slots.entry(key.to_string()).or_default().refresh_gate.clone()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_EXPIRY_BUFFER_SECS))
    }
}
