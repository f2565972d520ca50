// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-memory counter store keyed by caller identity.
//!
//! The store is the only shared mutable state in the gate. Each operation
//! runs inside a single write-guard critical section, so concurrent
//! requests from one identity never observe the same pre-increment count.
//! Nothing is persisted; a restart clears every counter.

use crate::config::AdmissionPolicy;
use crate::identity::IdentityKey;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Admission state for one identity, as handed out by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    /// Attempts since the last reset
    pub count: u32,
    /// Attempts since the window began; challenge resets do not clear it
    pub window_attempts: u32,
    /// When the current counting window began
    pub window_start: Instant,
    /// Set once `count` crossed the challenge threshold
    pub captcha_required: bool,
}

impl CounterRecord {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            window_attempts: 0,
            window_start: now,
            captcha_required: false,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.window_start) >= window
    }

    /// Time left before the window rolls over.
    pub fn window_remaining(&self, window: Duration) -> Duration {
        window.saturating_sub(Instant::now().duration_since(self.window_start))
    }
}

/// Thread-safe counter store.
pub struct CounterStore {
    challenge_threshold: u32,
    window: Duration,
    records: RwLock<HashMap<IdentityKey, CounterRecord>>,
}

impl CounterStore {
    /// Create an empty store enforcing the given policy's threshold and window.
    pub fn new(policy: &AdmissionPolicy) -> Self {
        Self {
            challenge_threshold: policy.challenge_threshold,
            window: policy.window_duration(),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Count one attempt for `key` and return the post-increment record.
    ///
    /// Records whose window has elapsed are re-initialised first.
    pub async fn observe(&self, key: &IdentityKey) -> CounterRecord {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records
            .entry(key.clone())
            .or_insert_with(|| CounterRecord::fresh(now));

        if record.is_expired(now, self.window) {
            debug!(identity = %key, "Window expired, starting fresh");
            *record = CounterRecord::fresh(now);
        }

        record.count = record.count.saturating_add(1);
        record.window_attempts = record.window_attempts.saturating_add(1);
        record.clone()
    }

    /// Flag `key` as requiring a CAPTCHA. Returns whether the flag is now set.
    ///
    /// A record below the challenge threshold (for instance one reset by a
    /// concurrent verification) is left untouched.
    pub async fn mark_challenged(&self, key: &IdentityKey) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(key) {
            Some(record) if record.count >= self.challenge_threshold => {
                record.captcha_required = true;
                true
            }
            _ => false,
        }
    }

    /// Clear the attempt count and CAPTCHA flag for `key`.
    pub async fn reset(&self, key: &IdentityKey) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(key) {
            record.count = 0;
            record.captcha_required = false;
        }
    }

    /// Look up `key` without counting an attempt. Expired records read as absent.
    pub async fn get(&self, key: &IdentityKey) -> Option<CounterRecord> {
        let now = Instant::now();
        let records = self.records.read().await;
        records
            .get(key)
            .filter(|r| !r.is_expired(now, self.window))
            .cloned()
    }

    /// Drop records whose window has elapsed. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now, self.window));
        before - records.len()
    }

    /// Number of tracked identities.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Counting window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}
