//! Cooldown gate - per-subject, per-action expiring locks.
//!
//! Expiry is lazy: an entry whose deadline has passed is treated as absent
//! by [`CooldownGate::check`] and dropped on the spot. [`CooldownGate::sweep`]
//! is optional memory hygiene and never changes what `check` reports.
//!
//! Deadlines use `tokio::time::Instant`, so a paused test runtime can move
//! them with `tokio::time::advance`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

type Key = (String, String);

#[derive(Debug, Default)]
pub struct CooldownGate {
    entries: Mutex<HashMap<Key, Instant>>,
}

fn key(subject: &str, action: &str) -> Key {
    (subject.to_string(), action.to_string())
}

/// Whole milliseconds, rounded up so a live entry never reports 0.
fn ceil_millis(d: Duration) -> u64 {
    d.as_nanos().div_ceil(1_000_000).min(u64::MAX as u128) as u64
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Instant>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Milliseconds until `subject` may perform `action` again; 0 if clear.
    pub fn check(&self, subject: &str, action: &str) -> u64 {
        let key = key(subject, action);
        let mut entries = self.lock();
        let Some(&expiry) = entries.get(&key) else {
            return 0;
        };
        let now = Instant::now();
        if expiry <= now {
            entries.remove(&key);
            return 0;
        }
        ceil_millis(expiry - now)
    }

    /// Start (or restart) a cooldown ending `duration` from now, replacing
    /// any previous deadline.
    pub fn set(&self, subject: &str, action: &str, duration: Duration) {
        let expiry = Instant::now() + duration;
        self.lock().insert(key(subject, action), expiry);
    }

    pub fn clear(&self, subject: &str, action: &str) {
        self.lock().remove(&key(subject, action));
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expiry| *expiry > now);
        before - entries.len()
    }

    /// Entries currently stored, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
