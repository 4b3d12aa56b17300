//! In-process advisory lock table shared by the memory and local-fs
//! backends (spec §4.2).
//!
//! Both backends run within a single OS process, so a `parking_lot::Mutex`
//! over a small map is sufficient; there is no need for the conditional-put
//! dance the object-store backend uses to coordinate across machines.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use vg_core::{Error, Result, Timestamp};

use crate::types::{LockRecord, LockToken};

/// Best-effort mutual-exclusion over named locks, each with a caller-set
/// TTL. Acquisition polls until `timeout` elapses rather than blocking a
/// thread indefinitely, since callers run inside an async executor.
#[derive(Default)]
pub struct LockTable {
    held: Mutex<HashMap<String, LockRecord>>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl LockTable {
    /// A fresh, empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block (via async polling) up to `timeout` trying to acquire `name`.
    /// A lock past its deadline is reclaimed regardless of the recorded
    /// holder, per spec §4.2.
    pub async fn acquire(&self, name: &str, ttl: Duration, timeout: Duration) -> Result<LockToken> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(token) = self.try_acquire(name, ttl) {
                return Ok(token);
            }
            if Instant::now() >= deadline {
                return Err(Error::LockUnavailable { name: name.to_string() });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn try_acquire(&self, name: &str, ttl: Duration) -> Option<LockToken> {
        let now = Timestamp::now();
        let mut held = self.held.lock();
        if let Some(existing) = held.get(name) {
            if !existing.is_expired(now) {
                return None;
            }
        }
        let token = LockToken::new();
        let deadline = Timestamp::from_micros(now.as_micros() + ttl.as_micros() as u64);
        held.insert(name.to_string(), LockRecord { token: token.clone(), deadline });
        Some(token)
    }

    /// Release `name` if `token` matches the current holder. A mismatch
    /// (stale caller, already reclaimed) is silently ignored.
    pub fn release(&self, name: &str, token: &LockToken) {
        let mut held = self.held.lock();
        if held.get(name).is_some_and(|rec| &rec.token == token) {
            held.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let table = LockTable::new();
        let _token = table.acquire("x", Duration::from_secs(5), Duration::from_millis(5)).await.unwrap();
        let result = table.acquire("x", Duration::from_secs(5), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::LockUnavailable { .. })));
    }

    #[tokio::test]
    async fn release_then_reacquire_succeeds() {
        let table = LockTable::new();
        let token = table.acquire("x", Duration::from_secs(5), Duration::from_millis(5)).await.unwrap();
        table.release("x", &token);
        let result = table.acquire("x", Duration::from_secs(5), Duration::from_millis(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimed_by_a_new_holder() {
        let table = LockTable::new();
        let _first = table.acquire("x", Duration::from_millis(1), Duration::from_millis(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = table.acquire("x", Duration::from_secs(5), Duration::from_millis(50)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn mismatched_token_does_not_release() {
        let table = LockTable::new();
        let _token = table.acquire("x", Duration::from_secs(5), Duration::from_millis(5)).await.unwrap();
        table.release("x", &LockToken::new());
        let result = table.acquire("x", Duration::from_secs(5), Duration::from_millis(5)).await;
        assert!(result.is_err());
    }
}
