//! The operation gate.
//!
//! Every public operation holds an `OperationGuard` for its whole duration.
//! The underlying `tokio::sync::Mutex` is fair, so queued callers run in
//! the order they asked.

use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

/// Acquisition counters for instrumentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
    pub acquisitions: u64,
    pub peak_wait_ms: u64,
    pub total_hold_ms: u64,
}

#[derive(Default)]
pub struct OperationLock {
    gate: Mutex<()>,
    acquisitions: AtomicU64,
    peak_wait_ms: AtomicU64,
    total_hold_ms: AtomicU64,
}

impl OperationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other operation runs, then hold the gate until the
    /// returned guard is dropped.
    pub async fn acquire(&self, operation: &'static str) -> OperationGuard<'_> {
        let asked = Instant::now();
        let guard = self.gate.lock().await;
        let waited = asked.elapsed();
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.peak_wait_ms
            .fetch_max(waited.as_millis() as u64, Ordering::Relaxed);
        debug!(
            "SMB gate acquired for {} after {} ms",
            operation,
            waited.as_millis()
        );
        OperationGuard {
            _guard: guard,
            lock: self,
            operation,
            acquired: Instant::now(),
        }
    }

    /// Run `op` while holding the gate. The gate is released on every exit
    /// path, including cancellation of the returned future.
    pub async fn with_exclusive_access<T, F, Fut>(&self, operation: &'static str, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _guard = self.acquire(operation).await;
        op().await
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            peak_wait_ms: self.peak_wait_ms.load(Ordering::Relaxed),
            total_hold_ms: self.total_hold_ms.load(Ordering::Relaxed),
        }
    }
}

pub struct OperationGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    lock: &'a OperationLock,
    operation: &'static str,
    acquired: Instant,
}

impl OperationGuard<'_> {
    pub fn held_for(&self) -> Duration {
        self.acquired.elapsed()
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let held = self.held_for();
        self.lock
            .total_hold_ms
            .fetch_add(held.as_millis() as u64, Ordering::Relaxed);
        debug!(
            "SMB gate released by {} after {} ms",
            self.operation,
            held.as_millis()
        );
    }
}
