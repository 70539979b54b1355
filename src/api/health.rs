//! Shared run counters for the status endpoints.
//! Updated by the monitor loop, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Cumulative counters. The only state that outlives a single cycle.
#[derive(Default)]
pub struct MonitorStats {
    /// True while the monitor loop is running.
    pub running: AtomicBool,
    pub cycles: AtomicU64,
    /// Cycles where no listing appeared within the wait window.
    pub empty_cycles: AtomicU64,
    /// Cycles voided by a recoverable page error (unreadable balance etc.).
    pub void_cycles: AtomicU64,
    pub items_seen: AtomicU64,
    pub items_dropped: AtomicU64,
    pub alerts_sent: AtomicU64,
    pub alerts_failed: AtomicU64,
    pub publishes_ok: AtomicU64,
    pub publishes_failed: AtomicU64,
    pub last_balance: AtomicU64,
    /// Unix seconds of the last completed cycle (0 = none).
    pub last_cycle_at_secs: AtomicU64,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, v: bool) {
        self.running.store(v, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn set_last_balance(&self, balance: u64) {
        self.last_balance.store(balance, Ordering::Relaxed);
    }

    pub fn set_last_cycle_at_secs(&self, secs: u64) {
        self.last_cycle_at_secs.store(secs, Ordering::Relaxed);
    }
}
