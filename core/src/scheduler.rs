//! Settlement Scheduling
//!
//! Verified bundles are confirmed after a settlement delay. The delay is an
//! explicit schedule keyed by bundle id and read against an injectable
//! clock, so tests can move time forward instead of sleeping.
//!
//! ```text
//! submit_bundle ──► schedule(id, now + delay)
//!                         │
//!   driver tick ──► take_due(now) ──► Verified/Submitted → Confirmed
//!                         │
//!   cancel_settlement ────┘ (entry removed, bundle untouched)
//! ```

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond time source
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Pending settlements: bundle id -> due time (ms)
#[derive(Default)]
pub struct SettlementScheduler {
    entries: DashMap<String, u64>,
}

impl SettlementScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule (or reschedule) a bundle to settle at `due_at_ms`
    pub fn schedule(&self, bundle_id: &str, due_at_ms: u64) {
        self.entries.insert(bundle_id.to_string(), due_at_ms);
    }

    /// Drop a pending settlement; `false` if none was scheduled
    pub fn cancel(&self, bundle_id: &str) -> bool {
        self.entries.remove(bundle_id).is_some()
    }

    pub fn is_scheduled(&self, bundle_id: &str) -> bool {
        self.entries.contains_key(bundle_id)
    }

    pub fn due_at(&self, bundle_id: &str) -> Option<u64> {
        self.entries.get(bundle_id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry due at or before `now_ms`, oldest first
    ///
    /// Each entry is handed out once even with concurrent callers.
    pub fn take_due(&self, now_ms: u64) -> Vec<String> {
        let candidates: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|entry| *entry.value() <= now_ms)
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let mut due: Vec<(String, u64)> = candidates
            .into_iter()
            .filter_map(|(id, _)| self.entries.remove_if(&id, |_, due_at| *due_at <= now_ms))
            .collect();
        due.sort_by_key(|(_, due_at)| *due_at);
        due.into_iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let a = SystemClock.now_ms();
        let b = SystemClock.now_ms();
        assert!(a > 0 && b >= a);
    }

    #[test]
    fn test_take_due_respects_time() {
        let scheduler = SettlementScheduler::new();
        scheduler.schedule("late", 3_000);
        scheduler.schedule("early", 1_000);
        scheduler.schedule("mid", 2_000);

        assert!(scheduler.take_due(999).is_empty());
        assert_eq!(scheduler.take_due(2_000), vec!["early", "mid"]);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.take_due(2_000).is_empty());
        assert_eq!(scheduler.take_due(5_000), vec!["late"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancel() {
        let scheduler = SettlementScheduler::new();
        scheduler.schedule("b1", 100);
        assert_eq!(scheduler.due_at("b1"), Some(100));
        assert!(scheduler.cancel("b1"));
        assert!(!scheduler.cancel("b1"));
        assert!(scheduler.take_due(1_000).is_empty());
    }
}
