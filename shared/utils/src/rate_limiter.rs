//! Fixed-window rate limiter
//!
//! One counter per operation key. A window opens on the first call for a key
//! and the counter resets once the window has elapsed. Counters live in memory
//! only, so a restart hands every key its full quota back.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Gate for statement extraction model calls.
pub const PDF_PROCESSING: &str = "PDF_PROCESSING";
/// Batch admission check, consulted before any file in a batch is touched.
pub const PDF_PROCESSING_CHECK: &str = "PDF_PROCESSING_CHECK";
/// Gate for the general insight endpoints.
pub const GENERAL_INSIGHTS: &str = "GENERAL_INSIGHTS";

/// Millisecond time source.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    count: u32,
    window_start: u64,
    window_ms: u64,
}

impl WindowState {
    fn expired(&self, now: u64) -> bool {
        now.saturating_sub(self.window_start) > self.window_ms
    }
}

/// Client-facing view of a key's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub key: String,
    pub limit: u32,
    pub remaining: u32,
    pub window_ms: Option<u64>,
    pub resets_at_ms: Option<u64>,
}

pub struct RateLimiter {
    entries: DashMap<String, WindowState>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Take one unit of quota for `key` if any is left in the current window.
    pub fn can_proceed(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.try_acquire(key, limit, window, 1)
    }

    /// Take `units` of quota at once, or nothing at all.
    ///
    /// The entry stays locked for the whole check-and-increment, so two
    /// concurrent callers can never both claim the last unit.
    pub fn try_acquire(&self, key: &str, limit: u32, window: Duration, units: u32) -> bool {
        let now = self.clock.now_millis();
        let window_ms = window.as_millis() as u64;

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(WindowState {
                count: 0,
                window_start: now,
                window_ms,
            });

        entry.window_ms = window_ms;
        if entry.expired(now) {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count.saturating_add(units) > limit {
            return false;
        }

        entry.count += units;
        true
    }

    /// Units left for `key`. A key never seen, or whose window has run out,
    /// has its full quota.
    pub fn remaining_quota(&self, key: &str, limit: u32) -> u32 {
        let now = self.clock.now_millis();
        match self.entries.get(key) {
            Some(state) if !state.expired(now) => limit.saturating_sub(state.count),
            _ => limit,
        }
    }

    pub fn snapshot(&self, key: &str, limit: u32) -> QuotaStatus {
        let now = self.clock.now_millis();
        let live = self
            .entries
            .get(key)
            .map(|state| *state)
            .filter(|state| !state.expired(now));

        QuotaStatus {
            key: key.to_string(),
            limit,
            remaining: live.map_or(limit, |s| limit.saturating_sub(s.count)),
            window_ms: live.map(|s| s.window_ms),
            resets_at_ms: live.map(|s| s.window_start + s.window_ms),
        }
    }

    pub fn reset(&self, key: &str) {
        if let Some(mut state) = self.entries.get_mut(key) {
            state.count = 0;
        }
    }

    pub fn reset_all(&self) {
        self.entries.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
