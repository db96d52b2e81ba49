//! # Monotonic Cache Clock
//!
//! A single-writer, many-reader "seconds since start" counter plus the
//! `oldest_live` flush horizon, updated by one periodic task and read by
//! every worker without synchronization (relaxed ordering is sufficient —
//! we only need eventual visibility of a monotonically increasing value).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Thirty days in seconds — the cutoff between "relative" and "absolute"
/// `exptime` wire values.
pub const REALTIME_MAXDELTA: i64 = 60 * 60 * 24 * 30;

/// An item's expiration, resolved into the clock's own time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exptime {
    /// The item never expires.
    Never,
    /// The item expires once `current_time` reaches this value.
    At(u32),
}

impl Exptime {
    pub fn is_expired(self, current_time: u32) -> bool {
        match self {
            Exptime::Never => false,
            Exptime::At(t) => t <= current_time,
        }
    }
}

/// Process-wide time source.
///
/// `current_time` counts whole seconds since `started`, where `started` is
/// wall-clock startup time minus two seconds (matching the reference
/// implementation's choice of leaving a two-second margin so that an
/// absolute `exptime` equal to "now" at boot never collides with zero).
pub struct Clock {
    started_unix: u64,
    current_time: AtomicU32,
    /// 0 means "no flush horizon in effect" — safe because `current_time`
    /// never legitimately holds 0 (it starts at 2 and only increases).
    oldest_live: AtomicU32,
}

impl Clock {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Clock {
            started_unix: now.saturating_sub(2),
            current_time: AtomicU32::new(2),
            oldest_live: AtomicU32::new(0),
        }
    }

    /// Advances the clock by one second. Call this from a single periodic task.
    pub fn tick(&self) {
        self.current_time.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current_time(&self) -> u32 {
        self.current_time.load(Ordering::Relaxed)
    }

    pub fn oldest_live(&self) -> Option<u32> {
        match self.oldest_live.load(Ordering::Relaxed) {
            0 => None,
            t => Some(t),
        }
    }

    /// Converts a non-negative wire-level `exptime` into the clock's time base.
    ///
    /// `0` means never; values at or below [`REALTIME_MAXDELTA`] are
    /// relative seconds-from-now; anything larger is an absolute UNIX
    /// timestamp. An absolute timestamp at or before process start is
    /// coerced to "one second after start" to avoid wraparound into the
    /// past relative to `started`.
    pub fn realtime(&self, exptime: i64) -> Exptime {
        if exptime == 0 {
            return Exptime::Never;
        }
        if exptime <= REALTIME_MAXDELTA {
            return Exptime::At(self.current_time().saturating_add(exptime as u32));
        }

        let rel = exptime - self.started_unix as i64;
        let rel = if rel <= 0 { 1 } else { rel };
        Exptime::At(rel as u32)
    }

    /// Sets the flush horizon so that every item created at or before the
    /// horizon is treated as absent. `None` flushes everything live right
    /// now; `Some(exptime)` schedules a delayed flush using the same
    /// relative/absolute rules as [`Clock::realtime`]. One second is
    /// subtracted from the computed horizon (matching the reference
    /// implementation) so an item stored in the same clock-second as the
    /// flush is not wrongly hidden.
    pub fn flush_all(&self, exptime: Option<i64>) {
        let horizon = match exptime {
            None | Some(0) => self.current_time(),
            Some(t) => match self.realtime(t) {
                Exptime::At(t) => t,
                Exptime::Never => self.current_time(),
            },
        };
        // Never store the 0 sentinel for a real horizon.
        self.oldest_live.store(horizon.saturating_sub(1).max(1), Ordering::Relaxed);
    }

    /// `oldest_live` only hides items once the horizon has actually been
    /// reached — a delayed `flush_all T` (T in the future) must not hide
    /// currently-live items before its window arrives.
    pub fn is_expired(&self, exptime: Exptime, created: u32) -> bool {
        let now = self.current_time();
        if exptime.is_expired(now) {
            return true;
        }
        matches!(self.oldest_live(), Some(horizon) if horizon <= now && created <= horizon)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_expires() {
        let clock = Clock::new();
        assert_eq!(clock.realtime(0), Exptime::Never);
        assert!(!clock.is_expired(Exptime::Never, clock.current_time()));
    }

    #[test]
    fn relative_exptime_adds_to_current_time() {
        let clock = Clock::new();
        let base = clock.current_time();
        assert_eq!(clock.realtime(10), Exptime::At(base + 10));
    }

    #[test]
    fn absolute_timestamp_at_or_before_start_coerces_to_one() {
        let clock = Clock::new();
        let in_the_past = clock.started_unix as i64 - 100;
        assert_eq!(clock.realtime(in_the_past.max(REALTIME_MAXDELTA + 1)), Exptime::At(1));
    }

    #[test]
    fn flush_all_hides_old_items_only() {
        let clock = Clock::new();
        let created_before = clock.current_time();
        clock.tick();
        clock.flush_all(None);
        assert!(clock.is_expired(Exptime::Never, created_before));
    }
}
