//! # Detection Cooldown
//!
//! A single timestamp-based lockout. After an emitted detection, every
//! further detection is suppressed until the quiet window has elapsed.
//!
//! The lockout is deliberately not keyed by value: a *different* code shown
//! inside the window is dropped as well. Suppressed reads do not extend the
//! window.
//!
//! ```text
//!   window = 1200ms
//!
//!   t=0ms     "123"  ──► emitted      (window opens)
//!   t=900ms   "123"  ──► suppressed
//!   t=1000ms  "456"  ──► suppressed   (blanket lockout)
//!   t=1300ms  "123"  ──► emitted      (window reopens)
//! ```

use std::time::{Duration, Instant};

use crate::DEFAULT_COOLDOWN_MS;

/// Timed lockout for repeated detections.
#[derive(Debug, Clone)]
pub struct Cooldown {
    window: Duration,
    last_emit: Option<Instant>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Cooldown {
            window,
            last_emit: None,
        }
    }

    /// Returns true if a detection at `now` may be emitted, and if so
    /// starts a new quiet window.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.is_locked(now) {
            return false;
        }
        self.last_emit = Some(now);
        true
    }

    /// Returns true if a detection at `now` would be suppressed.
    pub fn is_locked(&self, now: Instant) -> bool {
        self.remaining(now) > Duration::ZERO
    }

    /// Time left in the current quiet window.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_emit {
            Some(last) => self.window.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Clears the lockout (used when a new session starts).
    pub fn reset(&mut self) {
        self.last_emit = None;
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Cooldown::new(Duration::from_millis(DEFAULT_COOLDOWN_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_repeat_inside_window_is_suppressed() {
        let t0 = Instant::now();
        let mut cooldown = Cooldown::new(ms(1200));

        assert!(cooldown.try_acquire(t0));
        assert!(!cooldown.try_acquire(t0 + ms(900)));
        assert!(cooldown.try_acquire(t0 + ms(1300)));
    }

    #[test]
    fn test_suppressed_reads_do_not_extend_window() {
        let t0 = Instant::now();
        let mut cooldown = Cooldown::new(ms(1200));

        assert!(cooldown.try_acquire(t0));
        assert!(!cooldown.try_acquire(t0 + ms(1100)));
        assert!(cooldown.try_acquire(t0 + ms(1200)));
    }

    #[test]
    fn test_remaining_and_reset() {
        let t0 = Instant::now();
        let mut cooldown = Cooldown::default();
        assert_eq!(cooldown.remaining(t0), Duration::ZERO);

        cooldown.try_acquire(t0);
        assert_eq!(cooldown.remaining(t0 + ms(200)), ms(1000));
        assert!(cooldown.is_locked(t0 + ms(200)));

        cooldown.reset();
        assert!(!cooldown.is_locked(t0 + ms(200)));
    }
}
