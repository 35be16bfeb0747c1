//! Per-identity attempt limiting.

use regflow_core::config::BatchConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Caps how many flows may start for one identity inside a cooldown window.
///
/// Owned by the batch and shared between its concurrent flows. A limit of
/// zero disables the tracker: every attempt is allowed and nothing is
/// remembered.
#[derive(Debug)]
pub struct AttemptTracker {
    limit: u32,
    cooldown: Duration,
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl AttemptTracker {
    pub fn new(limit: u32, cooldown: Duration) -> Self {
        Self {
            limit,
            cooldown,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.attempt_limit,
            Duration::from_secs(config.attempt_cooldown_secs),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Records an attempt for `key` unless the window is already full.
    ///
    /// # Returns
    ///
    /// - `true`: the attempt may go ahead (and has been counted)
    /// - `false`: `limit` attempts already started within the cooldown
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = attempts.entry(key.to_string()).or_default();
        window.retain(|started| now.saturating_duration_since(*started) < self.cooldown);

        if window.len() >= self.limit as usize {
            return false;
        }
        window.push(now);
        true
    }

    /// Attempts still available for `key` at `now`.
    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        if !self.is_enabled() {
            return u32::MAX;
        }
        let attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let used = attempts
            .get(key)
            .map(|window| {
                window
                    .iter()
                    .filter(|started| now.saturating_duration_since(**started) < self.cooldown)
                    .count()
            })
            .unwrap_or(0);
        self.limit.saturating_sub(used as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_window() {
        let tracker = AttemptTracker::new(3, Duration::from_secs(300));
        let start = Instant::now();

        assert!(tracker.try_acquire_at("a@example.com", start));
        assert!(tracker.try_acquire_at("a@example.com", start + Duration::from_secs(1)));
        assert!(tracker.try_acquire_at("a@example.com", start + Duration::from_secs(2)));
        assert!(!tracker.try_acquire_at("a@example.com", start + Duration::from_secs(3)));
        assert_eq!(tracker.remaining_at("a@example.com", start + Duration::from_secs(3)), 0);

        // Other identities are unaffected.
        assert!(tracker.try_acquire_at("b@example.com", start + Duration::from_secs(3)));
    }

    #[test]
    fn test_window_expires() {
        let tracker = AttemptTracker::new(1, Duration::from_secs(300));
        let start = Instant::now();

        assert!(tracker.try_acquire_at("a@example.com", start));
        assert!(!tracker.try_acquire_at("a@example.com", start + Duration::from_secs(299)));
        assert!(tracker.try_acquire_at("a@example.com", start + Duration::from_secs(300)));
    }

    #[test]
    fn test_disabled_allows_everything() {
        let tracker = AttemptTracker::disabled();
        for _ in 0..100 {
            assert!(tracker.try_acquire("a@example.com"));
        }
        assert!(!tracker.is_enabled());
    }

    #[test]
    fn test_from_config_defaults() {
        let tracker = AttemptTracker::from_config(&BatchConfig::default());
        assert!(tracker.is_enabled());
        assert_eq!(tracker.remaining_at("x", Instant::now()), 3);
    }
}
