//! Log throttling utility
//!
//! Limits how often the same message is logged so a failing camera does not
//! flood the log while its streaming loop keeps retrying.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    last_logged: Instant,
    suppressed: u64,
}

/// Log throttler that limits how often the same key is logged
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use webcam_relay::utils::LogThrottler;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
///
/// assert!(throttler.should_log("video0"));
/// assert!(!throttler.should_log("video0"));
/// assert_eq!(throttler.suppressed("video0"), 1);
/// ```
pub struct LogThrottler {
    entries: Mutex<HashMap<String, Entry>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` when `key` has not been logged within the interval
    ///
    /// A `true` answer restarts the interval and resets the suppressed count;
    /// a `false` answer increments it.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.last_logged) < self.interval => {
                entry.suppressed = entry.suppressed.saturating_add(1);
                false
            }
            Some(entry) => {
                entry.last_logged = now;
                entry.suppressed = 0;
                true
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        last_logged: now,
                        suppressed: 0,
                    },
                );
                true
            }
        }
    }

    /// Messages dropped for `key` since it was last logged
    pub fn suppressed(&self, key: &str) -> u64 {
        self.entries.lock().get(key).map_or(0, |e| e.suppressed)
    }

    /// Forget `key`, so its next occurrence is logged immediately
    pub fn clear(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for LogThrottler {
    /// Five second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Macro for throttled warning logging
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_throttling() {
        let throttler = LogThrottler::new(Duration::from_millis(100));

        assert!(throttler.should_log("video0"));
        assert!(!throttler.should_log("video0"));
        assert!(!throttler.should_log("video0"));
        assert_eq!(throttler.suppressed("video0"), 2);

        thread::sleep(Duration::from_millis(150));

        assert!(throttler.should_log("video0"));
        assert_eq!(throttler.suppressed("video0"), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let throttler = LogThrottler::with_secs(10);

        assert!(throttler.should_log("video0"));
        assert!(throttler.should_log("video1"));
        assert!(!throttler.should_log("video0"));
        assert_eq!(throttler.len(), 2);
    }

    #[test]
    fn test_clear() {
        let throttler = LogThrottler::default();

        assert!(throttler.should_log("video0"));
        throttler.clear("video0");
        assert!(throttler.is_empty());
        assert!(throttler.should_log("video0"));
    }
}
