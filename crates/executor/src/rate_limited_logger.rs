//! Rate-limited logging utility
//!
//! A stalled handler or a disk that keeps failing produces the same log line
//! on every attempt. This logs at most once per interval and reports how many
//! occurrences were suppressed in between.
//!
//! # Example
//!
//! ```ignore
//! use batchline_executor::RateLimitedLogger;
//! use std::time::Duration;
//!
//! let logger = RateLimitedLogger::new(Duration::from_secs(10));
//!
//! // Only logs once per 10 seconds, even if called frequently
//! for _ in 0..1000 {
//!     logger.error("write failed", &io_error);
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval for rate-limited logging
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Rate-limited logger that prevents log spam
///
/// Thread-safe: uses atomic counters and a mutex for the last log time.
#[derive(Debug)]
pub struct RateLimitedLogger {
    /// Minimum interval between log messages
    min_interval: Duration,

    /// Last time we logged
    last_log_time: Mutex<Option<Instant>>,

    /// Occurrences since last log
    pending: AtomicU64,

    /// Occurrences ever recorded
    total: AtomicU64,
}

impl RateLimitedLogger {
    /// Create a new rate-limited logger with the specified interval
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record an occurrence and decide whether it should be logged
    ///
    /// Returns `Some(suppressed)` when the caller should emit a log line,
    /// where `suppressed` is the number of occurrences swallowed since the
    /// previous one. Returns `None` while inside the interval.
    pub fn check(&self) -> Option<u64> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);

        let should_log = {
            let mut last_time = self.last_log_time.lock();
            let now = Instant::now();

            match *last_time {
                Some(last) if now.duration_since(last) < self.min_interval => false,
                _ => {
                    *last_time = Some(now);
                    true
                }
            }
        };

        if should_log {
            let count = self.pending.swap(0, Ordering::Relaxed);
            Some(count.saturating_sub(1))
        } else {
            None
        }
    }

    /// Record an error and log it if enough time has passed
    ///
    /// Returns true if the error was logged, false if it was suppressed.
    pub fn error(&self, message: &str, error: &dyn std::fmt::Display) -> bool {
        let Some(suppressed) = self.check() else {
            return false;
        };

        let total = self.total.load(Ordering::Relaxed);
        if suppressed > 0 {
            tracing::error!(
                message = %message,
                error = %error,
                suppressed_count = suppressed,
                total_errors = total,
                "error (rate-limited)"
            );
        } else {
            tracing::error!(
                message = %message,
                error = %error,
                total_errors = total,
                "error"
            );
        }
        true
    }

}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_rate_limited_logger_default() {
        let logger = RateLimitedLogger::default();
        assert_eq!(logger.min_interval, DEFAULT_LOG_INTERVAL);
        assert_eq!(logger.pending.load(Ordering::Relaxed), 0);
        assert_eq!(logger.total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_first_error_always_logs() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = io::Error::other("test error");

        assert!(logger.error("test message", &error));
        assert_eq!(logger.total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_rapid_errors_suppressed() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = io::Error::other("test error");

        assert!(logger.error("test", &error));
        for _ in 0..10 {
            assert!(!logger.error("test", &error));
        }

        assert_eq!(logger.total.load(Ordering::Relaxed), 11);
        assert_eq!(logger.pending.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_check_reports_suppressed_count() {
        let logger = RateLimitedLogger::new(Duration::ZERO);

        assert_eq!(logger.check(), Some(0));
        assert_eq!(logger.check(), Some(0));

        let logger = RateLimitedLogger::new(Duration::from_millis(20));
        assert_eq!(logger.check(), Some(0));
        assert_eq!(logger.check(), None);
        assert_eq!(logger.check(), None);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(logger.check(), Some(2));
    }
}
