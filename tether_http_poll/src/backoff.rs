//! Two-stage linear backoff for the poll cadence.
//!
//! After a response that carried work the session polls again almost
//! immediately ([`MIN_POLL_INTERVAL`]). After a quiet response the interval
//! first jumps to [`QUIET_POLL_INTERVAL`], then grows by
//! [`POLL_INTERVAL_STEP`] per quiet response until it reaches
//! [`MAX_POLL_INTERVAL`].
//!
//! # Example
//!
//! ```
//! use core::time::Duration;
//! use tether_http_poll::backoff::{Activity, PollInterval};
//!
//! let mut interval = PollInterval::new();
//! assert_eq!(interval.current(), Duration::from_millis(10));
//!
//! interval.record(Activity::Quiet);
//! interval.record(Activity::Quiet);
//! assert_eq!(interval.current(), Duration::from_millis(200));
//!
//! interval.record(Activity::Busy);
//! assert_eq!(interval.current(), Duration::from_millis(10));
//! ```

use core::time::Duration;

/// Floor of the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Interval after the first quiet response.
pub const QUIET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Growth per further quiet response.
pub const POLL_INTERVAL_STEP: Duration = Duration::from_millis(100);

/// Ceiling of the poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Whether the last completed request carried work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Data or a command arrived.
    Busy,

    /// Nothing arrived: empty body, error status, or no response.
    Quiet,
}

/// The current poll interval.
///
/// Always within `[MIN_POLL_INTERVAL, MAX_POLL_INTERVAL]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval {
    current: Duration,
}

impl PollInterval {
    /// Start at the floor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: MIN_POLL_INTERVAL,
        }
    }

    /// The current interval.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Drop back to the floor.
    pub const fn reset(&mut self) {
        self.current = MIN_POLL_INTERVAL;
    }

    /// Adjust the interval for a completed request.
    pub fn record(&mut self, activity: Activity) {
        match activity {
            Activity::Busy => self.reset(),
            Activity::Quiet => {
                if self.current < QUIET_POLL_INTERVAL {
                    self.current = QUIET_POLL_INTERVAL;
                } else if self.current < MAX_POLL_INTERVAL {
                    self.current = (self.current + POLL_INTERVAL_STEP).min(MAX_POLL_INTERVAL);
                }
            }
        }
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::new()
    }
}
