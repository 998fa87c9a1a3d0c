//! Time source
//!
//! Every timestamp in Noema is Unix seconds. Day indices partition time into
//! UTC days and drive the root-update rate limit window.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Seconds per rate-limit day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Day index for a Unix timestamp
#[inline]
pub fn day_index(timestamp: i64) -> i64 {
    timestamp.div_euclid(SECONDS_PER_DAY)
}

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Unix seconds
    fn unix(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Start at a Unix timestamp
    pub fn at(timestamp: i64) -> Self {
        Self::new(DateTime::from_timestamp(timestamp, 0).unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        *self.now.write() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
