//! Per-entity, per-day rate limiter for committed-root updates
//!
//! The window is the UTC day index of the call timestamp. A window opens with a
//! zero count and implicitly resets when the day index advances.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use noema_common::clock::day_index;
use noema_common::error::LearningError;
use noema_common::types::entity::EntityId;

/// Counter for the current day window
#[derive(Debug, Clone, Copy)]
struct DayWindow {
    day: i64,
    count: u32,
}

/// Daily update cap
pub struct RateLimiter {
    limit: u32,
    /// entity -> current day window
    windows: Arc<RwLock<HashMap<EntityId, DayWindow>>>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Maximum updates per day
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Updates already consumed in the window containing `now`
    pub fn used(&self, entity: EntityId, now: i64) -> u32 {
        let day = day_index(now);
        self.windows
            .read()
            .get(&entity)
            .filter(|w| w.day == day)
            .map(|w| w.count)
            .unwrap_or(0)
    }

    pub fn remaining(&self, entity: EntityId, now: i64) -> u32 {
        self.limit.saturating_sub(self.used(entity, now))
    }

    /// Fail if the window containing `now` is exhausted, without consuming
    pub fn check(&self, entity: EntityId, now: i64) -> Result<(), LearningError> {
        if self.used(entity, now) >= self.limit {
            return Err(LearningError::RateLimited {
                limit: self.limit,
                day: day_index(now),
            });
        }
        Ok(())
    }

    /// Consume one update from the window containing `now`
    pub fn try_acquire(&self, entity: EntityId, now: i64) -> Result<u32, LearningError> {
        let day = day_index(now);

        let mut windows = self.windows.write();
        let window = windows.entry(entity).or_insert(DayWindow { day, count: 0 });

        // New day, new window
        if window.day != day {
            window.day = day;
            window.count = 0;
        }

        if window.count >= self.limit {
            warn!(entity = %entity, day, limit = self.limit, "Daily update limit reached");
            return Err(LearningError::RateLimited {
                limit: self.limit,
                day,
            });
        }

        window.count += 1;
        Ok(self.limit - window.count)
    }
}
