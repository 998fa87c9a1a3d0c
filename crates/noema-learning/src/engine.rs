//! MetricsEngine - bounded confidence and velocity updates
//!
//! Confidence is a fixed-point scalar in `[0, CONFIDENCE_SCALE]` that starts at
//! the neutral midpoint. A success closes `1/K` of the gap to the ceiling and a
//! failure removes `1/K2` of the current value, so neither bound can be reached
//! in a single step. All arithmetic is integer.

use serde::{Deserialize, Serialize};

use noema_common::clock::SECONDS_PER_DAY;
use noema_common::config::LearningSettings;
use noema_common::error::{NoemaError, Result};

/// Upper bound of the confidence score
pub const CONFIDENCE_SCALE: u64 = 1_000_000;

/// Starting confidence for a freshly enabled record
pub const NEUTRAL_CONFIDENCE: u64 = CONFIDENCE_SCALE / 2;

/// Fixed-point scale of learning velocity (events per day x 1000)
pub const VELOCITY_SCALE: u64 = 1_000;

/// Default success divisor K
pub const DEFAULT_SUCCESS_DIVISOR: u64 = 10;

/// Default failure divisor K2
pub const DEFAULT_FAILURE_DIVISOR: u64 = 20;

/// Per-entity learning metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningMetrics {
    /// Interactions recorded (monotonic)
    pub total_interactions: u64,
    /// Interactions plus root updates (monotonic)
    pub learning_events: u64,
    /// Confidence in `[0, CONFIDENCE_SCALE]`
    pub confidence_score: u64,
    /// Events per elapsed day, scaled by `VELOCITY_SCALE`
    pub learning_velocity: u64,
    /// Unix seconds of the last update
    pub last_update_timestamp: i64,
}

impl LearningMetrics {
    /// Defaults for a record enabled at `now`
    pub fn neutral(now: i64) -> Self {
        Self {
            total_interactions: 0,
            learning_events: 0,
            confidence_score: NEUTRAL_CONFIDENCE,
            learning_velocity: 0,
            last_update_timestamp: now,
        }
    }

    /// Confidence as a whole percentage (0-100)
    #[inline]
    pub fn confidence_percent(&self) -> u64 {
        self.confidence_score * 100 / CONFIDENCE_SCALE
    }
}

/// Deterministic metric update rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsEngine {
    success_divisor: u64,
    failure_divisor: u64,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self {
            success_divisor: DEFAULT_SUCCESS_DIVISOR,
            failure_divisor: DEFAULT_FAILURE_DIVISOR,
        }
    }
}

impl MetricsEngine {
    /// Engine with explicit divisors; both must be at least 2
    pub fn new(success_divisor: u64, failure_divisor: u64) -> Result<Self> {
        if success_divisor < 2 || failure_divisor < 2 {
            return Err(NoemaError::Config(format!(
                "confidence divisors must be >= 2 (success={}, failure={})",
                success_divisor, failure_divisor
            )));
        }
        Ok(Self {
            success_divisor,
            failure_divisor,
        })
    }

    pub fn from_settings(settings: &LearningSettings) -> Result<Self> {
        Self::new(settings.success_divisor, settings.failure_divisor)
    }

    /// Confidence after one outcome
    pub fn next_confidence(&self, score: u64, success: bool) -> u64 {
        let score = score.min(CONFIDENCE_SCALE);
        if success {
            score + (CONFIDENCE_SCALE - score) / self.success_divisor
        } else {
            score - score / self.failure_divisor
        }
    }

    /// Events per elapsed day since the previous update
    pub fn velocity(&self, learning_events: u64, last_update: i64, now: i64) -> u64 {
        let elapsed_days = (now - last_update).max(0) / SECONDS_PER_DAY;
        learning_events.saturating_mul(VELOCITY_SCALE) / (elapsed_days as u64 + 1)
    }

    /// Metrics after recording one interaction outcome
    pub fn apply_interaction(&self, metrics: &LearningMetrics, success: bool, now: i64) -> LearningMetrics {
        let learning_events = metrics.learning_events.saturating_add(1);
        LearningMetrics {
            total_interactions: metrics.total_interactions.saturating_add(1),
            learning_events,
            confidence_score: self.next_confidence(metrics.confidence_score, success),
            learning_velocity: self.velocity(learning_events, metrics.last_update_timestamp, now),
            last_update_timestamp: now.max(metrics.last_update_timestamp),
        }
    }

    /// Metrics after a committed root update
    pub fn apply_root_update(&self, metrics: &LearningMetrics, now: i64) -> LearningMetrics {
        let learning_events = metrics.learning_events.saturating_add(1);
        LearningMetrics {
            learning_events,
            learning_velocity: self.velocity(learning_events, metrics.last_update_timestamp, now),
            last_update_timestamp: now.max(metrics.last_update_timestamp),
            ..*metrics
        }
    }
}
