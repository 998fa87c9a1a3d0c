//! Rolling bounded scores (0-100)
//!
//! Each observation nudges the score by how far it deviates from the running
//! average, clamped to `MAX_STEP` per observation. The running average is an
//! exponential moving average kept in milli-units.

use serde::{Deserialize, Serialize};

use noema_common::error::LearningError;

/// Upper bound of a score
pub const MAX_SCORE: u64 = 100;

/// Starting score
pub const DEFAULT_SCORE: u64 = 50;

/// Largest change from a single observation
pub const MAX_STEP: i64 = 5;

/// Deviation divisor
pub const DEVIATION_DIVISOR: i64 = 4;

/// Moving-average weight (1/8 per observation)
pub const AVERAGE_WEIGHT: i64 = 8;

const MILLI: i64 = 1_000;

/// A bounded score updated by small deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingScore {
    value: u64,
    /// Running average x 1000
    average_milli: i64,
    samples: u64,
}

impl Default for RollingScore {
    fn default() -> Self {
        Self {
            value: DEFAULT_SCORE,
            average_milli: DEFAULT_SCORE as i64 * MILLI,
            samples: 0,
        }
    }
}

impl RollingScore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Running average, whole units
    pub fn average(&self) -> u64 {
        (self.average_milli / MILLI) as u64
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Score after observing `observation`, which must be within 0-100
    pub fn observed(&self, observation: u64) -> Result<Self, LearningError> {
        if observation > MAX_SCORE {
            return Err(LearningError::InvalidObservation(format!(
                "score observation {} exceeds {}",
                observation, MAX_SCORE
            )));
        }

        let obs_milli = observation as i64 * MILLI;
        let deviation = obs_milli - self.average_milli;
        let step = (deviation / (DEVIATION_DIVISOR * MILLI)).clamp(-MAX_STEP, MAX_STEP);
        let value = (self.value as i64 + step).clamp(0, MAX_SCORE as i64) as u64;

        Ok(Self {
            value,
            average_milli: self.average_milli + deviation / AVERAGE_WEIGHT,
            samples: self.samples + 1,
        })
    }

    /// In-place variant of [`RollingScore::observed`]
    pub fn observe(&mut self, observation: u64) -> Result<u64, LearningError> {
        *self = self.observed(observation)?;
        Ok(self.value)
    }
}
