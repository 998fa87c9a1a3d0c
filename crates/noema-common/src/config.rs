//! Noema configuration
//!
//! Layered: compiled defaults, then an optional TOML file (`noema.toml` or the
//! path in `NOEMA_CONFIG`), then `NOEMA__SECTION__KEY` environment variables.

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{NoemaError, Result};

/// Default file looked up when `NOEMA_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "noema.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoemaConfig {
    pub execution: ExecutionSettings,
    pub learning: LearningSettings,
    pub telemetry: TelemetrySettings,
}

impl NoemaConfig {
    /// Load configuration from `.env`, file and environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var("NOEMA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load with an explicit (optional) file path
    pub fn load_from(path: &str) -> Result<Self> {
        let cfg: NoemaConfig = Config::builder()
            .add_source(Config::try_from(&NoemaConfig::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("NOEMA").prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the engines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.learning.success_divisor < 2 || self.learning.failure_divisor < 2 {
            return Err(NoemaError::Config(format!(
                "confidence divisors must be >= 2 (success={}, failure={})",
                self.learning.success_divisor, self.learning.failure_divisor
            )));
        }
        if self.execution.gas_ceiling == 0 {
            return Err(NoemaError::Config("gas_ceiling must be positive".to_string()));
        }
        if self.execution.gas_price.is_sign_negative() {
            return Err(NoemaError::Config("gas_price must not be negative".to_string()));
        }
        Ok(())
    }
}

/// Delegated execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Gas available to a single logic call
    pub gas_ceiling: u64,
    /// Credit charged per gas unit
    pub gas_price: Decimal,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            gas_ceiling: 3_000_000,
            gas_price: Decimal::ZERO,
        }
    }
}

/// Learning ledger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    /// Root updates per entity per day, general module
    pub general_daily_limit: u32,
    /// Root updates per entity per day, creator module
    pub creator_daily_limit: u32,
    /// Root updates per entity per day, trading module
    pub trading_daily_limit: u32,
    /// K: success moves confidence 1/K of the way to the maximum
    pub success_divisor: u64,
    /// K2: failure removes 1/K2 of the current confidence
    pub failure_divisor: u64,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            general_daily_limit: 50,
            creator_daily_limit: 100,
            trading_daily_limit: 200,
            success_divisor: 10,
            failure_divisor: 20,
        }
    }
}

/// Logging bootstrap settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json: false,
        }
    }
}
