//! Learning module variants
//!
//! A module fixes the daily root-update cap, whether an entity's own logic
//! target may record interactions, and the milestones being tracked.

use noema_common::config::LearningSettings;

use crate::milestone::{Metric, Milestone, GENERAL_MILESTONES};

pub const GENERAL_DAILY_LIMIT: u32 = 50;
pub const CREATOR_DAILY_LIMIT: u32 = 100;
pub const TRADING_DAILY_LIMIT: u32 = 200;

/// Trading-specific milestones
pub const TRADING_MILESTONES: &[Milestone] = &[
    Milestone::new("trades_100", Metric::Trades, 100),
    Milestone::new("profitable_trader", Metric::Profitability, 80),
    Milestone::new("risk_master", Metric::RiskManagement, 80),
];

/// Creator-specific milestones
pub const CREATOR_MILESTONES: &[Milestone] = &[
    Milestone::new("content_100", Metric::Content, 100),
    Milestone::new("creative_genius", Metric::Creativity, 90),
    Milestone::new("trend_setter", Metric::TrendAdaptation, 80),
];

/// Static description of a learning module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningModule {
    /// Module reference published with `LearningEnabled`
    pub name: &'static str,
    /// Committed-root updates per entity per day
    pub daily_limit: u32,
    /// Whether the entity's logic target may record interactions
    pub logic_may_record: bool,
    /// Milestones on the shared learning record
    pub milestones: &'static [Milestone],
}

impl LearningModule {
    pub fn general() -> Self {
        Self {
            name: "general",
            daily_limit: GENERAL_DAILY_LIMIT,
            logic_may_record: true,
            milestones: GENERAL_MILESTONES,
        }
    }

    pub fn creator() -> Self {
        Self {
            name: "creator",
            daily_limit: CREATOR_DAILY_LIMIT,
            logic_may_record: false,
            milestones: GENERAL_MILESTONES,
        }
    }

    pub fn trading() -> Self {
        Self {
            name: "trading",
            daily_limit: TRADING_DAILY_LIMIT,
            logic_may_record: true,
            milestones: GENERAL_MILESTONES,
        }
    }

    /// Look up a module by name, applying the configured daily cap
    pub fn from_settings(name: &str, settings: &LearningSettings) -> Option<Self> {
        match name {
            "general" => Some(Self::general().with_daily_limit(settings.general_daily_limit)),
            "creator" => Some(Self::creator().with_daily_limit(settings.creator_daily_limit)),
            "trading" => Some(Self::trading().with_daily_limit(settings.trading_daily_limit)),
            _ => None,
        }
    }

    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }
}
