//! # Noema Learning
//!
//! Verifiable learning for Noema agents. Each entity commits a fixed-size root
//! of its off-chain learning tree; updates are proof-gated and rate-limited,
//! while lightweight interaction outcomes drive bounded confidence metrics.
//!
//! ## Components
//!
//! - [`MetricsEngine`]: confidence and velocity update rules
//! - [`RateLimiter`]: per-entity daily cap on root updates
//! - [`LearningLedger`]: committed roots, metrics, updaters and milestones
//! - [`specialized`]: trading and creator journals with rolling scores

pub mod engine;
pub mod ledger;
pub mod milestone;
pub mod module;
pub mod rate_limit;
pub mod score;
pub mod specialized;

pub use engine::{LearningMetrics, MetricsEngine, CONFIDENCE_SCALE, NEUTRAL_CONFIDENCE};
pub use ledger::{LearningLedger, LearningRecord, LearningState, RootUpdate};
pub use milestone::{Achievement, Metric, Milestone, MilestoneBook};
pub use module::LearningModule;
pub use rate_limit::RateLimiter;
pub use score::RollingScore;
pub use specialized::{CreatorLearning, TradingLearning};
