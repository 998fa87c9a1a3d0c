//! Named threshold crossings
//!
//! A milestone fires the first time its tracked value is at or above the
//! threshold. The achieved set is persisted with the owning record, so a value
//! that oscillates across the boundary never fires twice.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Value a milestone tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Interactions,
    /// Confidence as a whole percentage
    ConfidencePercent,
    LearningVersion,
    Trades,
    Profitability,
    RiskManagement,
    Content,
    Creativity,
    TrendAdaptation,
}

/// A named threshold on one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub name: &'static str,
    pub metric: Metric,
    pub threshold: u64,
}

impl Milestone {
    pub const fn new(name: &'static str, metric: Metric, threshold: u64) -> Self {
        Self {
            name,
            metric,
            threshold,
        }
    }
}

/// Milestones every learning module tracks
pub const GENERAL_MILESTONES: &[Milestone] = &[
    Milestone::new("interactions_100", Metric::Interactions, 100),
    Milestone::new("interactions_1000", Metric::Interactions, 1_000),
    Milestone::new("confidence_80", Metric::ConfidencePercent, 80),
    Milestone::new("confidence_95", Metric::ConfidencePercent, 95),
    Milestone::new("learning_versions_10", Metric::LearningVersion, 10),
];

/// A milestone that just fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Achievement {
    pub name: &'static str,
    pub value: u64,
}

/// Persisted set of already-achieved milestones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneBook {
    achieved: BTreeSet<String>,
}

impl MilestoneBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_achieved(&self, name: &str) -> bool {
        self.achieved.contains(name)
    }

    pub fn achieved(&self) -> impl Iterator<Item = &str> {
        self.achieved.iter().map(String::as_str)
    }

    /// Record `value` for `metric`; returns milestones crossed for the first time
    pub fn observe(&mut self, milestones: &[Milestone], metric: Metric, value: u64) -> Vec<Achievement> {
        let mut fired = Vec::new();
        for m in milestones.iter().filter(|m| m.metric == metric) {
            if value >= m.threshold && !self.achieved.contains(m.name) {
                self.achieved.insert(m.name.to_string());
                fired.push(Achievement { name: m.name, value });
            }
        }
        fired
    }
}
