//! Entity identifiers and the seams between the agent and learning subsystems

use serde::{Deserialize, Serialize};

use super::account::AccountId;
use crate::error::Result;

/// Sequential agent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Agent lifecycle status
///
/// Active and Paused are mutually reachable; Terminated is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Paused,
    Terminated,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Paused => write!(f, "paused"),
            AgentStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// Per-target circuit breaker key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseTarget {
    /// A single agent
    Entity(EntityId),
    /// Every agent whose logic target is this address
    Logic(AccountId),
}

/// Read-only lookup of entity ownership
///
/// Implemented by the agent arena; consumed by the authorization layer and the
/// learning ledger so neither reaches into agent state directly.
pub trait EntityDirectory: Send + Sync {
    /// Current owner, or None if the entity does not exist
    fn owner_of(&self, entity: EntityId) -> Option<AccountId>;

    /// Current delegated logic target
    fn logic_target_of(&self, entity: EntityId) -> Option<AccountId>;

    /// Current status
    fn status_of(&self, entity: EntityId) -> Option<AgentStatus>;
}

/// Post-execution learning hook
///
/// Called by the agent state machine after a successful action. Failures are
/// swallowed by the caller.
pub trait LearningHook: Send + Sync {
    /// Whether learning is currently enabled for the entity
    fn is_learning_enabled(&self, entity: EntityId) -> bool;

    /// Record the outcome of an executed action
    fn record_execution(&self, entity: EntityId, kind: &str, success: bool) -> Result<()>;
}
