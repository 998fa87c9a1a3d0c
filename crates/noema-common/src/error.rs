//! Error types for Noema
//!
//! Provides a unified error type and domain-specific error variants. Every
//! variant is distinguishable so callers can branch on the cause of a failure.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::account::AccountId;
use crate::types::entity::{AgentStatus, EntityId};

/// Result type alias using NoemaError
pub type Result<T> = std::result::Result<T, NoemaError>;

/// Unified error type for Noema operations
#[derive(Debug, Error)]
pub enum NoemaError {
    // Access-control errors
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    // Entity state / invariant errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    // Learning subsystem errors
    #[error("Learning error: {0}")]
    Learning(#[from] LearningError),

    // Delegated execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    // Crypto errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Caller is not allowed to perform the operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("{caller} is not the owner of entity {entity}")]
    NotOwner { entity: EntityId, caller: AccountId },

    #[error("{caller} is not authorized to act on entity {entity}")]
    NotAuthorized { entity: EntityId, caller: AccountId },

    #[error("{caller} is neither governor nor emergency authority")]
    NotGovernor { caller: AccountId },

    #[error("{caller} does not administer logic {logic}")]
    NotLogicAdmin { logic: AccountId, caller: AccountId },
}

/// Entity invariant violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Invalid status: expected {expected}, found {actual}")]
    InvalidStatus {
        expected: AgentStatus,
        actual: AgentStatus,
    },

    #[error("Entity {0} is terminated")]
    Terminated(EntityId),

    #[error("Null address is not a valid target")]
    ZeroAddress,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount overflows balance arithmetic")]
    BalanceOverflow,

    #[error("Operations are paused for entity {0}")]
    Paused(EntityId),

    #[error("Reentrant call into entity {0} rejected")]
    ReentrantCall(EntityId),

    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
}

/// Learning subsystem failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearningError {
    #[error("Learning is not enabled for entity {0}")]
    NotEnabled(EntityId),

    #[error("Learning record already initialized for entity {0}")]
    AlreadyInitialized(EntityId),

    #[error("Learning was disabled for entity {0}; reset before enabling again")]
    Disabled(EntityId),

    #[error("Previous root {supplied} does not match committed root {committed}")]
    StaleRoot { supplied: String, committed: String },

    #[error("Merkle proof does not verify against the new root")]
    InvalidProof,

    #[error("Daily update limit of {limit} reached for day {day}")]
    RateLimited { limit: u32, day: i64 },

    #[error("{journal} entry {index} not found")]
    EntryNotFound { journal: &'static str, index: u64 },

    #[error("Outcome for {journal} entry {index} already recorded")]
    OutcomeAlreadyRecorded { journal: &'static str, index: u64 },

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
}

/// Delegated logic execution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Out of gas: used {used} of {limit}")]
    OutOfGas { limit: u64, used: u64 },

    #[error("Delegated logic reverted: {0}")]
    Reverted(String),

    #[error("No logic registered at {0}")]
    LogicNotFound(AccountId),

    #[error("Logic already registered at {0}")]
    LogicAlreadyRegistered(AccountId),
}

/// Cryptographic operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    #[error("Nonce {nonce} already used by {signer}")]
    NonceReused { signer: AccountId, nonce: u64 },

    #[error("Approval expired at {expires_at}")]
    ApprovalExpired { expires_at: i64 },
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        ExecutionError::Reverted(err.to_string())
    }
}

impl From<serde_json::Error> for NoemaError {
    fn from(err: serde_json::Error) -> Self {
        NoemaError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for NoemaError {
    fn from(err: config::ConfigError) -> Self {
        NoemaError::Config(err.to_string())
    }
}
