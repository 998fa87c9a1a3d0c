//! # Noema Common
//!
//! Shared identifiers, errors and primitives for Noema agents.
//!
//! ## Core Types
//!
//! - [`AccountId`]: Ed25519 account address, renderable as a `did:key`
//! - [`EntityId`]: sequential agent identifier
//! - [`AgentStatus`]: active / paused / terminated lifecycle
//!
//! ## Crypto
//!
//! - [`crypto::merkle`]: domain-separated Merkle verifier and tree builder
//! - [`crypto::signature`]: signed delegation approvals
//!
//! ## Security
//!
//! - [`security::auth`]: the authorization predicate and delegate registry
//! - [`security::guard`]: reentrancy guard

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod security;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NoemaConfig;
pub use crypto::merkle::{Digest, MerkleTree, MerkleVerifier};
pub use error::{
    AccessError, CryptoError, ExecutionError, LearningError, NoemaError, Result, StateError,
};
pub use events::{Event, EventBus, EventKind, EventSink, MemoryEventSink};
pub use security::{AuthScope, AuthorizationLayer, CallGuard, GuardScope};
pub use types::{
    account::AccountId,
    entity::{AgentStatus, EntityDirectory, EntityId, LearningHook, PauseTarget},
};

/// Noema version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
