//! Cryptographic primitives for Noema
//!
//! This module provides:
//! - Merkle verification and tree building for learning commitments
//! - Ed25519 signed approvals with canonical encoding

pub mod merkle;
pub mod signature;

// Re-export commonly used items
pub use merkle::{hash_leaf, hash_pair, Digest, MerkleTree, MerkleVerifier};
pub use signature::{sign_with_key, verify_signature, DelegationApproval};
