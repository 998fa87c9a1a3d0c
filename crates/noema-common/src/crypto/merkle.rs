//! Merkle commitments for learning trees
//!
//! Implements a binary Merkle tree using BLAKE3 hashing for:
//! - Verifying point-claims against a committed root with a sibling path
//! - Building trees and proofs off-chain (tooling and tests)
//!
//! Interior nodes hash the *sorted* pair of children, so a proof is just the
//! ordered sibling list with no position bits. Leaves and interior nodes are
//! domain-separated to prevent second-preimage splicing.

use serde::{Deserialize, Serialize};

/// Hash size in bytes (BLAKE3 output)
pub const HASH_SIZE: usize = 32;

/// Longest proof accepted by the verifier
pub const MAX_PROOF_DEPTH: usize = 64;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Fixed-size fingerprint
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Digest(pub [u8; HASH_SIZE]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; HASH_SIZE]);

    /// Get hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
        let arr: [u8; HASH_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash claim data to create leaf hash
#[inline]
pub fn hash_leaf(data: &[u8]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data);
    Digest(*hasher.finalize().as_bytes())
}

/// Hash two child nodes to create parent (order-independent)
#[inline]
pub fn hash_pair(a: &Digest, b: &Digest) -> Digest {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(&lo.0);
    hasher.update(&hi.0);
    Digest(*hasher.finalize().as_bytes())
}

/// Stateless proof verification
pub struct MerkleVerifier;

impl MerkleVerifier {
    /// Recompute the root from a leaf hash and its sibling path
    pub fn compute_root(leaf: &Digest, proof: &[Digest]) -> Option<Digest> {
        if proof.len() > MAX_PROOF_DEPTH {
            return None;
        }
        Some(proof.iter().fold(*leaf, |acc, sibling| hash_pair(&acc, sibling)))
    }

    /// Verify that `leaf` is committed under `root`
    pub fn verify(root: &Digest, leaf: &Digest, proof: &[Digest]) -> bool {
        match Self::compute_root(leaf, proof) {
            Some(computed) => computed == *root,
            None => false,
        }
    }

    /// Verify raw claim bytes (hashed as a leaf first)
    pub fn verify_claim(root: &Digest, claim: &[u8], proof: &[Digest]) -> bool {
        Self::verify(root, &hash_leaf(claim), proof)
    }
}

/// Binary Merkle tree built from claims
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] = leaves, last level = [root]
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree over raw claims
    pub fn from_claims<T: AsRef<[u8]>>(claims: &[T]) -> Self {
        Self::from_leaves(claims.iter().map(|c| hash_leaf(c.as_ref())).collect())
    }

    /// Build a tree over precomputed leaf hashes
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        let mut levels = vec![leaves];

        while levels.last().map_or(false, |level| level.len() > 1) {
            let current = &levels[levels.len() - 1];
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    // Odd node is promoted unchanged
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// Root hash (None if tree is empty)
    pub fn root(&self) -> Option<Digest> {
        self.levels.last().and_then(|level| level.first().copied())
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Sibling path for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<Vec<Digest>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = idx ^ 1;
            if sibling < level.len() {
                siblings.push(level[sibling]);
            }
            idx /= 2;
        }
        Some(siblings)
    }
}
