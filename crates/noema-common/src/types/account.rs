//! AccountId - 32-byte identity for owners, delegates and logic targets
//!
//! Externally owned accounts are Ed25519 public keys and render as `did:key`
//! identifiers. Logic targets share the same address shape; the all-zero
//! address is the null address and is never a valid target.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Ed25519 multicodec prefix for did:key
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The null address
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    /// Generate a fresh keypair, returning the account and its signing key
    ///
    /// # Example
    /// ```
    /// use noema_common::AccountId;
    ///
    /// let (account, _signing_key) = AccountId::generate();
    /// assert!(account.to_did().starts_with("did:key:z"));
    /// ```
    pub fn generate() -> (Self, SigningKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        (Self::from_signing_key(&signing_key), signing_key)
    }

    /// Account controlled by the given signing key
    pub fn from_signing_key(signing_key: &SigningKey) -> Self {
        Self(signing_key.verifying_key().to_bytes())
    }

    /// Deterministic address derived from a label (for contract-style targets)
    pub fn derive(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// Whether this is the null address
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Encode as a did:key string (multicodec 0xed01, base58btc)
    pub fn to_did(&self) -> String {
        let mut prefixed = Vec::with_capacity(34);
        prefixed.extend_from_slice(&ED25519_MULTICODEC);
        prefixed.extend_from_slice(&self.0);
        format!("did:key:z{}", bs58::encode(&prefixed).into_string())
    }

    /// Decode a did:key string
    pub fn from_did(did: &str) -> Result<Self, CryptoError> {
        let encoded = did
            .strip_prefix("did:key:z")
            .ok_or_else(|| CryptoError::InvalidDid(did.to_string()))?;

        let decoded = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| CryptoError::InvalidDid(did.to_string()))?;

        if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC {
            return Err(CryptoError::InvalidDid(did.to_string()));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&decoded[2..]);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountId({})", &hex::encode(self.0)[..16])
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", &hex::encode(self.0)[..16])
    }
}
