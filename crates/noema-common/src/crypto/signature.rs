//! Signed off-chain approvals
//!
//! Owners may approve a delegation off-chain by signing a canonical encoding
//! of its fields with their Ed25519 key. The encoding is a wire contract:
//!
//! ```text
//! b"noema/delegation/v1" || entity_id:u64 BE || delegate:[u8;32]
//!     || scope:u8 || nonce:u64 BE || expires_at:i64 BE
//! ```

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::security::auth::AuthScope;
use crate::types::account::AccountId;
use crate::types::entity::EntityId;

/// Domain tag prepended to every delegation approval
pub const DELEGATION_DOMAIN: &[u8] = b"noema/delegation/v1";

/// Owner-signed grant of delegate rights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationApproval {
    pub entity_id: EntityId,
    pub delegate: AccountId,
    pub scope: AuthScope,
    /// Per-signer replay nonce
    pub nonce: u64,
    /// Unix seconds after which the approval is void
    pub expires_at: i64,
}

impl DelegationApproval {
    /// Canonical byte encoding that is signed
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DELEGATION_DOMAIN.len() + 8 + 32 + 1 + 8 + 8);
        out.extend_from_slice(DELEGATION_DOMAIN);
        out.extend_from_slice(&self.entity_id.0.to_be_bytes());
        out.extend_from_slice(self.delegate.as_bytes());
        out.push(self.scope.code());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&self.expires_at.to_be_bytes());
        out
    }

    /// Sign with the owner's key
    pub fn sign(&self, signing_key: &SigningKey) -> [u8; 64] {
        sign_with_key(signing_key, &self.canonical_bytes())
    }

    /// Check the signature was produced by `signer`
    pub fn verify(&self, signer: &AccountId, signature: &[u8; 64]) -> Result<(), CryptoError> {
        verify_signature(signer, &self.canonical_bytes(), signature)
    }
}

/// Sign data using a signing key, returning signature bytes
pub fn sign_with_key(signing_key: &SigningKey, message: &[u8]) -> [u8; 64] {
    signing_key.sign(message).to_bytes()
}

/// Verify a signature made by the account's key
pub fn verify_signature(
    signer: &AccountId,
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let verifying_key = signer.verifying_key()?;
    let sig = Signature::from_bytes(signature);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approval(delegate: AccountId) -> DelegationApproval {
        DelegationApproval {
            entity_id: EntityId(42),
            delegate,
            scope: AuthScope::Learning,
            nonce: 1,
            expires_at: 1_900_000_000,
        }
    }

    #[test]
    fn test_canonical_layout() {
        let delegate = AccountId([9u8; 32]);
        let bytes = approval(delegate).canonical_bytes();
        let d = DELEGATION_DOMAIN.len();

        assert_eq!(&bytes[..d], DELEGATION_DOMAIN);
        assert_eq!(&bytes[d..d + 8], &42u64.to_be_bytes());
        assert_eq!(&bytes[d + 8..d + 40], &[9u8; 32]);
        assert_eq!(bytes[d + 40], AuthScope::Learning.code());
        assert_eq!(&bytes[d + 41..d + 49], &1u64.to_be_bytes());
        assert_eq!(&bytes[d + 49..], &1_900_000_000i64.to_be_bytes());
    }

    #[test]
    fn test_sign_and_verify() {
        let (owner, key) = AccountId::generate();
        let a = approval(AccountId([3u8; 32]));
        let sig = a.sign(&key);

        assert!(a.verify(&owner, &sig).is_ok());

        let (other, _) = AccountId::generate();
        assert_eq!(a.verify(&other, &sig), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn test_any_field_change_breaks_signature() {
        let (owner, key) = AccountId::generate();
        let a = approval(AccountId([3u8; 32]));
        let sig = a.sign(&key);

        let mut tampered = a.clone();
        tampered.nonce = 2;
        assert!(tampered.verify(&owner, &sig).is_err());

        let mut tampered = a;
        tampered.scope = AuthScope::Execution;
        assert!(tampered.verify(&owner, &sig).is_err());
    }
}
