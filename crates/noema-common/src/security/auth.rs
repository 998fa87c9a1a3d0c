//! Authorization layer
//!
//! Resolves who may act on behalf of an entity. A caller is authorized when it
//! is the owner, an explicitly delegated account, or (for execution only) the
//! entity's own delegated logic target. The logic target is deliberately not
//! authorized for learning updates so a compromised logic contract cannot
//! rewrite its own learning fingerprint.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::crypto::signature::DelegationApproval;
use crate::error::{AccessError, CryptoError, NoemaError, Result, StateError};
use crate::events::{EventBus, EventKind};
use crate::types::account::AccountId;
use crate::types::entity::{EntityDirectory, EntityId};

use super::guard::GuardScope;

/// What the caller wants to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScope {
    /// Execute delegated logic
    Execution,
    /// Mutate learning state
    Learning,
}

impl AuthScope {
    /// Wire code used in signed approvals
    pub fn code(&self) -> u8 {
        match self {
            AuthScope::Execution => 1,
            AuthScope::Learning => 2,
        }
    }
}

/// Owner-managed delegation registry and authorization predicate
pub struct AuthorizationLayer {
    directory: Arc<dyn EntityDirectory>,
    /// entity -> explicitly delegated (account, scope) grants
    delegates: DashMap<EntityId, BTreeSet<(AccountId, AuthScope)>>,
    /// signer -> consumed approval nonces
    used_nonces: DashMap<AccountId, HashSet<u64>>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    guard: GuardScope,
}

impl AuthorizationLayer {
    pub fn new(directory: Arc<dyn EntityDirectory>, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self {
            directory,
            delegates: DashMap::new(),
            used_nonces: DashMap::new(),
            clock,
            events,
            guard: GuardScope::new(),
        }
    }

    /// Entity lookup shared with the other components
    pub fn directory(&self) -> &Arc<dyn EntityDirectory> {
        &self.directory
    }

    /// The single authorization predicate
    pub fn is_authorized(&self, entity: EntityId, caller: &AccountId, scope: AuthScope) -> bool {
        let Some(owner) = self.directory.owner_of(entity) else {
            return false;
        };
        if owner == *caller || self.is_delegate(entity, caller, scope) {
            return true;
        }
        scope == AuthScope::Execution && self.directory.logic_target_of(entity) == Some(*caller)
    }

    /// Fail unless the caller is authorized
    pub fn ensure_authorized(&self, entity: EntityId, caller: &AccountId, scope: AuthScope) -> Result<()> {
        self.ensure_exists(entity)?;
        if self.is_authorized(entity, caller, scope) {
            return Ok(());
        }
        warn!(entity = %entity, caller = %caller, ?scope, "Authorization denied");
        Err(AccessError::NotAuthorized {
            entity,
            caller: *caller,
        }
        .into())
    }

    /// Fail unless the caller owns the entity; returns the owner
    pub fn ensure_owner(&self, entity: EntityId, caller: &AccountId) -> Result<AccountId> {
        let owner = self
            .directory
            .owner_of(entity)
            .ok_or(StateError::EntityNotFound(entity))?;
        if owner != *caller {
            warn!(entity = %entity, caller = %caller, "Owner check failed");
            return Err(AccessError::NotOwner {
                entity,
                caller: *caller,
            }
            .into());
        }
        Ok(owner)
    }

    fn ensure_exists(&self, entity: EntityId) -> Result<()> {
        self.directory
            .owner_of(entity)
            .map(|_| ())
            .ok_or_else(|| StateError::EntityNotFound(entity).into())
    }

    pub fn is_delegate(&self, entity: EntityId, account: &AccountId, scope: AuthScope) -> bool {
        self.delegates
            .get(&entity)
            .map(|set| set.contains(&(*account, scope)))
            .unwrap_or(false)
    }

    /// Delegated grants of an entity, sorted
    pub fn delegates(&self, entity: EntityId) -> Vec<(AccountId, AuthScope)> {
        self.delegates
            .get(&entity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Owner grants a delegate the given scope
    pub fn add_delegate(
        &self,
        caller: &AccountId,
        entity: EntityId,
        delegate: AccountId,
        scope: AuthScope,
    ) -> Result<()> {
        let _guard = self.guard.enter(entity)?;
        self.ensure_owner(entity, caller)?;
        self.insert_delegate(entity, delegate, scope)
    }

    /// Owner revokes a delegate's grant for the given scope
    pub fn remove_delegate(
        &self,
        caller: &AccountId,
        entity: EntityId,
        delegate: &AccountId,
        scope: AuthScope,
    ) -> Result<bool> {
        let _guard = self.guard.enter(entity)?;
        self.ensure_owner(entity, caller)?;
        let removed = self
            .delegates
            .get_mut(&entity)
            .map(|mut set| set.remove(&(*delegate, scope)))
            .unwrap_or(false);
        if removed {
            debug!(entity = %entity, delegate = %delegate, ?scope, "Delegate removed");
            self.events.publish(EventKind::DelegateRemoved {
                entity,
                delegate: *delegate,
                scope,
            });
        }
        Ok(removed)
    }

    /// Add a delegate from an owner-signed approval submitted by anyone
    pub fn add_delegate_signed(&self, approval: &DelegationApproval, signature: &[u8; 64]) -> Result<()> {
        let entity = approval.entity_id;
        let _guard = self.guard.enter(entity)?;
        let owner = self
            .directory
            .owner_of(entity)
            .ok_or(StateError::EntityNotFound(entity))?;

        if self.clock.unix() > approval.expires_at {
            return Err(CryptoError::ApprovalExpired {
                expires_at: approval.expires_at,
            }
            .into());
        }

        if approval.delegate.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }

        approval.verify(&owner, signature)?;

        {
            let mut nonces = self.used_nonces.entry(owner).or_default();
            if nonces.contains(&approval.nonce) {
                return Err(CryptoError::NonceReused {
                    signer: owner,
                    nonce: approval.nonce,
                }
                .into());
            }
            nonces.insert(approval.nonce);
        }

        self.insert_delegate(entity, approval.delegate, approval.scope)
    }

    fn insert_delegate(&self, entity: EntityId, delegate: AccountId, scope: AuthScope) -> Result<()> {
        if delegate.is_zero() {
            return Err(NoemaError::State(StateError::ZeroAddress));
        }
        let inserted = self
            .delegates
            .entry(entity)
            .or_default()
            .insert((delegate, scope));
        if inserted {
            debug!(entity = %entity, delegate = %delegate, ?scope, "Delegate added");
            self.events.publish(EventKind::DelegateAdded {
                entity,
                delegate,
                scope,
            });
        }
        Ok(())
    }
}
