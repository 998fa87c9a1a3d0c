//! CircuitBreaker - global and per-target pause flags
//!
//! Two authorities may flip either layer: the governor and a distinct
//! emergency authority. Flags never expire. Only the governor may rotate
//! either authority.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use noema_common::error::{AccessError, Result, StateError};
use noema_common::events::{EventBus, EventKind};
use noema_common::types::account::AccountId;
use noema_common::types::entity::{EntityId, PauseTarget};

pub struct CircuitBreaker {
    governor: RwLock<AccountId>,
    emergency: RwLock<AccountId>,
    global: AtomicBool,
    targets: RwLock<HashSet<PauseTarget>>,
    events: Arc<EventBus>,
}

impl CircuitBreaker {
    pub fn new(governor: AccountId, emergency: AccountId, events: Arc<EventBus>) -> Self {
        Self {
            governor: RwLock::new(governor),
            emergency: RwLock::new(emergency),
            global: AtomicBool::new(false),
            targets: RwLock::new(HashSet::new()),
            events,
        }
    }

    pub fn governor(&self) -> AccountId {
        *self.governor.read()
    }

    pub fn emergency_authority(&self) -> AccountId {
        *self.emergency.read()
    }

    fn ensure_authority(&self, caller: &AccountId) -> Result<()> {
        if *caller == self.governor() || *caller == self.emergency_authority() {
            return Ok(());
        }
        warn!(caller = %caller, "Breaker authority check failed");
        Err(AccessError::NotGovernor { caller: *caller }.into())
    }

    fn ensure_governor(&self, caller: &AccountId) -> Result<()> {
        if *caller == self.governor() {
            return Ok(());
        }
        Err(AccessError::NotGovernor { caller: *caller }.into())
    }

    pub fn set_global_pause(&self, caller: &AccountId, paused: bool) -> Result<()> {
        self.ensure_authority(caller)?;
        self.global.store(paused, Ordering::SeqCst);
        warn!(paused, by = %caller, "Global pause changed");
        self.events.publish(EventKind::GlobalPauseChanged { paused, by: *caller });
        Ok(())
    }

    pub fn set_target_pause(&self, caller: &AccountId, target: PauseTarget, paused: bool) -> Result<()> {
        self.ensure_authority(caller)?;
        {
            let mut targets = self.targets.write();
            if paused {
                targets.insert(target);
            } else {
                targets.remove(&target);
            }
        }
        warn!(?target, paused, by = %caller, "Target pause changed");
        self.events.publish(EventKind::TargetPauseChanged {
            target,
            paused,
            by: *caller,
        });
        Ok(())
    }

    pub fn is_globally_paused(&self) -> bool {
        self.global.load(Ordering::SeqCst)
    }

    /// Global flag OR the target's own flag
    pub fn is_paused(&self, target: &PauseTarget) -> bool {
        self.is_globally_paused() || self.targets.read().contains(target)
    }

    /// Global flag, the entity's flag, or its logic target's flag
    pub fn is_entity_paused(&self, entity: EntityId, logic: &AccountId) -> bool {
        if self.is_globally_paused() {
            return true;
        }
        let targets = self.targets.read();
        targets.contains(&PauseTarget::Entity(entity)) || targets.contains(&PauseTarget::Logic(*logic))
    }

    pub fn ensure_not_paused(&self, entity: EntityId, logic: &AccountId) -> std::result::Result<(), StateError> {
        if self.is_entity_paused(entity, logic) {
            return Err(StateError::Paused(entity));
        }
        Ok(())
    }

    /// Governor-only
    pub fn set_governor(&self, caller: &AccountId, new_governor: AccountId) -> Result<()> {
        self.ensure_governor(caller)?;
        if new_governor.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }
        *self.governor.write() = new_governor;
        info!(old = %caller, new = %new_governor, "Governor rotated");
        Ok(())
    }

    /// Governor-only
    pub fn set_emergency_authority(&self, caller: &AccountId, authority: AccountId) -> Result<()> {
        self.ensure_governor(caller)?;
        if authority.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }
        *self.emergency.write() = authority;
        info!(new = %authority, "Emergency authority rotated");
        Ok(())
    }
}
