//! Entity arena
//!
//! Dense table of agent slots indexed by sequential id. Each slot carries its
//! own sequencer and a versioned record; cross-entity operations never share
//! a lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};

use noema_common::error::StateError;
use noema_common::types::account::AccountId;
use noema_common::types::entity::{AgentStatus, EntityDirectory, EntityId};

use crate::balance::Balance;

/// Full state of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: EntityId,
    pub owner: AccountId,
    pub status: AgentStatus,
    pub balance: Balance,
    pub logic_target: AccountId,
    pub metadata_ref: String,
    /// Only state delegated logic may mutate
    pub storage: BTreeMap<Bytes, Bytes>,
    pub created_at: i64,
    pub last_action_timestamp: i64,
    /// Bumped on every commit
    pub version: u64,
}

impl AgentRecord {
    pub fn is_terminated(&self) -> bool {
        self.status == AgentStatus::Terminated
    }
}

/// One entity's lockable, versioned slot
pub struct AgentSlot {
    sequencer: Mutex<()>,
    state: RwLock<AgentRecord>,
}

impl AgentSlot {
    fn new(record: AgentRecord) -> Self {
        Self {
            sequencer: Mutex::new(()),
            state: RwLock::new(record),
        }
    }

    /// Serialize calls against this entity
    pub fn sequence(&self) -> MutexGuard<'_, ()> {
        self.sequencer.lock()
    }

    /// Consistent copy of the current record
    pub fn snapshot(&self) -> AgentRecord {
        self.state.read().clone()
    }

    /// Publish a draft taken from [`snapshot`](Self::snapshot)
    ///
    /// Fails if another commit landed since the draft was taken.
    pub fn commit(&self, mut draft: AgentRecord) -> Result<AgentRecord, StateError> {
        let mut state = self.state.write();
        if state.version != draft.version {
            return Err(StateError::VersionConflict {
                expected: draft.version,
                found: state.version,
            });
        }
        draft.version += 1;
        *state = draft;
        Ok(state.clone())
    }

    pub fn read<R>(&self, f: impl FnOnce(&AgentRecord) -> R) -> R {
        f(&self.state.read())
    }
}

/// Arena of all agents
#[derive(Default)]
pub struct EntityTable {
    slots: RwLock<Vec<Arc<AgentSlot>>>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new active agent; ids start at 1
    pub fn insert(
        &self,
        owner: AccountId,
        logic_target: AccountId,
        metadata_ref: String,
        now: i64,
    ) -> EntityId {
        let mut slots = self.slots.write();
        let id = EntityId(slots.len() as u64 + 1);
        slots.push(Arc::new(AgentSlot::new(AgentRecord {
            id,
            owner,
            status: AgentStatus::Active,
            balance: Balance::new(),
            logic_target,
            metadata_ref,
            storage: BTreeMap::new(),
            created_at: now,
            last_action_timestamp: now,
            version: 0,
        })));
        id
    }

    pub fn get(&self, entity: EntityId) -> Option<Arc<AgentSlot>> {
        let index = entity.0.checked_sub(1)?;
        self.slots.read().get(index as usize).cloned()
    }

    pub fn slot(&self, entity: EntityId) -> Result<Arc<AgentSlot>, StateError> {
        self.get(entity).ok_or(StateError::EntityNotFound(entity))
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityDirectory for EntityTable {
    fn owner_of(&self, entity: EntityId) -> Option<AccountId> {
        self.get(entity).map(|slot| slot.read(|r| r.owner))
    }

    fn logic_target_of(&self, entity: EntityId) -> Option<AccountId> {
        self.get(entity).map(|slot| slot.read(|r| r.logic_target))
    }

    fn status_of(&self, entity: EntityId) -> Option<AgentStatus> {
        self.get(entity).map(|slot| slot.read(|r| r.status))
    }
}
