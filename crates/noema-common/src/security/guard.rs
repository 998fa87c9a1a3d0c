//! Call-depth guard
//!
//! Rejects a nested call into a guarded entry point for the same entity from
//! within its own execution on the same thread. Calls from other threads are
//! not affected; they serialize on the entity's own lock instead.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StateError;
use crate::types::entity::EntityId;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ENTERED: RefCell<HashSet<(u64, EntityId)>> = RefCell::new(HashSet::new());
}

/// Identity of a guarded component instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuardScope(u64);

impl GuardScope {
    /// Allocate a fresh scope for a new component instance
    pub fn new() -> Self {
        Self(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }

    /// Enter the guarded region for `entity`
    pub fn enter(&self, entity: EntityId) -> Result<CallGuard, StateError> {
        let key = (self.0, entity);
        let inserted = ENTERED.with(|set| set.borrow_mut().insert(key));
        if !inserted {
            return Err(StateError::ReentrantCall(entity));
        }
        Ok(CallGuard { key })
    }

    /// Whether the current thread is inside the guarded region for `entity`
    pub fn is_entered(&self, entity: EntityId) -> bool {
        ENTERED.with(|set| set.borrow().contains(&(self.0, entity)))
    }
}

impl Default for GuardScope {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII marker; leaving the region on drop
#[derive(Debug)]
pub struct CallGuard {
    key: (u64, EntityId),
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        ENTERED.with(|set| {
            set.borrow_mut().remove(&self.key);
        });
    }
}
