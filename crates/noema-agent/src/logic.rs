//! Delegated logic
//!
//! An agent's behaviour lives behind a stable logic address. Each address maps
//! to a list of behaviour versions and a current pointer, so an upgrade swaps
//! the behaviour without touching any entity's storage.
//!
//! Logic runs against an [`ExecutionContext`]: a gas-metered handle exposing
//! one entity's key/value storage and nothing else.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;

use noema_common::error::{AccessError, ExecutionError, Result, StateError};
use noema_common::events::{EventBus, EventKind};
use noema_common::types::account::AccountId;
use noema_common::types::entity::EntityId;

/// Intrinsic cost of every call
pub const GAS_BASE_CALL: u64 = 21_000;
pub const GAS_PER_PAYLOAD_BYTE: u64 = 16;
pub const GAS_STORAGE_READ: u64 = 800;
pub const GAS_STORAGE_WRITE: u64 = 5_000;
/// Charged per key and value byte on writes
pub const GAS_PER_STORAGE_BYTE: u64 = 20;
pub const GAS_LOG: u64 = 375;

/// Gas accounting for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Consume `amount`; once exhausted the meter stays at its limit
    pub fn charge(&mut self, amount: u64) -> std::result::Result<(), ExecutionError> {
        let next = self.used.saturating_add(amount);
        if next > self.limit {
            self.used = self.limit;
            return Err(ExecutionError::OutOfGas {
                limit: self.limit,
                used: next,
            });
        }
        self.used = next;
        Ok(())
    }

    #[inline]
    pub fn used(&self) -> u64 {
        self.used
    }

    #[inline]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }
}

/// Sandboxed view of one entity during a delegated call
pub struct ExecutionContext<'a> {
    pub entity: EntityId,
    pub caller: AccountId,
    pub owner: AccountId,
    /// Balance before any fee for this call
    pub balance: Decimal,
    pub timestamp: i64,
    storage: &'a mut BTreeMap<Bytes, Bytes>,
    gas: GasMeter,
    logs: Vec<String>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        entity: EntityId,
        caller: AccountId,
        owner: AccountId,
        balance: Decimal,
        timestamp: i64,
        storage: &'a mut BTreeMap<Bytes, Bytes>,
        gas_limit: u64,
    ) -> Self {
        Self {
            entity,
            caller,
            owner,
            balance,
            timestamp,
            storage,
            gas: GasMeter::new(gas_limit),
            logs: Vec::new(),
        }
    }

    /// Charge the intrinsic cost of a call carrying `payload_len` bytes
    pub fn charge_intrinsic(&mut self, payload_len: usize) -> std::result::Result<(), ExecutionError> {
        let payload = GAS_PER_PAYLOAD_BYTE.saturating_mul(payload_len as u64);
        self.gas.charge(GAS_BASE_CALL.saturating_add(payload))
    }

    pub fn charge_gas(&mut self, amount: u64) -> std::result::Result<(), ExecutionError> {
        self.gas.charge(amount)
    }

    pub fn get(&mut self, key: &[u8]) -> std::result::Result<Option<Bytes>, ExecutionError> {
        self.gas.charge(GAS_STORAGE_READ)?;
        Ok(self.storage.get(key).cloned())
    }

    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> std::result::Result<(), ExecutionError> {
        let key = key.into();
        let value = value.into();
        let bytes = (key.len() + value.len()) as u64;
        self.gas
            .charge(GAS_STORAGE_WRITE.saturating_add(GAS_PER_STORAGE_BYTE.saturating_mul(bytes)))?;
        self.storage.insert(key, value);
        Ok(())
    }

    pub fn remove(&mut self, key: &[u8]) -> std::result::Result<Option<Bytes>, ExecutionError> {
        self.gas.charge(GAS_STORAGE_WRITE)?;
        Ok(self.storage.remove(key))
    }

    pub fn log(&mut self, message: impl Into<String>) -> std::result::Result<(), ExecutionError> {
        self.gas.charge(GAS_LOG)?;
        self.logs.push(message.into());
        Ok(())
    }

    pub fn gas_used(&self) -> u64 {
        self.gas.used()
    }

    pub fn gas_remaining(&self) -> u64 {
        self.gas.remaining()
    }

    pub(crate) fn into_logs(self) -> Vec<String> {
        self.logs
    }
}

/// Behaviour an agent delegates to
pub trait AgentLogic: Send + Sync {
    /// Human-readable behaviour name
    fn name(&self) -> &str;

    /// Run one action; an error aborts the whole call
    fn execute(&self, ctx: &mut ExecutionContext<'_>, payload: &[u8]) -> std::result::Result<Bytes, ExecutionError>;
}

struct LogicEntry {
    admin: AccountId,
    versions: Vec<Arc<dyn AgentLogic>>,
    current: usize,
}

/// Indirection table from stable logic address to current behaviour
pub struct LogicRegistry {
    entries: DashMap<AccountId, LogicEntry>,
    events: Arc<EventBus>,
}

impl LogicRegistry {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            entries: DashMap::new(),
            events,
        }
    }

    /// Register version 1 of the behaviour at `address`, administered by `admin`
    pub fn register(&self, admin: AccountId, address: AccountId, logic: Arc<dyn AgentLogic>) -> Result<()> {
        if address.is_zero() || admin.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }
        match self.entries.entry(address) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ExecutionError::LogicAlreadyRegistered(address).into())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!(logic = %address, admin = %admin, name = logic.name(), "Logic registered");
                slot.insert(LogicEntry {
                    admin,
                    versions: vec![logic],
                    current: 0,
                });
                Ok(())
            }
        }
    }

    /// Admin-only pointer swap; returns the new version number
    pub fn upgrade(&self, caller: &AccountId, address: AccountId, logic: Arc<dyn AgentLogic>) -> Result<u32> {
        let version = {
            let mut entry = self
                .entries
                .get_mut(&address)
                .ok_or(ExecutionError::LogicNotFound(address))?;
            if entry.admin != *caller {
                return Err(AccessError::NotLogicAdmin {
                    logic: address,
                    caller: *caller,
                }
                .into());
            }
            info!(logic = %address, name = logic.name(), "Logic upgraded");
            entry.versions.push(logic);
            entry.current = entry.versions.len() - 1;
            (entry.current + 1) as u32
        };
        self.events.publish(EventKind::LogicUpgraded {
            logic: address,
            version,
        });
        Ok(version)
    }

    /// Current behaviour at `address`
    pub fn resolve(&self, address: &AccountId) -> Option<Arc<dyn AgentLogic>> {
        self.entries
            .get(address)
            .and_then(|entry| entry.versions.get(entry.current).cloned())
    }

    /// 1-based current version
    pub fn version(&self, address: &AccountId) -> Option<u32> {
        self.entries.get(address).map(|entry| (entry.current + 1) as u32)
    }

    pub fn admin_of(&self, address: &AccountId) -> Option<AccountId> {
        self.entries.get(address).map(|entry| entry.admin)
    }

    pub fn contains(&self, address: &AccountId) -> bool {
        self.entries.contains_key(address)
    }
}
