//! AgentRegistry - the agent state machine
//!
//! Gates and executes delegated logic calls under owner, authorization and
//! pause constraints. Every mutating entry point runs under the call-depth
//! guard and the entity's sequencer, works on a snapshot draft and commits
//! it in one step, so a failed call leaves no trace.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use noema_common::clock::Clock;
use noema_common::config::ExecutionSettings;
use noema_common::crypto::merkle::Digest;
use noema_common::error::{AccessError, ExecutionError, Result, StateError};
use noema_common::events::{EventBus, EventKind};
use noema_common::security::{AuthScope, AuthorizationLayer, GuardScope};
use noema_common::types::account::AccountId;
use noema_common::types::entity::{AgentStatus, EntityId, LearningHook};

use crate::balance::PayoutBook;
use crate::breaker::CircuitBreaker;
use crate::logic::{ExecutionContext, LogicRegistry, GAS_BASE_CALL, GAS_PER_PAYLOAD_BYTE};
use crate::table::{AgentRecord, AgentSlot, EntityTable};

/// Result of a successful action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReceipt {
    pub entity: EntityId,
    /// Name of the behaviour that ran
    pub logic: String,
    pub output: Bytes,
    pub gas_used: u64,
    /// Credit debited for gas
    pub fee: Decimal,
    pub logs: Vec<String>,
}

pub struct AgentRegistry {
    table: Arc<EntityTable>,
    logic: Arc<LogicRegistry>,
    breaker: Arc<CircuitBreaker>,
    auth: Arc<AuthorizationLayer>,
    hook: Option<Arc<dyn LearningHook>>,
    payouts: PayoutBook,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    settings: ExecutionSettings,
    guard: GuardScope,
}

impl AgentRegistry {
    pub fn new(
        table: Arc<EntityTable>,
        logic: Arc<LogicRegistry>,
        breaker: Arc<CircuitBreaker>,
        auth: Arc<AuthorizationLayer>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            table,
            logic,
            breaker,
            auth,
            hook: None,
            payouts: PayoutBook::new(),
            clock,
            events,
            settings,
            guard: GuardScope::new(),
        }
    }

    /// Attach the post-execution learning hook
    pub fn with_hook(mut self, hook: Arc<dyn LearningHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn table(&self) -> &Arc<EntityTable> {
        &self.table
    }

    pub fn logic(&self) -> &Arc<LogicRegistry> {
        &self.logic
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn auth(&self) -> &Arc<AuthorizationLayer> {
        &self.auth
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    // ========== Lifecycle ==========

    /// The only entity-creation entry point
    pub fn create_entity(&self, owner: AccountId, logic_target: AccountId, metadata_ref: impl Into<String>) -> Result<EntityId> {
        if owner.is_zero() || logic_target.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }
        let entity = self
            .table
            .insert(owner, logic_target, metadata_ref.into(), self.clock.unix());
        info!(entity = %entity, owner = %owner, logic = %logic_target, "Entity created");
        self.events.publish(EventKind::EntityCreated {
            entity,
            owner,
            logic_target,
        });
        Ok(entity)
    }

    /// Owner-only: Active -> Paused
    pub fn pause(&self, caller: &AccountId, entity: EntityId) -> Result<()> {
        self.transition(caller, entity, AgentStatus::Active, AgentStatus::Paused)
    }

    /// Owner-only: Paused -> Active
    pub fn unpause(&self, caller: &AccountId, entity: EntityId) -> Result<()> {
        self.transition(caller, entity, AgentStatus::Paused, AgentStatus::Active)
    }

    fn transition(&self, caller: &AccountId, entity: EntityId, from: AgentStatus, to: AgentStatus) -> Result<()> {
        let _guard = self.guard.enter(entity)?;
        let slot = self.table.slot(entity)?;
        let _seq = slot.sequence();
        let mut draft = slot.snapshot();

        ensure_owner(&draft, caller)?;
        self.breaker.ensure_not_paused(entity, &draft.logic_target)?;
        ensure_status(&draft, from)?;

        draft.status = to;
        slot.commit(draft)?;
        info!(entity = %entity, from = %from, to = %to, "Status changed");
        self.events.publish(EventKind::StatusChanged { entity, status: to });
        Ok(())
    }

    /// Owner-only, irreversible; refunds the whole balance to the owner
    pub fn terminate(&self, caller: &AccountId, entity: EntityId) -> Result<Decimal> {
        let _guard = self.guard.enter(entity)?;
        let slot = self.table.slot(entity)?;
        let _seq = slot.sequence();
        let mut draft = slot.snapshot();

        ensure_owner(&draft, caller)?;
        self.breaker.ensure_not_paused(entity, &draft.logic_target)?;
        if draft.is_terminated() {
            return Err(StateError::Terminated(entity).into());
        }

        let refund = draft.balance.drain();
        draft.status = AgentStatus::Terminated;
        let owner = draft.owner;
        self.pay_out(&slot, draft, owner, refund)?;

        warn!(entity = %entity, refund = %refund, "Entity terminated");
        let mut events = vec![EventKind::StatusChanged {
            entity,
            status: AgentStatus::Terminated,
        }];
        if refund > Decimal::ZERO {
            events.push(EventKind::BalanceRefunded {
                entity,
                owner,
                amount: refund,
            });
        }
        self.events.publish_all(events);
        Ok(refund)
    }

    // ========== Balance ==========

    /// Anyone may fund a live entity
    pub fn fund(&self, caller: &AccountId, entity: EntityId, amount: Decimal) -> Result<Decimal> {
        let _guard = self.guard.enter(entity)?;
        if amount <= Decimal::ZERO {
            return Err(StateError::InvalidAmount.into());
        }
        let slot = self.table.slot(entity)?;
        let _seq = slot.sequence();
        let mut draft = slot.snapshot();

        self.breaker.ensure_not_paused(entity, &draft.logic_target)?;
        ensure_live(&draft)?;

        draft.balance.credit(amount)?;
        let balance = slot.commit(draft)?.balance.available();
        debug!(entity = %entity, from = %caller, amount = %amount, "Entity funded");
        self.events.publish(EventKind::BalanceFunded {
            entity,
            amount,
            balance,
        });
        Ok(balance)
    }

    /// Owner-only; pays `amount` out to the owner
    pub fn withdraw(&self, caller: &AccountId, entity: EntityId, amount: Decimal) -> Result<Decimal> {
        let _guard = self.guard.enter(entity)?;
        let slot = self.table.slot(entity)?;
        let _seq = slot.sequence();
        let mut draft = slot.snapshot();

        ensure_owner(&draft, caller)?;
        self.breaker.ensure_not_paused(entity, &draft.logic_target)?;
        ensure_live(&draft)?;

        draft.balance.debit(amount)?;
        let owner = draft.owner;
        let balance = self.pay_out(&slot, draft, owner, amount)?.balance.available();
        debug!(entity = %entity, amount = %amount, "Balance withdrawn");
        self.events.publish(EventKind::BalanceWithdrawn {
            entity,
            to: owner,
            amount,
        });
        Ok(balance)
    }

    /// Owner-only retarget of the delegated logic; storage is kept
    pub fn set_logic_target(&self, caller: &AccountId, entity: EntityId, new_target: AccountId) -> Result<()> {
        let _guard = self.guard.enter(entity)?;
        if new_target.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }
        let slot = self.table.slot(entity)?;
        let _seq = slot.sequence();
        let mut draft = slot.snapshot();

        ensure_owner(&draft, caller)?;
        ensure_live(&draft)?;
        self.breaker.ensure_not_paused(entity, &draft.logic_target)?;

        let old = std::mem::replace(&mut draft.logic_target, new_target);
        slot.commit(draft)?;
        info!(entity = %entity, old = %old, new = %new_target, "Logic target changed");
        self.events.publish(EventKind::LogicTargetChanged {
            entity,
            old,
            new: new_target,
        });
        Ok(())
    }

    // ========== Execution ==========

    /// Run the entity's delegated logic with `payload`
    ///
    /// Requires: not paused (global, entity or logic flag), status Active,
    /// caller authorized for execution, and a positive balance covering the
    /// intrinsic fee. The logic's failure fails the call. Learning is then
    /// notified best-effort.
    pub fn execute_action(&self, caller: &AccountId, entity: EntityId, payload: &[u8]) -> Result<ActionReceipt> {
        let _guard = self.guard.enter(entity)?;
        let receipt = match self.run_action(caller, entity, payload) {
            Ok(receipt) => receipt,
            Err(err) => {
                metrics::counter!("noema_actions_rejected_total", 1);
                debug!(entity = %entity, caller = %caller, error = %err, "Action rejected");
                return Err(err);
            }
        };
        metrics::counter!("noema_actions_executed_total", 1);
        self.notify_learning(entity, &receipt.logic);
        Ok(receipt)
    }

    fn run_action(&self, caller: &AccountId, entity: EntityId, payload: &[u8]) -> Result<ActionReceipt> {
        let slot = self.table.slot(entity)?;
        let _seq = slot.sequence();
        let mut draft = slot.snapshot();

        self.breaker.ensure_not_paused(entity, &draft.logic_target)?;
        ensure_status(&draft, AgentStatus::Active)?;
        self.auth.ensure_authorized(entity, caller, AuthScope::Execution)?;

        let intrinsic = self.fee_for(intrinsic_gas(payload.len()))?;
        if draft.balance.is_empty() {
            return Err(StateError::InsufficientBalance {
                required: intrinsic,
                available: draft.balance.available(),
            }
            .into());
        }
        draft.balance.ensure_covers(intrinsic)?;

        let logic = self
            .logic
            .resolve(&draft.logic_target)
            .ok_or(ExecutionError::LogicNotFound(draft.logic_target))?;

        let now = self.clock.unix();
        let mut scratch = draft.storage.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = ExecutionContext::new(
                entity,
                *caller,
                draft.owner,
                draft.balance.available(),
                now,
                &mut scratch,
                self.settings.gas_ceiling,
            );
            ctx.charge_intrinsic(payload.len())?;
            let output = logic.execute(&mut ctx, payload)?;
            let gas_used = ctx.gas_used();
            Ok::<_, ExecutionError>((output, gas_used, ctx.into_logs()))
        }));
        let (output, gas_used, logs) = match outcome {
            Ok(result) => result?,
            Err(panic) => {
                warn!(entity = %entity, logic = logic.name(), "Delegated logic panicked");
                return Err(ExecutionError::Reverted(panic_message(&*panic)).into());
            }
        };

        let fee = self.fee_for(gas_used)?;
        if fee > Decimal::ZERO {
            draft.balance.debit(fee)?;
        }
        draft.storage = scratch;
        draft.last_action_timestamp = now;
        slot.commit(draft)?;

        info!(entity = %entity, caller = %caller, gas_used, fee = %fee, "Action executed");
        self.events.publish(EventKind::ActionExecuted {
            entity,
            caller: *caller,
            gas_used,
            result_len: output.len(),
            result_hash: Digest(*blake3::hash(&output).as_bytes()),
            logs: logs.clone(),
        });

        Ok(ActionReceipt {
            entity,
            logic: logic.name().to_string(),
            output,
            gas_used,
            fee,
            logs,
        })
    }

    fn fee_for(&self, gas: u64) -> Result<Decimal> {
        Ok(self
            .settings
            .gas_price
            .checked_mul(Decimal::from(gas))
            .ok_or(StateError::BalanceOverflow)?)
    }

    /// Credit `owner` and commit `draft` together; neither lands alone
    fn pay_out(&self, slot: &AgentSlot, draft: AgentRecord, owner: AccountId, amount: Decimal) -> Result<AgentRecord> {
        self.payouts.credit(owner, amount)?;
        let record = slot.commit(draft).map_err(|err| {
            self.payouts.reverse(&owner, amount);
            err
        })?;
        Ok(record)
    }

    /// Failures and panics in the hook never reach the caller
    fn notify_learning(&self, entity: EntityId, kind: &str) {
        let Some(hook) = &self.hook else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if !hook.is_learning_enabled(entity) {
                return Ok(());
            }
            hook.record_execution(entity, kind, true)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                metrics::counter!("noema_learning_hook_failures_total", 1);
                debug!(entity = %entity, error = %err, "Learning hook failed");
            }
            Err(_) => {
                metrics::counter!("noema_learning_hook_failures_total", 1);
                debug!(entity = %entity, "Learning hook panicked");
            }
        }
    }

    // ========== Views ==========

    pub fn entity(&self, entity: EntityId) -> Option<AgentRecord> {
        self.table.get(entity).map(|slot| slot.snapshot())
    }

    pub fn status(&self, entity: EntityId) -> Option<AgentStatus> {
        self.table.get(entity).map(|slot| slot.read(|r| r.status))
    }

    pub fn balance(&self, entity: EntityId) -> Option<Decimal> {
        self.table.get(entity).map(|slot| slot.read(|r| r.balance.available()))
    }

    pub fn storage_value(&self, entity: EntityId, key: &[u8]) -> Option<Bytes> {
        self.table
            .get(entity)
            .and_then(|slot| slot.read(|r| r.storage.get(key).cloned()))
    }

    /// Credits paid out to `account` by withdrawals and refunds
    pub fn paid_out(&self, account: &AccountId) -> Decimal {
        self.payouts.paid_out(account)
    }
}

fn intrinsic_gas(payload_len: usize) -> u64 {
    GAS_BASE_CALL.saturating_add(GAS_PER_PAYLOAD_BYTE.saturating_mul(payload_len as u64))
}

fn ensure_owner(record: &AgentRecord, caller: &AccountId) -> Result<()> {
    if record.owner != *caller {
        warn!(entity = %record.id, caller = %caller, "Owner check failed");
        return Err(AccessError::NotOwner {
            entity: record.id,
            caller: *caller,
        }
        .into());
    }
    Ok(())
}

fn ensure_status(record: &AgentRecord, expected: AgentStatus) -> Result<()> {
    if record.status == expected {
        return Ok(());
    }
    if record.is_terminated() {
        return Err(StateError::Terminated(record.id).into());
    }
    Err(StateError::InvalidStatus {
        expected,
        actual: record.status,
    }
    .into())
}

fn ensure_live(record: &AgentRecord) -> Result<()> {
    if record.is_terminated() {
        return Err(StateError::Terminated(record.id).into());
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "delegated logic panicked".to_string()
    }
}
