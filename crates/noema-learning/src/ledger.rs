//! LearningLedger - committed roots, metrics and updater sets per entity
//!
//! Each entity's record lives in its own slot behind a mutex. Mutations copy the
//! record, validate and update the copy, then swap it in; a failed call leaves
//! the slot untouched and publishes nothing.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use noema_common::clock::Clock;
use noema_common::crypto::merkle::{Digest, MerkleVerifier};
use noema_common::error::{AccessError, LearningError, Result, StateError};
use noema_common::events::{EventBus, EventKind};
use noema_common::security::auth::{AuthScope, AuthorizationLayer};
use noema_common::security::guard::GuardScope;
use noema_common::types::account::AccountId;
use noema_common::types::entity::{AgentStatus, EntityId, LearningHook};

use crate::engine::{LearningMetrics, MetricsEngine};
use crate::milestone::{Achievement, Metric, MilestoneBook};
use crate::module::LearningModule;
use crate::rate_limit::RateLimiter;

/// Enabled flag of a learning record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningState {
    Enabled,
    /// Emergency-stopped; must be reset before enabling again
    Disabled,
}

/// Per-entity learning record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub entity: EntityId,
    pub module: String,
    pub state: LearningState,
    /// Fingerprint of the off-chain learning tree
    pub committed_root: Digest,
    /// Incremented on every committed root update
    pub learning_version: u64,
    pub authorized_updaters: BTreeSet<AccountId>,
    pub metrics: LearningMetrics,
    pub milestones: MilestoneBook,
    /// Metadata supplied with the latest root update
    pub last_metadata: String,
    pub enabled_at: i64,
    /// Distinct for every enable; a reset followed by enable starts a new one
    pub generation: u64,
}

impl LearningRecord {
    fn new(entity: EntityId, module: &str, root: Digest, now: i64, generation: u64) -> Self {
        Self {
            entity,
            module: module.to_string(),
            state: LearningState::Enabled,
            committed_root: root,
            learning_version: 0,
            authorized_updaters: BTreeSet::new(),
            metrics: LearningMetrics::neutral(now),
            milestones: MilestoneBook::new(),
            last_metadata: String::new(),
            enabled_at: now,
            generation,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.state == LearningState::Enabled
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Proof-gated root transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootUpdate {
    /// Must equal the currently committed root
    pub previous_root: Digest,
    pub new_root: Digest,
    /// Claim proven to be a member of `new_root`
    pub anchor_claim: Bytes,
    /// Sibling path for `anchor_claim`; empty only when `new_root` is the anchor leaf itself
    pub proof: Vec<Digest>,
    pub metadata: String,
}

/// Owner of every entity's committed root and metrics
pub struct LearningLedger {
    module: LearningModule,
    engine: MetricsEngine,
    limiter: RateLimiter,
    records: DashMap<EntityId, Arc<Mutex<LearningRecord>>>,
    generations: AtomicU64,
    auth: Arc<AuthorizationLayer>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    guard: GuardScope,
}

impl LearningLedger {
    pub fn new(
        module: LearningModule,
        engine: MetricsEngine,
        auth: Arc<AuthorizationLayer>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(module.daily_limit),
            module,
            engine,
            records: DashMap::new(),
            generations: AtomicU64::new(0),
            auth,
            clock,
            events,
            guard: GuardScope::new(),
        }
    }

    pub fn module(&self) -> &LearningModule {
        &self.module
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Owner-only: create an enabled record with `initial_root`
    pub fn enable_learning(&self, caller: &AccountId, entity: EntityId, initial_root: Digest) -> Result<()> {
        let _guard = self.guard.enter(entity)?;
        self.auth.ensure_owner(entity, caller)?;
        self.ensure_live(entity)?;

        let now = self.clock.unix();
        match self.records.entry(entity) {
            Entry::Occupied(slot) => {
                let err = match slot.get().lock().state {
                    LearningState::Enabled => LearningError::AlreadyInitialized(entity),
                    LearningState::Disabled => LearningError::Disabled(entity),
                };
                return Err(err.into());
            }
            Entry::Vacant(slot) => {
                let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                let record = LearningRecord::new(entity, self.module.name, initial_root, now, generation);
                slot.insert(Arc::new(Mutex::new(record)));
            }
        }

        info!(entity = %entity, module = self.module.name, root = %initial_root, "Learning enabled");
        self.events.publish(EventKind::LearningEnabled {
            entity,
            module: self.module.name.to_string(),
            root: initial_root,
        });
        Ok(())
    }

    /// Owner-only emergency stop
    pub fn disable_learning(&self, caller: &AccountId, entity: EntityId) -> Result<()> {
        let _guard = self.guard.enter(entity)?;
        self.auth.ensure_owner(entity, caller)?;

        self.commit(entity, |record, events| {
            if !record.is_enabled() {
                return Err(LearningError::NotEnabled(entity).into());
            }
            record.state = LearningState::Disabled;
            events.push(EventKind::LearningDisabled {
                entity,
                module: record.module.clone(),
            });
            Ok(())
        })?;

        warn!(entity = %entity, "Learning disabled");
        Ok(())
    }

    /// Owner-only: discard a disabled record so learning can be enabled again
    pub fn reset_learning(&self, caller: &AccountId, entity: EntityId) -> Result<()> {
        let _guard = self.guard.enter(entity)?;
        self.auth.ensure_owner(entity, caller)?;

        let state = self
            .slot(entity)
            .map(|slot| slot.lock().state)
            .ok_or(LearningError::NotEnabled(entity))?;
        if state == LearningState::Enabled {
            return Err(LearningError::AlreadyInitialized(entity).into());
        }

        self.records
            .remove_if(&entity, |_, slot| slot.lock().state == LearningState::Disabled);
        info!(entity = %entity, "Learning record reset");
        Ok(())
    }

    /// Owner-only: allow `updater` to record and commit learning
    pub fn add_updater(&self, caller: &AccountId, entity: EntityId, updater: AccountId) -> Result<bool> {
        let _guard = self.guard.enter(entity)?;
        self.auth.ensure_owner(entity, caller)?;
        self.ensure_live(entity)?;
        if updater.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }
        let added = self.commit(entity, |record, _| Ok(record.authorized_updaters.insert(updater)))?;
        debug!(entity = %entity, updater = %updater, added, "Updater added");
        Ok(added)
    }

    /// Owner-only: revoke an updater
    pub fn remove_updater(&self, caller: &AccountId, entity: EntityId, updater: &AccountId) -> Result<bool> {
        let _guard = self.guard.enter(entity)?;
        self.auth.ensure_owner(entity, caller)?;
        self.ensure_live(entity)?;
        let removed = self.commit(entity, |record, _| Ok(record.authorized_updaters.remove(updater)))?;
        debug!(entity = %entity, updater = %updater, removed, "Updater removed");
        Ok(removed)
    }

    /// Record one interaction outcome; never rate-limited
    pub fn record_interaction(
        &self,
        caller: &AccountId,
        entity: EntityId,
        kind: &str,
        success: bool,
    ) -> Result<LearningMetrics> {
        let _guard = self.guard.enter(entity)?;
        let granted = self.directory_grant(caller, entity, true)?;

        self.commit(entity, |record, events| {
            Self::ensure_updater(granted, record, caller)?;
            self.apply_interaction(record, kind, success, events)
        })
    }

    /// Ensure `caller` may write learning data for `entity` right now;
    /// returns the generation of the enabled record
    pub fn ensure_recorder(&self, caller: &AccountId, entity: EntityId) -> Result<u64> {
        let granted = self.directory_grant(caller, entity, true)?;
        let slot = self.slot(entity).ok_or(LearningError::NotEnabled(entity))?;
        let record = slot.lock();
        Self::ensure_updater(granted, &record, caller)?;
        if !record.is_enabled() {
            return Err(LearningError::NotEnabled(entity).into());
        }
        Ok(record.generation)
    }

    /// Record an outcome on behalf of a trusted component
    pub(crate) fn record_outcome(&self, entity: EntityId, kind: &str, success: bool) -> Result<LearningMetrics> {
        let _guard = self.guard.enter(entity)?;
        self.ensure_live(entity)?;
        self.commit(entity, |record, events| {
            self.apply_interaction(record, kind, success, events)
        })
    }

    /// Advance the committed root; returns the new learning version
    pub fn update_learning_root(&self, caller: &AccountId, entity: EntityId, update: &RootUpdate) -> Result<u64> {
        let _guard = self.guard.enter(entity)?;
        let granted = self.directory_grant(caller, entity, false)?;
        let now = self.clock.unix();

        let version = self.commit(entity, |record, events| {
            Self::ensure_updater(granted, record, caller)?;
            if !record.is_enabled() {
                return Err(LearningError::NotEnabled(entity).into());
            }
            if update.previous_root != record.committed_root {
                return Err(LearningError::StaleRoot {
                    supplied: update.previous_root.to_hex(),
                    committed: record.committed_root.to_hex(),
                }
                .into());
            }
            if !MerkleVerifier::verify_claim(&update.new_root, &update.anchor_claim, &update.proof) {
                return Err(LearningError::InvalidProof.into());
            }

            // Last check; consumes quota only when everything else passed
            self.limiter.try_acquire(entity, now)?;

            let old_root = record.committed_root;
            record.committed_root = update.new_root;
            record.learning_version += 1;
            record.metrics = self.engine.apply_root_update(&record.metrics, now);
            record.last_metadata = update.metadata.clone();

            events.push(EventKind::LearningRootUpdated {
                entity,
                old_root,
                new_root: update.new_root,
                version: record.learning_version,
                timestamp: now,
            });
            let fired = record.milestones.observe(
                self.module.milestones,
                Metric::LearningVersion,
                record.learning_version,
            );
            push_milestones(entity, fired, now, events);
            Ok(record.learning_version)
        })?;

        metrics::counter!("noema_learning_root_updates_total", 1);
        info!(entity = %entity, version, root = %update.new_root, "Learning root updated");
        Ok(version)
    }

    /// Check a claim against the currently committed root
    pub fn verify_learning(&self, entity: EntityId, claim: &[u8], proof: &[Digest]) -> bool {
        let Some(slot) = self.slot(entity) else {
            return false;
        };
        let record = slot.lock();
        record.is_enabled() && MerkleVerifier::verify_claim(&record.committed_root, claim, proof)
    }

    pub fn learning_record(&self, entity: EntityId) -> Option<LearningRecord> {
        self.slot(entity).map(|slot| slot.lock().clone())
    }

    pub fn metrics(&self, entity: EntityId) -> Option<LearningMetrics> {
        self.slot(entity).map(|slot| slot.lock().metrics)
    }

    pub fn committed_root(&self, entity: EntityId) -> Option<Digest> {
        self.slot(entity).map(|slot| slot.lock().committed_root)
    }

    /// Generation of the current record, if any
    pub fn generation(&self, entity: EntityId) -> Option<u64> {
        self.slot(entity).map(|slot| slot.lock().generation)
    }

    pub fn is_enabled(&self, entity: EntityId) -> bool {
        self.slot(entity)
            .map(|slot| slot.lock().is_enabled())
            .unwrap_or(false)
    }

    /// Root updates still allowed in the current day window
    pub fn updates_remaining_today(&self, entity: EntityId) -> u32 {
        self.limiter.remaining(entity, self.clock.unix())
    }

    fn slot(&self, entity: EntityId) -> Option<Arc<Mutex<LearningRecord>>> {
        self.records.get(&entity).map(|slot| Arc::clone(slot.value()))
    }

    /// Copy, mutate, swap; events are published only after the swap
    fn commit<R, F>(&self, entity: EntityId, f: F) -> Result<R>
    where
        F: FnOnce(&mut LearningRecord, &mut Vec<EventKind>) -> Result<R>,
    {
        let slot = self.slot(entity).ok_or(LearningError::NotEnabled(entity))?;
        let mut pending = Vec::new();
        let out = {
            let mut record = slot.lock();
            let mut draft = record.clone();
            let out = f(&mut draft, &mut pending)?;
            *record = draft;
            out
        };
        self.events.publish_all(pending);
        Ok(out)
    }

    /// Owner, learning delegate or (when allowed) logic target
    fn directory_grant(&self, caller: &AccountId, entity: EntityId, allow_logic: bool) -> Result<bool> {
        let directory = self.auth.directory();
        if directory.owner_of(entity).is_none() {
            return Err(StateError::EntityNotFound(entity).into());
        }
        self.ensure_live(entity)?;
        if self.auth.is_authorized(entity, caller, AuthScope::Learning) {
            return Ok(true);
        }
        Ok(allow_logic
            && self.module.logic_may_record
            && directory.logic_target_of(entity) == Some(*caller))
    }

    /// Terminated entities accept no further learning writes
    fn ensure_live(&self, entity: EntityId) -> Result<()> {
        match self.auth.directory().status_of(entity) {
            Some(AgentStatus::Terminated) => Err(StateError::Terminated(entity).into()),
            _ => Ok(()),
        }
    }

    fn ensure_updater(granted: bool, record: &LearningRecord, caller: &AccountId) -> Result<()> {
        if granted || record.authorized_updaters.contains(caller) {
            return Ok(());
        }
        warn!(entity = %record.entity, caller = %caller, "Learning update denied");
        Err(AccessError::NotAuthorized {
            entity: record.entity,
            caller: *caller,
        }
        .into())
    }

    fn apply_interaction(
        &self,
        record: &mut LearningRecord,
        kind: &str,
        success: bool,
        events: &mut Vec<EventKind>,
    ) -> Result<LearningMetrics> {
        let entity = record.entity;
        if !record.is_enabled() {
            return Err(LearningError::NotEnabled(entity).into());
        }

        let now = self.clock.unix();
        record.metrics = self.engine.apply_interaction(&record.metrics, success, now);
        debug!(
            entity = %entity,
            kind,
            success,
            confidence = record.metrics.confidence_score,
            "Interaction recorded"
        );

        events.push(EventKind::InteractionRecorded {
            entity,
            kind: kind.to_string(),
            success,
            confidence: record.metrics.confidence_score,
        });

        let milestones = self.module.milestones;
        let mut fired = record
            .milestones
            .observe(milestones, Metric::Interactions, record.metrics.total_interactions);
        fired.extend(record.milestones.observe(
            milestones,
            Metric::ConfidencePercent,
            record.metrics.confidence_percent(),
        ));
        push_milestones(entity, fired, now, events);

        Ok(record.metrics)
    }
}

/// Queue `MilestoneAchieved` for each first-time crossing
pub(crate) fn push_milestones(entity: EntityId, fired: Vec<Achievement>, now: i64, events: &mut Vec<EventKind>) {
    for achievement in fired {
        info!(entity = %entity, milestone = achievement.name, value = achievement.value, "Milestone achieved");
        events.push(EventKind::MilestoneAchieved {
            entity,
            milestone: achievement.name.to_string(),
            value: achievement.value,
            timestamp: now,
        });
    }
}

impl LearningHook for LearningLedger {
    fn is_learning_enabled(&self, entity: EntityId) -> bool {
        self.is_enabled(entity)
    }

    fn record_execution(&self, entity: EntityId, kind: &str, success: bool) -> Result<()> {
        self.record_outcome(entity, kind, success).map(|_| ())
    }
}
