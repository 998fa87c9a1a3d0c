//! Observable events
//!
//! Every committed state transition publishes an [`Event`] to the
//! [`EventBus`], which fans it out to its sinks. External indexers and UIs
//! consume these; a failed call publishes nothing.

use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::merkle::Digest;
use crate::security::auth::AuthScope;
use crate::types::account::AccountId;
use crate::types::entity::{AgentStatus, EntityId, PauseTarget};

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    EntityCreated {
        entity: EntityId,
        owner: AccountId,
        logic_target: AccountId,
    },
    ActionExecuted {
        entity: EntityId,
        caller: AccountId,
        gas_used: u64,
        result_len: usize,
        result_hash: Digest,
        logs: Vec<String>,
    },
    StatusChanged {
        entity: EntityId,
        status: AgentStatus,
    },
    BalanceFunded {
        entity: EntityId,
        amount: Decimal,
        balance: Decimal,
    },
    BalanceWithdrawn {
        entity: EntityId,
        to: AccountId,
        amount: Decimal,
    },
    BalanceRefunded {
        entity: EntityId,
        owner: AccountId,
        amount: Decimal,
    },
    LogicTargetChanged {
        entity: EntityId,
        old: AccountId,
        new: AccountId,
    },
    LogicUpgraded {
        logic: AccountId,
        version: u32,
    },
    GlobalPauseChanged {
        paused: bool,
        by: AccountId,
    },
    TargetPauseChanged {
        target: PauseTarget,
        paused: bool,
        by: AccountId,
    },
    DelegateAdded {
        entity: EntityId,
        delegate: AccountId,
        scope: AuthScope,
    },
    DelegateRemoved {
        entity: EntityId,
        delegate: AccountId,
        scope: AuthScope,
    },
    LearningEnabled {
        entity: EntityId,
        module: String,
        root: Digest,
    },
    LearningDisabled {
        entity: EntityId,
        module: String,
    },
    LearningRootUpdated {
        entity: EntityId,
        old_root: Digest,
        new_root: Digest,
        version: u64,
        timestamp: i64,
    },
    InteractionRecorded {
        entity: EntityId,
        kind: String,
        success: bool,
        confidence: u64,
    },
    MilestoneAchieved {
        entity: EntityId,
        milestone: String,
        value: u64,
        timestamp: i64,
    },
    JournalEntryRecorded {
        entity: EntityId,
        journal: String,
        index: u64,
    },
    JournalOutcomeRecorded {
        entity: EntityId,
        journal: String,
        index: u64,
        success: bool,
    },
}

impl EventKind {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::EntityCreated { .. } => "entity_created",
            EventKind::ActionExecuted { .. } => "action_executed",
            EventKind::StatusChanged { .. } => "status_changed",
            EventKind::BalanceFunded { .. } => "balance_funded",
            EventKind::BalanceWithdrawn { .. } => "balance_withdrawn",
            EventKind::BalanceRefunded { .. } => "balance_refunded",
            EventKind::LogicTargetChanged { .. } => "logic_target_changed",
            EventKind::LogicUpgraded { .. } => "logic_upgraded",
            EventKind::GlobalPauseChanged { .. } => "global_pause_changed",
            EventKind::TargetPauseChanged { .. } => "target_pause_changed",
            EventKind::DelegateAdded { .. } => "delegate_added",
            EventKind::DelegateRemoved { .. } => "delegate_removed",
            EventKind::LearningEnabled { .. } => "learning_enabled",
            EventKind::LearningDisabled { .. } => "learning_disabled",
            EventKind::LearningRootUpdated { .. } => "learning_root_updated",
            EventKind::InteractionRecorded { .. } => "interaction_recorded",
            EventKind::MilestoneAchieved { .. } => "milestone_achieved",
            EventKind::JournalEntryRecorded { .. } => "journal_entry_recorded",
            EventKind::JournalOutcomeRecorded { .. } => "journal_outcome_recorded",
        }
    }
}

/// Published event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: String,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Event sink
pub trait EventSink: Send + Sync {
    fn write(&self, event: &Event);
}

/// Logs every event through `tracing`
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn write(&self, event: &Event) {
        info!(event = event.kind.name(), id = %event.id, "{}", event.to_json());
    }
}

/// Retains events in memory
#[derive(Default)]
pub struct MemoryEventSink {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all retained events
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Retained event kinds matching a predicate
    pub fn matching<F>(&self, pred: F) -> Vec<EventKind>
    where
        F: Fn(&EventKind) -> bool,
    {
        self.events
            .read()
            .iter()
            .map(|e| &e.kind)
            .filter(|k| pred(k))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for MemoryEventSink {
    fn write(&self, event: &Event) {
        self.events.write().push(event.clone());
    }
}

/// Fan-out of events to sinks
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    /// Bus with no sinks
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that logs through `tracing`
    pub fn with_tracing() -> Self {
        let bus = Self::new();
        bus.add_sink(Arc::new(TracingEventSink));
        bus
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Publish an event to every sink
    pub fn publish(&self, kind: EventKind) {
        let event = Event::new(kind);
        debug!(event = event.kind.name(), "publishing");
        for sink in self.sinks.read().iter() {
            sink.write(&event);
        }
    }

    /// Publish a batch in order
    pub fn publish_all(&self, kinds: impl IntoIterator<Item = EventKind>) {
        for kind in kinds {
            self.publish(kind);
        }
    }
}
