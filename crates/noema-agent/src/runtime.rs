//! Runtime wiring
//!
//! Builds the component graph: entity table, authorization layer, learning
//! ledger (plus its specialized module), logic table, circuit breaker and the
//! agent registry on top.

use std::sync::Arc;

use tracing::info;

use noema_common::clock::{Clock, SystemClock};
use noema_common::config::NoemaConfig;
use noema_common::error::{NoemaError, Result, StateError};
use noema_common::events::EventBus;
use noema_common::security::AuthorizationLayer;
use noema_common::telemetry::init_tracing;
use noema_common::types::account::AccountId;
use noema_common::types::entity::LearningHook;
use noema_learning::{CreatorLearning, LearningLedger, LearningModule, MetricsEngine, TradingLearning};

use crate::breaker::CircuitBreaker;
use crate::logic::LogicRegistry;
use crate::registry::AgentRegistry;
use crate::table::EntityTable;

/// Domain module layered over the ledger
#[derive(Clone)]
pub enum Specialization {
    General,
    Trading(Arc<TradingLearning>),
    Creator(Arc<CreatorLearning>),
}

impl Specialization {
    pub fn trading(&self) -> Option<&Arc<TradingLearning>> {
        match self {
            Specialization::Trading(trading) => Some(trading),
            _ => None,
        }
    }

    pub fn creator(&self) -> Option<&Arc<CreatorLearning>> {
        match self {
            Specialization::Creator(creator) => Some(creator),
            _ => None,
        }
    }
}

/// Fully wired component graph
pub struct AgentRuntime {
    pub config: NoemaConfig,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventBus>,
    pub table: Arc<EntityTable>,
    pub auth: Arc<AuthorizationLayer>,
    pub ledger: Arc<LearningLedger>,
    pub specialization: Specialization,
    pub logic: Arc<LogicRegistry>,
    pub breaker: Arc<CircuitBreaker>,
    pub registry: Arc<AgentRegistry>,
}

impl AgentRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Load configuration from the environment, install tracing and build
    /// on the wall clock
    pub fn from_env(governor: AccountId, emergency: AccountId, module: &str) -> Result<Self> {
        let config = NoemaConfig::load()?;
        init_tracing(&config.telemetry);
        Self::builder()
            .config(config)
            .events(Arc::new(EventBus::with_tracing()))
            .governor(governor)
            .emergency_authority(emergency)
            .module(module)
            .build()
    }
}

#[derive(Default)]
pub struct RuntimeBuilder {
    config: NoemaConfig,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<EventBus>>,
    governor: Option<AccountId>,
    emergency: Option<AccountId>,
    module: Option<String>,
    hook: Option<Arc<dyn LearningHook>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: NoemaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn governor(mut self, governor: AccountId) -> Self {
        self.governor = Some(governor);
        self
    }

    pub fn emergency_authority(mut self, emergency: AccountId) -> Self {
        self.emergency = Some(emergency);
        self
    }

    /// `general` (default), `trading` or `creator`
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Replace the post-execution hook that would otherwise feed the ledger
    pub fn hook(mut self, hook: Arc<dyn LearningHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<AgentRuntime> {
        let config = self.config;
        config.validate()?;

        let governor = self.governor.ok_or_else(|| NoemaError::Config("governor is required".into()))?;
        let emergency = self.emergency.unwrap_or(governor);
        if governor.is_zero() || emergency.is_zero() {
            return Err(StateError::ZeroAddress.into());
        }

        let module_name = self.module.unwrap_or_else(|| "general".to_string());
        let module = LearningModule::from_settings(&module_name, &config.learning)
            .ok_or_else(|| NoemaError::Config(format!("unknown learning module: {module_name}")))?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self.events.unwrap_or_else(|| Arc::new(EventBus::new()));

        let table = Arc::new(EntityTable::new());
        let auth = Arc::new(AuthorizationLayer::new(table.clone(), clock.clone(), events.clone()));
        let engine = MetricsEngine::from_settings(&config.learning)?;
        let ledger = Arc::new(LearningLedger::new(
            module,
            engine,
            auth.clone(),
            clock.clone(),
            events.clone(),
        ));

        let specialization = match module_name.as_str() {
            "trading" => Specialization::Trading(Arc::new(TradingLearning::new(ledger.clone()))),
            "creator" => Specialization::Creator(Arc::new(CreatorLearning::new(ledger.clone()))),
            _ => Specialization::General,
        };
        let hook: Arc<dyn LearningHook> = match (self.hook, &specialization) {
            (Some(hook), _) => hook,
            (None, Specialization::Trading(trading)) => trading.clone(),
            (None, Specialization::Creator(creator)) => creator.clone(),
            (None, Specialization::General) => ledger.clone(),
        };

        let logic = Arc::new(LogicRegistry::new(events.clone()));
        let breaker = Arc::new(CircuitBreaker::new(governor, emergency, events.clone()));
        let registry = Arc::new(
            AgentRegistry::new(
                table.clone(),
                logic.clone(),
                breaker.clone(),
                auth.clone(),
                clock.clone(),
                events.clone(),
                config.execution.clone(),
            )
            .with_hook(hook),
        );

        info!(
            module = %module_name,
            gas_ceiling = config.execution.gas_ceiling,
            governor = %governor,
            "Agent runtime ready"
        );

        Ok(AgentRuntime {
            config,
            clock,
            events,
            table,
            auth,
            ledger,
            specialization,
            logic,
            breaker,
            registry,
        })
    }
}
