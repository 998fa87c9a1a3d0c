//! End-to-end scenarios across the agent and learning subsystems

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use noema_agent::{AgentLogic, AgentRegistry, AgentRuntime, ExecutionContext};
use noema_common::config::NoemaConfig;
use noema_common::crypto::signature::DelegationApproval;
use noema_common::{
    AccessError, AccountId, AgentStatus, AuthScope, CryptoError, Digest, EntityId, EventBus, EventKind,
    ExecutionError, LearningError, LearningHook, ManualClock, MemoryEventSink, MerkleTree, NoemaError,
    PauseTarget, StateError,
};
use noema_learning::{RootUpdate, CONFIDENCE_SCALE};

const START: i64 = 1_700_000_000;

// ---------- logic fixtures ----------

struct Echo;

impl AgentLogic for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>, payload: &[u8]) -> Result<Bytes, ExecutionError> {
        ctx.set(Bytes::from_static(b"last"), Bytes::copy_from_slice(payload))?;
        ctx.log("echo")?;
        Ok(Bytes::copy_from_slice(payload))
    }
}

struct Loud;

impl AgentLogic for Loud {
    fn name(&self) -> &str {
        "loud"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>, _payload: &[u8]) -> Result<Bytes, ExecutionError> {
        let last = ctx.get(b"last")?.unwrap_or_default();
        Ok(Bytes::from(last.to_ascii_uppercase()))
    }
}

struct Failing;

impl AgentLogic for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>, _payload: &[u8]) -> Result<Bytes, ExecutionError> {
        ctx.set(Bytes::from_static(b"half"), Bytes::from_static(b"written"))?;
        Err(anyhow::anyhow!("strategy rejected").into())
    }
}

struct Panicking;

impl AgentLogic for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>, _payload: &[u8]) -> Result<Bytes, ExecutionError> {
        ctx.set(Bytes::from_static(b"half"), Bytes::from_static(b"written"))?;
        panic!("logic bug");
    }
}

struct Burner;

impl AgentLogic for Burner {
    fn name(&self) -> &str {
        "burner"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>, _payload: &[u8]) -> Result<Bytes, ExecutionError> {
        loop {
            ctx.charge_gas(10_000)?;
        }
    }
}

/// Calls back into the registry for its own entity
#[derive(Default)]
struct Reentrant {
    registry: OnceLock<Weak<AgentRegistry>>,
}

impl AgentLogic for Reentrant {
    fn name(&self) -> &str {
        "reentrant"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>, _payload: &[u8]) -> Result<Bytes, ExecutionError> {
        let registry = self
            .registry
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ExecutionError::Reverted("registry gone".into()))?;
        registry
            .fund(&ctx.owner, ctx.entity, dec!(1))
            .map_err(|err| ExecutionError::Reverted(err.to_string()))?;
        Ok(Bytes::new())
    }
}

// ---------- hook fixtures ----------

#[derive(Default)]
struct FailingHook {
    calls: AtomicUsize,
}

impl LearningHook for FailingHook {
    fn is_learning_enabled(&self, _entity: EntityId) -> bool {
        true
    }

    fn record_execution(&self, entity: EntityId, _kind: &str, _success: bool) -> noema_common::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LearningError::NotEnabled(entity).into())
    }
}

#[derive(Default)]
struct PanickingHook {
    calls: AtomicUsize,
}

impl LearningHook for PanickingHook {
    fn is_learning_enabled(&self, _entity: EntityId) -> bool {
        true
    }

    fn record_execution(&self, _entity: EntityId, _kind: &str, _success: bool) -> noema_common::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("hook bug");
    }
}

// ---------- harness ----------

struct Harness {
    runtime: AgentRuntime,
    sink: Arc<MemoryEventSink>,
    clock: Arc<ManualClock>,
    governor: AccountId,
    emergency: AccountId,
    owner: AccountId,
    echo: AccountId,
}

impl Harness {
    fn new(config: NoemaConfig, module: &str) -> Self {
        Self::build(config, module, None)
    }

    fn with_hook(hook: Arc<dyn LearningHook>) -> Self {
        Self::build(NoemaConfig::default(), "general", Some(hook))
    }

    fn build(config: NoemaConfig, module: &str, hook: Option<Arc<dyn LearningHook>>) -> Self {
        let clock = Arc::new(ManualClock::at(START));
        let events = Arc::new(EventBus::new());
        let sink = Arc::new(MemoryEventSink::new());
        events.add_sink(sink.clone());
        let governor = AccountId::derive("governor");
        let emergency = AccountId::derive("emergency");

        let mut builder = AgentRuntime::builder()
            .config(config)
            .clock(clock.clone())
            .events(events)
            .governor(governor)
            .emergency_authority(emergency)
            .module(module);
        if let Some(hook) = hook {
            builder = builder.hook(hook);
        }
        let runtime = builder.build().unwrap();

        let echo = AccountId::derive("logic/echo");
        runtime.logic.register(governor, echo, Arc::new(Echo)).unwrap();

        Self {
            runtime,
            sink,
            clock,
            governor,
            emergency,
            owner: AccountId::derive("owner"),
            echo,
        }
    }

    fn registry(&self) -> &AgentRegistry {
        &self.runtime.registry
    }

    /// Funded entity running `logic`
    fn funded(&self, logic: AccountId) -> EntityId {
        let entity = self.registry().create_entity(self.owner, logic, "ipfs://meta").unwrap();
        self.registry().fund(&self.owner, entity, dec!(100)).unwrap();
        entity
    }

    fn register(&self, label: &str, logic: Arc<dyn AgentLogic>) -> AccountId {
        let address = AccountId::derive(label);
        self.runtime.logic.register(self.governor, address, logic).unwrap();
        address
    }

    fn count(&self, pred: impl Fn(&EventKind) -> bool) -> usize {
        self.sink.matching(pred).len()
    }
}

fn tree(tag: &str) -> (MerkleTree, Vec<String>) {
    let claims: Vec<String> = (0..4).map(|i| format!("{tag}/claim-{i}")).collect();
    (MerkleTree::from_claims(&claims), claims)
}

fn update(previous_root: Digest, tag: &str) -> RootUpdate {
    let (tree, claims) = tree(tag);
    RootUpdate {
        previous_root,
        new_root: tree.root().unwrap(),
        anchor_claim: Bytes::from(claims[0].clone()),
        proof: tree.proof(0).unwrap(),
        metadata: tag.to_string(),
    }
}

// ---------- scenarios ----------

#[test]
fn execute_requires_funding() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.registry().create_entity(h.owner, h.echo, "ipfs://meta").unwrap();

    assert!(matches!(
        h.registry().execute_action(&h.owner, entity, b"hello"),
        Err(NoemaError::State(StateError::InsufficientBalance { .. }))
    ));
    assert_eq!(h.count(|k| matches!(k, EventKind::ActionExecuted { .. })), 0);

    h.registry().fund(&h.owner, entity, dec!(100)).unwrap();
    let receipt = h.registry().execute_action(&h.owner, entity, b"hello").unwrap();
    assert_eq!(receipt.output.as_ref(), b"hello");
    assert_eq!(receipt.logs, vec!["echo".to_string()]);
    assert_eq!(h.count(|k| matches!(k, EventKind::ActionExecuted { .. })), 1);
    assert_eq!(h.registry().entity(entity).unwrap().last_action_timestamp, START);
}

#[test]
fn confidence_rises_then_falls() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);
    let (r0, _) = tree("r0");
    h.runtime.ledger.enable_learning(&h.owner, entity, r0.root().unwrap()).unwrap();

    let mut last = h.runtime.ledger.metrics(entity).unwrap().confidence_score;
    for _ in 0..5 {
        let metrics = h.runtime.ledger.record_interaction(&h.owner, entity, "x", true).unwrap();
        assert!(metrics.confidence_score > last);
        assert!(metrics.confidence_score < CONFIDENCE_SCALE);
        last = metrics.confidence_score;
    }
    let metrics = h.runtime.ledger.record_interaction(&h.owner, entity, "x", false).unwrap();
    assert!(metrics.confidence_score < last);
    assert_eq!(metrics.total_interactions, 6);
}

#[test]
fn executed_actions_feed_learning() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);

    // Not enabled yet: nothing recorded, action still succeeds
    h.registry().execute_action(&h.owner, entity, b"a").unwrap();
    assert!(h.runtime.ledger.metrics(entity).is_none());

    let (r0, _) = tree("r0");
    h.runtime.ledger.enable_learning(&h.owner, entity, r0.root().unwrap()).unwrap();
    h.registry().execute_action(&h.owner, entity, b"b").unwrap();
    h.registry().execute_action(&h.echo, entity, b"c").unwrap();

    assert_eq!(h.runtime.ledger.metrics(entity).unwrap().total_interactions, 2);
    assert_eq!(
        h.count(|k| matches!(k, EventKind::InteractionRecorded { kind, success: true, .. } if kind == "echo")),
        2
    );
}

#[test]
fn root_updates_are_capped_per_day() {
    let mut config = NoemaConfig::default();
    config.learning.general_daily_limit = 3;
    let h = Harness::new(config, "general");
    let entity = h.funded(h.echo);
    let ledger = &h.runtime.ledger;

    let (r0, _) = tree("r0");
    let mut root = r0.root().unwrap();
    ledger.enable_learning(&h.owner, entity, root).unwrap();

    for i in 0..3 {
        let next = update(root, &format!("day1-{i}"));
        ledger.update_learning_root(&h.owner, entity, &next).unwrap();
        root = next.new_root;
    }
    assert_eq!(ledger.updates_remaining_today(entity), 0);

    let rejected = update(root, "day1-overflow");
    assert!(matches!(
        ledger.update_learning_root(&h.owner, entity, &rejected),
        Err(NoemaError::Learning(LearningError::RateLimited { limit: 3, .. }))
    ));
    assert_eq!(ledger.committed_root(entity), Some(root));

    // Lightweight recording is never capped
    for _ in 0..10 {
        ledger.record_interaction(&h.owner, entity, "x", true).unwrap();
    }

    h.clock.advance(Duration::days(1));
    for i in 0..3 {
        let next = update(root, &format!("day2-{i}"));
        ledger.update_learning_root(&h.owner, entity, &next).unwrap();
        root = next.new_root;
    }
    assert_eq!(ledger.learning_record(entity).unwrap().learning_version, 6);
    assert_eq!(h.count(|k| matches!(k, EventKind::LearningRootUpdated { .. })), 6);
}

#[test]
fn anchor_proof_verifies_against_new_root_only() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);
    let ledger = &h.runtime.ledger;

    let (r0, r0_claims) = tree("r0");
    let r0_root = r0.root().unwrap();
    ledger.enable_learning(&h.owner, entity, r0_root).unwrap();
    let stale_claim = r0_claims[1].clone();
    let stale_proof = r0.proof(1).unwrap();
    assert!(ledger.verify_learning(entity, stale_claim.as_bytes(), &stale_proof));

    // Claim C lives only in R1's tree
    let to_r1 = update(r0_root, "r1");
    let mut forged = to_r1.clone();
    forged.anchor_claim = Bytes::from_static(b"not in the tree");
    assert!(matches!(
        ledger.update_learning_root(&h.owner, entity, &forged),
        Err(NoemaError::Learning(LearningError::InvalidProof))
    ));
    let mut stale = to_r1.clone();
    stale.previous_root = to_r1.new_root;
    assert!(matches!(
        ledger.update_learning_root(&h.owner, entity, &stale),
        Err(NoemaError::Learning(LearningError::StaleRoot { .. }))
    ));
    assert_eq!(ledger.committed_root(entity), Some(r0_root));

    assert_eq!(ledger.update_learning_root(&h.owner, entity, &to_r1).unwrap(), 1);
    assert!(ledger.verify_learning(entity, &to_r1.anchor_claim, &to_r1.proof));
    assert!(!ledger.verify_learning(entity, stale_claim.as_bytes(), &stale_proof));

    let event = h.sink.matching(|k| matches!(k, EventKind::LearningRootUpdated { .. }));
    assert!(matches!(
        &event[0],
        EventKind::LearningRootUpdated { old_root, new_root, .. }
            if *old_root == r0_root && *new_root == to_r1.new_root
    ));
}

#[test]
fn logic_target_cannot_update_learning() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);
    let (r0, _) = tree("r0");
    let r0_root = r0.root().unwrap();
    h.runtime.ledger.enable_learning(&h.owner, entity, r0_root).unwrap();

    // General module lets the logic record interactions but never move the root
    assert!(h.runtime.ledger.record_interaction(&h.echo, entity, "x", true).is_ok());
    assert!(matches!(
        h.runtime.ledger.update_learning_root(&h.echo, entity, &update(r0_root, "r1")),
        Err(NoemaError::Access(_))
    ));
}

#[test]
fn creator_logic_may_not_record() {
    let h = Harness::new(NoemaConfig::default(), "creator");
    let entity = h.funded(h.echo);
    let (r0, _) = tree("r0");
    h.runtime.ledger.enable_learning(&h.owner, entity, r0.root().unwrap()).unwrap();

    assert!(matches!(
        h.runtime.ledger.record_interaction(&h.echo, entity, "x", true),
        Err(NoemaError::Access(_))
    ));
    let creator = h.runtime.specialization.creator().unwrap();
    assert!(creator.record_content(&h.echo, entity, "ipfs://post", "video").is_err());
    assert_eq!(creator.record_content(&h.owner, entity, "ipfs://post", "video").unwrap(), 0);

    // The execution hook still records through the privileged path
    h.registry().execute_action(&h.owner, entity, b"post").unwrap();
    assert_eq!(h.runtime.ledger.metrics(entity).unwrap().total_interactions, 1);
}

#[test]
fn global_and_targeted_pauses() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let breaker = &h.runtime.breaker;
    let a = h.funded(h.echo);
    let b = h.funded(h.echo);

    breaker.set_global_pause(&h.governor, true).unwrap();
    for entity in [a, b] {
        assert!(matches!(
            h.registry().execute_action(&h.owner, entity, b"x"),
            Err(NoemaError::State(StateError::Paused(e))) if e == entity
        ));
    }
    // Short-circuits before any mutation
    assert!(h.registry().fund(&h.owner, a, dec!(5)).is_err());
    assert_eq!(h.registry().balance(a), Some(dec!(100)));
    breaker.set_global_pause(&h.emergency, false).unwrap();

    breaker.set_target_pause(&h.emergency, PauseTarget::Entity(a), true).unwrap();
    assert!(h.registry().execute_action(&h.owner, a, b"x").is_err());
    assert!(h.registry().execute_action(&h.owner, b, b"x").is_ok());
    breaker.set_target_pause(&h.emergency, PauseTarget::Entity(a), false).unwrap();

    breaker.set_target_pause(&h.governor, PauseTarget::Logic(h.echo), true).unwrap();
    assert!(h.registry().execute_action(&h.owner, a, b"x").is_err());
    assert!(h.registry().execute_action(&h.owner, b, b"x").is_err());

    let stranger = AccountId::derive("stranger");
    assert!(matches!(
        breaker.set_global_pause(&stranger, true),
        Err(NoemaError::Access(AccessError::NotGovernor { .. }))
    ));
}

#[test]
fn terminate_refunds_once() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);

    assert_eq!(h.registry().terminate(&h.owner, entity).unwrap(), dec!(100));
    assert_eq!(h.registry().paid_out(&h.owner), dec!(100));
    assert_eq!(h.registry().status(entity), Some(AgentStatus::Terminated));

    assert!(matches!(
        h.registry().terminate(&h.owner, entity),
        Err(NoemaError::State(StateError::Terminated(_)))
    ));
    assert_eq!(h.registry().paid_out(&h.owner), dec!(100));
    assert_eq!(h.count(|k| matches!(k, EventKind::BalanceRefunded { .. })), 1);

    assert!(matches!(
        h.registry().execute_action(&h.owner, entity, b"x"),
        Err(NoemaError::State(StateError::Terminated(_)))
    ));
    assert!(h.registry().fund(&h.owner, entity, dec!(1)).is_err());
    assert!(h.registry().unpause(&h.owner, entity).is_err());

    // Terminated entities cannot enable learning
    let (r0, _) = tree("r0");
    assert!(h.runtime.ledger.enable_learning(&h.owner, entity, r0.root().unwrap()).is_err());
}

#[test]
fn paused_entities_cannot_change_status() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let breaker = &h.runtime.breaker;
    let entity = h.funded(h.echo);
    let paused = |result: Result<(), NoemaError>| {
        matches!(result, Err(NoemaError::State(StateError::Paused(e))) if e == entity)
    };

    // None trips the global flag
    let targets = [None, Some(PauseTarget::Entity(entity)), Some(PauseTarget::Logic(h.echo))];
    for target in targets {
        let trip = |paused: bool| match target {
            None => breaker.set_global_pause(&h.governor, paused).unwrap(),
            Some(target) => breaker.set_target_pause(&h.emergency, target, paused).unwrap(),
        };
        trip(true);

        assert!(paused(h.registry().terminate(&h.owner, entity).map(|_| ())));
        assert!(paused(h.registry().pause(&h.owner, entity)));
        assert_eq!(h.registry().status(entity), Some(AgentStatus::Active));
        assert_eq!(h.registry().balance(entity), Some(dec!(100)));
        assert_eq!(h.registry().paid_out(&h.owner), Decimal::ZERO);

        trip(false);
    }

    // An owner-paused entity stays paused while the breaker is tripped
    h.registry().pause(&h.owner, entity).unwrap();
    breaker.set_target_pause(&h.emergency, PauseTarget::Entity(entity), true).unwrap();
    assert!(paused(h.registry().unpause(&h.owner, entity)));
    assert_eq!(h.registry().status(entity), Some(AgentStatus::Paused));
    breaker.set_target_pause(&h.emergency, PauseTarget::Entity(entity), false).unwrap();

    h.registry().unpause(&h.owner, entity).unwrap();
    assert_eq!(h.registry().terminate(&h.owner, entity).unwrap(), dec!(100));
    assert_eq!(h.registry().paid_out(&h.owner), dec!(100));
    assert_eq!(h.count(|k| matches!(k, EventKind::BalanceRefunded { .. })), 1);
}

#[test]
fn balance_overflow_is_rejected() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.registry().create_entity(h.owner, h.echo, "ipfs://meta").unwrap();
    h.registry().fund(&h.owner, entity, Decimal::MAX).unwrap();

    assert!(matches!(
        h.registry().fund(&h.owner, entity, Decimal::MAX),
        Err(NoemaError::State(StateError::BalanceOverflow))
    ));
    assert_eq!(h.registry().balance(entity), Some(Decimal::MAX));
    assert_eq!(h.count(|k| matches!(k, EventKind::BalanceFunded { .. })), 1);

    // Payouts accumulate with the same checked arithmetic
    let second = h.registry().create_entity(h.owner, h.echo, "ipfs://meta").unwrap();
    h.registry().fund(&h.owner, second, dec!(1)).unwrap();
    h.registry().withdraw(&h.owner, entity, Decimal::MAX).unwrap();
    assert!(matches!(
        h.registry().terminate(&h.owner, second),
        Err(NoemaError::State(StateError::BalanceOverflow))
    ));
    assert_eq!(h.registry().status(second), Some(AgentStatus::Active));
    assert_eq!(h.registry().balance(second), Some(dec!(1)));
    assert_eq!(h.registry().paid_out(&h.owner), Decimal::MAX);
}

#[test]
fn terminated_entities_stop_learning() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);
    let ledger = &h.runtime.ledger;
    let (r0, _) = tree("r0");
    let r0_root = r0.root().unwrap();
    ledger.enable_learning(&h.owner, entity, r0_root).unwrap();
    ledger.record_interaction(&h.owner, entity, "warmup", true).unwrap();

    h.registry().terminate(&h.owner, entity).unwrap();
    let before = ledger.learning_record(entity).unwrap();
    let quota = ledger.updates_remaining_today(entity);

    assert!(matches!(
        ledger.record_interaction(&h.owner, entity, "after", true),
        Err(NoemaError::State(StateError::Terminated(_)))
    ));
    assert!(matches!(
        ledger.record_interaction(&h.echo, entity, "after", true),
        Err(NoemaError::State(StateError::Terminated(_)))
    ));
    assert!(matches!(
        ledger.update_learning_root(&h.owner, entity, &update(r0_root, "r1")),
        Err(NoemaError::State(StateError::Terminated(_)))
    ));
    assert_eq!(ledger.learning_record(entity).unwrap(), before);
    assert_eq!(ledger.updates_remaining_today(entity), quota);
}

#[test]
fn milestones_fire_once() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);
    let (r0, _) = tree("r0");
    h.runtime.ledger.enable_learning(&h.owner, entity, r0.root().unwrap()).unwrap();

    for _ in 0..120 {
        h.runtime.ledger.record_interaction(&h.owner, entity, "x", true).unwrap();
    }
    for name in ["confidence_80", "confidence_95", "interactions_100"] {
        assert_eq!(
            h.count(|k| matches!(k, EventKind::MilestoneAchieved { milestone, .. } if milestone == name)),
            1,
            "{name}"
        );
    }
    assert_eq!(
        h.count(|k| matches!(k, EventKind::MilestoneAchieved { milestone, .. } if milestone == "interactions_1000")),
        0
    );
}

#[test]
fn reentrant_call_is_rejected() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let logic = Arc::new(Reentrant::default());
    let _ = logic.registry.set(Arc::downgrade(&h.runtime.registry));
    let address = h.register("logic/reentrant", logic);
    let entity = h.funded(address);

    match h.registry().execute_action(&h.owner, entity, b"") {
        Err(NoemaError::Execution(ExecutionError::Reverted(message))) => {
            assert!(message.contains("Reentrant"), "{message}");
        }
        other => panic!("expected revert, got {other:?}"),
    }
    assert_eq!(h.registry().balance(entity), Some(dec!(100)));

    // Outside the call the same entry point works
    assert_eq!(h.registry().fund(&h.owner, entity, dec!(1)).unwrap(), dec!(101));
}

#[test]
fn hook_failures_are_swallowed() {
    let failing = Arc::new(FailingHook::default());
    let h = Harness::with_hook(failing.clone());
    let entity = h.funded(h.echo);
    h.registry().execute_action(&h.owner, entity, b"x").unwrap();
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry().storage_value(entity, b"last"), Some(Bytes::from_static(b"x")));

    let panicking = Arc::new(PanickingHook::default());
    let h = Harness::with_hook(panicking.clone());
    let entity = h.funded(h.echo);
    h.registry().execute_action(&h.owner, entity, b"y").unwrap();
    h.registry().execute_action(&h.owner, entity, b"z").unwrap();
    assert_eq!(panicking.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.registry().storage_value(entity, b"last"), Some(Bytes::from_static(b"z")));
}

#[test]
fn failed_logic_rolls_back() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let cases: [(&str, Arc<dyn AgentLogic>); 2] = [
        ("logic/failing", Arc::new(Failing)),
        ("logic/panicking", Arc::new(Panicking)),
    ];
    for (label, logic) in cases {
        let address = h.register(label, logic);
        let entity = h.funded(address);
        let before = h.registry().entity(entity).unwrap();

        assert!(matches!(
            h.registry().execute_action(&h.owner, entity, b"x"),
            Err(NoemaError::Execution(ExecutionError::Reverted(_)))
        ));
        assert_eq!(h.registry().entity(entity).unwrap(), before);
        assert!(h.registry().storage_value(entity, b"half").is_none());
    }
    assert_eq!(h.count(|k| matches!(k, EventKind::ActionExecuted { .. })), 0);
}

#[test]
fn gas_ceiling_aborts() {
    let mut config = NoemaConfig::default();
    config.execution.gas_ceiling = 50_000;
    let h = Harness::new(config, "general");

    let burner = h.register("logic/burner", Arc::new(Burner));
    let entity = h.funded(burner);
    assert!(matches!(
        h.registry().execute_action(&h.owner, entity, b""),
        Err(NoemaError::Execution(ExecutionError::OutOfGas { limit: 50_000, .. }))
    ));

    // Intrinsic payload cost alone exceeds the ceiling
    let echo = h.funded(h.echo);
    assert!(matches!(
        h.registry().execute_action(&h.owner, echo, &[0u8; 2_000]),
        Err(NoemaError::Execution(ExecutionError::OutOfGas { .. }))
    ));
    assert!(h.registry().execute_action(&h.owner, echo, b"small").is_ok());
}

#[test]
fn upgrade_keeps_storage() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let entity = h.funded(h.echo);
    h.registry().execute_action(&h.owner, entity, b"quiet").unwrap();

    let stranger = AccountId::derive("stranger");
    assert!(matches!(
        h.runtime.logic.upgrade(&stranger, h.echo, Arc::new(Loud)),
        Err(NoemaError::Access(AccessError::NotLogicAdmin { .. }))
    ));
    assert_eq!(h.runtime.logic.upgrade(&h.governor, h.echo, Arc::new(Loud)).unwrap(), 2);

    assert_eq!(h.registry().storage_value(entity, b"last"), Some(Bytes::from_static(b"quiet")));
    let receipt = h.registry().execute_action(&h.owner, entity, b"").unwrap();
    assert_eq!(receipt.output.as_ref(), b"QUIET");
    assert_eq!(receipt.logic, "loud");
    assert_eq!(h.count(|k| matches!(k, EventKind::LogicUpgraded { version: 2, .. })), 1);
}

#[test]
fn signed_delegation_enables_execution() {
    let h = Harness::new(NoemaConfig::default(), "general");
    let (owner, owner_key) = AccountId::generate();
    let entity = h.registry().create_entity(owner, h.echo, "ipfs://meta").unwrap();
    h.registry().fund(&owner, entity, dec!(10)).unwrap();

    let delegate = AccountId::derive("delegate");
    assert!(matches!(
        h.registry().execute_action(&delegate, entity, b"x"),
        Err(NoemaError::Access(AccessError::NotAuthorized { .. }))
    ));

    let approval = DelegationApproval {
        entity_id: entity,
        delegate,
        scope: AuthScope::Execution,
        nonce: 7,
        expires_at: START + 3_600,
    };
    let signature = approval.sign(&owner_key);
    h.runtime.auth.add_delegate_signed(&approval, &signature).unwrap();
    assert!(h.registry().execute_action(&delegate, entity, b"x").is_ok());

    assert!(matches!(
        h.runtime.auth.add_delegate_signed(&approval, &signature),
        Err(NoemaError::Crypto(CryptoError::NonceReused { nonce: 7, .. }))
    ));

    // A signature from anyone but the owner is rejected
    let (_, other_key) = AccountId::generate();
    let forged = DelegationApproval { nonce: 8, ..approval };
    assert!(matches!(
        h.runtime.auth.add_delegate_signed(&forged, &forged.sign(&other_key)),
        Err(NoemaError::Crypto(CryptoError::InvalidSignature))
    ));
}

#[test]
fn gas_fee_is_debited() {
    let mut config = NoemaConfig::default();
    config.execution.gas_price = dec!(0.001);
    let h = Harness::new(config, "general");
    let entity = h.funded(h.echo);

    let receipt = h.registry().execute_action(&h.owner, entity, b"ping").unwrap();
    assert!(receipt.gas_used > 21_000);
    assert_eq!(receipt.fee, dec!(0.001) * Decimal::from(receipt.gas_used));
    assert_eq!(h.registry().balance(entity), Some(dec!(100) - receipt.fee));

    // Balance below the intrinsic fee is rejected up front
    let poor = h.registry().create_entity(h.owner, h.echo, "ipfs://meta").unwrap();
    h.registry().fund(&h.owner, poor, dec!(1)).unwrap();
    assert!(matches!(
        h.registry().execute_action(&h.owner, poor, b"ping"),
        Err(NoemaError::State(StateError::InsufficientBalance { .. }))
    ));
    assert_eq!(h.registry().balance(poor), Some(dec!(1)));
}

#[test]
fn trading_journal_through_runtime() {
    use noema_learning::specialized::trading::TradeSide;

    let h = Harness::new(NoemaConfig::default(), "trading");
    let entity = h.funded(h.echo);
    let (r0, _) = tree("r0");
    h.runtime.ledger.enable_learning(&h.owner, entity, r0.root().unwrap()).unwrap();
    let trading = h.runtime.specialization.trading().unwrap();

    let index = trading
        .record_trade(&h.echo, entity, "ETH-USD", TradeSide::Buy, dec!(1.5), dec!(2400))
        .unwrap();
    let scores = trading.record_trade_outcome(&h.owner, entity, index, dec!(35)).unwrap();
    assert!(scores.profitability > 50);
    assert!(matches!(
        trading.record_trade_outcome(&h.owner, entity, index, dec!(35)),
        Err(NoemaError::Learning(LearningError::OutcomeAlreadyRecorded { .. }))
    ));
    assert_eq!(h.runtime.ledger.learning_record(entity).unwrap().module, "trading");
}
