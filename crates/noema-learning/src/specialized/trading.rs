//! Trading learning module
//!
//! Journals trades and risk snapshots per entity. A trade's outcome can be
//! filled in once; it feeds the shared confidence metrics and the
//! profitability score. Risk snapshots feed the risk-management score.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use noema_common::error::{LearningError, Result};
use noema_common::events::EventKind;
use noema_common::security::guard::GuardScope;
use noema_common::types::account::AccountId;
use noema_common::types::entity::{EntityId, LearningHook};

use super::{Book, Journal, JournalEntry, Shelf};
use crate::ledger::{push_milestones, LearningLedger};
use crate::milestone::{Metric, MilestoneBook};
use crate::module::TRADING_MILESTONES;
use crate::score::RollingScore;

const TRADES: &str = "trades";
const RISK_SNAPSHOTS: &str = "risk_snapshots";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Realised result of a trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub pnl: Decimal,
    pub recorded_at: i64,
}

impl TradeOutcome {
    pub fn is_profitable(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub index: u64,
    pub market: String,
    pub side: TradeSide,
    pub size: Decimal,
    pub price: Decimal,
    pub timestamp: i64,
    pub outcome: Option<TradeOutcome>,
}

impl JournalEntry for TradeRecord {
    fn has_outcome(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Point-in-time risk posture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub index: u64,
    pub exposure: Decimal,
    pub max_drawdown_bps: u32,
    /// Adherence to risk limits, 0-100
    pub discipline: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingScores {
    pub profitability: u64,
    pub risk_management: u64,
}

#[derive(Debug, Clone)]
struct TradingBook {
    trades: Journal<TradeRecord>,
    risk: Journal<RiskSnapshot>,
    profitability: RollingScore,
    risk_management: RollingScore,
    milestones: MilestoneBook,
    generation: u64,
}

impl Book for TradingBook {
    fn open(generation: u64) -> Self {
        Self {
            trades: Journal::new(TRADES),
            risk: Journal::new(RISK_SNAPSHOTS),
            profitability: RollingScore::new(),
            risk_management: RollingScore::new(),
            milestones: MilestoneBook::new(),
            generation,
        }
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

impl TradingBook {
    fn scores(&self) -> TradingScores {
        TradingScores {
            profitability: self.profitability.value(),
            risk_management: self.risk_management.value(),
        }
    }
}

/// Trading journals layered over a learning ledger
pub struct TradingLearning {
    ledger: Arc<LearningLedger>,
    books: Shelf<TradingBook>,
    guard: GuardScope,
}

impl TradingLearning {
    pub fn new(ledger: Arc<LearningLedger>) -> Self {
        Self {
            ledger,
            books: Shelf::new(),
            guard: GuardScope::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<LearningLedger> {
        &self.ledger
    }

    /// Journal an executed trade; returns its index
    pub fn record_trade(
        &self,
        caller: &AccountId,
        entity: EntityId,
        market: &str,
        side: TradeSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<u64> {
        let _guard = self.guard.enter(entity)?;
        let generation = self.ledger.ensure_recorder(caller, entity)?;
        if size <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(LearningError::InvalidObservation(format!(
                "trade size {} and price {} must be positive",
                size, price
            ))
            .into());
        }

        let now = self.ledger.clock().unix();
        let mut events = Vec::new();
        let index = {
            let slot = self.books.current(entity, generation);
            let mut book = slot.lock();
            let next = book.trades.next_index();
            let index = book.trades.append(TradeRecord {
                index: next,
                market: market.to_string(),
                side,
                size,
                price,
                timestamp: now,
                outcome: None,
            });
            events.push(EventKind::JournalEntryRecorded {
                entity,
                journal: TRADES.to_string(),
                index,
            });
            let count = book.trades.len() as u64;
            let fired = book.milestones.observe(TRADING_MILESTONES, Metric::Trades, count);
            push_milestones(entity, fired, now, &mut events);
            index
        };

        debug!(entity = %entity, index, market, ?side, "Trade recorded");
        self.ledger.events().publish_all(events);
        Ok(index)
    }

    /// Fill in a trade's realised PnL; once per trade
    pub fn record_trade_outcome(
        &self,
        caller: &AccountId,
        entity: EntityId,
        index: u64,
        pnl: Decimal,
    ) -> Result<TradingScores> {
        let _guard = self.guard.enter(entity)?;
        let generation = self.ledger.ensure_recorder(caller, entity)?;

        let now = self.ledger.clock().unix();
        let mut events = Vec::new();
        let scores = {
            let slot = self.books.current(entity, generation);
            let mut book = slot.lock();
            match book.trades.get(index) {
                None => return Err(LearningError::EntryNotFound { journal: TRADES, index }.into()),
                Some(trade) if trade.has_outcome() => {
                    return Err(LearningError::OutcomeAlreadyRecorded { journal: TRADES, index }.into())
                }
                Some(_) => {}
            }

            let outcome = TradeOutcome { pnl, recorded_at: now };
            let observation = match pnl.cmp(&Decimal::ZERO) {
                std::cmp::Ordering::Greater => 100,
                std::cmp::Ordering::Equal => 50,
                std::cmp::Ordering::Less => 0,
            };
            let profitability = book.profitability.observed(observation)?;

            // Shared metrics first; the book commit below cannot fail
            self.ledger
                .record_outcome(entity, "trade_outcome", outcome.is_profitable())?;

            book.trades.set_outcome(index, |t| t.outcome = Some(outcome))?;
            book.profitability = profitability;
            events.push(EventKind::JournalOutcomeRecorded {
                entity,
                journal: TRADES.to_string(),
                index,
                success: pnl > Decimal::ZERO,
            });
            let fired = book.milestones.observe(
                TRADING_MILESTONES,
                Metric::Profitability,
                profitability.value(),
            );
            push_milestones(entity, fired, now, &mut events);
            book.scores()
        };

        debug!(entity = %entity, index, %pnl, profitability = scores.profitability, "Trade outcome recorded");
        self.ledger.events().publish_all(events);
        Ok(scores)
    }

    /// Journal a risk snapshot; returns its index
    pub fn record_risk_snapshot(
        &self,
        caller: &AccountId,
        entity: EntityId,
        exposure: Decimal,
        max_drawdown_bps: u32,
        discipline: u64,
    ) -> Result<u64> {
        let _guard = self.guard.enter(entity)?;
        let generation = self.ledger.ensure_recorder(caller, entity)?;
        if exposure.is_sign_negative() {
            return Err(LearningError::InvalidObservation(format!("negative exposure {}", exposure)).into());
        }

        let now = self.ledger.clock().unix();
        let mut events = Vec::new();
        let index = {
            let slot = self.books.current(entity, generation);
            let mut book = slot.lock();
            let risk_management = book.risk_management.observed(discipline)?;

            let next = book.risk.next_index();
            let index = book.risk.append(RiskSnapshot {
                index: next,
                exposure,
                max_drawdown_bps,
                discipline,
                timestamp: now,
            });
            book.risk_management = risk_management;
            events.push(EventKind::JournalEntryRecorded {
                entity,
                journal: RISK_SNAPSHOTS.to_string(),
                index,
            });
            let fired = book.milestones.observe(
                TRADING_MILESTONES,
                Metric::RiskManagement,
                risk_management.value(),
            );
            push_milestones(entity, fired, now, &mut events);
            index
        };

        self.ledger.events().publish_all(events);
        Ok(index)
    }

    pub fn trades(&self, entity: EntityId) -> Vec<TradeRecord> {
        self.books
            .view(entity, self.ledger.generation(entity), |book| book.trades.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn risk_snapshots(&self, entity: EntityId) -> Vec<RiskSnapshot> {
        self.books
            .view(entity, self.ledger.generation(entity), |book| book.risk.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn scores(&self, entity: EntityId) -> TradingScores {
        self.books
            .view(entity, self.ledger.generation(entity), |book| book.scores())
            .unwrap_or_else(|| TradingBook::open(0).scores())
    }
}

impl LearningHook for TradingLearning {
    fn is_learning_enabled(&self, entity: EntityId) -> bool {
        self.ledger.is_learning_enabled(entity)
    }

    fn record_execution(&self, entity: EntityId, kind: &str, success: bool) -> Result<()> {
        self.ledger.record_execution(entity, kind, success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MetricsEngine;
    use crate::module::LearningModule;
    use noema_common::clock::ManualClock;
    use noema_common::crypto::merkle::hash_leaf;
    use noema_common::error::NoemaError;
    use noema_common::events::{EventBus, MemoryEventSink};
    use noema_common::security::auth::AuthorizationLayer;
    use noema_common::types::entity::{AgentStatus, EntityDirectory};
    use rust_decimal_macros::dec;

    struct OneEntity(AccountId);

    impl EntityDirectory for OneEntity {
        fn owner_of(&self, entity: EntityId) -> Option<AccountId> {
            (entity == EntityId(1)).then_some(self.0)
        }
        fn logic_target_of(&self, entity: EntityId) -> Option<AccountId> {
            (entity == EntityId(1)).then(|| AccountId::derive("bot"))
        }
        fn status_of(&self, entity: EntityId) -> Option<AgentStatus> {
            (entity == EntityId(1)).then_some(AgentStatus::Active)
        }
    }

    fn setup() -> (TradingLearning, AccountId, Arc<MemoryEventSink>) {
        let owner = AccountId::derive("trader");
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let events = Arc::new(EventBus::new());
        let sink = Arc::new(MemoryEventSink::new());
        events.add_sink(sink.clone());
        let auth = Arc::new(AuthorizationLayer::new(
            Arc::new(OneEntity(owner)),
            clock.clone(),
            events.clone(),
        ));
        let ledger = Arc::new(LearningLedger::new(
            LearningModule::trading(),
            MetricsEngine::default(),
            auth,
            clock,
            events,
        ));
        ledger.enable_learning(&owner, EntityId(1), hash_leaf(b"r0")).unwrap();
        (TradingLearning::new(ledger), owner, sink)
    }

    #[test]
    fn test_trade_then_outcome() {
        let (trading, owner, _) = setup();
        let e = EntityId(1);
        let idx = trading
            .record_trade(&owner, e, "ETH-USD", TradeSide::Buy, dec!(2), dec!(3000))
            .unwrap();
        assert_eq!(idx, 0);

        let scores = trading.record_trade_outcome(&owner, e, idx, dec!(150)).unwrap();
        assert_eq!(scores.profitability, 55);
        assert_eq!(trading.ledger().metrics(e).unwrap().total_interactions, 1);
        assert!(trading.trades(e)[0].outcome.as_ref().unwrap().is_profitable());
    }

    #[test]
    fn test_outcome_exactly_once() {
        let (trading, owner, _) = setup();
        let e = EntityId(1);
        trading
            .record_trade(&owner, e, "BTC-USD", TradeSide::Sell, dec!(1), dec!(60000))
            .unwrap();
        trading.record_trade_outcome(&owner, e, 0, dec!(-10)).unwrap();

        assert!(matches!(
            trading.record_trade_outcome(&owner, e, 0, dec!(10)),
            Err(NoemaError::Learning(LearningError::OutcomeAlreadyRecorded { index: 0, .. }))
        ));
        assert!(matches!(
            trading.record_trade_outcome(&owner, e, 9, dec!(10)),
            Err(NoemaError::Learning(LearningError::EntryNotFound { index: 9, .. }))
        ));
        // Rejected calls do not touch shared metrics
        assert_eq!(trading.ledger().metrics(e).unwrap().total_interactions, 1);
    }

    #[test]
    fn test_profitable_trader_milestone_once() {
        let (trading, owner, sink) = setup();
        let e = EntityId(1);
        for i in 0..10 {
            trading
                .record_trade(&owner, e, "ETH-USD", TradeSide::Buy, dec!(1), dec!(100))
                .unwrap();
            trading.record_trade_outcome(&owner, e, i, dec!(5)).unwrap();
        }
        assert!(trading.scores(e).profitability >= 80);

        let fired = sink.matching(|k| {
            matches!(k, EventKind::MilestoneAchieved { milestone, .. } if milestone == "profitable_trader")
        });
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_reset_starts_fresh_books() {
        let (trading, owner, sink) = setup();
        let e = EntityId(1);
        let profitable_run = |trading: &TradingLearning| {
            for i in 0..10 {
                trading
                    .record_trade(&owner, e, "ETH-USD", TradeSide::Buy, dec!(1), dec!(100))
                    .unwrap();
                trading.record_trade_outcome(&owner, e, i, dec!(5)).unwrap();
            }
        };
        let crossings = || {
            sink.matching(|k| {
                matches!(k, EventKind::MilestoneAchieved { milestone, .. } if milestone == "profitable_trader")
            })
            .len()
        };

        profitable_run(&trading);
        assert_eq!(crossings(), 1);

        let ledger = trading.ledger();
        ledger.disable_learning(&owner, e).unwrap();
        ledger.reset_learning(&owner, e).unwrap();
        assert!(trading.trades(e).is_empty());

        ledger.enable_learning(&owner, e, hash_leaf(b"r1")).unwrap();
        assert!(trading.trades(e).is_empty());
        assert_eq!(trading.scores(e), TradingScores { profitability: 50, risk_management: 50 });

        // New generation indexes from zero and may cross again
        profitable_run(&trading);
        assert_eq!(trading.trades(e).len(), 10);
        assert_eq!(crossings(), 2);
    }

    #[test]
    fn test_risk_snapshots() {
        let (trading, owner, _) = setup();
        let e = EntityId(1);
        trading.record_risk_snapshot(&owner, e, dec!(1000), 250, 90).unwrap();
        assert_eq!(trading.risk_snapshots(e).len(), 1);
        assert!(trading.scores(e).risk_management > 50);

        assert!(matches!(
            trading.record_risk_snapshot(&owner, e, dec!(1000), 250, 101),
            Err(NoemaError::Learning(LearningError::InvalidObservation(_)))
        ));
        assert_eq!(trading.risk_snapshots(e).len(), 1);
    }

    #[test]
    fn test_rejects_bad_trades_and_strangers() {
        let (trading, owner, _) = setup();
        let e = EntityId(1);
        assert!(trading
            .record_trade(&owner, e, "ETH-USD", TradeSide::Buy, dec!(0), dec!(1))
            .is_err());

        let stranger = AccountId::derive("stranger");
        assert!(matches!(
            trading.record_trade(&stranger, e, "ETH-USD", TradeSide::Buy, dec!(1), dec!(1)),
            Err(NoemaError::Access(_))
        ));
        assert!(trading.trades(e).is_empty());

        // Trading bots may journal through their logic target
        let bot = AccountId::derive("bot");
        assert!(trading
            .record_trade(&bot, e, "ETH-USD", TradeSide::Buy, dec!(1), dec!(1))
            .is_ok());
    }
}
