//! Creator learning module
//!
//! Journals published content and audience segments. Content performance is
//! filled in once per entry and drives the creativity score; audience
//! segments drive trend adaptation.

use std::sync::Arc;

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
use crate::module::CREATOR_MILESTONES;
use crate::score::RollingScore;

const CONTENT: &str = "content";
const AUDIENCE: &str = "audience_segments";

/// Engagement at or above this counts as a successful piece
pub const ENGAGEMENT_SUCCESS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPerformance {
    /// Engagement, 0-100
    pub engagement: u64,
    pub views: u64,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub index: u64,
    /// Off-chain content reference (URI or hash)
    pub content_ref: String,
    pub category: String,
    pub timestamp: i64,
    pub performance: Option<ContentPerformance>,
}

impl JournalEntry for ContentRecord {
    fn has_outcome(&self) -> bool {
        self.performance.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceSegment {
    pub index: u64,
    pub segment: String,
    pub size: u64,
    /// How well recent content matched the segment's trends, 0-100
    pub trend_alignment: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorScores {
    pub creativity: u64,
    pub trend_adaptation: u64,
}

#[derive(Debug, Clone)]
struct CreatorBook {
    content: Journal<ContentRecord>,
    audience: Journal<AudienceSegment>,
    creativity: RollingScore,
    trend_adaptation: RollingScore,
    milestones: MilestoneBook,
    generation: u64,
}

impl Book for CreatorBook {
    fn open(generation: u64) -> Self {
        Self {
            content: Journal::new(CONTENT),
            audience: Journal::new(AUDIENCE),
            creativity: RollingScore::new(),
            trend_adaptation: RollingScore::new(),
            milestones: MilestoneBook::new(),
            generation,
        }
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

impl CreatorBook {
    fn scores(&self) -> CreatorScores {
        CreatorScores {
            creativity: self.creativity.value(),
            trend_adaptation: self.trend_adaptation.value(),
        }
    }
}

/// Creator journals layered over a learning ledger
pub struct CreatorLearning {
    ledger: Arc<LearningLedger>,
    books: Shelf<CreatorBook>,
    guard: GuardScope,
}

impl CreatorLearning {
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

    pub fn record_content(
        &self,
        caller: &AccountId,
        entity: EntityId,
        content_ref: &str,
        category: &str,
    ) -> Result<u64> {
        let _guard = self.guard.enter(entity)?;
        let generation = self.ledger.ensure_recorder(caller, entity)?;
        if content_ref.is_empty() {
            return Err(LearningError::InvalidObservation("empty content reference".to_string()).into());
        }

        let now = self.ledger.clock().unix();
        let mut events = Vec::new();
        let index = {
            let slot = self.books.current(entity, generation);
            let mut book = slot.lock();
            let next = book.content.next_index();
            let index = book.content.append(ContentRecord {
                index: next,
                content_ref: content_ref.to_string(),
                category: category.to_string(),
                timestamp: now,
                performance: None,
            });
            events.push(EventKind::JournalEntryRecorded {
                entity,
                journal: CONTENT.to_string(),
                index,
            });
            let count = book.content.len() as u64;
            let fired = book.milestones.observe(CREATOR_MILESTONES, Metric::Content, count);
            push_milestones(entity, fired, now, &mut events);
            index
        };

        debug!(entity = %entity, index, content_ref, "Content recorded");
        self.ledger.events().publish_all(events);
        Ok(index)
    }

    /// Fill in a content entry's performance; once per entry
    pub fn record_content_performance(
        &self,
        caller: &AccountId,
        entity: EntityId,
        index: u64,
        engagement: u64,
        views: u64,
    ) -> Result<CreatorScores> {
        let _guard = self.guard.enter(entity)?;
        let generation = self.ledger.ensure_recorder(caller, entity)?;

        let now = self.ledger.clock().unix();
        let mut events = Vec::new();
        let scores = {
            let slot = self.books.current(entity, generation);
            let mut book = slot.lock();
            match book.content.get(index) {
                None => return Err(LearningError::EntryNotFound { journal: CONTENT, index }.into()),
                Some(entry) if entry.has_outcome() => {
                    return Err(LearningError::OutcomeAlreadyRecorded { journal: CONTENT, index }.into())
                }
                Some(_) => {}
            }

            let creativity = book.creativity.observed(engagement)?;
            let success = engagement >= ENGAGEMENT_SUCCESS;
            self.ledger.record_outcome(entity, "content_performance", success)?;

            book.content.set_outcome(index, |c| {
                c.performance = Some(ContentPerformance {
                    engagement,
                    views,
                    recorded_at: now,
                })
            })?;
            book.creativity = creativity;
            events.push(EventKind::JournalOutcomeRecorded {
                entity,
                journal: CONTENT.to_string(),
                index,
                success,
            });
            let fired = book
                .milestones
                .observe(CREATOR_MILESTONES, Metric::Creativity, creativity.value());
            push_milestones(entity, fired, now, &mut events);
            book.scores()
        };

        self.ledger.events().publish_all(events);
        Ok(scores)
    }

    pub fn record_audience_segment(
        &self,
        caller: &AccountId,
        entity: EntityId,
        segment: &str,
        size: u64,
        trend_alignment: u64,
    ) -> Result<u64> {
        let _guard = self.guard.enter(entity)?;
        let generation = self.ledger.ensure_recorder(caller, entity)?;

        let now = self.ledger.clock().unix();
        let mut events = Vec::new();
        let index = {
            let slot = self.books.current(entity, generation);
            let mut book = slot.lock();
            let trend_adaptation = book.trend_adaptation.observed(trend_alignment)?;

            let next = book.audience.next_index();
            let index = book.audience.append(AudienceSegment {
                index: next,
                segment: segment.to_string(),
                size,
                trend_alignment,
                timestamp: now,
            });
            book.trend_adaptation = trend_adaptation;
            events.push(EventKind::JournalEntryRecorded {
                entity,
                journal: AUDIENCE.to_string(),
                index,
            });
            let fired = book.milestones.observe(
                CREATOR_MILESTONES,
                Metric::TrendAdaptation,
                trend_adaptation.value(),
            );
            push_milestones(entity, fired, now, &mut events);
            index
        };

        self.ledger.events().publish_all(events);
        Ok(index)
    }

    pub fn content(&self, entity: EntityId) -> Vec<ContentRecord> {
        self.books
            .view(entity, self.ledger.generation(entity), |book| book.content.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn audience_segments(&self, entity: EntityId) -> Vec<AudienceSegment> {
        self.books
            .view(entity, self.ledger.generation(entity), |book| book.audience.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn scores(&self, entity: EntityId) -> CreatorScores {
        self.books
            .view(entity, self.ledger.generation(entity), |book| book.scores())
            .unwrap_or_else(|| CreatorBook::open(0).scores())
    }
}

impl LearningHook for CreatorLearning {
    fn is_learning_enabled(&self, entity: EntityId) -> bool {
        self.ledger.is_learning_enabled(entity)
    }

    fn record_execution(&self, entity: EntityId, kind: &str, success: bool) -> Result<()> {
        self.ledger.record_execution(entity, kind, success)
    }
}
