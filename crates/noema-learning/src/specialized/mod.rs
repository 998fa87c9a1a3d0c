//! Domain-specialised learning modules
//!
//! Each module composes a [`LearningLedger`](crate::ledger::LearningLedger)
//! and keeps its own append-only journals and rolling scores per entity.

pub mod creator;
pub mod trading;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use noema_common::error::LearningError;
use noema_common::types::entity::EntityId;

pub use creator::CreatorLearning;
pub use trading::TradingLearning;

/// Entry that may receive exactly one outcome
pub trait JournalEntry {
    fn has_outcome(&self) -> bool;
}

/// Append-only indexed log
#[derive(Debug, Clone, Serialize)]
pub struct Journal<T> {
    name: &'static str,
    entries: Vec<T>,
}

impl<T: Clone> Journal<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Index the next append will receive
    pub fn next_index(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn append(&mut self, entry: T) -> u64 {
        self.entries.push(entry);
        self.entries.len() as u64 - 1
    }

    pub fn get(&self, index: u64) -> Option<&T> {
        self.entries.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }
}

impl<T: Clone + JournalEntry> Journal<T> {
    /// Fill in the outcome of `index` exactly once
    pub fn set_outcome<F>(&mut self, index: u64, fill: F) -> Result<&T, LearningError>
    where
        F: FnOnce(&mut T),
    {
        let name = self.name;
        let entry = self
            .entries
            .get_mut(index as usize)
            .ok_or(LearningError::EntryNotFound { journal: name, index })?;
        if entry.has_outcome() {
            return Err(LearningError::OutcomeAlreadyRecorded { journal: name, index });
        }
        fill(&mut *entry);
        Ok(entry)
    }
}

/// Per-entity book opened under one ledger generation
pub trait Book {
    fn open(generation: u64) -> Self;
    fn generation(&self) -> u64;
}

/// Books keyed by entity; a book from an older generation is never served
pub struct Shelf<B> {
    slots: DashMap<EntityId, Arc<Mutex<B>>>,
}

impl<B: Book> Shelf<B> {
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// Book for `generation`, replacing a stale one
    pub fn current(&self, entity: EntityId, generation: u64) -> Arc<Mutex<B>> {
        let mut slot = self
            .slots
            .entry(entity)
            .or_insert_with(|| Arc::new(Mutex::new(B::open(generation))));
        let stale = slot.lock().generation() != generation;
        if stale {
            *slot = Arc::new(Mutex::new(B::open(generation)));
        }
        Arc::clone(slot.value())
    }

    /// Read the book only if it belongs to `generation`
    pub fn view<R, F>(&self, entity: EntityId, generation: Option<u64>, read: F) -> Option<R>
    where
        F: FnOnce(&B) -> R,
    {
        let generation = generation?;
        let slot = Arc::clone(self.slots.get(&entity)?.value());
        let book = slot.lock();
        if book.generation() == generation {
            Some(read(&book))
        } else {
            None
        }
    }
}

impl<B: Book> Default for Shelf<B> {
    fn default() -> Self {
        Self::new()
    }
}
