//! In-process cache of label-prompt embeddings.
//!
//! Entries live for the lifetime of the owning classifier and are only ever
//! replaced as a whole category. Population is single-flight per category:
//! callers arriving while a population is in flight wait for it and receive
//! its outcome, success or failure.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::embedding::{Embedding, ProviderError};

/// A label together with the embedding of its prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEmbedding {
    pub label: &'static str,
    pub embedding: Embedding,
}

/// Ordered label embeddings for one category, in prompt order.
pub type LabelEmbeddings = Arc<[LabelEmbedding]>;

#[derive(Debug, Default)]
struct SlotState {
    entry: Option<LabelEmbeddings>,
    in_flight: bool,
    /// Number of finished populations.
    generation: u64,
    /// Error of the population that finished as `generation`.
    failure: Option<(u64, ProviderError)>,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    finished: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the population running as `joined` has finished.
    fn wait_for<'a>(&self, mut state: MutexGuard<'a, SlotState>, joined: u64) -> MutexGuard<'a, SlotState> {
        while state.in_flight && state.generation == joined {
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }
}

/// Marks the population finished even if `populate` unwinds, so waiters
/// are never left blocked.
struct Flight<'a> {
    slot: &'a Slot,
    done: bool,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut state = self.slot.lock();
            state.in_flight = false;
            state.generation += 1;
            self.slot.finished.notify_all();
        }
    }
}

#[derive(Debug, Default)]
pub struct LabelEmbeddingCache {
    slots: Mutex<HashMap<&'static str, Arc<Slot>>>,
}

impl LabelEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, category: &'static str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(category).or_default())
    }

    fn existing_slot(&self, category: &str) -> Option<Arc<Slot>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(category).cloned()
    }

    /// Return the cached entry for `category`, running `populate` if there is
    /// none yet.
    ///
    /// `populate` runs outside the lock. Callers that arrive while it runs
    /// share its result; a failure is returned to all of them and nothing is
    /// stored. Only a caller arriving after a failed population retries.
    pub fn get_or_populate<F>(&self, category: &'static str, populate: F) -> Result<LabelEmbeddings, ProviderError>
    where
        F: FnOnce() -> Result<Vec<LabelEmbedding>, ProviderError>,
    {
        let slot = self.slot(category);
        let mut state = slot.lock();

        loop {
            if let Some(cached) = state.entry.as_ref() {
                tracing::trace!(category, "Label embedding cache hit");
                return Ok(Arc::clone(cached));
            }
            if !state.in_flight {
                break;
            }

            let joined = state.generation;
            state = slot.wait_for(state, joined);

            if let Some(cached) = state.entry.as_ref() {
                return Ok(Arc::clone(cached));
            }
            if let Some((generation, err)) = &state.failure {
                if *generation == joined + 1 {
                    tracing::debug!(category, error = %err, "Sharing failed label population");
                    return Err(err.clone());
                }
            }
            // The joined population unwound; start over
        }

        state.in_flight = true;
        drop(state);

        let mut flight = Flight {
            slot: &slot,
            done: false,
        };
        let outcome = populate().map(LabelEmbeddings::from);

        let mut state = slot.lock();
        state.in_flight = false;
        state.generation += 1;
        let generation = state.generation;
        match &outcome {
            Ok(populated) => {
                tracing::debug!(category, labels = populated.len(), "Label embeddings cached");
                state.entry = Some(Arc::clone(populated));
            }
            Err(err) => state.failure = Some((generation, err.clone())),
        }
        flight.done = true;
        slot.finished.notify_all();

        outcome
    }

    /// Cached entry for `category`, if populated.
    pub fn get(&self, category: &str) -> Option<LabelEmbeddings> {
        let slot = self.existing_slot(category)?;
        let state = slot.lock();
        state.entry.clone()
    }

    /// Number of labels cached for `category`.
    pub fn entry_len(&self, category: &str) -> Option<usize> {
        self.get(category).map(|e| e.len())
    }

    /// Number of populated categories.
    pub fn len(&self) -> usize {
        let slots: Vec<Arc<Slot>> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.values().cloned().collect()
        };
        slots.iter().filter(|s| s.lock().entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. In-flight populations finish but are not kept.
    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
