//! Committed history: an append-only log of entry patches with a cursor.
//!
//! The current document is always `oldest` with `entries[..cursor]` folded on
//! top; the fold result is cached and kept in step on every cursor move.
//! Appending while the cursor is behind the tip drops the redo branch.
//!
//! Pausing groups a burst of history-worthy pushes (a slider drag, say) into
//! one step: the first push of the burst appends, every later push amends that
//! entry field by field. Pushes that are not history-worthy never create a
//! step; they are folded into the entry under the cursor, or into the oldest
//! snapshot when the cursor sits at the start.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::doc::{ComposedState, HistoryEntry, HistoryEntryData};

/// Handle returned by [`HistoryStore::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ComposedState) + Send>;

/// How a push landed in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A new step was appended.
    Appended,
    /// The open paused step absorbed the patch.
    Amended,
    /// The patch was folded in without creating a step.
    Folded,
}

pub struct HistoryStore {
    oldest: ComposedState,
    entries: Vec<HistoryEntry>,
    cursor: usize,
    composed: ComposedState,
    total_index: u64,
    next_entry_index: u64,
    paused: bool,
    burst_open: bool,
    max_entries: Option<usize>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
}

impl HistoryStore {
    /// Start a session whose undo floor is `oldest`.
    #[must_use]
    pub fn new(oldest: ComposedState) -> Self {
        Self {
            composed: oldest.clone(),
            oldest,
            entries: Vec::new(),
            cursor: 0,
            total_index: 0,
            next_entry_index: 0,
            paused: false,
            burst_open: false,
            max_entries: None,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Bound the number of committed entries; older ones fold into the base.
    #[must_use]
    pub fn with_max_entries(mut self, max: Option<usize>) -> Self {
        self.max_entries = max.map(|m| m.max(1));
        self.enforce_limit();
        self
    }

    // --- Queries ---

    #[must_use]
    pub fn composed(&self) -> &ComposedState {
        &self.composed
    }

    #[must_use]
    pub fn oldest(&self) -> &ComposedState {
        &self.oldest
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Change counter: bumped by appends, undos and redos. Compare against a
    /// saved value to detect unsaved work.
    #[must_use]
    pub fn total_index(&self) -> u64 {
        self.total_index
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // --- Mutation ---

    /// Record a change.
    ///
    /// Empty patches are ignored and report [`PushOutcome::Folded`].
    pub fn push(&mut self, data: HistoryEntryData, is_history_worthy: bool) -> PushOutcome {
        if data.is_empty() {
            return PushOutcome::Folded;
        }
        self.composed.apply(&data);

        let outcome = if !is_history_worthy {
            match self.cursor.checked_sub(1).and_then(|i| self.entries.get_mut(i)) {
                Some(entry) => entry.data.merge(data),
                None => self.oldest.apply(&data),
            }
            PushOutcome::Folded
        } else if self.paused && self.burst_open && self.cursor == self.entries.len() && self.cursor > 0 {
            if let Some(entry) = self.entries.last_mut() {
                entry.data.merge(data);
            }
            PushOutcome::Amended
        } else {
            self.entries.truncate(self.cursor);
            self.entries.push(HistoryEntry { index: self.next_entry_index, data });
            self.next_entry_index += 1;
            self.cursor += 1;
            self.total_index += 1;
            self.burst_open = self.paused;
            self.enforce_limit();
            PushOutcome::Appended
        };

        debug!(?outcome, cursor = self.cursor, len = self.entries.len(), "history push");
        self.notify();
        outcome
    }

    /// Step the cursor back. `false` when already at the start.
    pub fn undo(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.total_index += 1;
        self.burst_open = false;
        self.composed = self.compose_at(self.cursor);
        self.notify();
        true
    }

    /// Step the cursor forward. `false` when already at the tip.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.entries.get(self.cursor) else {
            return false;
        };
        self.composed.apply(&entry.data);
        self.cursor += 1;
        self.total_index += 1;
        self.burst_open = false;
        self.notify();
        true
    }

    /// Enter or leave coalescing mode. Leaving closes the current burst.
    pub fn pause(&mut self, paused: bool) {
        self.paused = paused;
        self.burst_open = false;
    }

    /// Pause so that the next push amends the tip entry, continuing a burst
    /// that an earlier pause region started.
    pub fn pause_continuing(&mut self) {
        self.paused = true;
        self.burst_open = self.cursor > 0 && self.cursor == self.entries.len();
    }

    /// Pause until the returned guard drops.
    pub fn pause_scope(&mut self) -> PauseGuard<'_> {
        self.pause(true);
        PauseGuard { store: self }
    }

    /// Discard all entries and restart from `oldest`.
    pub fn reset(&mut self, oldest: ComposedState) {
        self.composed = oldest.clone();
        self.oldest = oldest;
        self.entries.clear();
        self.cursor = 0;
        self.total_index += 1;
        self.burst_open = false;
        self.notify();
    }

    // --- Listeners ---

    /// Register a callback run synchronously after every state change.
    pub fn add_listener(&mut self, listener: impl FnMut(&ComposedState) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    // --- Internals ---

    /// Fold `entries[..cursor]` onto the oldest snapshot.
    #[must_use]
    pub fn compose_at(&self, cursor: usize) -> ComposedState {
        let mut state = self.oldest.clone();
        for entry in self.entries.iter().take(cursor) {
            state.apply(&entry.data);
        }
        state
    }

    fn enforce_limit(&mut self) {
        let Some(max) = self.max_entries else {
            return;
        };
        while self.entries.len() > max && self.cursor > 0 {
            let dropped = self.entries.remove(0);
            self.oldest.apply(&dropped.data);
            self.cursor -= 1;
            debug!(index = dropped.index, "history entry folded into base");
        }
    }

    fn notify(&mut self) {
        for (_, listener) in &mut self.listeners {
            listener(&self.composed);
        }
    }
}

/// Keeps the history paused; resumes on drop.
pub struct PauseGuard<'a> {
    store: &'a mut HistoryStore,
}

impl Deref for PauseGuard<'_> {
    type Target = HistoryStore;

    fn deref(&self) -> &HistoryStore {
        self.store
    }
}

impl DerefMut for PauseGuard<'_> {
    fn deref_mut(&mut self) -> &mut HistoryStore {
        self.store
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.store.pause(false);
    }
}
