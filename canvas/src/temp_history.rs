//! Uncommitted history for one interactive operation.
//!
//! While an operation such as a selection transform is live, its steps are
//! pushed here instead of into the committed log. The stack has its own
//! cursor, is only meaningful while active, and is thrown away when the
//! operation is committed or discarded.

#[cfg(test)]
#[path = "temp_history_test.rs"]
mod temp_history_test;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::selection::Matrix;

/// Snapshot of a selection transform session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectTransform {
    pub transform: Matrix,
    pub do_clone: bool,
    pub target_layer_index: usize,
    pub background_is_transparent: bool,
}

/// One uncommitted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum TempHistoryEntry {
    SelectTransform(SelectTransform),
}

#[derive(Debug, Default)]
pub struct TempHistory {
    entries: Vec<TempHistoryEntry>,
    cursor: usize,
    is_active: bool,
}

impl TempHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivating also clears.
    pub fn set_is_active(&mut self, active: bool) {
        self.is_active = active;
        if !active {
            self.clear();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Append a step, dropping anything redoable.
    pub fn push(&mut self, entry: TempHistoryEntry) {
        if !self.is_active {
            debug!("temp history inactive; push ignored");
            return;
        }
        self.entries.truncate(self.cursor);
        self.entries.push(entry);
        self.cursor += 1;
    }

    /// Overwrite the step under the cursor; pushes when there is none.
    pub fn replace_top(&mut self, entry: TempHistoryEntry) {
        if !self.is_active {
            debug!("temp history inactive; replace ignored");
            return;
        }
        if self.cursor == 0 {
            self.push(entry);
            return;
        }
        self.entries.truncate(self.cursor);
        if let Some(top) = self.entries.last_mut() {
            *top = entry;
        }
    }

    #[must_use]
    pub fn can_decrease_index(&self) -> bool {
        self.is_active && self.cursor > 0
    }

    #[must_use]
    pub fn can_increase_index(&self) -> bool {
        self.is_active && self.cursor < self.entries.len()
    }

    pub fn decrease_index(&mut self) -> bool {
        if !self.can_decrease_index() {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn increase_index(&mut self) -> bool {
        if !self.can_increase_index() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Steps up to the cursor; the last one is the current state.
    #[must_use]
    pub fn entries(&self) -> &[TempHistoryEntry] {
        &self.entries[..self.cursor]
    }

    #[must_use]
    pub fn top(&self) -> Option<&TempHistoryEntry> {
        self.entries().last()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}
