//! Undo/redo orchestration across the committed and temporary histories.
//!
//! An active temporary session takes precedence: while it can step, undo and
//! redo move its cursor and leave the committed log alone. Otherwise the
//! committed log steps. Either way the caller gets the kind of step taken and
//! the document as it was before the step, or `None` when nothing happened.

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_test;

use tracing::debug;

use crate::doc::ComposedState;
use crate::history::HistoryStore;
use crate::temp_history::TempHistory;

/// Which history a step affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    Undo,
    Redo,
    TempUndo,
    TempRedo,
}

impl ExecutionType {
    /// True for steps that moved the committed log.
    #[must_use]
    pub fn is_committed(self) -> bool {
        matches!(self, Self::Undo | Self::Redo)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub kind: ExecutionType,
    /// Document before the step.
    pub composed_before: ComposedState,
}

type EnablementCallback = Box<dyn FnMut(bool, bool) + Send>;

#[derive(Default)]
pub struct HistoryExecutor {
    on_can_undo_redo_change: Option<EnablementCallback>,
}

impl HistoryExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback told `(can_undo, can_redo)` after each change.
    pub fn set_on_can_undo_redo_change(&mut self, callback: impl FnMut(bool, bool) + Send + 'static) {
        self.on_can_undo_redo_change = Some(Box::new(callback));
    }

    #[must_use]
    pub fn can_undo(history: &HistoryStore, temp: &TempHistory) -> bool {
        temp.can_decrease_index() || history.can_undo()
    }

    #[must_use]
    pub fn can_redo(history: &HistoryStore, temp: &TempHistory) -> bool {
        temp.can_increase_index() || history.can_redo()
    }

    pub fn undo(&mut self, history: &mut HistoryStore, temp: &mut TempHistory) -> Option<ExecutionResult> {
        let composed_before = history.composed().clone();
        let kind = if temp.is_active() && temp.decrease_index() {
            ExecutionType::TempUndo
        } else if history.undo() {
            ExecutionType::Undo
        } else {
            debug!("undo: nothing to do");
            return None;
        };
        self.notify(history, temp);
        Some(ExecutionResult { kind, composed_before })
    }

    pub fn redo(&mut self, history: &mut HistoryStore, temp: &mut TempHistory) -> Option<ExecutionResult> {
        let composed_before = history.composed().clone();
        let kind = if temp.is_active() && temp.increase_index() {
            ExecutionType::TempRedo
        } else if history.redo() {
            ExecutionType::Redo
        } else {
            debug!("redo: nothing to do");
            return None;
        };
        self.notify(history, temp);
        Some(ExecutionResult { kind, composed_before })
    }

    /// Recompute enablement and tell the callback. Call after any push.
    pub fn notify(&mut self, history: &HistoryStore, temp: &TempHistory) {
        let can_undo = Self::can_undo(history, temp);
        let can_redo = Self::can_redo(history, temp);
        if let Some(callback) = self.on_can_undo_redo_change.as_mut() {
            callback(can_undo, can_redo);
        }
    }
}
