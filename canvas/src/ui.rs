//! UI-facing state and notifications.
//!
//! The engine never draws chrome itself. It keeps the small amount of state a
//! host UI renders (tool, colors, tool settings, undo/redo enablement) and
//! emits `UiEvent`s when that state, the drawing flag, or the live transform
//! changes. Events go to registered listeners; a host without listeners
//! polls them from a bounded queue instead.

#[cfg(test)]
#[path = "ui_test.rs"]
mod ui_test;

use std::collections::VecDeque;

use serde::Serialize;

use crate::consts::UI_EVENT_QUEUE_LIMIT;
use crate::input::Tool;
use crate::raster::Rgb;
use crate::tools::{FillConfig, GradientConfig, ShapeConfig, TextConfig};

/// Persistent UI state visible to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// Currently active tool.
    pub tool: Tool,
    /// Paint color.
    pub primary_color: Rgb,
    /// Alternate color; gradients run from primary to secondary.
    pub secondary_color: Rgb,
    pub can_undo: bool,
    pub can_redo: bool,
    pub shape: ShapeConfig,
    pub gradient: GradientConfig,
    pub fill: FillConfig,
    pub text: TextConfig,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tool: Tool::default(),
            primary_color: Rgb::BLACK,
            secondary_color: Rgb::WHITE,
            can_undo: false,
            can_redo: false,
            shape: ShapeConfig::default(),
            gradient: GradientConfig::default(),
            fill: FillConfig::default(),
            text: TextConfig::default(),
        }
    }
}

/// Notification for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Something in [`UiState`] changed.
    UiStateChanged,
    /// A stroke started (`true`) or ended (`false`).
    IsDrawing(bool),
    /// The live selection transform changed or ended.
    TransformChanged,
    /// Short user-facing message ("Undo", "Redo", ...).
    StatusMessage(String),
}

type UiListener = Box<dyn FnMut(&UiEvent) + Send>;

/// Fan-out for [`UiEvent`]s.
#[derive(Default)]
pub struct UiEvents {
    listeners: Vec<UiListener>,
    queue: VecDeque<UiEvent>,
}

impl UiEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver events to `listener`. Once any listener exists, events are no
    /// longer queued for polling.
    pub fn subscribe(&mut self, listener: impl FnMut(&UiEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
        self.queue.clear();
    }

    pub fn emit(&mut self, event: UiEvent) {
        if self.listeners.is_empty() {
            if self.queue.len() == UI_EVENT_QUEUE_LIMIT {
                self.queue.pop_front();
            }
            self.queue.push_back(event);
            return;
        }
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Number of events waiting for the next drain.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Take every queued event.
    pub fn drain(&mut self) -> Vec<UiEvent> {
        self.queue.drain(..).collect()
    }
}

type ModalListener = Box<dyn FnMut(usize) + Send>;

/// Number of open modal dialogs. While non-zero, shortcuts and tool input
/// are frozen.
#[derive(Default)]
pub struct ModalCounter {
    count: usize,
    listeners: Vec<ModalListener>,
}

impl ModalCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.count > 0
    }

    pub fn open(&mut self) {
        self.count += 1;
        self.notify();
    }

    /// Close one modal. Extra closes are ignored.
    pub fn close(&mut self) {
        if self.count == 0 {
            return;
        }
        self.count -= 1;
        self.notify();
    }

    /// Register a callback told the new count after every change.
    pub fn subscribe(&mut self, listener: impl FnMut(usize) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self) {
        for listener in &mut self.listeners {
            listener(self.count);
        }
    }
}
