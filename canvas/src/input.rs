//! Input model: tools, modifier keys, and the keyboard shortcut table.
//!
//! `Tool` and `Modifiers` capture the user's intent at the time of a pointer
//! or key event; `PointerEvent` is one raw pointer sample. `Shortcut::from_key`
//! maps a key press to an editor command. Whether the command may run (modal
//! open, stroke in progress) is decided by the engine, not here.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use serde::{Deserialize, Serialize};

use crate::viewport::Point;

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    /// Freehand painting with the current brush (default).
    #[default]
    Brush,
    /// Flood fill from the clicked pixel.
    Fill,
    /// Place text at the clicked point.
    Text,
    /// Drag out a rectangle, ellipse or line.
    Shape,
    /// Drag out a linear or radial gradient.
    Gradient,
    /// Drag out a selection, or move the selected pixels.
    Select,
}

impl Tool {
    /// Whether a drag with this tool ends in a single document edit on release.
    #[must_use]
    pub fn is_drag_edit(self) -> bool {
        matches!(self, Self::Shape | Self::Gradient | Self::Select)
    }
}

/// Keyboard/mouse modifier keys held during an event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    /// Shift key is held.
    pub shift: bool,
    /// Ctrl key is held.
    pub ctrl: bool,
    /// Alt / Option key is held.
    pub alt: bool,
    /// Meta / Command key is held.
    pub meta: bool,
}

impl Modifiers {
    /// Ctrl on most platforms, Command on macOS.
    #[must_use]
    pub fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

/// One pointer sample in screen space.
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub screen: Point,
    /// 0..=1; mice report 0.5.
    pub pressure: f32,
    /// Milliseconds, host clock.
    pub time: f64,
    pub is_coalesced: bool,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    /// Mouse-like sample: half pressure, no modifiers.
    #[must_use]
    pub fn new(x: f64, y: f64, time: f64) -> Self {
        Self { screen: Point::new(x, y), pressure: 0.5, time, is_coalesced: false, modifiers: Modifiers::default() }
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// A keyboard key, named as the host reports it (e.g. `"z"`, `"Enter"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(pub String);

impl Key {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// An editor command bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
    /// Commit the live interactive operation.
    Apply,
    /// Cancel the live interactive operation, or drop the selection.
    Discard,
    /// Clear the active layer (inside the selection, if any).
    EraseLayer,
    ToggleEraser,
    CycleBrush,
    /// Swap primary and secondary colors.
    SwapColors,
    DecreaseBrushSize,
    IncreaseBrushSize,
    SelectTool(Tool),
}

impl Shortcut {
    /// Look up the command for a key press.
    #[must_use]
    pub fn from_key(key: &Key, modifiers: Modifiers) -> Option<Self> {
        let name = key.0.as_str();
        if modifiers.command() {
            return match name.to_ascii_lowercase().as_str() {
                "z" if modifiers.shift => Some(Self::Redo),
                "z" => Some(Self::Undo),
                "y" => Some(Self::Redo),
                _ => None,
            };
        }
        if modifiers.alt {
            return None;
        }
        let shortcut = match name {
            "Enter" => Self::Apply,
            "Escape" => Self::Discard,
            "Delete" | "Backspace" => Self::EraseLayer,
            "[" => Self::DecreaseBrushSize,
            "]" => Self::IncreaseBrushSize,
            _ => match name.to_ascii_lowercase().as_str() {
                "e" => Self::ToggleEraser,
                "b" => Self::CycleBrush,
                "x" => Self::SwapColors,
                "f" => Self::SelectTool(Tool::Fill),
                "t" => Self::SelectTool(Tool::Text),
                "u" => Self::SelectTool(Tool::Shape),
                "g" => Self::SelectTool(Tool::Gradient),
                "l" => Self::SelectTool(Tool::Select),
                _ => return None,
            },
        };
        Some(shortcut)
    }
}
