//! Selection transform sessions.
//!
//! A transform session moves (or clones) the selected pixels of one layer.
//! While it is live, every adjustment is a temp-history step, so undo and
//! redo scrub the session without touching the committed log. Discrete
//! adjustments (nudge, rotate, flip, retarget) push a step; a pointer drag
//! pushes once when it starts and then keeps replacing that step.
//!
//! Nothing reaches the document until [`SelectController::commit`], which
//! applies the net transform as one committed edit. [`SelectController::discard`]
//! drops the session and leaves the document exactly as it was.

#[cfg(test)]
#[path = "select_test.rs"]
mod select_test;

use tracing::debug;

use crate::document::{Document, DocumentError, SelectionTransformParams};
use crate::selection::Matrix;
use crate::temp_history::{SelectTransform, TempHistory, TempHistoryEntry};
use crate::viewport::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// Drawing or adjusting the selection outline.
    #[default]
    Select,
    /// Moving the selected pixels.
    Transform,
}

#[derive(Debug, Default)]
pub struct SelectController {
    mode: SelectMode,
    /// Layer the pixels are lifted from.
    layer_index: usize,
    /// State before any adjustment; what a full temp undo returns to.
    initial: Option<SelectTransform>,
    current: Option<SelectTransform>,
    /// Transform at the start of the active drag.
    drag_base: Option<Matrix>,
    drag_pushed: bool,
}

impl SelectController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> SelectMode {
        self.mode
    }

    #[must_use]
    pub fn is_transforming(&self) -> bool {
        self.mode == SelectMode::Transform
    }

    #[must_use]
    pub fn layer_index(&self) -> usize {
        self.layer_index
    }

    /// Live transform state, if a session is open.
    #[must_use]
    pub fn current(&self) -> Option<SelectTransform> {
        self.current
    }

    /// Open a session on `layer_index`. `false` when one is already open.
    pub fn begin_transform(&mut self, temp: &mut TempHistory, layer_index: usize, do_clone: bool) -> bool {
        if self.is_transforming() {
            return false;
        }
        let initial = SelectTransform {
            transform: Matrix::identity(),
            do_clone,
            target_layer_index: layer_index,
            background_is_transparent: false,
        };
        temp.set_is_active(true);
        self.mode = SelectMode::Transform;
        self.layer_index = layer_index;
        self.initial = Some(initial);
        self.current = Some(initial);
        self.drag_base = None;
        debug!(layer_index, do_clone, "transform session opened");
        true
    }

    // --- Discrete adjustments ---

    pub fn translate(&mut self, temp: &mut TempHistory, dx: f64, dy: f64) -> bool {
        self.adjust(temp, |t| t.transform = Matrix::translate(dx, dy).multiply(&t.transform))
    }

    /// Rotate by `degrees` around `pivot`.
    pub fn rotate(&mut self, temp: &mut TempHistory, degrees: f64, pivot: Point) -> bool {
        let step = about(pivot, &Matrix::rotate(degrees));
        self.adjust(temp, |t| t.transform = step.multiply(&t.transform))
    }

    /// Mirror across the vertical (`horizontal`) or horizontal axis through `pivot`.
    pub fn flip(&mut self, temp: &mut TempHistory, horizontal: bool, pivot: Point) -> bool {
        let scale = if horizontal { Matrix::scale(-1.0, 1.0) } else { Matrix::scale(1.0, -1.0) };
        let step = about(pivot, &scale);
        self.adjust(temp, |t| t.transform = step.multiply(&t.transform))
    }

    /// Send the moved pixels to another layer on commit.
    pub fn move_to_layer(&mut self, temp: &mut TempHistory, target_layer_index: usize) -> bool {
        self.adjust(temp, |t| t.target_layer_index = target_layer_index)
    }

    /// Whether the hole left behind stays transparent instead of white.
    pub fn set_background_transparent(&mut self, temp: &mut TempHistory, transparent: bool) -> bool {
        self.adjust(temp, |t| t.background_is_transparent = transparent)
    }

    // --- Drag ---

    /// Start a pointer drag. The first [`Self::drag_to`] pushes a step; later
    /// ones replace it.
    pub fn begin_drag(&mut self) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        self.drag_base = Some(current.transform);
        self.drag_pushed = false;
        true
    }

    /// Move the drag to offset `(dx, dy)` from where it started.
    pub fn drag_to(&mut self, temp: &mut TempHistory, dx: f64, dy: f64) -> bool {
        let (Some(base), Some(mut next)) = (self.drag_base, self.current) else {
            return false;
        };
        next.transform = Matrix::translate(dx, dy).multiply(&base);
        if Some(next) == self.current {
            return false;
        }
        let entry = TempHistoryEntry::SelectTransform(next);
        if self.drag_pushed {
            temp.replace_top(entry);
        } else {
            temp.push(entry);
            self.drag_pushed = true;
        }
        self.current = Some(next);
        true
    }

    pub fn end_drag(&mut self) {
        self.drag_base = None;
        self.drag_pushed = false;
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.drag_base.is_some()
    }

    // --- Session end ---

    /// Apply the net transform as one committed edit and close the session.
    /// Returns `Ok(false)` when there was nothing to apply.
    ///
    /// # Errors
    ///
    /// Propagates the document's rejection; the session is closed either way.
    pub fn commit(&mut self, temp: &mut TempHistory, doc: &mut Document<'_>) -> Result<bool, DocumentError> {
        let Some(current) = self.current else {
            return Ok(false);
        };
        let layer_index = self.layer_index;
        self.close(temp);

        let retargeted = current.target_layer_index != layer_index;
        // A clone in place still stamps; it thickens translucent pixels.
        if current.transform.is_identity() && !retargeted && !current.do_clone {
            debug!("transform session committed unchanged");
            return Ok(false);
        }
        let params = SelectionTransformParams {
            layer_index,
            transform: current.transform,
            target_layer_index: retargeted.then_some(current.target_layer_index),
            background_is_transparent: current.background_is_transparent,
        };
        if current.do_clone {
            doc.transform_clone_via_selection(&params)?;
        } else {
            doc.transform_via_selection(&params)?;
        }
        Ok(true)
    }

    /// Commit, then reopen a cloning session on the layer the pixels landed on.
    ///
    /// # Errors
    ///
    /// Propagates the commit's rejection; no new session is opened then.
    pub fn clone_transform(&mut self, temp: &mut TempHistory, doc: &mut Document<'_>) -> Result<bool, DocumentError> {
        let target = self.current.map_or(self.layer_index, |c| c.target_layer_index);
        self.commit(temp, doc)?;
        Ok(self.begin_transform(temp, target, true))
    }

    /// Drop the session without touching the document.
    pub fn discard(&mut self, temp: &mut TempHistory) {
        if self.is_transforming() {
            debug!("transform session discarded");
        }
        self.close(temp);
    }

    /// Re-read the live state after a temp undo or redo.
    pub fn sync_from_temp(&mut self, temp: &TempHistory) {
        if !self.is_transforming() {
            return;
        }
        self.current = match temp.top() {
            Some(TempHistoryEntry::SelectTransform(t)) => Some(*t),
            None => self.initial,
        };
    }

    fn adjust(&mut self, temp: &mut TempHistory, edit: impl FnOnce(&mut SelectTransform)) -> bool {
        let Some(mut next) = self.current else {
            return false;
        };
        edit(&mut next);
        if Some(next) == self.current {
            return false;
        }
        temp.push(TempHistoryEntry::SelectTransform(next));
        self.current = Some(next);
        true
    }

    fn close(&mut self, temp: &mut TempHistory) {
        temp.set_is_active(false);
        self.mode = SelectMode::Select;
        self.initial = None;
        self.current = None;
        self.drag_base = None;
        self.drag_pushed = false;
    }
}

/// `step` applied around `pivot` instead of the origin.
fn about(pivot: Point, step: &Matrix) -> Matrix {
    Matrix::translate(pivot.x, pivot.y)
        .multiply(step)
        .multiply(&Matrix::translate(-pivot.x, -pivot.y))
}
