//! Headless editor engine.
//!
//! DESIGN
//! ======
//! `EngineCore` owns all live editor state: committed and temporary history,
//! the undo/redo executor, the input chain, brushes, tool settings, the
//! selection transform session, the viewport and the modal counter. It is
//! fully synchronous, so tests drive it directly with pointer and key events.
//!
//! `Engine` wraps the core with the journal replayer and the async storage
//! sequencing: load the journal, replay it, seed a blank document for a new
//! project, then start recording.
//!
//! Every document change goes through [`EngineCore::edit`], which commits any
//! live transform session first, runs the operation on a short-lived
//! [`Document`] and then refreshes undo/redo enablement. Replay handlers use
//! the same path, so a replayed journal rebuilds exactly what was recorded.
//!
//! ERROR HANDLING
//! ==============
//! Rejected document edits come back as `Err(DocumentError)` to live callers
//! and as skipped records during replay. Input handlers never fail; they
//! return whether the event was consumed.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::sync::Arc;

use image::RgbaImage;
use journal::RecordedEvent;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::brush::{BrushConfigPatch, BrushSet};
use crate::chain::{DrawEvent, DrawPoint, EventChain, LineSegment};
use crate::chain_recorder::{ChainRecorder, DRAW_EVENT, DrawRecord, StrokeContext, decode_samples};
use crate::config::EngineConfig;
use crate::consts::BRUSH_SIZE_STEP;
use crate::doc::{ComposedState, LayerId, Size};
use crate::document::{
    AddLayerParams, Document, DocumentError, FillParams, FilterParams, FlipParams, FloodFillParams, GradientParams,
    LayerIndexParams, MergeLayersParams, MixModeParams, MoveLayerParams, OpacityParams, RenameLayerParams,
    ResetParams, ResizeCanvasParams, ResizeParams, RotateParams, SelectionParams, SelectionTransformParams,
    ShapeParams, TextParams, VisibilityParams, tags,
};
use crate::executor::{ExecutionType, HistoryExecutor};
use crate::history::HistoryStore;
use crate::input::{Key, Modifiers, PointerEvent, Shortcut, Tool};
use crate::raster::Rgb;
use crate::recorder::{EventRecorder, RecorderError};
use crate::replay::{ReplayError, ReplaySummary, Replayer, decode_payload};
use crate::select::SelectController;
use crate::selection::Selection;
use crate::storage::{StorageError, StorageProvider};
use crate::temp_history::TempHistory;
use crate::tools::{FillConfigPatch, GradientConfigPatch, ShapeConfigPatch, TextConfigPatch};
use crate::ui::{ModalCounter, UiEvent, UiEvents, UiState};
use crate::viewport::{Point, Viewport};

/// Pointer gesture tracked between pointer-down and pointer-up.
enum Gesture {
    Idle,
    /// Brush stroke painting into a private copy of the layer.
    Stroke { layer: LayerId, image: RgbaImage },
    /// Shape, gradient or selection outline being dragged out.
    Drag { tool: Tool, start: Point, current: Point },
    /// Selected pixels being dragged in a transform session.
    MoveSelection { start: Point },
}

/// Core engine state: all logic that does not need a runtime or storage.
pub struct EngineCore {
    config: EngineConfig,
    history: HistoryStore,
    temp: TempHistory,
    executor: HistoryExecutor,
    chain: EventChain,
    brushes: BrushSet,
    ui: UiState,
    events: UiEvents,
    select: SelectController,
    viewport: Viewport,
    modals: ModalCounter,
    recorder: Option<EventRecorder>,
    gesture: Gesture,
    /// Finished stroke waiting for its pixels to be committed.
    stroke_record: Option<DrawRecord>,
    /// Last brush position, for shift-click lines.
    last_point: Option<DrawPoint>,
    /// Brush to go back to when the eraser is toggled off.
    eraser_return: Option<&'static str>,
    /// `(layer index, history total index)` of the opacity drag in progress.
    pub(crate) opacity_drag: Option<(usize, u64)>,
}

impl EngineCore {
    /// Engine with a blank default canvas and no journal.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, String::new(), None)
    }

    /// Unjournaled engine whose document belongs to `project_id`, for
    /// read-only replays of a stored project.
    #[must_use]
    pub fn for_project(config: EngineConfig, project_id: impl Into<String>) -> Self {
        Self::build(config, project_id.into(), None)
    }

    /// Engine that journals every edit through `recorder`.
    #[must_use]
    pub fn with_recorder(config: EngineConfig, recorder: EventRecorder) -> Self {
        let project_id = recorder.project_id().to_owned();
        Self::build(config, project_id, Some(recorder))
    }

    fn build(config: EngineConfig, project_id: String, recorder: Option<EventRecorder>) -> Self {
        let size = Size::new(config.default_width, config.default_height);
        let history = HistoryStore::new(ComposedState::blank(project_id, size, Some(Rgb::WHITE)))
            .with_max_entries(config.history_limit());
        let mut chain = EventChain::new(config.smoothing);
        if recorder.is_some() {
            chain = chain.with_recorder(ChainRecorder::new());
        }
        Self {
            config,
            history,
            temp: TempHistory::new(),
            executor: HistoryExecutor::new(),
            chain,
            brushes: BrushSet::new(),
            ui: UiState::default(),
            events: UiEvents::new(),
            select: SelectController::new(),
            viewport: Viewport::default(),
            modals: ModalCounter::new(),
            recorder,
            gesture: Gesture::Idle,
            stroke_record: None,
            last_point: None,
            eraser_return: None,
            opacity_drag: None,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current document.
    #[must_use]
    pub fn composed(&self) -> &ComposedState {
        self.history.composed()
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryStore {
        &mut self.history
    }

    #[must_use]
    pub fn temp_history(&self) -> &TempHistory {
        &self.temp
    }

    #[must_use]
    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    #[must_use]
    pub fn brushes(&self) -> &BrushSet {
        &self.brushes
    }

    #[must_use]
    pub fn select(&self) -> &SelectController {
        &self.select
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[must_use]
    pub fn modals(&self) -> &ModalCounter {
        &self.modals
    }

    pub fn modals_mut(&mut self) -> &mut ModalCounter {
        &mut self.modals
    }

    #[must_use]
    pub fn recorder(&self) -> Option<&EventRecorder> {
        self.recorder.as_ref()
    }

    pub fn recorder_mut(&mut self) -> Option<&mut EventRecorder> {
        self.recorder.as_mut()
    }

    /// A brush stroke is in progress.
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.chain.is_drawing()
    }

    #[must_use]
    pub fn smoothing(&self) -> u8 {
        self.chain.smoothing_level()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        HistoryExecutor::can_undo(&self.history, &self.temp)
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        HistoryExecutor::can_redo(&self.history, &self.temp)
    }

    // --- Notifications ---

    pub fn subscribe(&mut self, listener: impl FnMut(&UiEvent) + Send + 'static) {
        self.events.subscribe(listener);
    }

    /// Take every UI event emitted since the last call.
    pub fn take_events(&mut self) -> Vec<UiEvent> {
        self.events.drain()
    }

    pub fn set_on_can_undo_redo_change(&mut self, callback: impl FnMut(bool, bool) + Send + 'static) {
        self.executor.set_on_can_undo_redo_change(callback);
    }

    // --- Document edits ---

    /// Run one document operation.
    ///
    /// Commits any live transform session first, then refreshes undo/redo
    /// enablement.
    ///
    /// # Errors
    ///
    /// Whatever the operation rejects; the document is unchanged then.
    pub fn edit<T>(&mut self, op: impl FnOnce(&mut Document<'_>) -> Result<T, DocumentError>) -> Result<T, DocumentError> {
        self.apply_uncommitted();
        let size_before = self.history.composed().size;
        let result = op(&mut Document::new(&mut self.history, self.recorder.as_mut(), &self.config));
        if let Err(e) = &result {
            debug!(error = %e, "edit rejected");
        }
        let size = self.history.composed().size;
        if size != size_before {
            self.viewport.fit(size);
        }
        self.after_push();
        result
    }

    /// Start over with one blank layer.
    ///
    /// # Errors
    ///
    /// [`DocumentError::InvalidSize`] for a zero or oversized canvas.
    pub fn reset(&mut self, params: &ResetParams) -> Result<LayerId, DocumentError> {
        self.edit(|doc| doc.reset(params))
    }

    /// Replace the selection; `None` clears it.
    pub fn set_selection(&mut self, selection: Option<Selection>) {
        let params = SelectionParams { selection };
        let applied = self.edit(|doc| {
            doc.set_selection(&params);
            Ok(())
        });
        if let Err(e) = applied {
            warn!(error = %e, "selection rejected");
        }
    }

    pub fn select_all(&mut self) {
        let size = self.composed().size;
        self.set_selection(Some(Selection::rect(0.0, 0.0, f64::from(size.width), f64::from(size.height))));
    }

    // --- Undo / redo ---

    pub fn undo(&mut self) -> bool {
        self.step(false, true)
    }

    pub fn redo(&mut self) -> bool {
        self.step(true, true)
    }

    /// One undo or redo through the executor. Committed steps are journaled;
    /// `announce` controls the status message.
    pub(crate) fn step(&mut self, redo: bool, announce: bool) -> bool {
        let result = if redo {
            self.executor.redo(&mut self.history, &mut self.temp)
        } else {
            self.executor.undo(&mut self.history, &mut self.temp)
        };
        let Some(result) = result else {
            return false;
        };
        match result.kind {
            ExecutionType::TempUndo | ExecutionType::TempRedo => {
                self.select.sync_from_temp(&self.temp);
                self.events.emit(UiEvent::TransformChanged);
            }
            ExecutionType::Undo | ExecutionType::Redo => {
                if self.select.is_transforming() {
                    self.select.discard(&mut self.temp);
                    self.events.emit(UiEvent::TransformChanged);
                }
                self.opacity_drag = None;
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.record(if redo { tags::REDO } else { tags::UNDO }, json!({}));
                }
            }
        }
        let size = self.history.composed().size;
        if result.composed_before.size != size {
            self.viewport.fit(size);
        }
        if announce {
            self.events.emit(UiEvent::StatusMessage(if redo { "Redo" } else { "Undo" }.into()));
        }
        self.sync_undo_state();
        debug!(kind = ?result.kind, "history step");
        true
    }

    // --- Selection transform session ---

    /// Start moving the selected pixels of the active layer.
    pub fn begin_transform(&mut self) -> bool {
        let index = self.composed().active_index();
        self.transform_changed(|select, temp| select.begin_transform(temp, index, false))
    }

    pub fn translate_transform(&mut self, dx: f64, dy: f64) -> bool {
        self.transform_changed(|select, temp| select.translate(temp, dx, dy))
    }

    /// Rotate around the selection center (canvas center without one).
    pub fn rotate_transform(&mut self, degrees: f64) -> bool {
        let pivot = self.transform_pivot();
        self.transform_changed(|select, temp| select.rotate(temp, degrees, pivot))
    }

    pub fn flip_transform(&mut self, horizontal: bool) -> bool {
        let pivot = self.transform_pivot();
        self.transform_changed(|select, temp| select.flip(temp, horizontal, pivot))
    }

    pub fn move_transform_to_layer(&mut self, target_layer_index: usize) -> bool {
        if self.composed().layer_at(target_layer_index).is_none() {
            return false;
        }
        self.transform_changed(|select, temp| select.move_to_layer(temp, target_layer_index))
    }

    pub fn set_transform_background_transparent(&mut self, transparent: bool) -> bool {
        self.transform_changed(|select, temp| select.set_background_transparent(temp, transparent))
    }

    /// Commit the live transform and keep going with a copy of the pixels.
    pub fn clone_transform(&mut self) -> bool {
        let result = {
            let mut doc = Document::new(&mut self.history, self.recorder.as_mut(), &self.config);
            self.select.clone_transform(&mut self.temp, &mut doc)
        };
        self.events.emit(UiEvent::TransformChanged);
        self.after_push();
        match result {
            Ok(reopened) => reopened,
            Err(e) => {
                warn!(error = %e, "transform clone rejected");
                false
            }
        }
    }

    /// Commit the live interactive operation, if any.
    pub fn apply_uncommitted(&mut self) -> bool {
        if !self.select.is_transforming() {
            return false;
        }
        let result = {
            let mut doc = Document::new(&mut self.history, self.recorder.as_mut(), &self.config);
            self.select.commit(&mut self.temp, &mut doc)
        };
        self.events.emit(UiEvent::TransformChanged);
        self.after_push();
        match result {
            Ok(applied) => applied,
            Err(e) => {
                warn!(error = %e, "transform commit rejected");
                false
            }
        }
    }

    /// Drop the live interactive operation, leaving the document untouched.
    pub fn discard_uncommitted(&mut self) -> bool {
        if !self.select.is_transforming() {
            return false;
        }
        self.select.discard(&mut self.temp);
        self.events.emit(UiEvent::TransformChanged);
        self.sync_undo_state();
        true
    }

    fn transform_changed(&mut self, change: impl FnOnce(&mut SelectController, &mut TempHistory) -> bool) -> bool {
        let changed = change(&mut self.select, &mut self.temp);
        if changed {
            self.events.emit(UiEvent::TransformChanged);
            self.after_push();
        }
        changed
    }

    fn transform_pivot(&self) -> Point {
        let composed = self.composed();
        composed.selection.as_ref().and_then(Selection::center).unwrap_or_else(|| {
            Point::new(f64::from(composed.size.width) / 2.0, f64::from(composed.size.height) / 2.0)
        })
    }

    // --- Tools and settings ---

    /// Switch tools. Leaving the select tool commits a live transform.
    pub fn set_tool(&mut self, tool: Tool) {
        if tool != Tool::Select {
            self.apply_uncommitted();
        }
        if self.ui.tool != tool {
            self.ui.tool = tool;
            self.events.emit(UiEvent::UiStateChanged);
        }
    }

    /// Make `id` the current brush. `false` for an unknown id.
    pub fn select_brush(&mut self, id: &str) -> bool {
        if !self.brushes.select(id) {
            return false;
        }
        self.events.emit(UiEvent::UiStateChanged);
        true
    }

    pub fn set_brush_config(&mut self, patch: BrushConfigPatch) {
        self.brushes.current_mut().config_mut().apply(patch);
        self.events.emit(UiEvent::UiStateChanged);
    }

    /// Set stroke smoothing (0..=5).
    pub fn set_smoothing(&mut self, level: u8) {
        self.chain.set_smoothing_level(level);
        self.events.emit(UiEvent::UiStateChanged);
    }

    pub fn set_primary_color(&mut self, color: Rgb) {
        self.ui.primary_color = color;
        self.brushes.set_color(color);
        self.events.emit(UiEvent::UiStateChanged);
    }

    pub fn set_secondary_color(&mut self, color: Rgb) {
        self.ui.secondary_color = color;
        self.events.emit(UiEvent::UiStateChanged);
    }

    pub fn swap_colors(&mut self) {
        let (primary, secondary) = (self.ui.secondary_color, self.ui.primary_color);
        self.ui.secondary_color = secondary;
        self.set_primary_color(primary);
    }

    pub fn set_shape_config(&mut self, patch: ShapeConfigPatch) {
        self.ui.shape.apply(patch);
        self.events.emit(UiEvent::UiStateChanged);
    }

    pub fn set_gradient_config(&mut self, patch: GradientConfigPatch) {
        self.ui.gradient.apply(patch);
        self.events.emit(UiEvent::UiStateChanged);
    }

    pub fn set_fill_config(&mut self, patch: FillConfigPatch) {
        self.ui.fill.apply(patch);
        self.events.emit(UiEvent::UiStateChanged);
    }

    pub fn set_text_config(&mut self, patch: TextConfigPatch) {
        self.ui.text.apply(patch);
        self.events.emit(UiEvent::UiStateChanged);
    }

    fn toggle_eraser(&mut self) -> bool {
        if self.brushes.current_id() == "eraser" {
            let back = self.eraser_return.take().unwrap_or("pen");
            self.brushes.select(back);
        } else {
            self.eraser_return = Some(self.brushes.current_id());
            self.brushes.select("eraser");
        }
        self.set_tool(Tool::Brush);
        self.events.emit(UiEvent::UiStateChanged);
        true
    }

    fn step_brush_size(&mut self, delta: f32) -> bool {
        let size = self.brushes.current().config().size + delta;
        self.set_brush_config(BrushConfigPatch { size: Some(size), ..BrushConfigPatch::default() });
        true
    }

    // --- Viewport ---

    /// Resize the host element and refit the canvas.
    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport.set_size(width, height);
        self.viewport.fit(self.composed().size);
    }

    /// Wheel input: zoom with the command key held, otherwise scroll.
    pub fn on_wheel(&mut self, screen: Point, delta_y: f64, modifiers: Modifiers) -> bool {
        if self.modals.is_open() {
            return false;
        }
        if modifiers.command() {
            self.viewport.zoom_at(screen, 2f64.powf(-delta_y / 500.0));
        } else {
            self.viewport.pan_by(0.0, -delta_y);
        }
        true
    }

    // --- Keyboard ---

    /// Run the shortcut bound to `key`. Ignored while a modal is open or a
    /// stroke is in progress.
    pub fn on_key_down(&mut self, key: &Key, modifiers: Modifiers) -> bool {
        if self.modals.is_open() || self.chain.is_drawing() {
            debug!(key = %key.0, "shortcut suppressed");
            return false;
        }
        let Some(shortcut) = Shortcut::from_key(key, modifiers) else {
            return false;
        };
        match shortcut {
            Shortcut::Undo => self.undo(),
            Shortcut::Redo => self.redo(),
            Shortcut::Apply => self.apply_uncommitted(),
            Shortcut::Discard => {
                if self.discard_uncommitted() {
                    true
                } else if self.composed().selection.is_some() {
                    self.set_selection(None);
                    true
                } else {
                    false
                }
            }
            Shortcut::EraseLayer => self.clear_layer(),
            Shortcut::ToggleEraser => self.toggle_eraser(),
            Shortcut::CycleBrush => {
                self.brushes.cycle();
                self.set_tool(Tool::Brush);
                self.events.emit(UiEvent::UiStateChanged);
                true
            }
            Shortcut::SwapColors => {
                self.swap_colors();
                true
            }
            Shortcut::DecreaseBrushSize => self.step_brush_size(-BRUSH_SIZE_STEP),
            Shortcut::IncreaseBrushSize => self.step_brush_size(BRUSH_SIZE_STEP),
            Shortcut::SelectTool(tool) => {
                self.set_tool(tool);
                true
            }
        }
    }

    // --- Pointer ---

    pub fn on_pointer_down(&mut self, event: PointerEvent) -> bool {
        if self.modals.is_open() || !matches!(self.gesture, Gesture::Idle) {
            return false;
        }
        let at = self.viewport.screen_to_canvas(event.screen);
        match self.ui.tool {
            Tool::Brush => self.begin_stroke(at, event),
            Tool::Fill => self.fill_at(at),
            Tool::Text => self.text_at(at),
            Tool::Shape | Tool::Gradient => {
                self.apply_uncommitted();
                self.gesture = Gesture::Drag { tool: self.ui.tool, start: at, current: at };
                true
            }
            Tool::Select => self.begin_select_drag(at),
        }
    }

    pub fn on_pointer_move(&mut self, event: PointerEvent) -> bool {
        let at = self.viewport.screen_to_canvas(event.screen);
        match self.gesture {
            Gesture::Idle => false,
            Gesture::Stroke { .. } => {
                let point = DrawPoint { is_coalesced: event.is_coalesced, ..DrawPoint::new(at.x, at.y, event.pressure, event.time) };
                self.feed(DrawEvent::Move(point));
                self.last_point = Some(point);
                true
            }
            Gesture::Drag { ref mut current, .. } => {
                *current = at;
                true
            }
            Gesture::MoveSelection { start } => {
                if self.select.drag_to(&mut self.temp, at.x - start.x, at.y - start.y) {
                    self.events.emit(UiEvent::TransformChanged);
                    self.after_push();
                }
                true
            }
        }
    }

    pub fn on_pointer_up(&mut self, event: PointerEvent) -> bool {
        if matches!(self.gesture, Gesture::Stroke { .. }) {
            self.feed(DrawEvent::Up { time: event.time });
            self.finish_stroke(true);
            return true;
        }
        let at = self.viewport.screen_to_canvas(event.screen);
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Drag { tool, start, .. } => self.finish_drag(tool, start, at),
            Gesture::MoveSelection { .. } => {
                self.select.end_drag();
                true
            }
            Gesture::Idle | Gesture::Stroke { .. } => false,
        }
    }

    fn begin_stroke(&mut self, at: Point, event: PointerEvent) -> bool {
        self.apply_uncommitted();
        let composed = self.history.composed();
        let layer = composed.active_layer_id;
        let Some(state) = composed.layer(layer) else {
            warn!(%layer, "no active layer to paint on");
            return false;
        };
        self.gesture = Gesture::Stroke { layer, image: state.image.to_image() };
        self.brushes.reset();

        let point = DrawPoint::new(at.x, at.y, event.pressure, event.time);
        if event.modifiers.shift {
            if let Some(from) = self.last_point {
                self.feed(DrawEvent::Line(LineSegment {
                    x0: from.x,
                    y0: from.y,
                    x1: at.x,
                    y1: at.y,
                    pressure0: from.pressure,
                    pressure1: event.pressure,
                }));
                self.last_point = Some(point);
                self.finish_stroke(false);
                return true;
            }
        }
        self.feed(DrawEvent::Down(point));
        self.last_point = Some(point);
        self.events.emit(UiEvent::IsDrawing(true));
        true
    }

    /// Push one raw sample through the chain and paint what comes out.
    fn feed(&mut self, event: DrawEvent) {
        let context = StrokeContext { brush: self.brushes.snapshot(), smoothing: self.chain.smoothing_level() };
        let output = self.chain.chain_in(event, &context);
        if let Gesture::Stroke { image, .. } = &mut self.gesture {
            let brush = self.brushes.current_mut();
            for event in &output.events {
                brush.draw(image, event);
            }
        }
        if output.recorded.is_some() {
            self.stroke_record = output.recorded;
        }
    }

    /// Commit the stroke image. `announced` strokes emitted `IsDrawing(true)`.
    fn finish_stroke(&mut self, announced: bool) {
        let Gesture::Stroke { layer, image } = std::mem::replace(&mut self.gesture, Gesture::Idle) else {
            return;
        };
        let record = self.stroke_record.take();
        match self.edit(|doc| doc.commit_stroke(layer, image)) {
            Ok(()) => {
                if let (Some(record), Some(recorder)) = (record, self.recorder.as_mut()) {
                    recorder.record_payload(DRAW_EVENT, &record);
                }
            }
            Err(e) => warn!(error = %e, "stroke dropped"),
        }
        if announced {
            self.events.emit(UiEvent::IsDrawing(false));
        }
    }

    fn begin_select_drag(&mut self, at: Point) -> bool {
        let inside = self.composed().selection.as_ref().is_some_and(|s| s.contains(at));
        if self.select.is_transforming() || (inside && self.begin_transform()) {
            self.select.begin_drag();
            self.gesture = Gesture::MoveSelection { start: at };
            return true;
        }
        self.gesture = Gesture::Drag { tool: Tool::Select, start: at, current: at };
        true
    }

    fn finish_drag(&mut self, tool: Tool, start: Point, end: Point) -> bool {
        let index = self.composed().active_index();
        let result = match tool {
            Tool::Shape => {
                let shape = self.ui.shape;
                let params = ShapeParams {
                    index,
                    kind: shape.kind,
                    x1: start.x,
                    y1: start.y,
                    x2: end.x,
                    y2: end.y,
                    color: self.ui.primary_color,
                    opacity: shape.opacity,
                    is_filled: shape.is_filled,
                    line_width: shape.line_width,
                    is_eraser: false,
                };
                self.edit(|doc| doc.draw_shape(&params))
            }
            Tool::Gradient => {
                let gradient = self.ui.gradient;
                let params = GradientParams {
                    index,
                    kind: gradient.kind,
                    x1: start.x,
                    y1: start.y,
                    x2: end.x,
                    y2: end.y,
                    color: self.ui.primary_color,
                    to_color: (!gradient.to_transparent).then_some(self.ui.secondary_color),
                    opacity: gradient.opacity,
                };
                self.edit(|doc| doc.draw_gradient(&params))
            }
            Tool::Select => {
                let (w, h) = (end.x - start.x, end.y - start.y);
                let selection = (w.abs() >= 1.0 && h.abs() >= 1.0)
                    .then(|| Selection::rect(start.x.min(end.x), start.y.min(end.y), w.abs(), h.abs()));
                self.set_selection(selection);
                Ok(())
            }
            Tool::Brush | Tool::Fill | Tool::Text => Ok(()),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, ?tool, "drag edit rejected");
                false
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fill_at(&mut self, at: Point) -> bool {
        let size = self.composed().size;
        if at.x < 0.0 || at.y < 0.0 || at.x >= f64::from(size.width) || at.y >= f64::from(size.height) {
            return false;
        }
        let fill = self.ui.fill;
        let params = FloodFillParams {
            index: self.composed().active_index(),
            x: at.x.floor() as u32,
            y: at.y.floor() as u32,
            color: self.ui.primary_color,
            opacity: fill.opacity,
            tolerance: fill.tolerance,
            is_eraser: fill.is_eraser,
        };
        self.edit(|doc| doc.flood_fill(&params)).is_ok()
    }

    fn text_at(&mut self, at: Point) -> bool {
        let text = &self.ui.text;
        let params = TextParams {
            index: self.composed().active_index(),
            x: at.x,
            y: at.y,
            text: text.text.clone(),
            size: text.size,
            color: self.ui.primary_color,
            opacity: text.opacity,
        };
        self.edit(|doc| doc.draw_text(&params)).is_ok()
    }

    // --- Replay ---

    /// Repaint a recorded stroke on the active layer with the recorded brush
    /// settings, then restore the live brush.
    fn replay_stroke(&mut self, record: &DrawRecord) -> Result<(), ReplayError> {
        if !self.brushes.contains(&record.brush.id) {
            return Err(ReplayError::MissingResource(format!("brush `{}`", record.brush.id)));
        }
        let events = decode_samples(&record.events)?;
        let layer = self.composed().active_layer_id;
        let mut image = self
            .composed()
            .layer(layer)
            .map(|l| l.image.to_image())
            .ok_or_else(|| ReplayError::MissingResource(format!("layer {layer}")))?;

        let previous_brush = self.brushes.current_id();
        let previous_smoothing = self.chain.smoothing_level();
        self.brushes.select(&record.brush.id);
        let saved = *self.brushes.current().config();
        let configured = self.brushes.current_mut().apply_config_json(&record.brush.cfg);
        if configured.is_ok() {
            self.chain.reset();
            self.chain.set_smoothing_level(record.smoothing);
            let brush = self.brushes.current_mut();
            brush.reset();
            for event in self.chain.replay(&events) {
                brush.draw(&mut image, &event);
            }
            self.chain.reset();
        }
        *self.brushes.current_mut().config_mut() = saved;
        self.brushes.select(previous_brush);
        self.chain.set_smoothing_level(previous_smoothing);

        configured.map_err(|source| ReplayError::Payload { kind: DRAW_EVENT.to_owned(), source })?;
        self.edit(|doc| doc.commit_stroke(layer, image))?;
        Ok(())
    }

    // --- Internals ---

    /// Refresh enablement after anything that may have pushed.
    fn after_push(&mut self) {
        self.executor.notify(&self.history, &self.temp);
        self.sync_undo_state();
    }

    fn sync_undo_state(&mut self) {
        let (can_undo, can_redo) = (self.can_undo(), self.can_redo());
        if (can_undo, can_redo) != (self.ui.can_undo, self.ui.can_redo) {
            self.ui.can_undo = can_undo;
            self.ui.can_redo = can_redo;
            self.events.emit(UiEvent::UiStateChanged);
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// What [`Engine::load_from_storage`] found.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The journal was replayed.
    Replayed(ReplaySummary),
    /// No journal yet: a new project.
    Empty,
    /// The storage provider failed.
    Unavailable(StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("initial document rejected: {0}")]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// The full engine: core state plus journal replay and storage sequencing.
pub struct Engine {
    pub core: EngineCore,
    replayer: Replayer<EngineCore>,
}

impl Engine {
    /// Engine without a journal.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { core: EngineCore::new(config), replayer: replayer() }
    }

    /// Unjournaled engine for inspecting a stored project.
    #[must_use]
    pub fn for_project(project_id: impl Into<String>, config: EngineConfig) -> Self {
        Self { core: EngineCore::for_project(config, project_id), replayer: replayer() }
    }

    /// Engine journaling `project_id` into `storage`.
    #[must_use]
    pub fn with_storage(project_id: impl Into<String>, storage: Arc<dyn StorageProvider>, config: EngineConfig) -> Self {
        let recorder = EventRecorder::new(project_id, storage, &config);
        Self { core: EngineCore::with_recorder(config, recorder), replayer: replayer() }
    }

    /// Engine for a brand-new project with a random id.
    #[must_use]
    pub fn create(storage: Arc<dyn StorageProvider>, config: EngineConfig) -> Self {
        Self::with_storage(Uuid::new_v4().to_string(), storage, config)
    }

    #[must_use]
    pub fn replayer(&self) -> &Replayer<EngineCore> {
        &self.replayer
    }

    /// Apply journal records to the live document without journaling them
    /// again.
    pub fn replay(&mut self, events: &[RecordedEvent]) -> ReplaySummary {
        if let Some(recorder) = self.core.recorder.as_mut() {
            recorder.set_replaying(true);
        }
        let summary = self.replayer.replay(&mut self.core, events);
        if let Some(recorder) = self.core.recorder.as_mut() {
            recorder.set_replaying(false);
            if let Some(last) = events.iter().map(|e| e.timestamp).max() {
                recorder.note_timestamp(last);
            }
        }
        summary
    }

    /// Load this project's journal and replay it.
    ///
    /// No document operation may run while this is pending; `&mut self`
    /// enforces that.
    pub async fn load_from_storage(&mut self) -> LoadOutcome {
        let Some(recorder) = self.core.recorder.as_ref() else {
            debug!("no journal attached; nothing to load");
            return LoadOutcome::Empty;
        };
        let storage = recorder.storage();
        let project_id = recorder.project_id().to_owned();
        match storage.load(&project_id).await {
            Err(e) => {
                warn!(error = %e, project_id, "journal unavailable");
                LoadOutcome::Unavailable(e)
            }
            Ok(events) if events.is_empty() => {
                info!(project_id, "new project");
                LoadOutcome::Empty
            }
            Ok(events) => {
                info!(project_id, records = events.len(), "replaying journal");
                LoadOutcome::Replayed(self.replay(&events))
            }
        }
    }

    /// Load, seed a blank document when there was nothing to replay, then
    /// start recording.
    ///
    /// An unreadable journal is left alone: the blank session records into
    /// a freshly generated project id instead.
    ///
    /// # Errors
    ///
    /// Fails when the configured default canvas is invalid or recording
    /// cannot start (no tokio runtime).
    pub async fn open(&mut self) -> Result<LoadOutcome, EngineError> {
        let outcome = self.load_from_storage().await;
        if let (LoadOutcome::Unavailable(_), Some(recorder)) = (&outcome, self.core.recorder.as_mut()) {
            let fresh = Uuid::new_v4().to_string();
            warn!(from = recorder.project_id(), to = %fresh, "journal unreadable; recording into a new project");
            *recorder = recorder.fork(fresh);
        }
        if !matches!(outcome, LoadOutcome::Replayed(_)) {
            let config = self.core.config;
            self.core.reset(&ResetParams {
                width: config.default_width,
                height: config.default_height,
                fill: Some(Rgb::WHITE),
            })?;
        }
        if let Some(recorder) = self.core.recorder.as_mut() {
            recorder.start()?;
        }
        Ok(outcome)
    }

    /// Wait until every journal write issued so far has landed.
    ///
    /// # Errors
    ///
    /// [`RecorderError::WriterClosed`] if the writer task is gone.
    pub async fn flush(&self) -> Result<(), RecorderError> {
        match self.core.recorder.as_ref() {
            Some(recorder) => recorder.flush().await,
            None => Ok(()),
        }
    }
}

// =============================================================================
// REPLAY HANDLERS
// =============================================================================

/// Registry with a handler for every journal tag.
#[must_use]
pub fn replayer() -> Replayer<EngineCore> {
    let mut r = Replayer::new();
    on_edit(&mut r, tags::RESET, |doc, p: &ResetParams| doc.reset(p));
    on_edit(&mut r, tags::RESIZE, |doc, p: &ResizeParams| doc.resize(p));
    on_edit(&mut r, tags::RESIZE_CANVAS, |doc, p: &ResizeCanvasParams| doc.resize_canvas(p));
    on_edit(&mut r, tags::ROTATE, |doc, p: &RotateParams| doc.rotate(p));
    on_edit(&mut r, tags::ADD_LAYER, |doc, p: &AddLayerParams| doc.add_layer(p));
    on_edit(&mut r, tags::DUPLICATE_LAYER, |doc, p: &LayerIndexParams| doc.duplicate_layer(p));
    on_edit(&mut r, tags::REMOVE_LAYER, |doc, p: &LayerIndexParams| doc.remove_layer(p));
    on_edit(&mut r, tags::MOVE_LAYER, |doc, p: &MoveLayerParams| doc.move_layer(p));
    on_edit(&mut r, tags::MERGE_LAYERS, |doc, p: &MergeLayersParams| doc.merge_layers(p));
    on_edit(&mut r, tags::SELECT_LAYER, |doc, p: &LayerIndexParams| Ok(doc.select_layer(p)));
    on_edit(&mut r, tags::RENAME_LAYER, |doc, p: &RenameLayerParams| doc.rename_layer(p));
    on_edit(&mut r, tags::OPACITY, |doc, p: &OpacityParams| doc.set_opacity(p));
    on_edit(&mut r, tags::VISIBILITY, |doc, p: &VisibilityParams| doc.set_visibility(p));
    on_edit(&mut r, tags::MIX_MODE, |doc, p: &MixModeParams| doc.set_mix_mode(p));
    on_edit(&mut r, tags::FLIP, |doc, p: &FlipParams| doc.flip(p));
    on_edit(&mut r, tags::FILL, |doc, p: &FillParams| doc.fill_layer(p));
    on_edit(&mut r, tags::FLOOD_FILL, |doc, p: &FloodFillParams| doc.flood_fill(p));
    on_edit(&mut r, tags::SHAPE, |doc, p: &ShapeParams| doc.draw_shape(p));
    on_edit(&mut r, tags::GRADIENT, |doc, p: &GradientParams| doc.draw_gradient(p));
    on_edit(&mut r, tags::TEXT, |doc, p: &TextParams| doc.draw_text(p));
    on_edit(&mut r, tags::ERASE, |doc, p: &LayerIndexParams| doc.erase_layer(p));
    on_edit(&mut r, tags::FILTER, |doc, p: &FilterParams| doc.apply_filter(p));
    on_edit(&mut r, tags::SELECTION, |doc, p: &SelectionParams| {
        doc.set_selection(p);
        Ok(())
    });
    on_edit(&mut r, tags::SELECTION_TRANSFORM, |doc, p: &SelectionTransformParams| doc.transform_via_selection(p));
    on_edit(&mut r, tags::SELECTION_TRANSFORM_CLONE, |doc, p: &SelectionTransformParams| {
        doc.transform_clone_via_selection(p)
    });
    r.add_replay_handler(tags::MERGE_ALL, |core: &mut EngineCore, _: &Value| {
        core.edit(|doc| doc.merge_all())?;
        Ok(())
    });
    r.add_replay_handler(DRAW_EVENT, |core: &mut EngineCore, data: &Value| {
        let record: DrawRecord = decode_payload(DRAW_EVENT, data)?;
        core.replay_stroke(&record)
    });
    r.add_replay_handler(tags::UNDO, |core: &mut EngineCore, _: &Value| replay_step(core, false));
    r.add_replay_handler(tags::REDO, |core: &mut EngineCore, _: &Value| replay_step(core, true));
    r
}

/// Register a handler that decodes `P` and runs one document operation.
fn on_edit<P, T>(
    replayer: &mut Replayer<EngineCore>,
    kind: &'static str,
    op: impl Fn(&mut Document<'_>, &P) -> Result<T, DocumentError> + Send + Sync + 'static,
) where
    P: DeserializeOwned,
{
    replayer.add_replay_handler(kind, move |core: &mut EngineCore, data: &Value| {
        let params: P = decode_payload(kind, data)?;
        core.edit(|doc| op(doc, &params))?;
        Ok(())
    });
}

fn replay_step(core: &mut EngineCore, redo: bool) -> Result<(), ReplayError> {
    if core.step(redo, false) {
        Ok(())
    } else {
        Err(ReplayError::MissingResource(if redo { "redo step" } else { "undo step" }.into()))
    }
}
