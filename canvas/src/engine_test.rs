#![allow(clippy::float_cmp)]

use std::sync::{Arc, Mutex};

use super::*;
use crate::selection::Matrix;
use crate::storage::MemoryStorage;
use crate::ui::UiEvent;

// =============================================================
// Helpers
// =============================================================

fn config() -> EngineConfig {
    EngineConfig { default_width: 16, default_height: 16, smoothing: 0, ..EngineConfig::default() }
}

fn core() -> EngineCore {
    EngineCore::new(config())
}

fn recording_core() -> EngineCore {
    let recorder = EventRecorder::new("p", Arc::new(MemoryStorage::new()), &config());
    EngineCore::with_recorder(config(), recorder)
}

fn pointer(x: f64, y: f64, time: f64) -> PointerEvent {
    PointerEvent::new(x, y, time)
}

fn stroke(core: &mut EngineCore, from: (f64, f64), to: (f64, f64)) {
    assert!(core.on_pointer_down(pointer(from.0, from.1, 0.0)));
    assert!(core.on_pointer_move(pointer(f64::midpoint(from.0, to.0), f64::midpoint(from.1, to.1), 10.0)));
    assert!(core.on_pointer_move(pointer(to.0, to.1, 20.0)));
    assert!(core.on_pointer_up(pointer(to.0, to.1, 30.0)));
}

fn drag(core: &mut EngineCore, from: (f64, f64), to: (f64, f64)) {
    core.on_pointer_down(pointer(from.0, from.1, 0.0));
    core.on_pointer_move(pointer(to.0, to.1, 10.0));
    core.on_pointer_up(pointer(to.0, to.1, 20.0));
}

fn pixel(core: &EngineCore, index: usize, x: u32, y: u32) -> [u8; 4] {
    let (_, layer) = core.composed().layer_at(index).expect("layer");
    layer.image.as_image().get_pixel(x, y).0
}

fn active_image(core: &EngineCore) -> RgbaImage {
    core.composed().active_layer().expect("active layer").image.to_image()
}

fn recorded_kinds(core: &EngineCore) -> Vec<String> {
    core.recorder().expect("recorder").pending().iter().map(|e| e.kind.clone()).collect()
}

fn ctrl() -> Modifiers {
    Modifiers { ctrl: true, ..Modifiers::default() }
}

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];
const RED: Rgb = Rgb::new(255, 0, 0);

// =============================================================
// Construction
// =============================================================

#[test]
fn new_engine_starts_with_one_white_layer() {
    let core = core();
    assert_eq!(core.composed().size, Size::new(16, 16));
    assert_eq!(core.composed().layer_count(), 1);
    assert_eq!(pixel(&core, 0, 3, 3), WHITE);
    assert!(!core.can_undo());
    assert!(!core.can_redo());
}

#[test]
fn recorder_sets_project_id() {
    let core = recording_core();
    assert_eq!(core.composed().project_id, "p");
}

// =============================================================
// Brush strokes
// =============================================================

#[test]
fn stroke_commits_one_history_entry() {
    let mut core = core();
    let before = active_image(&core);
    stroke(&mut core, (2.0, 2.0), (12.0, 2.0));

    assert_eq!(core.history().len(), 1);
    assert_ne!(active_image(&core), before);
    assert!(!core.is_drawing());
    assert!(core.ui().can_undo);
}

#[test]
fn stroke_paints_only_on_release() {
    let mut core = core();
    let before = active_image(&core);
    core.on_pointer_down(pointer(2.0, 2.0, 0.0));
    core.on_pointer_move(pointer(8.0, 2.0, 10.0));
    assert!(core.is_drawing());
    assert_eq!(active_image(&core), before);
    assert_eq!(core.history().len(), 0);
}

#[test]
fn stroke_announces_drawing_state() {
    let mut core = core();
    stroke(&mut core, (2.0, 2.0), (8.0, 8.0));
    let events = core.take_events();
    let drawing: Vec<_> = events.iter().filter(|e| matches!(e, UiEvent::IsDrawing(_))).collect();
    assert_eq!(drawing, [&UiEvent::IsDrawing(true), &UiEvent::IsDrawing(false)]);
}

#[test]
fn subscribed_host_leaves_nothing_queued() {
    let seen = Arc::new(Mutex::new(0_usize));
    let sink = Arc::clone(&seen);
    let mut core = core();
    core.subscribe(move |_| *sink.lock().expect("lock") += 1);

    for _ in 0..50 {
        stroke(&mut core, (2.0, 2.0), (8.0, 8.0));
        core.undo();
    }

    assert!(*seen.lock().expect("lock") >= 150);
    assert_eq!(core.events.queued(), 0);
    assert!(core.take_events().is_empty());
}

#[test]
fn stroke_is_journaled_as_one_draw_record() {
    let mut core = recording_core();
    stroke(&mut core, (2.0, 2.0), (12.0, 2.0));

    assert_eq!(recorded_kinds(&core), [DRAW_EVENT]);
    let data = &core.recorder().expect("recorder").pending()[0].data;
    let record: DrawRecord = serde_json::from_value(data.clone()).expect("draw record");
    assert_eq!(record.brush.id, "pen");
    assert_eq!(record.events.len(), 4);
    assert_eq!(record.smoothing, 0);
}

#[test]
fn shift_click_draws_line_from_last_point() {
    let mut core = recording_core();
    stroke(&mut core, (2.0, 2.0), (2.0, 4.0));
    let before = active_image(&core);

    let shifted = pointer(12.0, 4.0, 50.0).with_modifiers(Modifiers { shift: true, ..Modifiers::default() });
    assert!(core.on_pointer_down(shifted));

    assert_eq!(core.history().len(), 2);
    assert_ne!(active_image(&core), before);
    assert!(!core.is_drawing());
    assert_eq!(recorded_kinds(&core), [DRAW_EVENT, DRAW_EVENT]);
}

#[test]
fn eraser_stroke_removes_paint() {
    let mut core = core();
    assert!(core.select_brush("eraser"));
    stroke(&mut core, (2.0, 8.0), (14.0, 8.0));
    assert!(pixel(&core, 0, 8, 8)[3] < 128);
}

#[test]
fn unknown_brush_is_refused() {
    let mut core = core();
    assert!(!core.select_brush("airbrush"));
    assert_eq!(core.brushes().current_id(), "pen");
}

// =============================================================
// Undo / redo
// =============================================================

#[test]
fn undo_and_redo_are_journaled_when_committed() {
    let mut core = recording_core();
    stroke(&mut core, (2.0, 2.0), (12.0, 2.0));
    let painted = active_image(&core);

    assert!(core.undo());
    assert_eq!(pixel(&core, 0, 7, 2), WHITE);
    assert!(core.redo());
    assert_eq!(active_image(&core), painted);
    assert_eq!(recorded_kinds(&core), [DRAW_EVENT, tags::UNDO, tags::REDO]);
}

#[test]
fn undo_reports_status_message() {
    let mut core = core();
    stroke(&mut core, (2.0, 2.0), (8.0, 2.0));
    core.take_events();
    core.undo();
    assert!(core.take_events().contains(&UiEvent::StatusMessage("Undo".into())));
}

#[test]
fn undo_with_empty_history_does_nothing() {
    let mut core = recording_core();
    assert!(!core.undo());
    assert!(!core.redo());
    assert!(recorded_kinds(&core).is_empty());
}

#[test]
fn enablement_callback_follows_history() {
    let mut core = core();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    core.set_on_can_undo_redo_change(move |u, r| sink.lock().expect("lock").push((u, r)));

    stroke(&mut core, (2.0, 2.0), (8.0, 2.0));
    core.undo();

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.last(), Some(&(false, true)));
    assert!(seen.contains(&(true, false)));
}

// =============================================================
// Selection transform
// =============================================================

/// 16x16 white canvas with a black 2x2 block selected at the origin.
fn selected_block() -> EngineCore {
    let mut core = recording_core();
    core.set_selection(Some(Selection::rect(0.0, 0.0, 2.0, 2.0)));
    assert!(core.fill_layer(Rgb::BLACK));
    core
}

#[test]
fn transform_steps_are_undone_without_journaling() {
    let mut core = selected_block();
    let entries = core.history().len();
    let journaled = recorded_kinds(&core).len();

    assert!(core.begin_transform());
    assert!(core.translate_transform(4.0, 4.0));
    assert!(core.undo());

    assert!(core.select().is_transforming());
    assert_eq!(core.select().current().expect("session").transform, Matrix::identity());
    assert_eq!(core.history().len(), entries);
    assert_eq!(recorded_kinds(&core).len(), journaled);

    assert!(core.redo());
    assert_eq!(core.select().current().expect("session").transform.e, 4.0);
}

#[test]
fn apply_commits_transform_as_one_entry() {
    let mut core = selected_block();
    let entries = core.history().len();
    core.begin_transform();
    core.translate_transform(4.0, 4.0);

    assert!(core.on_key_down(&Key::new("Enter"), Modifiers::default()));
    assert!(!core.select().is_transforming());
    assert_eq!(core.history().len(), entries + 1);
    assert_eq!(pixel(&core, 0, 4, 4), BLACK);
    assert_eq!(pixel(&core, 0, 0, 0), WHITE);
    assert_eq!(recorded_kinds(&core).last().map(String::as_str), Some(tags::SELECTION_TRANSFORM));
}

#[test]
fn repeated_clone_in_place_stamps_copies() {
    let mut core = selected_block();
    assert!(core.begin_transform());
    let entries = core.history().len();

    assert!(core.clone_transform());
    assert_eq!(core.history().len(), entries);
    assert!(core.clone_transform());
    assert_eq!(core.history().len(), entries + 1);
    assert_eq!(recorded_kinds(&core).last().map(String::as_str), Some(tags::SELECTION_TRANSFORM_CLONE));
    assert!(core.select().is_transforming());
}

#[test]
fn escape_discards_transform_then_selection() {
    let mut core = selected_block();
    let before = core.composed().clone();
    core.begin_transform();
    core.translate_transform(3.0, 0.0);

    assert!(core.on_key_down(&Key::new("Escape"), Modifiers::default()));
    assert_eq!(core.composed(), &before);
    assert!(core.composed().selection.is_some());

    assert!(core.on_key_down(&Key::new("Escape"), Modifiers::default()));
    assert!(core.composed().selection.is_none());
}

#[test]
fn committed_undo_ends_transform_session() {
    let mut core = selected_block();
    core.begin_transform();
    core.translate_transform(2.0, 0.0);
    core.undo();
    assert!(core.select().is_transforming());

    assert!(core.undo());
    assert!(!core.select().is_transforming());
    assert_eq!(pixel(&core, 0, 0, 0), WHITE);
}

#[test]
fn dragging_inside_selection_moves_pixels() {
    let mut core = selected_block();
    core.set_tool(Tool::Select);
    drag(&mut core, (1.0, 1.0), (5.0, 5.0));
    assert!(core.select().is_transforming());

    core.set_tool(Tool::Brush);
    assert!(!core.select().is_transforming());
    assert_eq!(pixel(&core, 0, 4, 4), BLACK);
}

#[test]
fn select_drag_outside_sets_and_clears_selection() {
    let mut core = core();
    core.set_tool(Tool::Select);
    drag(&mut core, (2.0, 2.0), (6.0, 8.0));
    let selection = core.composed().selection.clone().expect("selection");
    assert!(selection.contains(Point::new(3.0, 3.0)));
    assert!(!selection.contains(Point::new(7.0, 3.0)));

    drag(&mut core, (10.0, 10.0), (10.0, 10.0));
    assert!(core.composed().selection.is_none());
}

#[test]
fn editing_commits_a_live_transform_first() {
    let mut core = selected_block();
    core.begin_transform();
    core.translate_transform(4.0, 0.0);
    assert!(core.add_layer());
    assert!(!core.select().is_transforming());
    assert_eq!(pixel(&core, 0, 4, 0), BLACK);
}

// =============================================================
// Tools
// =============================================================

#[test]
fn fill_tool_floods_clicked_region() {
    let mut core = core();
    core.set_tool(Tool::Fill);
    core.set_primary_color(RED);
    assert!(core.on_pointer_down(pointer(3.0, 3.0, 0.0)));
    assert_eq!(pixel(&core, 0, 15, 15), [255, 0, 0, 255]);
}

#[test]
fn fill_outside_canvas_is_ignored() {
    let mut core = core();
    core.set_tool(Tool::Fill);
    assert!(!core.on_pointer_down(pointer(-1.0, 3.0, 0.0)));
    assert_eq!(core.history().len(), 0);
}

#[test]
fn shape_drag_draws_on_release() {
    let mut core = recording_core();
    core.set_tool(Tool::Shape);
    core.set_shape_config(ShapeConfigPatch { is_filled: Some(true), ..ShapeConfigPatch::default() });
    drag(&mut core, (2.0, 2.0), (10.0, 10.0));

    assert_eq!(pixel(&core, 0, 5, 5), BLACK);
    assert_eq!(pixel(&core, 0, 12, 12), WHITE);
    assert_eq!(recorded_kinds(&core), [tags::SHAPE]);
}

#[test]
fn gradient_drag_runs_to_secondary_color() {
    let mut core = core();
    core.set_tool(Tool::Gradient);
    drag(&mut core, (0.0, 0.0), (15.0, 0.0));
    assert!(pixel(&core, 0, 0, 8)[0] < 64);
    assert!(pixel(&core, 0, 15, 8)[0] > 192);
}

#[test]
fn text_tool_places_text() {
    let mut core = recording_core();
    core.set_tool(Tool::Text);
    core.set_text_config(TextConfigPatch { text: Some("A".into()), size: Some(12.0), ..TextConfigPatch::default() });
    assert!(core.on_pointer_down(pointer(2.0, 2.0, 0.0)));
    assert_eq!(recorded_kinds(&core), [tags::TEXT]);
}

// =============================================================
// Keyboard
// =============================================================

#[test]
fn shortcuts_are_frozen_while_modal_is_open() {
    let mut core = core();
    stroke(&mut core, (2.0, 2.0), (8.0, 2.0));
    core.modals_mut().open();

    assert!(!core.on_key_down(&Key::new("z"), ctrl()));
    assert!(!core.on_pointer_down(pointer(1.0, 1.0, 100.0)));
    assert_eq!(core.history().len(), 1);

    core.modals_mut().close();
    assert!(core.on_key_down(&Key::new("z"), ctrl()));
    assert!(core.can_redo());
}

#[test]
fn shortcuts_are_frozen_while_drawing() {
    let mut core = core();
    core.on_pointer_down(pointer(2.0, 2.0, 0.0));
    assert!(!core.on_key_down(&Key::new("x"), Modifiers::default()));
    assert_eq!(core.ui().primary_color, Rgb::BLACK);
}

#[test]
fn swap_colors_updates_brush() {
    let mut core = core();
    assert!(core.on_key_down(&Key::new("x"), Modifiers::default()));
    assert_eq!(core.ui().primary_color, Rgb::WHITE);
    assert_eq!(core.ui().secondary_color, Rgb::BLACK);
    assert_eq!(core.brushes().current().config().color, Rgb::WHITE);
}

#[test]
fn eraser_toggle_returns_to_previous_brush() {
    let mut core = core();
    core.select_brush("pixel");
    core.on_key_down(&Key::new("e"), Modifiers::default());
    assert_eq!(core.brushes().current_id(), "eraser");
    core.on_key_down(&Key::new("e"), Modifiers::default());
    assert_eq!(core.brushes().current_id(), "pixel");
}

#[test]
fn bracket_keys_step_brush_size() {
    let mut core = core();
    let size = core.brushes().current().config().size;
    core.on_key_down(&Key::new("]"), Modifiers::default());
    assert_eq!(core.brushes().current().config().size, size + BRUSH_SIZE_STEP);
    core.on_key_down(&Key::new("["), Modifiers::default());
    core.on_key_down(&Key::new("["), Modifiers::default());
    assert_eq!(core.brushes().current().config().size, size - BRUSH_SIZE_STEP);
}

#[test]
fn tool_keys_switch_tools() {
    let mut core = core();
    core.on_key_down(&Key::new("u"), Modifiers::default());
    assert_eq!(core.ui().tool, Tool::Shape);
    core.on_key_down(&Key::new("b"), Modifiers::default());
    assert_eq!(core.ui().tool, Tool::Brush);
    assert_eq!(core.brushes().current_id(), "pixel");
}

#[test]
fn delete_erases_active_layer() {
    let mut core = core();
    assert!(core.on_key_down(&Key::new("Delete"), Modifiers::default()));
    assert_eq!(pixel(&core, 0, 4, 4)[3], 0);
}

// =============================================================
// Viewport
// =============================================================

#[test]
fn wheel_pans_and_ctrl_wheel_zooms() {
    let mut core = core();
    core.on_wheel(Point::new(0.0, 0.0), 100.0, Modifiers::default());
    assert_eq!(core.viewport().pan_y, -100.0);

    core.on_wheel(Point::new(0.0, 0.0), -500.0, ctrl());
    assert_eq!(core.viewport().zoom, 2.0);
}

#[test]
fn resize_refits_viewport() {
    let mut core = core();
    core.set_viewport_size(100.0, 100.0);
    core.edit(|doc| doc.resize(&ResizeParams { width: 200, height: 100, smooth: false })).expect("resize");
    assert_eq!(core.viewport().zoom, 0.5);
    core.undo();
    assert_eq!(core.viewport().zoom, 1.0);
}

#[test]
fn rejected_edit_changes_nothing() {
    let mut core = recording_core();
    let result = core.reset(&ResetParams { width: 0, height: 5, fill: None });
    assert!(matches!(result, Err(DocumentError::InvalidSize { .. })));
    assert_eq!(core.history().len(), 0);
    assert!(recorded_kinds(&core).is_empty());
}

// =============================================================
// Replay
// =============================================================

#[test]
fn replayer_handles_every_journal_tag() {
    let replayer = replayer();
    for kind in [
        tags::RESET,
        tags::RESIZE,
        tags::RESIZE_CANVAS,
        tags::ROTATE,
        tags::ADD_LAYER,
        tags::DUPLICATE_LAYER,
        tags::REMOVE_LAYER,
        tags::MOVE_LAYER,
        tags::MERGE_LAYERS,
        tags::MERGE_ALL,
        tags::SELECT_LAYER,
        tags::RENAME_LAYER,
        tags::OPACITY,
        tags::VISIBILITY,
        tags::MIX_MODE,
        tags::FLIP,
        tags::FILL,
        tags::FLOOD_FILL,
        tags::SHAPE,
        tags::GRADIENT,
        tags::TEXT,
        tags::ERASE,
        tags::FILTER,
        tags::SELECTION,
        tags::SELECTION_TRANSFORM,
        tags::SELECTION_TRANSFORM_CLONE,
        tags::UNDO,
        tags::REDO,
        DRAW_EVENT,
    ] {
        assert!(replayer.has_handler(kind), "no handler for {kind}");
    }
}

#[test]
fn replayed_stroke_restores_live_brush() {
    let mut live = recording_core();
    live.set_brush_config(BrushConfigPatch { size: Some(9.0), ..BrushConfigPatch::default() });
    stroke(&mut live, (2.0, 2.0), (12.0, 12.0));
    let events = live.recorder().expect("recorder").pending().to_vec();

    let mut engine = Engine::new(config());
    engine.core.select_brush("pixel");
    engine.core.set_smoothing(3);
    let summary = engine.replay(&events);

    assert_eq!(summary, ReplaySummary { applied: 1, skipped: 0 });
    assert_eq!(active_image(&engine.core), active_image(&live));
    assert_eq!(engine.core.brushes().current_id(), "pixel");
    assert_eq!(engine.core.smoothing(), 3);
}

#[test]
fn replayed_stroke_with_unknown_brush_is_skipped() {
    let record = json!({"brush": {"id": "airbrush", "cfg": {}}, "events": ["D 1,1,0.5,0", "U 1"], "smoothing": 0});
    let mut engine = Engine::new(config());
    let summary = engine.replay(&[RecordedEvent::new(DRAW_EVENT, 1, record)]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(engine.core.history().len(), 0);
}

#[test]
fn replayed_undo_without_history_is_skipped() {
    let mut engine = Engine::new(config());
    let summary = engine.replay(&[RecordedEvent::new(tags::UNDO, 1, json!({}))]);
    assert_eq!(summary, ReplaySummary { applied: 0, skipped: 1 });
}

// =============================================================
// Storage
// =============================================================

#[tokio::test]
async fn open_on_empty_storage_seeds_blank_document() {
    let storage = MemoryStorage::new();
    let mut engine = Engine::with_storage("p", Arc::new(storage.clone()), config());

    let outcome = engine.open().await.expect("open");
    engine.flush().await.expect("flush");

    assert!(matches!(outcome, LoadOutcome::Empty));
    let kinds: Vec<_> = storage.events("p").await.into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [tags::RESET]);
    assert_eq!(pixel(&engine.core, 0, 0, 0), WHITE);
}

#[tokio::test]
async fn replay_reproduces_live_document() {
    let storage = MemoryStorage::new();
    let mut live = Engine::with_storage("p", Arc::new(storage.clone()), config());
    live.open().await.expect("open");

    stroke(&mut live.core, (2.0, 2.0), (12.0, 6.0));
    assert!(live.core.add_layer());
    assert!(live.core.fill_layer(RED));
    live.core.set_layer_opacity(1, 0.8, true);
    live.core.set_layer_opacity(1, 0.5, true);
    live.core.finish_opacity_change();
    live.core.set_tool(Tool::Shape);
    drag(&mut live.core, (1.0, 1.0), (9.0, 9.0));
    live.core.undo();
    live.core.undo();
    live.core.redo();
    live.core.set_active_layer(0);
    live.core.set_tool(Tool::Brush);
    stroke(&mut live.core, (14.0, 1.0), (1.0, 14.0));
    live.flush().await.expect("flush");

    let journal = storage.events("p").await;
    let mut replayed = Engine::with_storage("p", Arc::new(MemoryStorage::with_events("p", journal.clone())), config());
    let outcome = replayed.open().await.expect("open");

    let LoadOutcome::Replayed(summary) = outcome else {
        panic!("expected replay, got {outcome:?}");
    };
    assert_eq!(summary, ReplaySummary { applied: journal.len(), skipped: 0 });
    assert_eq!(replayed.core.layers_state(), live.core.layers_state());
    assert_eq!(replayed.core.composed().flatten(), live.core.composed().flatten());
    assert_eq!(replayed.core.history().len(), live.core.history().len());
    assert_eq!(replayed.core.can_redo(), live.core.can_redo());
}

#[tokio::test]
async fn replay_does_not_journal_again() {
    let journal = vec![
        RecordedEvent::new(tags::RESET, 1, json!({"width": 16, "height": 16})),
        RecordedEvent::new(tags::ADD_LAYER, 2, json!({"index": 0})),
    ];
    let storage = MemoryStorage::with_events("p", journal);
    let mut engine = Engine::with_storage("p", Arc::new(storage.clone()), config());
    engine.open().await.expect("open");
    engine.flush().await.expect("flush");

    assert_eq!(storage.events("p").await.len(), 2);
    assert_eq!(engine.core.composed().layer_count(), 2);

    engine.core.add_layer();
    engine.flush().await.expect("flush");
    let events = storage.events("p").await;
    assert_eq!(events.len(), 3);
    assert!(events[2].timestamp > 2);
}

#[tokio::test]
async fn corrupt_records_are_skipped() {
    let journal = vec![
        RecordedEvent::new(tags::RESET, 1, json!({"width": 16, "height": 16})),
        RecordedEvent::new("teleport", 2, json!({})),
        RecordedEvent::new(tags::ADD_LAYER, 3, json!({"index": "top"})),
        RecordedEvent::new(DRAW_EVENT, 4, json!({"brush": {"id": "pen", "cfg": {}}, "events": ["Q"], "smoothing": 0})),
        RecordedEvent::new(tags::FILL, 5, json!({"index": 0, "color": {"r": 255, "g": 0, "b": 0}})),
    ];
    let mut engine = Engine::with_storage("p", Arc::new(MemoryStorage::with_events("p", journal)), config());

    let LoadOutcome::Replayed(summary) = engine.load_from_storage().await else {
        panic!("expected replay");
    };
    assert_eq!(summary, ReplaySummary { applied: 2, skipped: 3 });
    assert_eq!(pixel(&engine.core, 0, 0, 0), [255, 0, 0, 255]);
}

struct BrokenStorage;

#[async_trait::async_trait]
impl StorageProvider for BrokenStorage {
    async fn load(&self, _: &str) -> Result<Vec<RecordedEvent>, StorageError> {
        Err(StorageError::Unavailable("offline".into()))
    }

    async fn append(&self, _: &str, _: &RecordedEvent) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("offline".into()))
    }
}

#[tokio::test]
async fn unavailable_storage_still_opens_blank() {
    let mut engine = Engine::with_storage("p", Arc::new(BrokenStorage), config());
    let outcome = engine.open().await.expect("open");
    assert!(matches!(outcome, LoadOutcome::Unavailable(_)));
    assert_eq!(engine.core.composed().layer_count(), 1);

    let id = engine.core.recorder().expect("recorder").project_id().to_owned();
    assert_ne!(id, "p");
    assert_eq!(engine.core.composed().project_id, id);
}

/// Shared journal whose next `load` fails once.
struct OfflineOnce {
    offline: Mutex<bool>,
    inner: MemoryStorage,
}

#[async_trait::async_trait]
impl StorageProvider for OfflineOnce {
    async fn load(&self, project_id: &str) -> Result<Vec<RecordedEvent>, StorageError> {
        let offline = std::mem::take(&mut *self.offline.lock().unwrap());
        if offline {
            return Err(StorageError::Unavailable("offline".into()));
        }
        self.inner.load(project_id).await
    }

    async fn append(&self, project_id: &str, event: &RecordedEvent) -> Result<(), StorageError> {
        self.inner.append(project_id, event).await
    }
}

#[tokio::test]
async fn failed_load_leaves_existing_journal_untouched() {
    let shared = MemoryStorage::new();
    let mut first = Engine::with_storage("p", Arc::new(shared.clone()), config());
    first.open().await.expect("open");
    assert!(first.core.add_layer());
    assert!(first.core.fill_layer(Rgb::BLACK));
    first.flush().await.expect("flush");
    let before = shared.events("p").await;
    assert_eq!(before.len(), 3);

    let flaky = Arc::new(OfflineOnce { offline: Mutex::new(true), inner: shared.clone() });
    let mut second = Engine::with_storage("p", flaky.clone(), config());
    let outcome = second.open().await.expect("open");
    assert!(matches!(outcome, LoadOutcome::Unavailable(_)));
    assert!(second.core.add_layer());
    second.flush().await.expect("flush");

    assert_eq!(shared.events("p").await, before);
    let forked = second.core.recorder().expect("recorder").project_id().to_owned();
    let kinds: Vec<_> = shared.events(&forked).await.into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [tags::RESET, tags::ADD_LAYER]);

    let mut third = Engine::with_storage("p", flaky, config());
    assert!(matches!(third.open().await.expect("open"), LoadOutcome::Replayed(_)));
    assert_eq!(third.core.composed().layer_count(), 2);
}

#[test]
fn project_replay_keeps_project_id() {
    let mut engine = Engine::for_project("demo", config());
    let summary = engine.replay(&[RecordedEvent::new(tags::RESET, 1, json!({"width": 8, "height": 8}))]);
    assert_eq!(summary, ReplaySummary { applied: 1, skipped: 0 });
    assert!(engine.core.recorder().is_none());
    assert_eq!(engine.core.composed().project_id, "demo");
    assert_eq!(engine.core.composed().size, Size::new(8, 8));
}

#[test]
fn create_assigns_random_project_id() {
    let a = Engine::create(Arc::new(MemoryStorage::new()), config());
    let b = Engine::create(Arc::new(MemoryStorage::new()), config());
    let id = a.core.recorder().expect("recorder").project_id().to_owned();
    assert!(Uuid::parse_str(&id).is_ok());
    assert_ne!(id, b.core.recorder().expect("recorder").project_id());
}
