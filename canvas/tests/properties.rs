//! End-to-end properties of the history and replay engine, driven through
//! the public API only.
#![allow(clippy::float_cmp)]

use std::sync::Arc;

use canvas::config::EngineConfig;
use canvas::doc::ComposedState;
use canvas::document::{ResetParams, tags};
use canvas::engine::{Engine, EngineCore, LoadOutcome};
use canvas::input::PointerEvent;
use canvas::raster::Rgb;
use canvas::replay::ReplaySummary;
use canvas::selection::Selection;
use canvas::storage::MemoryStorage;
use journal::RecordedEvent;
use serde_json::json;

fn config() -> EngineConfig {
    EngineConfig { default_width: 32, default_height: 32, ..EngineConfig::default() }
}

fn stroke(core: &mut EngineCore, points: &[(f64, f64)]) {
    let mut time = 0.0;
    let mut samples = points.iter();
    let Some(&(x, y)) = samples.next() else {
        return;
    };
    core.on_pointer_down(PointerEvent::new(x, y, time));
    for &(x, y) in samples {
        time += 16.0;
        core.on_pointer_move(PointerEvent::new(x, y, time));
    }
    let &(x, y) = points.last().unwrap_or(&(x, y));
    core.on_pointer_up(PointerEvent::new(x, y, time + 16.0));
}

fn opacity(core: &EngineCore) -> f32 {
    core.layers_state().layers[0].opacity
}

// =============================================================
// 1. Undo/redo round trip
// =============================================================

#[test]
fn undo_then_redo_walks_the_same_states() {
    let mut core = EngineCore::new(config());
    let mut states: Vec<ComposedState> = vec![core.composed().clone()];

    stroke(&mut core, &[(2.0, 2.0), (20.0, 4.0), (28.0, 20.0)]);
    states.push(core.composed().clone());
    assert!(core.add_layer());
    states.push(core.composed().clone());
    assert!(core.fill_layer(Rgb::new(10, 200, 30)));
    states.push(core.composed().clone());
    assert!(core.set_layer_visibility(0, false));
    states.push(core.composed().clone());

    for expected in states.iter().rev().skip(1) {
        assert!(core.undo());
        assert_eq!(core.composed(), expected);
    }
    assert!(!core.can_undo());

    for expected in states.iter().skip(1) {
        assert!(core.redo());
        assert_eq!(core.composed(), expected);
    }
    assert!(!core.can_redo());
}

// =============================================================
// 2. Pause coalescing
// =============================================================

#[test]
fn opacity_burst_is_one_undo_step() {
    let mut core = EngineCore::new(config());
    stroke(&mut core, &[(4.0, 4.0), (8.0, 8.0)]);
    let entries = core.history().len();

    for value in [0.2, 0.5, 0.9] {
        assert!(core.set_layer_opacity(0, value, true));
    }
    core.finish_opacity_change();

    assert_eq!(core.history().len(), entries + 1);
    assert_eq!(opacity(&core), 0.9);
    assert!(core.undo());
    assert_eq!(opacity(&core), 1.0);
    assert_eq!(core.history().len(), entries + 1);
}

// =============================================================
// 3. Temp session isolation
// =============================================================

#[test]
fn temp_session_never_touches_committed_history() {
    let mut core = EngineCore::new(config());
    core.set_selection(Some(Selection::rect(4.0, 4.0, 8.0, 8.0)));
    assert!(core.fill_layer(Rgb::BLACK));
    let entry_a = core.composed().clone();
    let entries = core.history().len();

    assert!(core.begin_transform());
    assert!(core.translate_transform(5.0, 0.0));
    assert!(core.rotate_transform(90.0));
    assert!(core.undo());
    assert_eq!(core.composed(), &entry_a);
    assert_eq!(core.history().len(), entries);

    assert!(core.discard_uncommitted());
    assert_eq!(core.composed(), &entry_a);
    assert!(core.can_undo());
    assert!(core.undo());
    assert_ne!(core.composed(), &entry_a);
}

// =============================================================
// 4. Redo-branch truncation
// =============================================================

#[test]
fn new_edit_after_undo_drops_redo_branch() {
    let mut core = EngineCore::new(config());
    assert!(core.add_layer());
    assert!(core.rename_layer("B"));
    assert!(core.undo());
    assert!(core.can_redo());

    assert!(core.fill_layer(Rgb::WHITE));
    assert!(!core.can_redo());
    assert_eq!(core.history().len(), 2);
    assert!(!core.redo());
}

// =============================================================
// 5. Replay determinism
// =============================================================

#[tokio::test]
async fn replayed_journal_matches_live_session() {
    let storage = MemoryStorage::new();
    let mut live = Engine::with_storage("demo", Arc::new(storage.clone()), config());
    live.open().await.expect("open");

    live.core
        .reset(&ResetParams { width: 100, height: 100, fill: Some(Rgb::WHITE) })
        .expect("reset");
    stroke(&mut live.core, &[(10.0, 10.0), (50.0, 30.0), (90.0, 90.0)]);
    live.core.set_primary_color(Rgb::new(200, 0, 0));
    stroke(&mut live.core, &[(90.0, 10.0), (50.0, 50.0), (10.0, 90.0)]);
    assert!(live.core.undo());
    live.flush().await.expect("flush");

    let journal = storage.events("demo").await;
    let kinds: Vec<_> = journal.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, [tags::RESET, tags::RESET, "draw", "draw", tags::UNDO]);

    let mut replayed = Engine::with_storage("demo", Arc::new(MemoryStorage::with_events("demo", journal)), config());
    let outcome = replayed.open().await.expect("open");
    assert!(matches!(outcome, LoadOutcome::Replayed(ReplaySummary { applied: 5, skipped: 0 })));

    assert_eq!(replayed.core.composed().flatten(), live.core.composed().flatten());
    assert_eq!(replayed.core.history().len(), live.core.history().len());
    assert!(replayed.core.can_redo());

    assert!(replayed.core.redo());
    assert!(live.core.redo());
    assert_eq!(replayed.core.composed().flatten(), live.core.composed().flatten());
}

// =============================================================
// 6. Corrupt-log tolerance
// =============================================================

#[test]
fn unknown_record_between_draws_is_skipped() {
    let mut live = EngineCore::with_recorder(
        config(),
        canvas::recorder::EventRecorder::new("p", Arc::new(MemoryStorage::new()), &config()),
    );
    stroke(&mut live, &[(2.0, 2.0), (30.0, 2.0)]);
    stroke(&mut live, &[(2.0, 30.0), (30.0, 30.0)]);
    let clean = live.recorder().expect("recorder").pending().to_vec();
    assert_eq!(clean.len(), 2);

    let mut corrupt = clean.clone();
    corrupt.insert(1, RecordedEvent::new("hologram", clean[0].timestamp, json!({"x": 1})));

    let mut engine = Engine::new(config());
    let summary = engine.replay(&corrupt);
    assert_eq!(summary, ReplaySummary { applied: 2, skipped: 1 });
    assert_eq!(engine.core.composed().flatten(), live.composed().flatten());
}
