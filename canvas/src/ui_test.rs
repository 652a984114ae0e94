use std::sync::{Arc, Mutex};

use super::*;

// =============================================================
// UiState
// =============================================================

#[test]
fn default_state_paints_black_with_brush() {
    let state = UiState::default();
    assert_eq!(state.tool, Tool::Brush);
    assert_eq!(state.primary_color, Rgb::BLACK);
    assert_eq!(state.secondary_color, Rgb::WHITE);
    assert!(!state.can_undo);
}

#[test]
fn state_serializes_camel_case() {
    let json = serde_json::to_value(UiState::default()).expect("json");
    assert_eq!(json["tool"], "brush");
    assert_eq!(json["canRedo"], false);
}

// =============================================================
// UiEvents
// =============================================================

#[test]
fn emit_without_listeners_queues_for_polling() {
    let mut events = UiEvents::new();
    events.emit(UiEvent::IsDrawing(true));
    events.emit(UiEvent::StatusMessage("Undo".into()));

    assert_eq!(events.drain(), [UiEvent::IsDrawing(true), UiEvent::StatusMessage("Undo".into())]);
    assert!(events.drain().is_empty());
}

#[test]
fn emit_with_listener_skips_queue() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut events = UiEvents::new();
    events.emit(UiEvent::TransformChanged);
    events.subscribe(move |e| sink.lock().expect("lock").push(e.clone()));

    events.emit(UiEvent::IsDrawing(true));
    events.emit(UiEvent::StatusMessage("Undo".into()));

    assert_eq!(*seen.lock().expect("lock"), [UiEvent::IsDrawing(true), UiEvent::StatusMessage("Undo".into())]);
    assert_eq!(events.queued(), 0);
}

#[test]
fn polling_queue_keeps_newest_events() {
    let mut events = UiEvents::new();
    for n in 0..UI_EVENT_QUEUE_LIMIT + 10 {
        events.emit(UiEvent::StatusMessage(n.to_string()));
    }
    let drained = events.drain();
    assert_eq!(drained.len(), UI_EVENT_QUEUE_LIMIT);
    assert_eq!(drained[0], UiEvent::StatusMessage("10".into()));
}

// =============================================================
// ModalCounter
// =============================================================

#[test]
fn modal_counter_nests() {
    let mut modals = ModalCounter::new();
    modals.open();
    modals.open();
    modals.close();
    assert!(modals.is_open());
    modals.close();
    assert!(!modals.is_open());
}

#[test]
fn extra_close_is_ignored() {
    let mut modals = ModalCounter::new();
    modals.close();
    assert_eq!(modals.count(), 0);
}

#[test]
fn modal_subscribers_see_counts() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut modals = ModalCounter::new();
    modals.subscribe(move |n| sink.lock().expect("lock").push(n));
    modals.open();
    modals.close();
    modals.close();
    assert_eq!(*seen.lock().expect("lock"), [1, 0]);
}
