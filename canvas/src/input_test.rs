use super::*;

fn plain() -> Modifiers {
    Modifiers::default()
}

fn ctrl() -> Modifiers {
    Modifiers { ctrl: true, ..Modifiers::default() }
}

fn key(name: &str, modifiers: Modifiers) -> Option<Shortcut> {
    Shortcut::from_key(&Key::new(name), modifiers)
}

// =============================================================
// Tool
// =============================================================

#[test]
fn tool_default_is_brush() {
    assert_eq!(Tool::default(), Tool::Brush);
}

#[test]
fn drag_edit_tools() {
    assert!(Tool::Shape.is_drag_edit());
    assert!(Tool::Select.is_drag_edit());
    assert!(!Tool::Brush.is_drag_edit());
    assert!(!Tool::Fill.is_drag_edit());
}

#[test]
fn tool_serializes_camel_case() {
    assert_eq!(serde_json::to_value(Tool::Gradient).expect("json"), serde_json::json!("gradient"));
}

// =============================================================
// Modifiers
// =============================================================

#[test]
fn command_is_ctrl_or_meta() {
    assert!(ctrl().command());
    assert!(Modifiers { meta: true, ..Modifiers::default() }.command());
    assert!(!Modifiers { shift: true, alt: true, ..Modifiers::default() }.command());
}

// =============================================================
// Shortcut table
// =============================================================

#[test]
fn undo_redo_bindings() {
    assert_eq!(key("z", ctrl()), Some(Shortcut::Undo));
    assert_eq!(key("y", ctrl()), Some(Shortcut::Redo));
    assert_eq!(key("Z", Modifiers { shift: true, ..ctrl() }), Some(Shortcut::Redo));
    assert_eq!(key("z", Modifiers { meta: true, ..Modifiers::default() }), Some(Shortcut::Undo));
}

#[test]
fn plain_z_is_not_undo() {
    assert_eq!(key("z", plain()), None);
}

#[test]
fn session_keys() {
    assert_eq!(key("Enter", plain()), Some(Shortcut::Apply));
    assert_eq!(key("Escape", plain()), Some(Shortcut::Discard));
    assert_eq!(key("Delete", plain()), Some(Shortcut::EraseLayer));
    assert_eq!(key("Backspace", plain()), Some(Shortcut::EraseLayer));
}

#[test]
fn brush_keys() {
    assert_eq!(key("e", plain()), Some(Shortcut::ToggleEraser));
    assert_eq!(key("B", plain()), Some(Shortcut::CycleBrush));
    assert_eq!(key("x", plain()), Some(Shortcut::SwapColors));
    assert_eq!(key("[", plain()), Some(Shortcut::DecreaseBrushSize));
    assert_eq!(key("]", plain()), Some(Shortcut::IncreaseBrushSize));
}

#[test]
fn tool_keys() {
    assert_eq!(key("t", plain()), Some(Shortcut::SelectTool(Tool::Text)));
    assert_eq!(key("u", plain()), Some(Shortcut::SelectTool(Tool::Shape)));
    assert_eq!(key("l", plain()), Some(Shortcut::SelectTool(Tool::Select)));
    assert_eq!(key("g", plain()), Some(Shortcut::SelectTool(Tool::Gradient)));
    assert_eq!(key("f", plain()), Some(Shortcut::SelectTool(Tool::Fill)));
}

#[test]
fn alt_and_unknown_keys_are_unbound() {
    assert_eq!(key("e", Modifiers { alt: true, ..Modifiers::default() }), None);
    assert_eq!(key("q", plain()), None);
    assert_eq!(key("e", ctrl()), None);
}

#[test]
fn pointer_event_defaults_to_mouse() {
    let event = PointerEvent::new(1.0, 2.0, 3.0).with_modifiers(Modifiers { shift: true, ..Modifiers::default() });
    assert!((event.pressure - 0.5).abs() < f32::EPSILON);
    assert!(event.modifiers.shift);
    assert!(!event.is_coalesced);
}
