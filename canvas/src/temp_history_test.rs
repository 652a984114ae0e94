use super::*;

fn step(target: usize) -> TempHistoryEntry {
    TempHistoryEntry::SelectTransform(SelectTransform {
        transform: Matrix::translate(target as f64, 0.0),
        do_clone: false,
        target_layer_index: target,
        background_is_transparent: true,
    })
}

fn active() -> TempHistory {
    let mut temp = TempHistory::new();
    temp.set_is_active(true);
    temp
}

#[test]
fn inactive_stack_ignores_pushes() {
    let mut temp = TempHistory::new();
    temp.push(step(1));
    temp.replace_top(step(2));
    assert!(temp.entries().is_empty());
    assert!(!temp.can_decrease_index());
}

#[test]
fn push_and_step_through() {
    let mut temp = active();
    temp.push(step(1));
    temp.push(step(2));
    assert!(temp.can_decrease_index());
    assert!(!temp.can_increase_index());

    assert!(temp.decrease_index());
    assert_eq!(temp.top(), Some(&step(1)));
    assert!(temp.increase_index());
    assert_eq!(temp.top(), Some(&step(2)));
    assert!(!temp.increase_index());
}

#[test]
fn decrease_to_start_leaves_no_top() {
    let mut temp = active();
    temp.push(step(1));
    assert!(temp.decrease_index());
    assert!(!temp.decrease_index());
    assert!(temp.top().is_none());
    assert!(temp.can_increase_index());
}

#[test]
fn replace_top_overwrites_in_place() {
    let mut temp = active();
    temp.push(step(1));
    temp.replace_top(step(5));
    assert_eq!(temp.entries(), &[step(5)]);
}

#[test]
fn replace_top_on_empty_pushes() {
    let mut temp = active();
    temp.replace_top(step(3));
    assert_eq!(temp.entries().len(), 1);
}

#[test]
fn replace_top_drops_redo_steps() {
    let mut temp = active();
    temp.push(step(1));
    temp.push(step(2));
    temp.decrease_index();
    temp.replace_top(step(9));
    assert!(!temp.can_increase_index());
    assert_eq!(temp.entries(), &[step(9)]);
}

#[test]
fn push_after_decrease_truncates() {
    let mut temp = active();
    temp.push(step(1));
    temp.push(step(2));
    temp.decrease_index();
    temp.push(step(3));
    assert_eq!(temp.entries(), &[step(1), step(3)]);
}

#[test]
fn deactivating_clears() {
    let mut temp = active();
    temp.push(step(1));
    temp.set_is_active(false);
    temp.set_is_active(true);
    assert!(temp.entries().is_empty());
}

#[test]
fn entry_serializes_with_type_tag() {
    let json = serde_json::to_value(step(2)).expect("serialize");
    assert_eq!(json["type"], "select-transform");
    assert_eq!(json["data"]["targetLayerIndex"], 2);
}
