#![allow(clippy::float_cmp)]

use super::*;

fn down(x: f64, y: f64, t: f64) -> DrawEvent {
    DrawEvent::Down(DrawPoint::new(x, y, 0.5, t))
}

fn mv(x: f64, y: f64, t: f64) -> DrawEvent {
    DrawEvent::Move(DrawPoint::new(x, y, 0.5, t))
}

fn feed(s: &mut Smoothing, events: &[DrawEvent]) -> Vec<DrawEvent> {
    let mut out = Vec::new();
    for e in events {
        s.chain_in(*e, &mut out);
    }
    out
}

fn stroke() -> Vec<DrawEvent> {
    vec![
        down(0.0, 0.0, 0.0),
        mv(10.0, 0.0, 10.0),
        mv(20.0, 5.0, 20.0),
        mv(30.0, 0.0, 30.0),
        mv(40.0, 5.0, 40.0),
        DrawEvent::Up { time: 50.0 },
    ]
}

#[test]
fn translate_smoothing_saturates() {
    assert_eq!(translate_smoothing(0), 0.0);
    assert_eq!(translate_smoothing(5), SMOOTHING_TABLE[5]);
    assert_eq!(translate_smoothing(200), SMOOTHING_TABLE[5]);
}

#[test]
fn level_zero_passes_through() {
    let mut s = Smoothing::new(0);
    let input = stroke();
    assert_eq!(feed(&mut s, &input), input);
}

#[test]
fn smoothing_buffers_early_moves() {
    let mut s = Smoothing::new(3);
    let out = feed(&mut s, &[down(0.0, 0.0, 0.0), mv(10.0, 0.0, 10.0)]);
    assert_eq!(out.len(), 1);
}

#[test]
fn smoothing_emits_subdivided_segments_and_flushes_on_up() {
    let mut s = Smoothing::new(2);
    let out = feed(&mut s, &stroke());
    assert!(matches!(out.first(), Some(DrawEvent::Down(_))));
    assert!(matches!(out.last(), Some(DrawEvent::Up { .. })));
    // four filtered points after the down: four segments in total
    assert_eq!(out.len(), 2 + 4 * SMOOTHING_SUBDIVISIONS);
}

#[test]
fn smoothed_path_lags_raw_input() {
    let mut s = Smoothing::new(4);
    let out = feed(&mut s, &stroke());
    let last_move = out
        .iter()
        .rev()
        .find_map(|e| if let DrawEvent::Move(p) = e { Some(*p) } else { None })
        .expect("a move");
    assert!(last_move.x < 40.0);
    assert!(last_move.x > 0.0);
}

#[test]
fn smoothing_is_deterministic() {
    let mut a = Smoothing::new(3);
    let mut b = Smoothing::new(3);
    assert_eq!(feed(&mut a, &stroke()), feed(&mut b, &stroke()));
}

#[test]
fn segments_end_on_filtered_points() {
    let mut s = Smoothing::new(1);
    let out = feed(&mut s, &stroke());
    let DrawEvent::Move(p) = out[SMOOTHING_SUBDIVISIONS] else {
        unreachable!("expected move");
    };
    // first segment ends at the first filtered point: 0 + (10 - 0) * 0.65
    assert!((p.x - 6.5).abs() < 1e-9);
    assert!((p.time - 10.0).abs() < 1e-9);
}
