//! Stroke smoothing: an exponential pre-filter followed by Catmull-Rom
//! interpolation over a trailing window.
//!
//! Each move is first pulled toward the previous filtered position, then a
//! curve segment is emitted once the point after its end is known. Segments
//! still pending when the stroke ends are flushed with the last point
//! repeated as the trailing control point.

#[cfg(test)]
#[path = "smoothing_test.rs"]
mod smoothing_test;

use crate::chain::{ChainElement, DrawEvent, DrawPoint};
use crate::consts::{SMOOTHING_SUBDIVISIONS, SMOOTHING_TABLE};

/// Filter weight for a smoothing level; levels above the table saturate.
#[must_use]
pub fn translate_smoothing(level: u8) -> f64 {
    let idx = usize::from(level).min(SMOOTHING_TABLE.len() - 1);
    SMOOTHING_TABLE[idx]
}

#[derive(Debug)]
pub struct Smoothing {
    level: u8,
    strength: f64,
    /// Filtered points from the control point before the next segment on.
    points: Vec<DrawPoint>,
    /// Index in `points` where the next segment starts.
    next: usize,
    filtered: Option<(f64, f64)>,
}

impl Smoothing {
    #[must_use]
    pub fn new(level: u8) -> Self {
        let mut smoothing = Self { level: 0, strength: 0.0, points: Vec::new(), next: 0, filtered: None };
        smoothing.set_level(level);
        smoothing
    }

    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(u8::try_from(SMOOTHING_TABLE.len() - 1).unwrap_or(u8::MAX));
        self.strength = translate_smoothing(self.level);
    }

    fn emit_ready(&mut self, finishing: bool, out: &mut Vec<DrawEvent>) {
        loop {
            let i = self.next;
            let len = self.points.len();
            let ready = i + 2 < len || (finishing && i + 1 < len);
            if !ready {
                break;
            }
            let p0 = self.points[i.saturating_sub(1)];
            let p1 = self.points[i];
            let p2 = self.points[i + 1];
            let p3 = self.points[(i + 2).min(len - 1)];
            for step in 1..=SMOOTHING_SUBDIVISIONS {
                #[allow(clippy::cast_precision_loss)]
                let t = step as f64 / SMOOTHING_SUBDIVISIONS as f64;
                out.push(DrawEvent::Move(catmull_rom(p0, p1, p2, p3, t)));
            }
            self.next += 1;
        }
        if self.next >= 2 {
            let consumed = self.next - 1;
            self.points.drain(..consumed);
            self.next -= consumed;
        }
    }
}

impl ChainElement for Smoothing {
    fn chain_in(&mut self, event: DrawEvent, out: &mut Vec<DrawEvent>) {
        match event {
            DrawEvent::Down(p) => {
                self.reset();
                self.points.push(p);
                self.filtered = Some((p.x, p.y));
                out.push(event);
            }
            DrawEvent::Move(p) => {
                let Some((fx, fy)) = self.filtered.filter(|_| self.strength > 0.0) else {
                    out.push(event);
                    return;
                };
                let k = 1.0 - self.strength;
                let (nx, ny) = (fx + (p.x - fx) * k, fy + (p.y - fy) * k);
                self.filtered = Some((nx, ny));
                self.points.push(DrawPoint { x: nx, y: ny, is_coalesced: false, ..p });
                self.emit_ready(false, out);
            }
            DrawEvent::Up { .. } => {
                if self.strength > 0.0 {
                    self.emit_ready(true, out);
                }
                self.reset();
                out.push(event);
            }
            DrawEvent::Line(_) => out.push(event),
        }
    }

    fn reset(&mut self) {
        self.points.clear();
        self.next = 0;
        self.filtered = None;
    }
}

/// Uniform Catmull-Rom between `p1` and `p2`; pressure and time are linear.
fn catmull_rom(p0: DrawPoint, p1: DrawPoint, p2: DrawPoint, p3: DrawPoint, t: f64) -> DrawPoint {
    let t2 = t * t;
    let t3 = t2 * t;
    let axis = |a: f64, b: f64, c: f64, d: f64| {
        0.5 * (2.0 * b + (-a + c) * t + (2.0 * a - 5.0 * b + 4.0 * c - d) * t2 + (-a + 3.0 * b - 3.0 * c + d) * t3)
    };
    #[allow(clippy::cast_possible_truncation)]
    let pressure = p1.pressure + (p2.pressure - p1.pressure) * t as f32;
    DrawPoint {
        x: axis(p0.x, p1.x, p2.x, p3.x),
        y: axis(p0.y, p1.y, p2.y, p3.y),
        pressure,
        time: p1.time + (p2.time - p1.time) * t,
        is_coalesced: false,
    }
}
