//! Drops degenerate pointer samples before they reach smoothing.
//!
//! Rejected: moves and ups outside a stroke, moves with no movement, moves
//! that repeat the previous timestamp, coalesced moves older than the previous
//! sample, and lines started mid-stroke. A second down while drawing first
//! closes the open stroke.

#[cfg(test)]
#[path = "sanitizer_test.rs"]
mod sanitizer_test;

use tracing::trace;

use crate::chain::{ChainElement, DrawEvent, DrawPoint};

#[derive(Debug, Default)]
pub struct Sanitizer {
    last: Option<DrawPoint>,
}

impl Sanitizer {
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.last.is_some()
    }
}

impl ChainElement for Sanitizer {
    #[allow(clippy::float_cmp)]
    fn chain_in(&mut self, event: DrawEvent, out: &mut Vec<DrawEvent>) {
        match event {
            DrawEvent::Down(p) => {
                if let Some(last) = self.last {
                    out.push(DrawEvent::Up { time: last.time });
                }
                self.last = Some(p);
                out.push(event);
            }
            DrawEvent::Move(p) => {
                let Some(last) = self.last else {
                    trace!("move outside stroke dropped");
                    return;
                };
                if p.x == last.x && p.y == last.y {
                    return;
                }
                if p.time == last.time || (p.is_coalesced && p.time < last.time) {
                    trace!(time = p.time, last = last.time, "stale sample dropped");
                    return;
                }
                self.last = Some(p);
                out.push(event);
            }
            DrawEvent::Up { .. } => {
                if self.last.take().is_some() {
                    out.push(event);
                }
            }
            DrawEvent::Line(_) => {
                if self.last.is_none() {
                    out.push(event);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
