//! Pointer input pipeline: raw samples in, brush-ready draw events out.
//!
//! Stages run in a fixed order for every sample:
//!
//! 1. recorder (optional): observes the raw sample and, at stroke end, yields
//!    one compact [`DrawRecord`] for the journal; never alters samples
//! 2. [`Sanitizer`]: drops degenerate samples and tracks whether a stroke is
//!    in progress
//! 3. [`Smoothing`]: pre-filters and interpolates positions
//!
//! One sample fully propagates before the next is accepted. Output order
//! follows input order, but a stage may emit more or fewer events than it
//! received.

#[cfg(test)]
#[path = "chain_test.rs"]
mod chain_test;

use crate::chain_recorder::{ChainRecorder, DrawRecord, StrokeContext};
use crate::sanitizer::Sanitizer;
use crate::smoothing::Smoothing;

/// One pointer sample in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawPoint {
    pub x: f64,
    pub y: f64,
    /// 0..=1; mice report 0.5.
    pub pressure: f32,
    /// Milliseconds, host clock.
    pub time: f64,
    /// Sample was batched by the host between two frames.
    pub is_coalesced: bool,
}

impl DrawPoint {
    #[must_use]
    pub fn new(x: f64, y: f64, pressure: f32, time: f64) -> Self {
        Self { x, y, pressure, time, is_coalesced: false }
    }
}

/// Straight segment drawn in one go (shift-click lines).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub pressure0: f32,
    pub pressure1: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawEvent {
    Down(DrawPoint),
    Move(DrawPoint),
    Up { time: f64 },
    Line(LineSegment),
}

/// A stateful stage of the chain.
pub trait ChainElement: Send {
    /// Consume one event, appending zero or more events to `out`.
    fn chain_in(&mut self, event: DrawEvent, out: &mut Vec<DrawEvent>);

    /// Forget any in-progress stroke.
    fn reset(&mut self);
}

/// Result of feeding one raw sample.
#[derive(Debug, Default)]
pub struct ChainOutput {
    /// Events for the brush.
    pub events: Vec<DrawEvent>,
    /// Completed stroke, when this sample ended one and a recorder is attached.
    pub recorded: Option<DrawRecord>,
}

pub struct EventChain {
    recorder: Option<ChainRecorder>,
    sanitizer: Sanitizer,
    smoothing: Smoothing,
}

impl EventChain {
    #[must_use]
    pub fn new(smoothing_level: u8) -> Self {
        Self { recorder: None, sanitizer: Sanitizer::default(), smoothing: Smoothing::new(smoothing_level) }
    }

    /// Attach the recorder stage.
    #[must_use]
    pub fn with_recorder(mut self, recorder: ChainRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    #[must_use]
    pub fn has_recorder(&self) -> bool {
        self.recorder.is_some()
    }

    /// Feed one live sample through every stage.
    pub fn chain_in(&mut self, event: DrawEvent, context: &StrokeContext) -> ChainOutput {
        let recorded = self.recorder.as_mut().and_then(|r| r.observe(&event, context));
        ChainOutput { events: self.run_stages(event), recorded }
    }

    /// Feed recorded samples, skipping the recorder stage.
    pub fn replay(&mut self, events: &[DrawEvent]) -> Vec<DrawEvent> {
        let mut out = Vec::new();
        for event in events {
            out.extend(self.run_stages(*event));
        }
        out
    }

    /// A stroke is in progress.
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.sanitizer.is_drawing()
    }

    #[must_use]
    pub fn smoothing_level(&self) -> u8 {
        self.smoothing.level()
    }

    pub fn set_smoothing_level(&mut self, level: u8) {
        self.smoothing.set_level(level);
    }

    /// Drop any half-finished stroke in every stage.
    pub fn reset(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.reset();
        }
        self.sanitizer.reset();
        self.smoothing.reset();
    }

    fn run_stages(&mut self, event: DrawEvent) -> Vec<DrawEvent> {
        let mut sanitized = Vec::with_capacity(2);
        self.sanitizer.chain_in(event, &mut sanitized);
        let mut out = Vec::with_capacity(sanitized.len());
        for e in sanitized {
            self.smoothing.chain_in(e, &mut out);
        }
        out
    }
}
