//! Stroke batching for the journal.
//!
//! The recorder stage sees raw samples before sanitizing, so replaying its
//! output through the rest of the chain reproduces the live stroke exactly.
//! A whole stroke, from down to up, becomes one `draw` record carrying the
//! brush in effect at stroke start and compact sample strings:
//!
//! | Sample | Form |
//! |--------|------|
//! | down | `D x,y,pressure,time[,c]` |
//! | move | `M x,y,pressure,time[,c]` |
//! | up | `U time` |
//! | line | `L x0,y0,x1,y1,pressure0,pressure1` |
//!
//! A trailing `c` marks a coalesced sample.

#[cfg(test)]
#[path = "chain_recorder_test.rs"]
mod chain_recorder_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{DrawEvent, DrawPoint, LineSegment};

/// Journal tag of a batched stroke.
pub const DRAW_EVENT: &str = "draw";

/// Brush id plus configuration at stroke start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushSnapshot {
    pub id: String,
    #[serde(default)]
    pub cfg: Value,
}

/// Engine state the recorder snapshots when a stroke begins.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeContext {
    pub brush: BrushSnapshot,
    pub smoothing: u8,
}

/// Payload of a `draw` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub brush: BrushSnapshot,
    pub events: Vec<String>,
    #[serde(default)]
    pub smoothing: u8,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("empty sample")]
    Empty,
    #[error("unknown sample kind `{0}`")]
    UnknownKind(String),
    #[error("sample `{0}` has the wrong number of fields")]
    Arity(String),
    #[error("sample `{0}` has a non-numeric field")]
    Number(String),
}

#[derive(Debug, Default)]
pub struct ChainRecorder {
    current: Option<(StrokeContext, Vec<String>)>,
}

impl ChainRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Note one raw sample. Returns the finished record when `event` ends a
    /// stroke.
    pub fn observe(&mut self, event: &DrawEvent, context: &StrokeContext) -> Option<DrawRecord> {
        let sample = encode_sample(event);
        match event {
            DrawEvent::Down(_) => {
                self.current
                    .get_or_insert_with(|| (context.clone(), Vec::new()))
                    .1
                    .push(sample);
                None
            }
            DrawEvent::Move(_) => {
                if let Some((_, samples)) = self.current.as_mut() {
                    samples.push(sample);
                }
                None
            }
            DrawEvent::Up { .. } => {
                let (context, mut events) = self.current.take()?;
                events.push(sample);
                Some(DrawRecord { brush: context.brush, events, smoothing: context.smoothing })
            }
            DrawEvent::Line(_) => {
                if let Some((_, samples)) = self.current.as_mut() {
                    samples.push(sample);
                    return None;
                }
                Some(DrawRecord { brush: context.brush.clone(), events: vec![sample], smoothing: context.smoothing })
            }
        }
    }

    #[must_use]
    pub fn is_recording_stroke(&self) -> bool {
        self.current.is_some()
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[must_use]
pub fn encode_sample(event: &DrawEvent) -> String {
    let point = |tag: char, p: &DrawPoint| {
        let flag = if p.is_coalesced { ",c" } else { "" };
        format!("{tag} {},{},{},{}{flag}", p.x, p.y, p.pressure, p.time)
    };
    match event {
        DrawEvent::Down(p) => point('D', p),
        DrawEvent::Move(p) => point('M', p),
        DrawEvent::Up { time } => format!("U {time}"),
        DrawEvent::Line(l) => format!("L {},{},{},{},{},{}", l.x0, l.y0, l.x1, l.y1, l.pressure0, l.pressure1),
    }
}

/// Parse one compact sample.
///
/// # Errors
///
/// Returns a [`SampleError`] describing the first problem found.
pub fn decode_sample(sample: &str) -> Result<DrawEvent, SampleError> {
    let sample = sample.trim();
    let (tag, body) = sample.split_once(' ').ok_or_else(|| {
        if sample.is_empty() { SampleError::Empty } else { SampleError::Arity(sample.to_owned()) }
    })?;
    let mut fields: Vec<&str> = body.split(',').map(str::trim).collect();
    let is_coalesced = fields.last() == Some(&"c");
    if is_coalesced {
        fields.pop();
    }
    let arity = |n: usize| if fields.len() == n { Ok(()) } else { Err(SampleError::Arity(sample.to_owned())) };
    let num = |i: usize| fields[i].parse::<f64>().map_err(|_| SampleError::Number(sample.to_owned()));
    let pressure = |i: usize| fields[i].parse::<f32>().map_err(|_| SampleError::Number(sample.to_owned()));

    let event = match tag {
        "D" | "M" => {
            arity(4)?;
            let p = DrawPoint { x: num(0)?, y: num(1)?, pressure: pressure(2)?, time: num(3)?, is_coalesced };
            if tag == "D" { DrawEvent::Down(p) } else { DrawEvent::Move(p) }
        }
        "U" => {
            arity(1)?;
            DrawEvent::Up { time: num(0)? }
        }
        "L" => {
            arity(6)?;
            DrawEvent::Line(LineSegment {
                x0: num(0)?,
                y0: num(1)?,
                x1: num(2)?,
                y1: num(3)?,
                pressure0: pressure(4)?,
                pressure1: pressure(5)?,
            })
        }
        other => return Err(SampleError::UnknownKind(other.to_owned())),
    };
    Ok(event)
}

/// Parse every sample of a record.
///
/// # Errors
///
/// Fails on the first malformed sample.
pub fn decode_samples(samples: &[String]) -> Result<Vec<DrawEvent>, SampleError> {
    samples.iter().map(|s| decode_sample(s)).collect()
}
