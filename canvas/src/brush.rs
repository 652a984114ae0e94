//! Brushes: turn chain output into dabs on a layer image.
//!
//! A brush owns its configuration. Configuration travels as JSON so the chain
//! recorder can snapshot it at stroke start and the replayer can restore it;
//! `apply_config_json` takes a partial object and clamps what it applies.

#[cfg(test)]
#[path = "brush_test.rs"]
mod brush_test;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{DrawEvent, DrawPoint};
use crate::chain_recorder::BrushSnapshot;
use crate::consts::{DAB_SPACING, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use crate::raster::{self, Paint, Rgb};
use crate::viewport::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushConfig {
    /// Diameter in canvas pixels.
    pub size: f32,
    pub opacity: f32,
    pub color: Rgb,
    /// Pressure scales the dab size.
    pub pressure_size: bool,
    /// Pressure scales the dab opacity.
    pub pressure_opacity: bool,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self { size: 4.0, opacity: 1.0, color: Rgb::BLACK, pressure_size: true, pressure_opacity: false }
    }
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushConfigPatch {
    pub size: Option<f32>,
    pub opacity: Option<f32>,
    pub color: Option<Rgb>,
    pub pressure_size: Option<bool>,
    pub pressure_opacity: Option<bool>,
}

impl BrushConfig {
    /// Apply `patch`, clamping size and opacity into range.
    pub fn apply(&mut self, patch: BrushConfigPatch) {
        if let Some(size) = patch.size.filter(|s| s.is_finite()) {
            self.size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
        }
        if let Some(opacity) = patch.opacity.filter(|o| o.is_finite()) {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
        self.color = patch.color.unwrap_or(self.color);
        self.pressure_size = patch.pressure_size.unwrap_or(self.pressure_size);
        self.pressure_opacity = patch.pressure_opacity.unwrap_or(self.pressure_opacity);
    }
}

/// A painting tool driven by draw events.
pub trait Brush: Send {
    fn id(&self) -> &'static str;

    fn config(&self) -> &BrushConfig;

    fn config_mut(&mut self) -> &mut BrushConfig;

    /// Paint one event onto `image`.
    fn draw(&mut self, image: &mut RgbaImage, event: &DrawEvent);

    /// Forget the last stroke position.
    fn reset(&mut self);

    /// Current configuration as JSON.
    fn config_json(&self) -> Value {
        serde_json::to_value(self.config()).unwrap_or(Value::Null)
    }

    /// Patch the configuration from a (possibly partial) JSON object.
    ///
    /// # Errors
    ///
    /// Returns the decode error when `value` does not describe a config patch.
    fn apply_config_json(&mut self, value: &Value) -> Result<(), serde_json::Error> {
        if value.is_null() {
            return Ok(());
        }
        let patch = BrushConfigPatch::deserialize(value)?;
        self.config_mut().apply(patch);
        Ok(())
    }
}

/// Round dab brush. `hard` gives aliased edges; `erase` removes paint.
pub struct DabBrush {
    id: &'static str,
    hard: bool,
    erase: bool,
    config: BrushConfig,
    last: Option<DrawPoint>,
}

impl DabBrush {
    /// Soft-edged pen.
    #[must_use]
    pub fn pen() -> Self {
        Self { id: "pen", hard: false, erase: false, config: BrushConfig::default(), last: None }
    }

    /// Hard-edged pixel brush.
    #[must_use]
    pub fn pixel() -> Self {
        let config = BrushConfig { size: 1.0, pressure_size: false, ..BrushConfig::default() };
        Self { id: "pixel", hard: true, erase: false, config, last: None }
    }

    #[must_use]
    pub fn eraser() -> Self {
        let config = BrushConfig { size: 20.0, ..BrushConfig::default() };
        Self { id: "eraser", hard: false, erase: true, config, last: None }
    }

    fn dab(&self, image: &mut RgbaImage, x: f64, y: f64, pressure: f32) {
        let pressure = pressure.clamp(0.0, 1.0);
        let size_scale = if self.config.pressure_size { f64::from(pressure) } else { 1.0 };
        let opacity_scale = if self.config.pressure_opacity { pressure } else { 1.0 };
        let radius = f64::from(self.config.size) / 2.0 * size_scale;
        let paint = Paint { erase: self.erase, ..Paint::solid(self.config.color, self.config.opacity * opacity_scale) };
        raster::stamp_dab(image, Point::new(x, y), radius, self.hard, paint);
    }

    /// Dabs from `(x0, y0)` (exclusive) to `(x1, y1)` (inclusive).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn segment(&self, image: &mut RgbaImage, from: (f64, f64, f32), to: (f64, f64, f32)) {
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let distance = (dx * dx + dy * dy).sqrt();
        let spacing = (f64::from(self.config.size) / 2.0 * DAB_SPACING).max(0.5);
        let steps = (distance / spacing).ceil().max(1.0) as usize;
        for step in 1..=steps {
            let t = step as f64 / steps as f64;
            let pressure = from.2 + (to.2 - from.2) * t as f32;
            self.dab(image, from.0 + dx * t, from.1 + dy * t, pressure);
        }
    }
}

impl Brush for DabBrush {
    fn id(&self) -> &'static str {
        self.id
    }

    fn config(&self) -> &BrushConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut BrushConfig {
        &mut self.config
    }

    fn draw(&mut self, image: &mut RgbaImage, event: &DrawEvent) {
        match event {
            DrawEvent::Down(p) => {
                self.dab(image, p.x, p.y, p.pressure);
                self.last = Some(*p);
            }
            DrawEvent::Move(p) => {
                if let Some(last) = self.last {
                    self.segment(image, (last.x, last.y, last.pressure), (p.x, p.y, p.pressure));
                }
                self.last = Some(*p);
            }
            DrawEvent::Up { .. } => self.last = None,
            DrawEvent::Line(line) => {
                self.dab(image, line.x0, line.y0, line.pressure0);
                self.segment(image, (line.x0, line.y0, line.pressure0), (line.x1, line.y1, line.pressure1));
            }
        }
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// The brushes an engine offers, with one current.
pub struct BrushSet {
    brushes: Vec<Box<dyn Brush>>,
    current: usize,
}

impl Default for BrushSet {
    fn default() -> Self {
        Self { brushes: vec![Box::new(DabBrush::pen()), Box::new(DabBrush::pixel()), Box::new(DabBrush::eraser())], current: 0 }
    }
}

impl BrushSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> &dyn Brush {
        self.brushes[self.current].as_ref()
    }

    pub fn current_mut(&mut self) -> &mut dyn Brush {
        self.brushes[self.current].as_mut()
    }

    #[must_use]
    pub fn current_id(&self) -> &'static str {
        self.current().id()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.brushes.iter().map(|b| b.id()).collect()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.brushes.iter().any(|b| b.id() == id)
    }

    /// Make `id` current. `false` for an unknown id.
    pub fn select(&mut self, id: &str) -> bool {
        match self.brushes.iter().position(|b| b.id() == id) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }

    /// Advance to the next painting brush, skipping the eraser.
    pub fn cycle(&mut self) -> &'static str {
        let count = self.brushes.len();
        for offset in 1..=count {
            let index = (self.current + offset) % count;
            if self.brushes[index].id() != "eraser" {
                self.current = index;
                break;
            }
        }
        self.current_id()
    }

    /// Set the paint color of every brush.
    pub fn set_color(&mut self, color: Rgb) {
        for brush in &mut self.brushes {
            brush.config_mut().color = color;
        }
    }

    /// Id and configuration of the current brush.
    #[must_use]
    pub fn snapshot(&self) -> BrushSnapshot {
        BrushSnapshot { id: self.current_id().to_owned(), cfg: self.current().config_json() }
    }

    /// Forget stroke positions in every brush.
    pub fn reset(&mut self) {
        for brush in &mut self.brushes {
            brush.reset();
        }
    }
}
