//! Per-tool settings for the non-brush tools.
//!
//! Each record has a patch twin with every field optional. Applying a patch
//! clamps numbers into range and ignores non-finite values, so a record is
//! always usable as-is.

#[cfg(test)]
#[path = "tools_test.rs"]
mod tools_test;

use serde::{Deserialize, Serialize};

use crate::raster::{GradientKind, ShapeKind};

const MAX_LINE_WIDTH: f64 = 200.0;
const MIN_TEXT_SIZE: f64 = 1.0;
const MAX_TEXT_SIZE: f64 = 1000.0;

fn unit(value: Option<f32>, current: f32) -> f32 {
    value.filter(|v| v.is_finite()).map_or(current, |v| v.clamp(0.0, 1.0))
}

fn ranged(value: Option<f64>, current: f64, min: f64, max: f64) -> f64 {
    value.filter(|v| v.is_finite()).map_or(current, |v| v.clamp(min, max))
}

// =============================================================================
// SHAPE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeConfig {
    pub kind: ShapeKind,
    pub is_filled: bool,
    pub line_width: f64,
    pub opacity: f32,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self { kind: ShapeKind::Rect, is_filled: false, line_width: 2.0, opacity: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShapeConfigPatch {
    pub kind: Option<ShapeKind>,
    pub is_filled: Option<bool>,
    pub line_width: Option<f64>,
    pub opacity: Option<f32>,
}

impl ShapeConfig {
    pub fn apply(&mut self, patch: ShapeConfigPatch) {
        self.kind = patch.kind.unwrap_or(self.kind);
        self.is_filled = patch.is_filled.unwrap_or(self.is_filled);
        self.line_width = ranged(patch.line_width, self.line_width, 1.0, MAX_LINE_WIDTH);
        self.opacity = unit(patch.opacity, self.opacity);
    }
}

// =============================================================================
// GRADIENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientConfig {
    pub kind: GradientKind,
    pub opacity: f32,
    /// Fade to transparent instead of the secondary color.
    pub to_transparent: bool,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self { kind: GradientKind::Linear, opacity: 1.0, to_transparent: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GradientConfigPatch {
    pub kind: Option<GradientKind>,
    pub opacity: Option<f32>,
    pub to_transparent: Option<bool>,
}

impl GradientConfig {
    pub fn apply(&mut self, patch: GradientConfigPatch) {
        self.kind = patch.kind.unwrap_or(self.kind);
        self.opacity = unit(patch.opacity, self.opacity);
        self.to_transparent = patch.to_transparent.unwrap_or(self.to_transparent);
    }
}

// =============================================================================
// FILL
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillConfig {
    /// Per-channel color distance still counted as the seed color.
    pub tolerance: u8,
    pub opacity: f32,
    pub is_eraser: bool,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self { tolerance: 0, opacity: 1.0, is_eraser: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FillConfigPatch {
    pub tolerance: Option<u8>,
    pub opacity: Option<f32>,
    pub is_eraser: Option<bool>,
}

impl FillConfig {
    pub fn apply(&mut self, patch: FillConfigPatch) {
        self.tolerance = patch.tolerance.unwrap_or(self.tolerance);
        self.opacity = unit(patch.opacity, self.opacity);
        self.is_eraser = patch.is_eraser.unwrap_or(self.is_eraser);
    }
}

// =============================================================================
// TEXT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfig {
    pub text: String,
    pub size: f64,
    pub opacity: f32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self { text: "Text".into(), size: 24.0, opacity: 1.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextConfigPatch {
    pub text: Option<String>,
    pub size: Option<f64>,
    pub opacity: Option<f32>,
}

impl TextConfig {
    pub fn apply(&mut self, patch: TextConfigPatch) {
        if let Some(text) = patch.text {
            self.text = text;
        }
        self.size = ranged(patch.size, self.size, MIN_TEXT_SIZE, MAX_TEXT_SIZE);
        self.opacity = unit(patch.opacity, self.opacity);
    }
}
