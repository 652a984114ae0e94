#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_ZOOM, MIN_ZOOM};
use crate::doc::Size;

/// A point in either screen or canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Pan/zoom state mapping the host element onto the canvas.
///
/// `pan_x` / `pan_y` are in screen pixels.
/// `zoom` is a scale factor (1.0 = one canvas pixel per screen pixel).
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0, width: 0.0, height: 0.0 }
    }
}

impl Viewport {
    /// Convert a screen-space point to canvas coordinates.
    #[must_use]
    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        Point {
            x: (screen.x - self.pan_x) / self.zoom,
            y: (screen.y - self.pan_y) / self.zoom,
        }
    }

    /// Convert a canvas-space point to screen coordinates.
    #[must_use]
    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        Point {
            x: canvas.x * self.zoom + self.pan_x,
            y: canvas.y * self.zoom + self.pan_y,
        }
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Multiply zoom by `factor`, keeping `anchor` (screen space) fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        let before = self.screen_to_canvas(anchor);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan_x = anchor.x - before.x * self.zoom;
        self.pan_y = anchor.y - before.y * self.zoom;
    }

    /// Center the canvas, shrinking it to fit but never enlarging past 1:1.
    pub fn fit(&mut self, size: Size) {
        let cw = f64::from(size.width);
        let ch = f64::from(size.height);
        if self.width <= 0.0 || self.height <= 0.0 {
            self.zoom = 1.0;
            self.pan_x = 0.0;
            self.pan_y = 0.0;
            return;
        }
        self.zoom = (self.width / cw).min(self.height / ch).min(1.0).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan_x = (self.width - cw * self.zoom) / 2.0;
        self.pan_y = (self.height - ch * self.zoom) / 2.0;
    }
}
