//! Selection geometry: polygon selections, their raster masks, and the affine
//! matrix used by selection transforms.
//!
//! A selection is a set of closed polygons combined with the even-odd rule, so
//! a polygon nested inside another punches a hole. Pixels are tested at their
//! centers.

#[cfg(test)]
#[path = "selection_test.rs"]
mod selection_test;

use serde::{Deserialize, Serialize};

use crate::doc::Size;
use crate::viewport::Point;

/// 2D affine transform `[a c e; b d f; 0 0 1]`, laid out like a canvas matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    #[must_use]
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    #[must_use]
    pub fn translate(x: f64, y: f64) -> Self {
        Self { e: x, f: y, ..Self::identity() }
    }

    #[must_use]
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, d: sy, ..Self::identity() }
    }

    /// Rotation by `degrees`, clockwise in screen coordinates.
    #[must_use]
    pub fn rotate(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    /// `self * other`: apply `other` first, then `self`.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    /// Inverse transform, or `None` for a degenerate matrix.
    #[must_use]
    pub fn invert(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

/// Polygon selection in canvas coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub polygons: Vec<Vec<Point>>,
}

impl Selection {
    /// Axis-aligned rectangular selection.
    #[must_use]
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            polygons: vec![vec![
                Point::new(x, y),
                Point::new(x + width, y),
                Point::new(x + width, y + height),
                Point::new(x, y + height),
            ]],
        }
    }

    /// True when no polygon has at least three vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.polygons.iter().all(|p| p.len() < 3)
    }

    /// Even-odd containment test across all polygons.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        let mut inside = false;
        for polygon in &self.polygons {
            if polygon.len() < 3 {
                continue;
            }
            let mut j = polygon.len() - 1;
            for i in 0..polygon.len() {
                let (pi, pj) = (polygon[i], polygon[j]);
                if (pi.y > p.y) != (pj.y > p.y) && p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// Center of the bounding box, or `None` when there are no vertices.
    #[must_use]
    pub fn center(&self) -> Option<Point> {
        let mut points = self.polygons.iter().flatten();
        let first = *points.next()?;
        let (mut min, mut max) = (first, first);
        for p in points {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        Some(Point::new(f64::midpoint(min.x, max.x), f64::midpoint(min.y, max.y)))
    }

    #[must_use]
    pub fn transformed(&self, matrix: &Matrix) -> Self {
        Self {
            polygons: self
                .polygons
                .iter()
                .map(|poly| poly.iter().map(|p| matrix.apply(*p)).collect())
                .collect(),
        }
    }

    /// Rasterize the selection at pixel centers.
    #[must_use]
    pub fn mask(&self, size: Size) -> SelectionMask {
        let mut bits = Vec::with_capacity(size.pixel_count());
        for y in 0..size.height {
            for x in 0..size.width {
                bits.push(self.contains(Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5)));
            }
        }
        SelectionMask { width: size.width, height: size.height, bits }
    }
}

/// Per-pixel selection coverage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl SelectionMask {
    /// Whether pixel `(x, y)` is selected. Out-of-range pixels never are.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[(y as usize) * (self.width as usize) + x as usize]
    }

    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }
}

/// Optional mask test: no mask means everything is editable.
#[must_use]
pub fn mask_allows(mask: Option<&SelectionMask>, x: u32, y: u32) -> bool {
    mask.is_none_or(|m| m.contains(x, y))
}
