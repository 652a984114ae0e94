//! Minimal deterministic pixel operations behind the document mutations.
//!
//! Everything here works on straight-alpha RGBA images and samples pixel
//! centers. Edits that honor a selection take an optional mask; `None` means
//! the whole layer is editable.

#[cfg(test)]
#[path = "raster_test.rs"]
mod raster_test;

use std::collections::VecDeque;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::doc::{MixMode, Size};
use crate::selection::{Matrix, SelectionMask, mask_allows};
use crate::viewport::Point;

/// Opaque color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };
    pub const WHITE: Self = Self { r: 255, g: 255, b: 255 };

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub fn with_alpha(self, a: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, a])
    }
}

/// Kind of gradient ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    #[default]
    Linear,
    Radial,
}

/// Geometric primitive drawn by the shape tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Rect,
    Ellipse,
    Line,
}

/// Paint applied by region operations.
#[derive(Debug, Clone, Copy)]
pub struct Paint {
    pub color: Rgb,
    pub opacity: f32,
    pub erase: bool,
}

impl Paint {
    #[must_use]
    pub fn solid(color: Rgb, opacity: f32) -> Self {
        Self { color, opacity: opacity.clamp(0.0, 1.0), erase: false }
    }
}

#[must_use]
pub fn blank(size: Size, color: Option<Rgb>) -> RgbaImage {
    RgbaImage::from_pixel(size.width, size.height, color.map_or(Rgba([0, 0, 0, 0]), |c| c.with_alpha(255)))
}

/// Source-over `color` onto `dst` with coverage `alpha` (0..=1).
pub fn blend_over(dst: &mut Rgba<u8>, color: Rgb, alpha: f32) {
    let sa = alpha.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let mix = |s: u8, d: u8| -> u8 {
        let v = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
        to_u8(v)
    };
    *dst = Rgba([mix(color.r, dst[0]), mix(color.g, dst[1]), mix(color.b, dst[2]), to_u8(out_a * 255.0)]);
}

/// Reduce alpha by coverage `alpha` (0..=1).
pub fn erase_over(dst: &mut Rgba<u8>, alpha: f32) {
    let keep = 1.0 - alpha.clamp(0.0, 1.0);
    dst[3] = to_u8(f32::from(dst[3]) * keep);
    if dst[3] == 0 {
        *dst = Rgba([0, 0, 0, 0]);
    }
}

fn apply_paint(dst: &mut Rgba<u8>, paint: Paint, coverage: f32) {
    if paint.erase {
        erase_over(dst, paint.opacity * coverage);
    } else {
        blend_over(dst, paint.color, paint.opacity * coverage);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Pixel range `[lo, hi)` covering canvas span `[a, b]`, clipped to `limit`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn span(a: f64, b: f64, limit: u32) -> (u32, u32) {
    let lo = a.min(b).floor().max(0.0);
    let hi = (a.max(b).ceil() + 1.0).min(f64::from(limit));
    if hi <= lo {
        return (0, 0);
    }
    (lo as u32, hi as u32)
}

/// Paint every pixel in the box whose center satisfies `cover`.
fn paint_region(
    image: &mut RgbaImage,
    bounds: (f64, f64, f64, f64),
    paint: Paint,
    mask: Option<&SelectionMask>,
    cover: impl Fn(f64, f64) -> f32,
) {
    let (x0, x1) = span(bounds.0, bounds.2, image.width());
    let (y0, y1) = span(bounds.1, bounds.3, image.height());
    for y in y0..y1 {
        for x in x0..x1 {
            if !mask_allows(mask, x, y) {
                continue;
            }
            let c = cover(f64::from(x) + 0.5, f64::from(y) + 0.5);
            if c > 0.0 {
                apply_paint(image.get_pixel_mut(x, y), paint, c);
            }
        }
    }
}

// ── Region edits ────────────────────────────────────────────────

pub fn fill(image: &mut RgbaImage, paint: Paint, mask: Option<&SelectionMask>) {
    let (w, h) = image.dimensions();
    paint_region(image, (0.0, 0.0, f64::from(w), f64::from(h)), paint, mask, |_, _| 1.0);
}

/// Clear pixels to transparent.
pub fn erase(image: &mut RgbaImage, mask: Option<&SelectionMask>) {
    for (x, y, px) in image.enumerate_pixels_mut() {
        if mask_allows(mask, x, y) {
            *px = Rgba([0, 0, 0, 0]);
        }
    }
}

/// 4-connected fill from `(x, y)` over pixels within `tolerance` of the seed.
///
/// Returns the number of pixels painted; zero when the seed is outside the
/// image or not selectable.
pub fn flood_fill(image: &mut RgbaImage, x: u32, y: u32, tolerance: u8, paint: Paint, mask: Option<&SelectionMask>) -> usize {
    let (w, h) = image.dimensions();
    if x >= w || y >= h || !mask_allows(mask, x, y) {
        return 0;
    }
    let seed = *image.get_pixel(x, y);
    let matches = |px: &Rgba<u8>| px.0.iter().zip(seed.0.iter()).all(|(a, b)| a.abs_diff(*b) <= tolerance);

    let mut visited = vec![false; (w as usize) * (h as usize)];
    let mut region = Vec::new();
    let mut queue = VecDeque::from([(x, y)]);
    visited[(y as usize) * (w as usize) + x as usize] = true;

    while let Some((cx, cy)) = queue.pop_front() {
        region.push((cx, cy));
        let neighbors = [
            (cx.checked_sub(1), Some(cy)),
            ((cx + 1 < w).then_some(cx + 1), Some(cy)),
            (Some(cx), cy.checked_sub(1)),
            (Some(cx), (cy + 1 < h).then_some(cy + 1)),
        ];
        for (nx, ny) in neighbors {
            let (Some(nx), Some(ny)) = (nx, ny) else {
                continue;
            };
            let idx = (ny as usize) * (w as usize) + nx as usize;
            if visited[idx] || !mask_allows(mask, nx, ny) || !matches(image.get_pixel(nx, ny)) {
                continue;
            }
            visited[idx] = true;
            queue.push_back((nx, ny));
        }
    }

    for (px, py) in &region {
        apply_paint(image.get_pixel_mut(*px, *py), paint, 1.0);
    }
    region.len()
}

/// Soft or hard round dab centered at `(cx, cy)`.
pub fn stamp_dab(image: &mut RgbaImage, center: Point, radius: f64, hard: bool, paint: Paint) {
    let r = radius.max(0.5);
    let bounds = (center.x - r, center.y - r, center.x + r, center.y + r);
    paint_region(image, bounds, paint, None, |x, y| {
        let d = ((x - center.x).powi(2) + (y - center.y).powi(2)).sqrt();
        if hard {
            if d <= r { 1.0 } else { 0.0 }
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let c = (1.0 - (d / r).powi(2)).max(0.0) as f32;
            c
        }
    });
}

// ── Shapes, gradients, text ─────────────────────────────────────

/// Rectangle, ellipse or line between two corners.
#[allow(clippy::too_many_arguments)]
pub fn draw_shape(
    image: &mut RgbaImage,
    kind: ShapeKind,
    from: Point,
    to: Point,
    filled: bool,
    line_width: f64,
    paint: Paint,
    mask: Option<&SelectionMask>,
) {
    let lw = line_width.max(1.0);
    let (left, right) = (from.x.min(to.x), from.x.max(to.x));
    let (top, bottom) = (from.y.min(to.y), from.y.max(to.y));
    match kind {
        ShapeKind::Rect => {
            paint_region(image, (left, top, right, bottom), paint, mask, |x, y| {
                let inside = x >= left && x <= right && y >= top && y <= bottom;
                let inner = x >= left + lw && x <= right - lw && y >= top + lw && y <= bottom - lw;
                if inside && (filled || !inner) { 1.0 } else { 0.0 }
            });
        }
        ShapeKind::Ellipse => {
            let (cx, cy) = ((left + right) / 2.0, (top + bottom) / 2.0);
            let (rx, ry) = (((right - left) / 2.0).max(0.5), ((bottom - top) / 2.0).max(0.5));
            let in_ellipse = move |x: f64, y: f64, rx: f64, ry: f64| {
                rx > 0.0 && ry > 0.0 && ((x - cx) / rx).powi(2) + ((y - cy) / ry).powi(2) <= 1.0
            };
            paint_region(image, (left, top, right, bottom), paint, mask, |x, y| {
                let outer = in_ellipse(x, y, rx, ry);
                let inner = in_ellipse(x, y, rx - lw, ry - lw);
                if outer && (filled || !inner) { 1.0 } else { 0.0 }
            });
        }
        ShapeKind::Line => {
            let half = lw / 2.0;
            let bounds = (left - half, top - half, right + half, bottom + half);
            paint_region(image, bounds, paint, mask, |x, y| {
                if distance_to_segment(Point::new(x, y), from, to) <= half { 1.0 } else { 0.0 }
            });
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 <= f64::EPSILON { 0.0 } else { (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0) };
    let (qx, qy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - qx).powi(2) + (p.y - qy).powi(2)).sqrt()
}

/// Ramp from `from_color` to `to_color`, or to transparent when `to_color` is `None`.
#[allow(clippy::too_many_arguments)]
pub fn draw_gradient(
    image: &mut RgbaImage,
    kind: GradientKind,
    start: Point,
    end: Point,
    from_color: Rgb,
    to_color: Option<Rgb>,
    opacity: f32,
    mask: Option<&SelectionMask>,
) {
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let len2 = (dx * dx + dy * dy).max(f64::EPSILON);
    let len = len2.sqrt();
    for (x, y, px) in image.enumerate_pixels_mut() {
        if !mask_allows(mask, x, y) {
            continue;
        }
        let (fx, fy) = (f64::from(x) + 0.5, f64::from(y) + 0.5);
        let t = match kind {
            GradientKind::Linear => ((fx - start.x) * dx + (fy - start.y) * dy) / len2,
            GradientKind::Radial => ((fx - start.x).powi(2) + (fy - start.y).powi(2)).sqrt() / len,
        };
        #[allow(clippy::cast_possible_truncation)]
        let t = t.clamp(0.0, 1.0) as f32;
        match to_color {
            Some(to) => {
                let lerp = |a: u8, b: u8| to_u8(f32::from(a) + (f32::from(b) - f32::from(a)) * t);
                let color = Rgb::new(lerp(from_color.r, to.r), lerp(from_color.g, to.g), lerp(from_color.b, to.b));
                blend_over(px, color, opacity);
            }
            None => blend_over(px, from_color, opacity * (1.0 - t)),
        }
    }
}

/// Block-glyph text: each visible character fills most of a `size`-tall cell.
pub fn draw_text(image: &mut RgbaImage, origin: Point, text: &str, size: f64, paint: Paint, mask: Option<&SelectionMask>) {
    let cell_w = size * 0.6;
    let line_h = size * 1.2;
    let inset = cell_w * 0.1;
    for (row, line) in text.lines().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let top = origin.y + row as f64 * line_h;
        for (col, ch) in line.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let left = origin.x + col as f64 * cell_w;
            let bounds = (left + inset, top, left + cell_w - inset, top + size);
            paint_region(image, bounds, paint, mask, |x, y| {
                if x >= bounds.0 && x <= bounds.2 && y >= bounds.1 && y <= bounds.3 { 1.0 } else { 0.0 }
            });
        }
    }
}

// ── Geometry ────────────────────────────────────────────────────

#[must_use]
pub fn flip(image: &RgbaImage, horizontal: bool, vertical: bool) -> RgbaImage {
    let mut out = if horizontal { imageops::flip_horizontal(image) } else { image.clone() };
    if vertical {
        out = imageops::flip_vertical(&out);
    }
    out
}

/// Rotate by a multiple of 90 degrees; other angles are snapped.
#[must_use]
pub fn rotate(image: &RgbaImage, degrees: i32) -> RgbaImage {
    match degrees.rem_euclid(360) {
        45..=134 => imageops::rotate90(image),
        135..=224 => imageops::rotate180(image),
        225..=314 => imageops::rotate270(image),
        _ => image.clone(),
    }
}

/// Scale to `size`, smooth or nearest-neighbour.
#[must_use]
pub fn resize(image: &RgbaImage, size: Size, smooth: bool) -> RgbaImage {
    let filter = if smooth { FilterType::Triangle } else { FilterType::Nearest };
    imageops::resize(image, size.width, size.height, filter)
}

/// Place `image` at `(offset_x, offset_y)` on a new `size` canvas.
#[must_use]
pub fn resize_canvas(image: &RgbaImage, size: Size, offset_x: i64, offset_y: i64, fill: Option<Rgb>) -> RgbaImage {
    let mut out = blank(size, fill);
    imageops::replace(&mut out, image, offset_x, offset_y);
    out
}

/// Map the selected pixels of `source` through `matrix` onto a transparent
/// canvas of the same size. `None` for a degenerate matrix.
#[must_use]
pub fn transform_selected(source: &RgbaImage, matrix: &Matrix, mask: Option<&SelectionMask>) -> Option<RgbaImage> {
    let inverse = matrix.invert()?;
    let (w, h) = source.dimensions();
    let mut out = RgbaImage::new(w, h);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let src = inverse.apply(Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5));
        if src.x < 0.0 || src.y < 0.0 {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (sx, sy) = (src.x.floor() as u32, src.y.floor() as u32);
        if sx < w && sy < h && mask_allows(mask, sx, sy) {
            *px = *source.get_pixel(sx, sy);
        }
    }
    Some(out)
}

// ── Compositing ─────────────────────────────────────────────────

fn blend_channel(mode: MixMode, cb: f32, cs: f32) -> f32 {
    match mode {
        MixMode::SourceOver => cs,
        MixMode::Multiply => cb * cs,
        MixMode::Screen => cb + cs - cb * cs,
        MixMode::Overlay => {
            if cb <= 0.5 {
                2.0 * cs * cb
            } else {
                let s = 2.0 * cb - 1.0;
                cs + s - cs * s
            }
        }
        MixMode::Darken => cb.min(cs),
        MixMode::Lighten => cb.max(cs),
        MixMode::Difference => (cb - cs).abs(),
        MixMode::Exclusion => cb + cs - 2.0 * cb * cs,
    }
}

/// Blend `src` onto `dst` with `mode` at `opacity`. Sizes must match; the
/// overlapping area is used otherwise.
pub fn composite(dst: &mut RgbaImage, src: &RgbaImage, mode: MixMode, opacity: f32) {
    let w = dst.width().min(src.width());
    let h = dst.height().min(src.height());
    let opacity = opacity.clamp(0.0, 1.0);
    for y in 0..h {
        for x in 0..w {
            let s = src.get_pixel(x, y);
            let a_s = f32::from(s[3]) / 255.0 * opacity;
            if a_s <= 0.0 {
                continue;
            }
            let d = dst.get_pixel_mut(x, y);
            let a_b = f32::from(d[3]) / 255.0;
            let a_o = a_s + a_b * (1.0 - a_s);
            let mut out = [0u8; 4];
            for c in 0..3 {
                let cs = f32::from(s[c]) / 255.0;
                let cb = f32::from(d[c]) / 255.0;
                let mixed = blend_channel(mode, cb, cs);
                let co = a_s * (1.0 - a_b) * cs + a_s * a_b * mixed + (1.0 - a_s) * a_b * cb;
                out[c] = to_u8(co / a_o * 255.0);
            }
            out[3] = to_u8(a_o * 255.0);
            *d = Rgba(out);
        }
    }
}

// ── Filters ─────────────────────────────────────────────────────

fn map_pixels(image: &mut RgbaImage, mask: Option<&SelectionMask>, f: impl Fn(Rgba<u8>) -> Rgba<u8>) {
    for (x, y, px) in image.enumerate_pixels_mut() {
        if mask_allows(mask, x, y) {
            *px = f(*px);
        }
    }
}

pub fn invert(image: &mut RgbaImage, mask: Option<&SelectionMask>) {
    map_pixels(image, mask, |p| Rgba([255 - p[0], 255 - p[1], 255 - p[2], p[3]]));
}

pub fn grayscale(image: &mut RgbaImage, mask: Option<&SelectionMask>) {
    map_pixels(image, mask, |p| {
        let l = luminance(p);
        Rgba([l, l, l, p[3]])
    });
}

/// `brightness` and `contrast` in -1..=1.
pub fn brightness_contrast(image: &mut RgbaImage, brightness: f32, contrast: f32, mask: Option<&SelectionMask>) {
    let b = brightness.clamp(-1.0, 1.0);
    let c = contrast.clamp(-1.0, 0.99);
    let factor = (1.0 + c) / (1.0 - c);
    map_pixels(image, mask, |p| {
        let adjust = |v: u8| to_u8(((f32::from(v) / 255.0 - 0.5) * factor + 0.5 + b) * 255.0);
        Rgba([adjust(p[0]), adjust(p[1]), adjust(p[2]), p[3]])
    });
}

/// Turn lightness into transparency: white vanishes, black stays opaque.
pub fn to_alpha(image: &mut RgbaImage, mask: Option<&SelectionMask>) {
    map_pixels(image, mask, |p| {
        let a = (255 - u16::from(luminance(p))) * u16::from(p[3]) / 255;
        #[allow(clippy::cast_possible_truncation)]
        let a = a as u8;
        if a == 0 { Rgba([0, 0, 0, 0]) } else { Rgba([0, 0, 0, a]) }
    });
}

fn luminance(p: Rgba<u8>) -> u8 {
    to_u8(0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]))
}
