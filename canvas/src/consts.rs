//! Shared numeric constants for the canvas crate.

// ── Document ────────────────────────────────────────────────────

/// Upper bound on layers per document.
pub const MAX_LAYERS: usize = 16;

/// Largest accepted canvas edge, in pixels.
pub const MAX_CANVAS_SIZE: u32 = 4096;

/// Canvas size used for a brand-new project.
pub const DEFAULT_CANVAS_WIDTH: u32 = 1000;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 700;

/// Committed history depth before the oldest entries fold into the base.
pub const DEFAULT_MAX_HISTORY: usize = 64;

// ── Input chain ─────────────────────────────────────────────────

/// Exponential pre-filter weight per smoothing level (0 = off).
pub const SMOOTHING_TABLE: [f64; 6] = [0.0, 0.35, 0.5, 0.65, 0.78, 0.88];

/// Default smoothing level.
pub const DEFAULT_SMOOTHING: u8 = 1;

/// Interpolated sub-points emitted per smoothed segment.
pub const SMOOTHING_SUBDIVISIONS: usize = 4;

// ── Brushes ─────────────────────────────────────────────────────

pub const MIN_BRUSH_SIZE: f32 = 0.5;
pub const MAX_BRUSH_SIZE: f32 = 500.0;

/// Dab spacing as a fraction of the brush radius.
pub const DAB_SPACING: f64 = 0.3;

/// Step applied by the `[` / `]` shortcuts.
pub const BRUSH_SIZE_STEP: f32 = 2.0;

// ── UI ──────────────────────────────────────────────────────────

/// Events kept for a polling host between drains; older ones are dropped.
pub const UI_EVENT_QUEUE_LIMIT: usize = 256;

// ── Viewport ────────────────────────────────────────────────────

pub const MIN_ZOOM: f64 = 1.0 / 16.0;
pub const MAX_ZOOM: f64 = 64.0;

// ── Recorder ────────────────────────────────────────────────────

pub const DEFAULT_APPEND_RETRIES: usize = 3;
pub const DEFAULT_APPEND_RETRY_BASE_MS: u64 = 20;
