//! Document mutation surface.
//!
//! Every state-changing document operation lives here. An operation takes a
//! typed parameter record, validates it against the current snapshot, turns
//! it into one `HistoryEntryData` patch, pushes that patch and records the
//! same parameters under the operation's journal tag. Replay decodes the
//! recorded parameters and calls the same method, so live and replayed edits
//! share one code path.
//!
//! `Document` is a short-lived handle that borrows the history store and the
//! recorder for the duration of one edit. Layers are addressed by stacking
//! index in parameters (that is what the user sees) and by `LayerId` in
//! patches.

#[cfg(test)]
#[path = "document_test.rs"]
mod document_test;

use std::collections::BTreeMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::doc::{
    ComposedState, HistoryEntryData, LayerId, LayerImage, LayerPatch, LayerState, LayersPatch, MixMode, Size,
    blank_layers,
};
use crate::history::HistoryStore;
use crate::raster::{self, GradientKind, Paint, Rgb, ShapeKind};
use crate::recorder::EventRecorder;
use crate::selection::{Matrix, Selection, SelectionMask};
use crate::viewport::Point;

/// Journal tags, one per operation.
pub mod tags {
    pub const RESET: &str = "reset";
    pub const RESIZE: &str = "resize";
    pub const RESIZE_CANVAS: &str = "resize-c";
    pub const ADD_LAYER: &str = "l-add";
    pub const DUPLICATE_LAYER: &str = "l-dupl";
    pub const REMOVE_LAYER: &str = "l-rm";
    pub const RENAME_LAYER: &str = "l-ren";
    pub const OPACITY: &str = "l-opac";
    pub const VISIBILITY: &str = "l-vis";
    pub const MOVE_LAYER: &str = "l-move";
    pub const MERGE_LAYERS: &str = "l-merge";
    pub const MERGE_ALL: &str = "l-merge-all";
    pub const SELECT_LAYER: &str = "l-select";
    pub const ROTATE: &str = "rotate";
    pub const FLIP: &str = "l-flip";
    pub const FILL: &str = "l-fill";
    pub const FLOOD_FILL: &str = "flood-fill";
    pub const SHAPE: &str = "shape";
    pub const GRADIENT: &str = "grad";
    pub const TEXT: &str = "text";
    pub const ERASE: &str = "l-erase";
    pub const MIX_MODE: &str = "set-mixmode";
    pub const SELECTION: &str = "selection";
    pub const SELECTION_TRANSFORM: &str = "selection-transform";
    pub const SELECTION_TRANSFORM_CLONE: &str = "selection-transform-clone";
    pub const FILTER: &str = "filter";
    pub const UNDO: &str = "undo";
    pub const REDO: &str = "redo";
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DocumentError {
    #[error("no layer at index {0}")]
    NoSuchLayer(usize),
    #[error("layer {0} does not exist")]
    MissingLayer(LayerId),
    #[error("layer limit of {max} reached")]
    LayerLimit { max: usize },
    #[error("cannot remove the last layer")]
    LastLayer,
    #[error("nothing to merge")]
    NothingToMerge,
    #[error("invalid canvas size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error("invalid filter input: {0}")]
    FilterInput(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// =============================================================================
// PARAMETERS
// =============================================================================

fn one() -> f32 {
    1.0
}

fn one_px() -> f64 {
    1.0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetParams {
    pub width: u32,
    pub height: u32,
    /// Background color of the single new layer; transparent when absent.
    #[serde(default)]
    pub fill: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub smooth: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeCanvasParams {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub offset_x: i64,
    #[serde(default)]
    pub offset_y: i64,
    /// Color of newly exposed area on the bottom layer.
    #[serde(default)]
    pub fill: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerIndexParams {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLayerParams {
    /// The new layer goes directly above this one.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameLayerParams {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpacityParams {
    pub index: usize,
    pub opacity: f32,
    /// Amend the tip entry instead of appending (continuation of a drag).
    #[serde(default, skip_serializing_if = "is_false")]
    pub amend: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityParams {
    pub index: usize,
    pub is_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixModeParams {
    pub index: usize,
    pub mix_mode: MixMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLayerParams {
    pub index: usize,
    /// Positive moves up the stack.
    pub delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeLayersParams {
    /// Layer that is blended and removed.
    pub from: usize,
    /// Layer that receives the result.
    pub to: usize,
    #[serde(default)]
    pub mix_mode: MixMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateParams {
    /// Multiple of 90, clockwise.
    pub deg: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipParams {
    #[serde(default)]
    pub is_horizontal: bool,
    #[serde(default)]
    pub is_vertical: bool,
    /// Single layer to flip; the whole canvas when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillParams {
    pub index: usize,
    pub color: Rgb,
    #[serde(default = "one")]
    pub opacity: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_eraser: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloodFillParams {
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub color: Rgb,
    #[serde(default = "one")]
    pub opacity: f32,
    #[serde(default)]
    pub tolerance: u8,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_eraser: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeParams {
    pub index: usize,
    pub kind: ShapeKind,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub color: Rgb,
    #[serde(default = "one")]
    pub opacity: f32,
    #[serde(default)]
    pub is_filled: bool,
    #[serde(default = "one_px")]
    pub line_width: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_eraser: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientParams {
    pub index: usize,
    pub kind: GradientKind,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub color: Rgb,
    /// End color; the ramp fades to transparent when absent.
    #[serde(default)]
    pub to_color: Option<Rgb>,
    #[serde(default = "one")]
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextParams {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub size: f64,
    pub color: Rgb,
    #[serde(default = "one")]
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionParams {
    /// `None` or an empty selection clears.
    #[serde(default)]
    pub selection: Option<Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionTransformParams {
    pub layer_index: usize,
    pub transform: Matrix,
    /// Destination layer; the source layer when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_layer_index: Option<usize>,
    #[serde(default)]
    pub background_is_transparent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub index: usize,
    pub filter_key: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BrightnessContrastInput {
    brightness: f32,
    contrast: f32,
}

/// Filters `apply_filter` understands.
pub const FILTER_KEYS: [&str; 4] = ["invert", "grayscale", "toAlpha", "brightnessContrast"];

// =============================================================================
// DOCUMENT
// =============================================================================

pub struct Document<'a> {
    history: &'a mut HistoryStore,
    recorder: Option<&'a mut EventRecorder>,
    max_layers: usize,
    max_canvas_size: u32,
}

impl<'a> Document<'a> {
    #[must_use]
    pub fn new(history: &'a mut HistoryStore, recorder: Option<&'a mut EventRecorder>, config: &EngineConfig) -> Self {
        Self { history, recorder, max_layers: config.max_layers, max_canvas_size: config.max_canvas_size }
    }

    #[must_use]
    pub fn composed(&self) -> &ComposedState {
        self.history.composed()
    }

    // --- Document ---

    /// Replace everything with one blank layer.
    ///
    /// # Errors
    ///
    /// [`DocumentError::InvalidSize`] for a zero or oversized canvas.
    pub fn reset(&mut self, params: &ResetParams) -> Result<LayerId, DocumentError> {
        let size = self.validate_size(params.width, params.height)?;
        let (layers, id) = blank_layers(size, params.fill);
        let data = HistoryEntryData {
            project_id: self.recorder.as_deref().map(|r| r.project_id().to_owned()),
            size: Some(size),
            active_layer_id: Some(id),
            selection: Some(None),
            layers: Some(LayersPatch::Replace(layers)),
            ..HistoryEntryData::default()
        };
        self.commit(tags::RESET, params, data);
        Ok(id)
    }

    /// Scale every layer to a new size.
    ///
    /// # Errors
    ///
    /// [`DocumentError::InvalidSize`] for a zero or oversized canvas.
    pub fn resize(&mut self, params: &ResizeParams) -> Result<(), DocumentError> {
        let size = self.validate_size(params.width, params.height)?;
        let layers = self
            .ordered()
            .into_iter()
            .map(|(id, mut layer)| {
                layer.image = LayerImage::new(raster::resize(layer.image.as_image(), size, params.smooth));
                (id, layer)
            })
            .collect();
        self.commit(tags::RESIZE, params, resized(size, layers));
        Ok(())
    }

    /// Grow or crop the canvas without scaling, placing content at the offset.
    ///
    /// # Errors
    ///
    /// [`DocumentError::InvalidSize`] for a zero or oversized canvas.
    pub fn resize_canvas(&mut self, params: &ResizeCanvasParams) -> Result<(), DocumentError> {
        let size = self.validate_size(params.width, params.height)?;
        let layers = self
            .ordered()
            .into_iter()
            .map(|(id, mut layer)| {
                let fill = if layer.index == 0 { params.fill } else { None };
                let image = raster::resize_canvas(layer.image.as_image(), size, params.offset_x, params.offset_y, fill);
                layer.image = LayerImage::new(image);
                (id, layer)
            })
            .collect();
        self.commit(tags::RESIZE_CANVAS, params, resized(size, layers));
        Ok(())
    }

    /// Rotate the whole canvas by a multiple of 90 degrees.
    ///
    /// # Errors
    ///
    /// [`DocumentError::InvalidArgument`] for other angles.
    pub fn rotate(&mut self, params: &RotateParams) -> Result<(), DocumentError> {
        if params.deg % 90 != 0 {
            return Err(DocumentError::InvalidArgument(format!("rotation of {} degrees", params.deg)));
        }
        let current = self.composed().size;
        let size = if params.deg.rem_euclid(180) == 90 { Size::new(current.height, current.width) } else { current };
        let layers = self
            .ordered()
            .into_iter()
            .map(|(id, mut layer)| {
                layer.image = LayerImage::new(raster::rotate(layer.image.as_image(), params.deg));
                (id, layer)
            })
            .collect();
        self.commit(tags::ROTATE, params, resized(size, layers));
        Ok(())
    }

    // --- Layer structure ---

    /// Insert a transparent layer above `index` and make it active.
    ///
    /// # Errors
    ///
    /// Fails at the layer limit or for an unknown index.
    pub fn add_layer(&mut self, params: &AddLayerParams) -> Result<LayerId, DocumentError> {
        self.check_layer_limit()?;
        self.layer_id_at(params.index)?;
        let id = self.composed().next_layer_id();
        let name = params.name.clone().unwrap_or_else(|| format!("Layer {}", id.0));
        let layer = LayerState::new(0, name, LayerImage::blank(self.composed().size, None));
        self.insert_above(tags::ADD_LAYER, params, params.index, id, layer);
        Ok(id)
    }

    /// Copy the layer at `index` directly above itself and make the copy active.
    ///
    /// # Errors
    ///
    /// Fails at the layer limit or for an unknown index.
    pub fn duplicate_layer(&mut self, params: &LayerIndexParams) -> Result<LayerId, DocumentError> {
        self.check_layer_limit()?;
        let source = self.layer_at(params.index)?.1.clone();
        let id = self.composed().next_layer_id();
        let layer = LayerState { name: format!("{} copy", source.name), ..source };
        self.insert_above(tags::DUPLICATE_LAYER, params, params.index, id, layer);
        Ok(id)
    }

    /// Delete a layer. When it was active, the layer below becomes active.
    ///
    /// # Errors
    ///
    /// [`DocumentError::LastLayer`] for the only layer, or an unknown index.
    pub fn remove_layer(&mut self, params: &LayerIndexParams) -> Result<(), DocumentError> {
        if self.composed().layer_count() <= 1 {
            return Err(DocumentError::LastLayer);
        }
        let removed = self.layer_id_at(params.index)?;
        let mut order = self.ordered();
        order.retain(|(id, _)| *id != removed);
        let active = if self.composed().active_layer_id == removed {
            order[params.index.saturating_sub(1)].0
        } else {
            self.composed().active_layer_id
        };
        self.commit_structure(tags::REMOVE_LAYER, params, order, active);
        Ok(())
    }

    /// Shift a layer `delta` places up (positive) or down the stack.
    ///
    /// # Errors
    ///
    /// [`DocumentError::InvalidArgument`] when the target falls outside the
    /// stack or `delta` is zero.
    pub fn move_layer(&mut self, params: &MoveLayerParams) -> Result<(), DocumentError> {
        self.layer_id_at(params.index)?;
        let count = self.composed().layer_count();
        let target = isize::try_from(params.delta)
            .map_or(None, |delta| params.index.checked_add_signed(delta))
            .filter(|t| *t < count && params.delta != 0)
            .ok_or_else(|| {
                DocumentError::InvalidArgument(format!("cannot move layer {} by {}", params.index, params.delta))
            })?;
        let mut order = self.ordered();
        let moved = order.remove(params.index);
        order.insert(target, moved);
        let active = self.composed().active_layer_id;
        self.commit_structure(tags::MOVE_LAYER, params, order, active);
        Ok(())
    }

    /// Blend layer `from` onto layer `to` and remove `from`. `to` becomes
    /// active.
    ///
    /// # Errors
    ///
    /// Fails for unknown indices or `from == to`.
    pub fn merge_layers(&mut self, params: &MergeLayersParams) -> Result<(), DocumentError> {
        if params.from == params.to {
            return Err(DocumentError::NothingToMerge);
        }
        let (from_id, from) = self.layer_at(params.from)?;
        let from = from.clone();
        let to_id = self.layer_id_at(params.to)?;

        let mut order = self.ordered();
        order.retain(|(id, _)| *id != from_id);
        if let Some((_, target)) = order.iter_mut().find(|(id, _)| *id == to_id) {
            let mut image = target.image.to_image();
            let opacity = if from.is_visible { from.opacity } else { 0.0 };
            raster::composite(&mut image, from.image.as_image(), params.mix_mode, opacity);
            target.image = LayerImage::new(image);
        }
        self.commit_structure(tags::MERGE_LAYERS, params, order, to_id);
        Ok(())
    }

    /// Flatten all visible layers into the bottom layer.
    ///
    /// # Errors
    ///
    /// [`DocumentError::NothingToMerge`] with a single layer.
    pub fn merge_all(&mut self) -> Result<LayerId, DocumentError> {
        if self.composed().layer_count() < 2 {
            return Err(DocumentError::NothingToMerge);
        }
        let (id, bottom) = self.layer_at(0)?;
        let merged = LayerState::new(0, bottom.name.clone(), LayerImage::new(self.composed().flatten()));
        self.commit_structure(tags::MERGE_ALL, &serde_json::json!({}), vec![(id, merged)], id);
        Ok(id)
    }

    /// Make the layer at `index` active, falling back to the bottom layer for
    /// an unknown index. Not an undo step.
    pub fn select_layer(&mut self, params: &LayerIndexParams) -> LayerId {
        let (index, id) = match self.layer_id_at(params.index) {
            Ok(id) => (params.index, id),
            Err(_) => {
                debug!(index = params.index, "select_layer: unknown index; using bottom layer");
                (0, self.composed().layer_at(0).map_or(self.composed().active_layer_id, |(id, _)| id))
            }
        };
        self.history.push(HistoryEntryData::active_layer(id), false);
        self.record(tags::SELECT_LAYER, &LayerIndexParams { index });
        id
    }

    // --- Layer properties ---

    /// # Errors
    ///
    /// Fails for an unknown index or an empty name.
    pub fn rename_layer(&mut self, params: &RenameLayerParams) -> Result<(), DocumentError> {
        if params.name.trim().is_empty() {
            return Err(DocumentError::InvalidArgument("empty layer name".into()));
        }
        let id = self.layer_id_at(params.index)?;
        let patch = LayerPatch { name: Some(params.name.clone()), ..LayerPatch::default() };
        self.commit(tags::RENAME_LAYER, params, layer_update(id, patch));
        Ok(())
    }

    /// Set opacity (clamped to 0..=1). With `amend` the value replaces the
    /// tip entry, so a drag ends up as one undo step.
    ///
    /// # Errors
    ///
    /// Fails for an unknown index or a non-finite opacity.
    pub fn set_opacity(&mut self, params: &OpacityParams) -> Result<(), DocumentError> {
        if !params.opacity.is_finite() {
            return Err(DocumentError::InvalidArgument(format!("opacity {}", params.opacity)));
        }
        let id = self.layer_id_at(params.index)?;
        let params = OpacityParams { opacity: params.opacity.clamp(0.0, 1.0), ..*params };
        let patch = LayerPatch { opacity: Some(params.opacity), ..LayerPatch::default() };
        if params.amend {
            self.history.pause_continuing();
        }
        self.commit(tags::OPACITY, &params, layer_update(id, patch));
        if params.amend {
            self.history.pause(false);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Fails for an unknown index.
    pub fn set_visibility(&mut self, params: &VisibilityParams) -> Result<(), DocumentError> {
        let id = self.layer_id_at(params.index)?;
        let patch = LayerPatch { is_visible: Some(params.is_visible), ..LayerPatch::default() };
        self.commit(tags::VISIBILITY, params, layer_update(id, patch));
        Ok(())
    }

    /// # Errors
    ///
    /// Fails for an unknown index.
    pub fn set_mix_mode(&mut self, params: &MixModeParams) -> Result<(), DocumentError> {
        let id = self.layer_id_at(params.index)?;
        let patch = LayerPatch { mix_mode: Some(params.mix_mode), ..LayerPatch::default() };
        self.commit(tags::MIX_MODE, params, layer_update(id, patch));
        Ok(())
    }

    // --- Pixels ---

    /// Mirror one layer, or every layer when no index is given.
    ///
    /// # Errors
    ///
    /// Fails for an unknown index or when neither axis is set.
    pub fn flip(&mut self, params: &FlipParams) -> Result<(), DocumentError> {
        if !params.is_horizontal && !params.is_vertical {
            return Err(DocumentError::InvalidArgument("flip needs an axis".into()));
        }
        let targets = match params.layer_index {
            Some(index) => vec![self.layer_at(index).map(|(id, l)| (id, l.clone()))?],
            None => self.ordered(),
        };
        let updates = targets
            .into_iter()
            .map(|(id, layer)| {
                let image = raster::flip(layer.image.as_image(), params.is_horizontal, params.is_vertical);
                (id, LayerPatch::image(LayerImage::new(image)))
            })
            .collect();
        let data = HistoryEntryData { layers: Some(LayersPatch::Update(updates)), ..HistoryEntryData::default() };
        self.commit(tags::FLIP, params, data);
        Ok(())
    }

    /// Fill the selection (or the whole layer) with a color, or erase it.
    ///
    /// # Errors
    ///
    /// Fails for an unknown index.
    pub fn fill_layer(&mut self, params: &FillParams) -> Result<(), DocumentError> {
        let paint = paint(params.color, params.opacity, params.is_eraser);
        self.paint_layer(tags::FILL, params, params.index, |image, mask| {
            raster::fill(image, paint, mask);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Fails for an unknown index or a seed outside the canvas or selection.
    pub fn flood_fill(&mut self, params: &FloodFillParams) -> Result<(), DocumentError> {
        let paint = paint(params.color, params.opacity, params.is_eraser);
        self.paint_layer(tags::FLOOD_FILL, params, params.index, |image, mask| {
            match raster::flood_fill(image, params.x, params.y, params.tolerance, paint, mask) {
                0 => Err(DocumentError::InvalidArgument(format!("flood fill seed ({}, {})", params.x, params.y))),
                _ => Ok(()),
            }
        })
    }

    /// # Errors
    ///
    /// Fails for an unknown index or a non-positive line width.
    pub fn draw_shape(&mut self, params: &ShapeParams) -> Result<(), DocumentError> {
        if params.line_width.is_nan() || params.line_width <= 0.0 {
            return Err(DocumentError::InvalidArgument(format!("line width {}", params.line_width)));
        }
        let paint = paint(params.color, params.opacity, params.is_eraser);
        self.paint_layer(tags::SHAPE, params, params.index, |image, mask| {
            let (from, to) = (Point::new(params.x1, params.y1), Point::new(params.x2, params.y2));
            raster::draw_shape(image, params.kind, from, to, params.is_filled, params.line_width, paint, mask);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Fails for an unknown index.
    pub fn draw_gradient(&mut self, params: &GradientParams) -> Result<(), DocumentError> {
        self.paint_layer(tags::GRADIENT, params, params.index, |image, mask| {
            let (start, end) = (Point::new(params.x1, params.y1), Point::new(params.x2, params.y2));
            raster::draw_gradient(image, params.kind, start, end, params.color, params.to_color, params.opacity, mask);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Fails for an unknown index, blank text or a non-positive size.
    pub fn draw_text(&mut self, params: &TextParams) -> Result<(), DocumentError> {
        if params.text.trim().is_empty() || params.size.is_nan() || params.size <= 0.0 {
            return Err(DocumentError::InvalidArgument("text needs content and a positive size".into()));
        }
        let paint = Paint::solid(params.color, params.opacity);
        self.paint_layer(tags::TEXT, params, params.index, |image, mask| {
            raster::draw_text(image, Point::new(params.x, params.y), &params.text, params.size, paint, mask);
            Ok(())
        })
    }

    /// Clear the selection (or the whole layer) to transparent.
    ///
    /// # Errors
    ///
    /// Fails for an unknown index.
    pub fn erase_layer(&mut self, params: &LayerIndexParams) -> Result<(), DocumentError> {
        self.paint_layer(tags::ERASE, params, params.index, |image, mask| {
            raster::erase(image, mask);
            Ok(())
        })
    }

    /// Run a named filter over the selection (or the whole layer).
    ///
    /// # Errors
    ///
    /// [`DocumentError::UnknownFilter`] for keys outside [`FILTER_KEYS`],
    /// [`DocumentError::FilterInput`] for malformed input.
    pub fn apply_filter(&mut self, params: &FilterParams) -> Result<(), DocumentError> {
        if !FILTER_KEYS.contains(&params.filter_key.as_str()) {
            return Err(DocumentError::UnknownFilter(params.filter_key.clone()));
        }
        let adjust = if params.filter_key == "brightnessContrast" && !params.input.is_null() {
            serde_json::from_value::<BrightnessContrastInput>(params.input.clone())
                .map_err(|e| DocumentError::FilterInput(e.to_string()))?
        } else {
            BrightnessContrastInput::default()
        };
        self.paint_layer(tags::FILTER, params, params.index, |image, mask| {
            match params.filter_key.as_str() {
                "invert" => raster::invert(image, mask),
                "grayscale" => raster::grayscale(image, mask),
                "toAlpha" => raster::to_alpha(image, mask),
                _ => raster::brightness_contrast(image, adjust.brightness, adjust.contrast, mask),
            }
            Ok(())
        })
    }

    /// Commit pixels painted by a brush stroke. The stroke itself is recorded
    /// by the chain recorder, not here.
    ///
    /// # Errors
    ///
    /// [`DocumentError::MissingLayer`] when the layer is gone.
    pub fn commit_stroke(&mut self, layer: LayerId, image: RgbaImage) -> Result<(), DocumentError> {
        if self.composed().layer(layer).is_none() {
            return Err(DocumentError::MissingLayer(layer));
        }
        self.history.push(layer_update(layer, LayerPatch::image(LayerImage::new(image))), true);
        Ok(())
    }

    // --- Selection ---

    /// Replace the selection; `None` or an empty polygon set clears it.
    pub fn set_selection(&mut self, params: &SelectionParams) {
        let selection = params.selection.clone().filter(|s| !s.is_empty());
        let data = HistoryEntryData { selection: Some(selection), ..HistoryEntryData::default() };
        self.commit(tags::SELECTION, params, data);
    }

    /// Move the selected pixels through `transform`, leaving a hole behind.
    ///
    /// # Errors
    ///
    /// Fails for unknown layers or a degenerate transform.
    pub fn transform_via_selection(&mut self, params: &SelectionTransformParams) -> Result<(), DocumentError> {
        self.transform_selection(tags::SELECTION_TRANSFORM, params, false)
    }

    /// Copy the selected pixels through `transform`, leaving the source intact.
    ///
    /// # Errors
    ///
    /// Fails for unknown layers or a degenerate transform.
    pub fn transform_clone_via_selection(&mut self, params: &SelectionTransformParams) -> Result<(), DocumentError> {
        self.transform_selection(tags::SELECTION_TRANSFORM_CLONE, params, true)
    }

    // --- Internals ---

    fn transform_selection(
        &mut self,
        tag: &str,
        params: &SelectionTransformParams,
        do_clone: bool,
    ) -> Result<(), DocumentError> {
        let (source_id, source) = self.layer_at(params.layer_index)?;
        let source = source.image.clone();
        let (target_id, target) = self.layer_at(params.target_layer_index.unwrap_or(params.layer_index))?;
        let target = target.image.clone();
        let mask = self.mask();
        let moved = raster::transform_selected(source.as_image(), &params.transform, mask.as_ref())
            .ok_or_else(|| DocumentError::InvalidArgument("degenerate transform".into()))?;

        let mut updates = BTreeMap::new();
        let mut holed = None;
        if !do_clone {
            let mut image = source.to_image();
            raster::erase(&mut image, mask.as_ref());
            if !params.background_is_transparent {
                raster::fill(&mut image, Paint::solid(Rgb::WHITE, 1.0), mask.as_ref());
            }
            holed = Some(image);
        }
        let mut dest = match holed {
            Some(image) if target_id == source_id => image,
            Some(image) => {
                updates.insert(source_id, LayerPatch::image(LayerImage::new(image)));
                target.to_image()
            }
            None => target.to_image(),
        };
        raster::composite(&mut dest, &moved, MixMode::SourceOver, 1.0);
        updates.insert(target_id, LayerPatch::image(LayerImage::new(dest)));

        let selection = self.composed().selection.as_ref().map(|s| Some(s.transformed(&params.transform)));
        let data = HistoryEntryData { selection, layers: Some(LayersPatch::Update(updates)), ..HistoryEntryData::default() };
        self.commit(tag, params, data);
        Ok(())
    }

    fn paint_layer<P: Serialize>(
        &mut self,
        tag: &str,
        params: &P,
        index: usize,
        edit: impl FnOnce(&mut RgbaImage, Option<&SelectionMask>) -> Result<(), DocumentError>,
    ) -> Result<(), DocumentError> {
        let (id, layer) = self.layer_at(index)?;
        let mut image = layer.image.to_image();
        let mask = self.mask();
        edit(&mut image, mask.as_ref())?;
        self.commit(tag, params, layer_update(id, LayerPatch::image(LayerImage::new(image))));
        Ok(())
    }

    fn insert_above<P: Serialize>(&mut self, tag: &str, params: &P, index: usize, id: LayerId, layer: LayerState) {
        let mut order = self.ordered();
        order.insert((index + 1).min(order.len()), (id, layer));
        self.commit_structure(tag, params, order, id);
    }

    fn commit_structure<P: Serialize>(&mut self, tag: &str, params: &P, order: Vec<(LayerId, LayerState)>, active: LayerId) {
        let layers = order
            .into_iter()
            .enumerate()
            .map(|(index, (id, layer))| (id, LayerState { index, ..layer }))
            .collect();
        let data = HistoryEntryData {
            active_layer_id: Some(active),
            layers: Some(LayersPatch::Replace(layers)),
            ..HistoryEntryData::default()
        };
        self.commit(tag, params, data);
    }

    fn commit<P: Serialize>(&mut self, tag: &str, params: &P, data: HistoryEntryData) {
        let outcome = self.history.push(data, true);
        debug!(tag, ?outcome, "document edit");
        self.record(tag, params);
    }

    fn record<P: Serialize>(&mut self, tag: &str, params: &P) {
        if let Some(recorder) = self.recorder.as_deref_mut() {
            recorder.record_payload(tag, params);
        }
    }

    fn ordered(&self) -> Vec<(LayerId, LayerState)> {
        self.composed()
            .ordered_layers()
            .into_iter()
            .map(|(id, layer)| (id, layer.clone()))
            .collect()
    }

    fn layer_at(&self, index: usize) -> Result<(LayerId, &LayerState), DocumentError> {
        self.composed().layer_at(index).ok_or(DocumentError::NoSuchLayer(index))
    }

    fn layer_id_at(&self, index: usize) -> Result<LayerId, DocumentError> {
        self.layer_at(index).map(|(id, _)| id)
    }

    fn check_layer_limit(&self) -> Result<(), DocumentError> {
        if self.composed().layer_count() >= self.max_layers {
            return Err(DocumentError::LayerLimit { max: self.max_layers });
        }
        Ok(())
    }

    fn validate_size(&self, width: u32, height: u32) -> Result<Size, DocumentError> {
        let valid = (1..=self.max_canvas_size).contains(&width) && (1..=self.max_canvas_size).contains(&height);
        if valid { Ok(Size::new(width, height)) } else { Err(DocumentError::InvalidSize { width, height }) }
    }

    fn mask(&self) -> Option<SelectionMask> {
        let composed = self.composed();
        composed
            .selection
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| s.mask(composed.size))
    }
}

fn paint(color: Rgb, opacity: f32, erase: bool) -> Paint {
    Paint { erase, ..Paint::solid(color, opacity) }
}

fn layer_update(id: LayerId, patch: LayerPatch) -> HistoryEntryData {
    HistoryEntryData { layers: Some(LayersPatch::single(id, patch)), ..HistoryEntryData::default() }
}

/// Patch for a canvas-size change: new size, rebuilt layers, selection cleared.
fn resized(size: Size, layers: BTreeMap<LayerId, LayerState>) -> HistoryEntryData {
    HistoryEntryData {
        size: Some(size),
        selection: Some(None),
        layers: Some(LayersPatch::Replace(layers)),
        ..HistoryEntryData::default()
    }
}
