//! Document model: layers, the composed snapshot, and history entry patches.
//!
//! `ComposedState` is the full document at one point in history. It is never
//! edited in place by callers; instead every mutation is expressed as a
//! `HistoryEntryData` patch and the history store folds patches onto the
//! oldest snapshot to produce the current one.
//!
//! Patches address layers by `LayerId`. Field-level edits (opacity, pixels,
//! names) use `LayersPatch::Update`, which leaves unmentioned layers and
//! fields untouched. Structural edits (add, remove, reorder, merge) carry the
//! complete layer set with `LayersPatch::Replace`.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::raster::{self, Rgb};
use crate::selection::Selection;

/// Canvas dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }
}

/// Stable layer identifier within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u32);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// How a layer blends onto the layers beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MixMode {
    #[default]
    SourceOver,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Difference,
    Exclusion,
}

/// Immutable, shared layer pixels.
///
/// Snapshots share images; an edit produces a new image rather than writing
/// through the `Arc`.
#[derive(Clone)]
pub struct LayerImage(Arc<RgbaImage>);

impl LayerImage {
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// A `size` image filled with `color`, or fully transparent.
    #[must_use]
    pub fn blank(size: Size, color: Option<Rgb>) -> Self {
        Self::new(raster::blank(size, color))
    }

    #[must_use]
    pub fn as_image(&self) -> &RgbaImage {
        &self.0
    }

    /// Copy of the pixels for editing.
    #[must_use]
    pub fn to_image(&self) -> RgbaImage {
        self.0.as_ref().clone()
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl PartialEq for LayerImage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.dimensions() == other.0.dimensions() && self.0.as_raw() == other.0.as_raw())
    }
}

impl fmt::Debug for LayerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerImage({}x{})", self.0.width(), self.0.height())
    }
}

/// One layer in a composed snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerState {
    /// Stacking position; 0 is the bottom layer.
    pub index: usize,
    pub opacity: f32,
    pub is_visible: bool,
    pub mix_mode: MixMode,
    pub name: String,
    pub image: LayerImage,
}

impl LayerState {
    #[must_use]
    pub fn new(index: usize, name: impl Into<String>, image: LayerImage) -> Self {
        Self { index, opacity: 1.0, is_visible: true, mix_mode: MixMode::SourceOver, name: name.into(), image }
    }
}

/// The full document at one history position.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedState {
    pub project_id: String,
    pub size: Size,
    pub active_layer_id: LayerId,
    pub layer_map: BTreeMap<LayerId, LayerState>,
    pub selection: Option<Selection>,
}

impl ComposedState {
    /// Single-layer document, as produced by a `reset`.
    #[must_use]
    pub fn blank(project_id: impl Into<String>, size: Size, fill: Option<Rgb>) -> Self {
        let (layer_map, active_layer_id) = blank_layers(size, fill);
        Self { project_id: project_id.into(), size, active_layer_id, layer_map, selection: None }
    }

    /// Fold one patch onto this snapshot.
    pub fn apply(&mut self, data: &HistoryEntryData) {
        if let Some(project_id) = &data.project_id {
            self.project_id.clone_from(project_id);
        }
        if let Some(size) = data.size {
            self.size = size;
        }
        match &data.layers {
            Some(LayersPatch::Replace(layers)) => self.layer_map.clone_from(layers),
            Some(LayersPatch::Update(updates)) => {
                for (id, patch) in updates {
                    if let Some(layer) = self.layer_map.get_mut(id) {
                        patch.apply_to(layer);
                    }
                }
            }
            None => {}
        }
        if let Some(id) = data.active_layer_id {
            self.active_layer_id = id;
        }
        if let Some(selection) = &data.selection {
            self.selection.clone_from(selection);
        }
    }

    /// Layers bottom to top.
    #[must_use]
    pub fn ordered_layers(&self) -> Vec<(LayerId, &LayerState)> {
        let mut layers: Vec<_> = self.layer_map.iter().map(|(id, l)| (*id, l)).collect();
        layers.sort_by_key(|(id, l)| (l.index, *id));
        layers
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layer_map.len()
    }

    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&LayerState> {
        self.layer_map.get(&id)
    }

    /// Layer at stacking position `index`.
    #[must_use]
    pub fn layer_at(&self, index: usize) -> Option<(LayerId, &LayerState)> {
        self.layer_map
            .iter()
            .find(|(_, l)| l.index == index)
            .map(|(id, l)| (*id, l))
    }

    #[must_use]
    pub fn active_layer(&self) -> Option<&LayerState> {
        self.layer_map.get(&self.active_layer_id)
    }

    /// Stacking position of the active layer, 0 if it is missing.
    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active_layer().map_or(0, |l| l.index)
    }

    /// Fresh id, one past the highest in use.
    #[must_use]
    pub fn next_layer_id(&self) -> LayerId {
        LayerId(self.layer_map.keys().map(|id| id.0).max().unwrap_or(0) + 1)
    }

    /// Visible layers blended bottom to top onto a transparent canvas.
    #[must_use]
    pub fn flatten(&self) -> RgbaImage {
        let mut out = raster::blank(self.size, None);
        for (_, layer) in self.ordered_layers() {
            if layer.is_visible {
                raster::composite(&mut out, layer.image.as_image(), layer.mix_mode, layer.opacity);
            }
        }
        out
    }
}

/// Layer set for a freshly reset document.
#[must_use]
pub fn blank_layers(size: Size, fill: Option<Rgb>) -> (BTreeMap<LayerId, LayerState>, LayerId) {
    let id = LayerId(1);
    let mut layers = BTreeMap::new();
    layers.insert(id, LayerState::new(0, "Layer 1", LayerImage::blank(size, fill)));
    (layers, id)
}

/// Sparse update for one layer. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerPatch {
    pub index: Option<usize>,
    pub opacity: Option<f32>,
    pub is_visible: Option<bool>,
    pub mix_mode: Option<MixMode>,
    pub name: Option<String>,
    pub image: Option<LayerImage>,
}

impl LayerPatch {
    #[must_use]
    pub fn image(image: LayerImage) -> Self {
        Self { image: Some(image), ..Self::default() }
    }

    pub fn apply_to(&self, layer: &mut LayerState) {
        if let Some(index) = self.index {
            layer.index = index;
        }
        if let Some(opacity) = self.opacity {
            layer.opacity = opacity;
        }
        if let Some(visible) = self.is_visible {
            layer.is_visible = visible;
        }
        if let Some(mode) = self.mix_mode {
            layer.mix_mode = mode;
        }
        if let Some(name) = &self.name {
            layer.name.clone_from(name);
        }
        if let Some(image) = &self.image {
            layer.image = image.clone();
        }
    }

    /// Later patch wins per field.
    pub fn merge(&mut self, later: Self) {
        self.index = later.index.or(self.index);
        self.opacity = later.opacity.or(self.opacity);
        self.is_visible = later.is_visible.or(self.is_visible);
        self.mix_mode = later.mix_mode.or(self.mix_mode);
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.image.is_some() {
            self.image = later.image;
        }
    }
}

/// Layer portion of a history entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LayersPatch {
    /// Field patches for existing layers.
    Update(BTreeMap<LayerId, LayerPatch>),
    /// Complete replacement of the layer set.
    Replace(BTreeMap<LayerId, LayerState>),
}

impl LayersPatch {
    #[must_use]
    pub fn single(id: LayerId, patch: LayerPatch) -> Self {
        Self::Update(BTreeMap::from([(id, patch)]))
    }

    fn merge(self, later: Self) -> Self {
        match (self, later) {
            (_, Self::Replace(layers)) => Self::Replace(layers),
            (Self::Replace(mut layers), Self::Update(updates)) => {
                for (id, patch) in &updates {
                    if let Some(layer) = layers.get_mut(id) {
                        patch.apply_to(layer);
                    }
                }
                Self::Replace(layers)
            }
            (Self::Update(mut earlier), Self::Update(updates)) => {
                for (id, patch) in updates {
                    earlier.entry(id).or_default().merge(patch);
                }
                Self::Update(earlier)
            }
        }
    }
}

/// Payload of a committed history entry. Absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntryData {
    pub project_id: Option<String>,
    pub size: Option<Size>,
    pub active_layer_id: Option<LayerId>,
    /// `Some(None)` clears the selection.
    pub selection: Option<Option<Selection>>,
    pub layers: Option<LayersPatch>,
}

impl HistoryEntryData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Patch touching only the active layer id.
    #[must_use]
    pub fn active_layer(id: LayerId) -> Self {
        Self { active_layer_id: Some(id), ..Self::default() }
    }

    /// Fold `later` into `self`, last write wins per field.
    pub fn merge(&mut self, later: Self) {
        if later.project_id.is_some() {
            self.project_id = later.project_id;
        }
        self.size = later.size.or(self.size);
        self.active_layer_id = later.active_layer_id.or(self.active_layer_id);
        if later.selection.is_some() {
            self.selection = later.selection;
        }
        self.layers = match (self.layers.take(), later.layers) {
            (None, later) => later,
            (Some(earlier), None) => Some(earlier),
            (Some(earlier), Some(later)) => Some(earlier.merge(later)),
        };
    }
}

/// One committed step.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Monotonic sequence number assigned by the store.
    pub index: u64,
    pub data: HistoryEntryData,
}
