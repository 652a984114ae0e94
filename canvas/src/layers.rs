//! Layer panel operations.
//!
//! Convenience layer over the document operations that always act relative to
//! the active layer, the way a layer panel does. Each call commits a live
//! transform first and reports `false` instead of an error when the panel
//! action is not possible (last layer, top of the stack, ...).

#[cfg(test)]
#[path = "layers_test.rs"]
mod layers_test;

use serde::Serialize;
use tracing::debug;

use crate::doc::{LayerId, MixMode};
use crate::document::{
    AddLayerParams, DocumentError, FillParams, LayerIndexParams, MergeLayersParams, MixModeParams, MoveLayerParams,
    OpacityParams, RenameLayerParams, VisibilityParams,
};
use crate::engine::EngineCore;
use crate::raster::Rgb;

/// One row of the layer panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub index: usize,
    pub id: LayerId,
    pub name: String,
    pub opacity: f32,
    pub is_visible: bool,
    pub mix_mode: MixMode,
}

/// Everything the layer panel renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayersState {
    /// Bottom layer first.
    pub layers: Vec<LayerInfo>,
    pub active_layer_index: usize,
}

impl EngineCore {
    // --- State ---

    #[must_use]
    pub fn layers_state(&self) -> LayersState {
        let composed = self.composed();
        let layers = composed
            .ordered_layers()
            .into_iter()
            .enumerate()
            .map(|(index, (id, layer))| LayerInfo {
                index,
                id,
                name: layer.name.clone(),
                opacity: layer.opacity,
                is_visible: layer.is_visible,
                mix_mode: layer.mix_mode,
            })
            .collect();
        LayersState { layers, active_layer_index: composed.active_index() }
    }

    #[must_use]
    pub fn active_layer_index(&self) -> usize {
        self.composed().active_index()
    }

    #[must_use]
    pub fn can_add_layer(&self) -> bool {
        self.composed().layer_count() < self.config().max_layers
    }

    #[must_use]
    pub fn can_remove_layer(&self) -> bool {
        self.composed().layer_count() > 1
    }

    #[must_use]
    pub fn can_merge_down(&self) -> bool {
        self.active_layer_index() > 0
    }

    #[must_use]
    pub fn can_merge_up(&self) -> bool {
        self.active_layer_index() + 1 < self.composed().layer_count()
    }

    #[must_use]
    pub fn can_merge_all(&self) -> bool {
        self.composed().layer_count() > 1
    }

    // --- Structure ---

    /// Make the layer at `index` active; an unknown index selects the bottom
    /// layer.
    pub fn set_active_layer(&mut self, index: usize) -> LayerId {
        let index = if index < self.composed().layer_count() { index } else { 0 };
        let params = LayerIndexParams { index };
        self.edit(|doc| Ok(doc.select_layer(&params))).unwrap_or(self.composed().active_layer_id)
    }

    /// New blank layer above the active one; it becomes active.
    pub fn add_layer(&mut self) -> bool {
        if !self.can_add_layer() {
            return false;
        }
        let params = AddLayerParams { index: self.active_layer_index(), name: None };
        panel(self.edit(|doc| doc.add_layer(&params)))
    }

    pub fn duplicate_layer(&mut self) -> bool {
        if !self.can_add_layer() {
            return false;
        }
        let params = LayerIndexParams { index: self.active_layer_index() };
        panel(self.edit(|doc| doc.duplicate_layer(&params)))
    }

    /// Remove the active layer. `false` for the last one.
    pub fn remove_layer(&mut self) -> bool {
        if !self.can_remove_layer() {
            return false;
        }
        let params = LayerIndexParams { index: self.active_layer_index() };
        panel(self.edit(|doc| doc.remove_layer(&params)))
    }

    /// Erase the active layer, inside the selection if there is one.
    pub fn clear_layer(&mut self) -> bool {
        let params = LayerIndexParams { index: self.active_layer_index() };
        panel(self.edit(|doc| doc.erase_layer(&params)))
    }

    /// Move a layer from one stack position to another.
    pub fn move_layer(&mut self, from: usize, to: usize) -> bool {
        let count = self.composed().layer_count();
        if from >= count || to >= count || from == to {
            return false;
        }
        let delta = i64::try_from(to).unwrap_or(i64::MAX) - i64::try_from(from).unwrap_or(i64::MAX);
        let params = MoveLayerParams { index: from, delta };
        panel(self.edit(|doc| doc.move_layer(&params)))
    }

    pub fn move_layer_up(&mut self) -> bool {
        let index = self.active_layer_index();
        self.move_layer(index, index + 1)
    }

    pub fn move_layer_down(&mut self) -> bool {
        let index = self.active_layer_index();
        index > 0 && self.move_layer(index, index - 1)
    }

    /// Merge layer `index` into the one below; the lower layer stays active.
    pub fn merge_down(&mut self, index: usize) -> bool {
        if index == 0 {
            return false;
        }
        let params = MergeLayersParams { from: index, to: index - 1, mix_mode: MixMode::SourceOver };
        panel(self.edit(|doc| doc.merge_layers(&params)))
    }

    /// Merge the layer above into layer `index`.
    pub fn merge_up(&mut self, index: usize) -> bool {
        if index + 1 >= self.composed().layer_count() {
            return false;
        }
        let params = MergeLayersParams { from: index + 1, to: index, mix_mode: MixMode::SourceOver };
        panel(self.edit(|doc| doc.merge_layers(&params)))
    }

    /// Flatten every layer. Returns the surviving layer's index.
    pub fn merge_all(&mut self) -> Option<usize> {
        match self.edit(|doc| doc.merge_all()) {
            Ok(_) => Some(0),
            Err(e) => {
                debug!(error = %e, "merge all refused");
                None
            }
        }
    }

    // --- Properties ---

    /// Rename the active layer. `false` when the name is unchanged or empty.
    pub fn rename_layer(&mut self, name: &str) -> bool {
        let index = self.active_layer_index();
        if self.composed().layer_at(index).is_some_and(|(_, l)| l.name == name) {
            return false;
        }
        let params = RenameLayerParams { index, name: name.to_owned() };
        panel(self.edit(|doc| doc.rename_layer(&params)))
    }

    /// Set a layer's opacity. While `is_dragging`, consecutive calls for the
    /// same layer collapse into one undo step.
    pub fn set_layer_opacity(&mut self, index: usize, opacity: f32, is_dragging: bool) -> bool {
        let Some((_, layer)) = self.composed().layer_at(index) else {
            return false;
        };
        if is_dragging && (layer.opacity - opacity).abs() < f32::EPSILON {
            return false;
        }
        let amend = self.opacity_drag == Some((index, self.history().total_index()));
        let params = OpacityParams { index, opacity, amend };
        let applied = panel(self.edit(|doc| doc.set_opacity(&params)));
        self.opacity_drag = (applied && is_dragging).then(|| (index, self.history().total_index()));
        applied
    }

    /// End an opacity drag; the next change starts a new undo step.
    pub fn finish_opacity_change(&mut self) {
        self.opacity_drag = None;
    }

    pub fn set_layer_visibility(&mut self, index: usize, is_visible: bool) -> bool {
        match self.composed().layer_at(index) {
            Some((_, layer)) if layer.is_visible != is_visible => {}
            _ => return false,
        }
        let params = VisibilityParams { index, is_visible };
        panel(self.edit(|doc| doc.set_visibility(&params)))
    }

    pub fn set_layer_mix_mode(&mut self, index: usize, mix_mode: MixMode) -> bool {
        match self.composed().layer_at(index) {
            Some((_, layer)) if layer.mix_mode != mix_mode => {}
            _ => return false,
        }
        let params = MixModeParams { index, mix_mode };
        panel(self.edit(|doc| doc.set_mix_mode(&params)))
    }

    /// Fill the active layer with an opaque color.
    pub fn fill_layer(&mut self, color: Rgb) -> bool {
        let params = FillParams { index: self.active_layer_index(), color, opacity: 1.0, is_eraser: false };
        panel(self.edit(|doc| doc.fill_layer(&params)))
    }
}

fn panel<T>(result: Result<T, DocumentError>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "layer panel action refused");
            false
        }
    }
}
