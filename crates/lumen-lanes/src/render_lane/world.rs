// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the intermediate `RenderWorld` and its associated data structures.
//!
//! The `RenderWorld` is a flat copy of what the renderer needs from the scene,
//! filled by the extraction lane and consumed by the batching and object lanes
//! without touching the scene again.

use lumen_core::asset::AssetUUID;
use lumen_core::scene::{CameraView, EntityId, LightDesc, RenderableDesc};

/// One drawable `(entity, mesh, material, sub-mesh)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Renderable {
    /// The entity whose transform places the instance.
    pub entity: EntityId,
    /// The mesh asset.
    pub mesh: AssetUUID,
    /// The material instance asset.
    pub material: AssetUUID,
    /// Sub-mesh of `mesh` to draw.
    pub sub_mesh: u32,
}

impl From<&RenderableDesc> for Renderable {
    fn from(desc: &RenderableDesc) -> Self {
        Self {
            entity: desc.entity,
            mesh: desc.mesh,
            material: desc.material,
            sub_mesh: desc.sub_mesh,
        }
    }
}

/// Everything extracted from the scene for one frame.
#[derive(Debug, Default, Clone)]
pub struct RenderWorld {
    /// Drawables in scene order. Only rebuilt when the drawable set changes.
    pub renderables: Vec<Renderable>,
    /// Active lights, refreshed every frame.
    pub lights: Vec<LightDesc>,
    /// The active camera, refreshed every frame.
    pub camera: Option<CameraView>,
}

impl RenderWorld {
    /// Creates a new, empty `RenderWorld`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all the data, preparing it for the next extraction.
    pub fn clear(&mut self) {
        self.renderables.clear();
        self.lights.clear();
        self.camera = None;
    }
}
