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

//! The read-only view of the scene consumed by the renderer.

use super::EntityId;
use crate::asset::AssetUUID;
use crate::math::{Mat4, Transform, Vec3};

/// A drawable triple reported by the scene: which mesh (and sub-mesh) an
/// entity draws, and with which material instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderableDesc {
    /// The drawing entity.
    pub entity: EntityId,
    /// The mesh asset.
    pub mesh: AssetUUID,
    /// The material instance asset.
    pub material: AssetUUID,
    /// Which sub-mesh of `mesh` is drawn.
    pub sub_mesh: u32,
}

/// The active camera as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// World-to-view matrix.
    pub view: Mat4,
    /// View-to-clip matrix.
    pub projection: Mat4,
    /// World-space eye position.
    pub position: Vec3,
}

/// The kind of a light source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Infinitely distant light with a direction only.
    Directional,
    /// Omnidirectional light with a position and range.
    Point,
    /// Cone-shaped light with a position, direction, range and angle.
    Spot,
}

/// A light source as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDesc {
    /// The kind of light.
    pub kind: LightKind,
    /// World-space position (ignored for directional lights).
    pub position: Vec3,
    /// World-space direction (ignored for point lights).
    pub direction: Vec3,
    /// Linear RGB color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Attenuation range (ignored for directional lights).
    pub range: f32,
    /// Outer cone angle in radians (spot lights only).
    pub cone_angle: f32,
}

/// A change notification from the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    /// An entity started drawing something.
    RenderableAdded(EntityId),
    /// An entity changed its mesh, sub-mesh or material.
    RenderableUpdated(EntityId),
    /// An entity stopped drawing.
    RenderableRemoved(EntityId),
    /// An entity's transform (or an ancestor's) changed.
    TransformChanged(EntityId),
}

/// The scene collaborator.
///
/// Object refresh reads transforms from worker threads, hence the `Sync` bound.
pub trait SceneSource: Sync {
    /// The current set of drawable triples.
    fn renderables(&self) -> Vec<RenderableDesc>;

    /// The entity's transform relative to its parent.
    fn local_transform(&self, entity: EntityId) -> Option<Transform>;

    /// The entity's parent in the hierarchy, if any.
    fn parent(&self, entity: EntityId) -> Option<EntityId>;

    /// The entity's linear velocity, used for render-time interpolation.
    fn linear_velocity(&self, _entity: EntityId) -> Option<Vec3> {
        None
    }

    /// The camera the frame is rendered from.
    fn active_camera(&self) -> Option<CameraView>;

    /// Light sources affecting the frame.
    fn lights(&self) -> Vec<LightDesc> {
        Vec::new()
    }

    /// Resolves an entity's world transform by walking up its parents.
    ///
    /// Returns `None` if the entity or one of its ancestors has no transform.
    fn world_matrix(&self, entity: EntityId) -> Option<Mat4> {
        let mut matrix = self.local_transform(entity)?.to_matrix();
        let mut current = entity;
        // A malformed hierarchy must not hang a worker.
        for _ in 0..MAX_HIERARCHY_DEPTH {
            match self.parent(current) {
                Some(parent) => {
                    matrix = self.local_transform(parent)?.to_matrix() * matrix;
                    current = parent;
                }
                None => return Some(matrix),
            }
        }
        log::warn!("Hierarchy of entity {entity} exceeds {MAX_HIERARCHY_DEPTH} levels");
        Some(matrix)
    }
}

/// Deepest parent chain followed by [`SceneSource::world_matrix`].
pub const MAX_HIERARCHY_DEPTH: usize = 64;
