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

//! Defines the lane responsible for extracting renderable data from the scene.

use super::{RenderWorld, Renderable};
use lumen_core::scene::SceneSource;

/// A lane that performs the "extraction" phase of the rendering pipeline.
///
/// It copies the scene's drawable triples, lights and camera into the
/// [`RenderWorld`], so later lanes work on a flat snapshot.
#[derive(Debug, Default)]
pub struct ExtractRenderablesLane;

impl ExtractRenderablesLane {
    /// Creates a new `ExtractRenderablesLane`.
    pub fn new() -> Self {
        Self
    }

    /// Executes the full extraction for one frame.
    pub fn run(&self, scene: &dyn SceneSource, render_world: &mut RenderWorld) {
        render_world.clear();
        self.extract_renderables(scene, render_world);
        self.extract_view(scene, render_world);
    }

    /// Replaces the drawable list. Returns the number of renderables.
    pub fn extract_renderables(&self, scene: &dyn SceneSource, render_world: &mut RenderWorld) -> usize {
        render_world.renderables.clear();
        render_world
            .renderables
            .extend(scene.renderables().iter().map(Renderable::from));
        log::trace!("Extracted {} renderables", render_world.renderables.len());
        render_world.renderables.len()
    }

    /// Refreshes the camera and the lights.
    pub fn extract_view(&self, scene: &dyn SceneSource, render_world: &mut RenderWorld) {
        render_world.camera = scene.active_camera();
        render_world.lights = scene.lights();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::asset::AssetUUID;
    use lumen_core::math::{Mat4, Transform, Vec3};
    use lumen_core::scene::{CameraView, EntityId, LightDesc, LightKind, RenderableDesc};

    struct Scene;

    impl SceneSource for Scene {
        fn renderables(&self) -> Vec<RenderableDesc> {
            (0..3)
                .map(|i| RenderableDesc {
                    entity: EntityId::new(i, 0),
                    mesh: AssetUUID::from_u128(u128::from(i % 2)),
                    material: AssetUUID::from_u128(100),
                    sub_mesh: 0,
                })
                .collect()
        }

        fn local_transform(&self, _entity: EntityId) -> Option<Transform> {
            Some(Transform::IDENTITY)
        }

        fn parent(&self, _entity: EntityId) -> Option<EntityId> {
            None
        }

        fn active_camera(&self) -> Option<CameraView> {
            Some(CameraView {
                view: Mat4::IDENTITY,
                projection: Mat4::IDENTITY,
                position: Vec3::ZERO,
            })
        }

        fn lights(&self) -> Vec<LightDesc> {
            vec![LightDesc {
                kind: LightKind::Point,
                position: Vec3::Y,
                direction: Vec3::ZERO,
                color: Vec3::ONE,
                intensity: 2.0,
                range: 10.0,
                cone_angle: 0.0,
            }]
        }
    }

    #[test]
    fn test_extract_keeps_scene_order() {
        let mut world = RenderWorld::new();
        ExtractRenderablesLane::new().run(&Scene, &mut world);

        assert_eq!(world.renderables.len(), 3);
        let entities: Vec<_> = world.renderables.iter().map(|r| r.entity.index).collect();
        assert_eq!(entities, vec![0, 1, 2]);
        assert_eq!(world.lights.len(), 1);
        assert!(world.camera.is_some());
    }

    #[test]
    fn test_extract_view_leaves_renderables_alone() {
        let mut world = RenderWorld::new();
        let lane = ExtractRenderablesLane::new();
        lane.extract_renderables(&Scene, &mut world);
        world.renderables.truncate(1);

        lane.extract_view(&Scene, &mut world);

        assert_eq!(world.renderables.len(), 1);
        assert_eq!(world.lights[0].intensity, 2.0);
    }
}
