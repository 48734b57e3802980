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

//! Parallel refresh of per-object GPU records.

use super::DrawInstance;
use lumen_core::asset::AssetUUID;
use lumen_core::math::{Mat4, Vec3};
use lumen_core::renderer::GpuObjectData;
use lumen_core::scene::SceneSource;
use lumen_core::tasks::WorkerPool;
use std::collections::HashMap;

/// Render-time extrapolation of moving objects between two fixed simulation steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    /// Fraction of a fixed step elapsed since the last simulation update, in `[0, 1]`.
    pub alpha: f32,
    /// Duration of one fixed simulation step in seconds.
    pub fixed_step: f32,
}

impl Interpolation {
    /// No extrapolation.
    pub const NONE: Self = Self {
        alpha: 0.0,
        fixed_step: 0.0,
    };

    fn is_active(&self) -> bool {
        self.alpha > 0.0 && self.fixed_step > 0.0
    }
}

impl Default for Interpolation {
    fn default() -> Self {
        Self::NONE
    }
}

/// Result of an [`ObjectRefreshLane::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectRefreshOutput {
    /// Records rewritten.
    pub refreshed: usize,
    /// Positions whose entity has a linear velocity; they must be refreshed every
    /// frame while interpolating.
    pub moving: Vec<u32>,
    /// Positions whose entity has no transform any more. Their record is left as is.
    pub missing: Vec<u32>,
}

/// A lane that recomputes world matrices and material indices of draw instances
/// on the worker pool.
///
/// Workers only read the scene and an immutable material-index snapshot; results
/// are written into the object array on the calling thread once every worker
/// joined.
#[derive(Debug, Clone, Default)]
pub struct ObjectRefreshLane {
    pool: WorkerPool,
}

enum Refreshed {
    Record { data: GpuObjectData, moving: bool },
    Missing,
}

impl ObjectRefreshLane {
    /// Creates a lane running on `pool`.
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Recomputes `objects[p]` for every position `p` in `dirty`.
    ///
    /// `objects` must be at least as long as `instances`; positions out of range
    /// are ignored.
    pub fn run(
        &self,
        scene: &dyn SceneSource,
        instances: &[DrawInstance],
        dirty: &[u32],
        material_indices: &HashMap<AssetUUID, u32>,
        interpolation: Interpolation,
        objects: &mut [GpuObjectData],
    ) -> ObjectRefreshOutput {
        let limit = instances.len().min(objects.len());
        let positions: Vec<u32> = dirty
            .iter()
            .copied()
            .filter(|p| (*p as usize) < limit)
            .collect();

        let results = self.pool.map(&positions, |position| {
            let instance = &instances[*position as usize];
            refresh(scene, instance, material_indices, interpolation)
        });

        let mut output = ObjectRefreshOutput::default();
        for (position, result) in positions.iter().zip(results) {
            match result {
                Refreshed::Record { data, moving } => {
                    objects[*position as usize] = data;
                    output.refreshed += 1;
                    if moving {
                        output.moving.push(*position);
                    }
                }
                Refreshed::Missing => output.missing.push(*position),
            }
        }
        if !output.missing.is_empty() {
            log::debug!("{} draw instances have no transform", output.missing.len());
        }
        output
    }

    /// Recomputes every record. `objects` is resized to `instances.len()`.
    pub fn run_all(
        &self,
        scene: &dyn SceneSource,
        instances: &[DrawInstance],
        material_indices: &HashMap<AssetUUID, u32>,
        interpolation: Interpolation,
        objects: &mut Vec<GpuObjectData>,
    ) -> ObjectRefreshOutput {
        objects.resize(instances.len(), GpuObjectData::new(Mat4::IDENTITY, 0));
        let all: Vec<u32> = (0..instances.len() as u32).collect();
        self.run(scene, instances, &all, material_indices, interpolation, objects)
    }
}

fn refresh(
    scene: &dyn SceneSource,
    instance: &DrawInstance,
    material_indices: &HashMap<AssetUUID, u32>,
    interpolation: Interpolation,
) -> Refreshed {
    let Some(mut world) = scene.world_matrix(instance.entity) else {
        return Refreshed::Missing;
    };
    let velocity = scene.linear_velocity(instance.entity);
    if let (Some(velocity), true) = (velocity, interpolation.is_active()) {
        let offset = velocity * interpolation.alpha * interpolation.fixed_step;
        world = Mat4::from_translation(offset) * world;
    }
    let material_index = material_indices.get(&instance.material).copied().unwrap_or(0);
    Refreshed::Record {
        data: GpuObjectData::new(world, material_index),
        moving: velocity.is_some_and(|v| v != Vec3::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::math::{Transform, Vec4};
    use lumen_core::scene::{CameraView, EntityId, RenderableDesc};

    struct Scene {
        count: u32,
    }

    impl SceneSource for Scene {
        fn renderables(&self) -> Vec<RenderableDesc> {
            Vec::new()
        }

        fn local_transform(&self, entity: EntityId) -> Option<Transform> {
            (entity.index < self.count)
                .then(|| Transform::from_translation(Vec3::new(entity.index as f32, 0.0, 0.0)))
        }

        fn parent(&self, entity: EntityId) -> Option<EntityId> {
            // Entity 1 is parented to entity 2 when it exists.
            (entity.index == 1 && self.count > 2).then_some(EntityId::new(2, 0))
        }

        fn linear_velocity(&self, entity: EntityId) -> Option<Vec3> {
            (entity.index == 3).then_some(Vec3::new(0.0, 10.0, 0.0))
        }

        fn active_camera(&self) -> Option<CameraView> {
            None
        }
    }

    const MATERIAL: AssetUUID = AssetUUID::from_u128(7);

    fn instances(count: u32) -> Vec<DrawInstance> {
        (0..count)
            .map(|i| DrawInstance {
                entity: EntityId::new(i, 0),
                material: MATERIAL,
            })
            .collect()
    }

    fn translation(object: &GpuObjectData) -> Vec4 {
        Vec4::from_array(object.model[3])
    }

    #[test]
    fn test_run_all_computes_world_matrices() {
        let lane = ObjectRefreshLane::new(WorkerPool::new(4, 1));
        let instances = instances(5);
        let indices = HashMap::from([(MATERIAL, 3)]);
        let mut objects = Vec::new();

        let output = lane.run_all(&Scene { count: 5 }, &instances, &indices, Interpolation::NONE, &mut objects);

        assert_eq!(output.refreshed, 5);
        assert_eq!(objects.len(), 5);
        assert_eq!(translation(&objects[0]), Vec4::new(0.0, 0.0, 0.0, 1.0));
        // Child at x = 1 under a parent at x = 2.
        assert_eq!(translation(&objects[1]), Vec4::new(3.0, 0.0, 0.0, 1.0));
        assert!(objects.iter().all(|o| o.material_index == 3));
        assert_eq!(output.moving, vec![3]);
    }

    #[test]
    fn test_velocity_is_extrapolated() {
        let lane = ObjectRefreshLane::new(WorkerPool::new(1, 1));
        let instances = instances(4);
        let mut objects = Vec::new();
        let interpolation = Interpolation {
            alpha: 0.5,
            fixed_step: 0.1,
        };

        lane.run_all(&Scene { count: 4 }, &instances, &HashMap::new(), interpolation, &mut objects);

        let moved = translation(&objects[3]);
        assert_eq!(moved.x, 3.0);
        assert!((moved.y - 0.5).abs() < 1e-6);
        assert_eq!(translation(&objects[2]).y, 0.0);
    }

    #[test]
    fn test_partial_refresh_touches_only_dirty_positions() {
        let lane = ObjectRefreshLane::default();
        let instances = instances(4);
        let sentinel = GpuObjectData::new(Mat4::from_translation(Vec3::splat(-1.0)), 42);
        let mut objects = vec![sentinel; 4];

        let output = lane.run(
            &Scene { count: 4 },
            &instances,
            &[2, 9],
            &HashMap::new(),
            Interpolation::NONE,
            &mut objects,
        );

        assert_eq!(output.refreshed, 1);
        assert_eq!(objects[0], sentinel);
        assert_eq!(objects[3], sentinel);
        assert_eq!(translation(&objects[2]), Vec4::new(2.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_missing_transform_is_reported() {
        let lane = ObjectRefreshLane::default();
        let instances = instances(3);
        let mut objects = Vec::new();

        let output = lane.run_all(&Scene { count: 2 }, &instances, &HashMap::new(), Interpolation::NONE, &mut objects);

        assert_eq!(output.missing, vec![2]);
        assert_eq!(output.refreshed, 2);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let instances = instances(500);
        let scene = Scene { count: 500 };
        let indices = HashMap::from([(MATERIAL, 1)]);
        let mut parallel = Vec::new();
        let mut sequential = Vec::new();

        ObjectRefreshLane::new(WorkerPool::new(8, 16)).run_all(&scene, &instances, &indices, Interpolation::NONE, &mut parallel);
        ObjectRefreshLane::new(WorkerPool::new(1, 1)).run_all(&scene, &instances, &indices, Interpolation::NONE, &mut sequential);

        assert_eq!(parallel, sequential);
    }
}
