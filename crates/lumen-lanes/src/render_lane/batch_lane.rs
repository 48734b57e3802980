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

//! The draw-batch builder.
//!
//! Renderables are stably sorted by `(material, mesh, sub_mesh)` and walked once.
//! A new indirect command starts whenever the mesh or sub-mesh changes, when the
//! current command is full, or when a new batch begins. A new batch starts
//! whenever the material changes or the current batch is full. Instance `i` of
//! the output draws with object record `i`, so `first_instance` values partition
//! the per-frame object array.

use super::Renderable;
use lumen_core::asset::AssetUUID;
use lumen_core::config::BatchingConfig;
use lumen_core::renderer::{IndexedIndirectCommand, RenderPipelineId, ResourceError, VertexFormat};
use lumen_core::scene::EntityId;
use lumen_data::geometry::{GeometryArena, GeometryRegion};
use lumen_data::materials::{MaterialBinding, MaterialRegistry};
use thiserror::Error;

/// Errors raised when configuring the batch builder.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    /// A command must be allowed at least one instance.
    #[error("max_instances_per_command must be at least 1")]
    ZeroInstanceCap,
    /// A batch must be allowed at least one command.
    #[error("max_commands_per_batch must be at least 1")]
    ZeroCommandCap,
}

/// Capacity limits of the batch builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    max_instances_per_command: u32,
    max_commands_per_batch: u32,
    max_instances: u32,
}

impl BatchLimits {
    /// Creates limits. `max_instances` bounds the whole draw list and normally is
    /// the capacity of a frame slot's object array.
    pub fn new(
        max_instances_per_command: u32,
        max_commands_per_batch: u32,
        max_instances: u32,
    ) -> Result<Self, BatchError> {
        if max_instances_per_command == 0 {
            return Err(BatchError::ZeroInstanceCap);
        }
        if max_commands_per_batch == 0 {
            return Err(BatchError::ZeroCommandCap);
        }
        Ok(Self {
            max_instances_per_command,
            max_commands_per_batch,
            max_instances,
        })
    }

    /// Builds limits from the batching configuration and the object capacity.
    pub fn from_config(config: &BatchingConfig, max_instances: u32) -> Result<Self, BatchError> {
        Self::new(
            config.max_instances_per_command,
            config.max_commands_per_batch,
            max_instances,
        )
    }

    /// Per-command instance cap.
    pub fn max_instances_per_command(&self) -> u32 {
        self.max_instances_per_command
    }

    /// Per-batch command cap.
    pub fn max_commands_per_batch(&self) -> u32 {
        self.max_commands_per_batch
    }

    /// Cap on the whole draw list.
    pub fn max_instances(&self) -> u32 {
        self.max_instances
    }
}

/// Where a mesh lives in the geometry arena.
pub trait GeometryLookup {
    /// The region of a resident sub-mesh.
    fn region(&self, mesh: AssetUUID, sub_mesh: u32) -> Result<GeometryRegion, ResourceError>;
}

impl GeometryLookup for GeometryArena {
    fn region(&self, mesh: AssetUUID, sub_mesh: u32) -> Result<GeometryRegion, ResourceError> {
        GeometryArena::region(self, mesh, sub_mesh)
    }
}

/// How to draw with a material.
pub trait MaterialLookup {
    /// The binding of a ready material.
    fn binding(&self, material: AssetUUID) -> Result<MaterialBinding, ResourceError>;
}

impl MaterialLookup for MaterialRegistry {
    fn binding(&self, material: AssetUUID) -> Result<MaterialBinding, ResourceError> {
        MaterialRegistry::binding(self, material)
    }
}

/// A contiguous run of commands drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBatch {
    /// The material instance.
    pub material: AssetUUID,
    /// Pipeline of the material's base material.
    pub pipeline: RenderPipelineId,
    /// Vertex pool the commands index into.
    pub vertex_format: VertexFormat,
    /// Index of the first command in [`DrawList::commands`].
    pub first_command: u32,
    /// Number of commands.
    pub command_count: u32,
}

/// The object drawn by one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawInstance {
    /// The entity providing the transform.
    pub entity: EntityId,
    /// The material instance, resolved to a material index at refresh time.
    pub material: AssetUUID,
}

/// Why a renderable was left out of the draw list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exclusions {
    /// The mesh is not resident.
    pub missing_mesh: u32,
    /// The material, its pipeline or one of its textures is not resident.
    pub missing_material: u32,
    /// The mesh's vertex format does not match the material's pipeline.
    pub format_mismatch: u32,
    /// The draw list was full.
    pub over_capacity: u32,
}

impl Exclusions {
    /// Total number of excluded renderables.
    pub fn total(&self) -> u32 {
        self.missing_mesh + self.missing_material + self.format_mismatch + self.over_capacity
    }
}

/// Output of the batch builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    /// Batches in draw order.
    pub batches: Vec<DrawBatch>,
    /// Indirect commands, referenced by range from the batches.
    pub commands: Vec<IndexedIndirectCommand>,
    /// One entry per instance, in `first_instance` order.
    pub instances: Vec<DrawInstance>,
    /// Renderables that could not be drawn.
    pub excluded: Exclusions,
}

impl DrawList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the list, keeping its allocations.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.commands.clear();
        self.instances.clear();
        self.excluded = Exclusions::default();
    }

    /// Returns `true` if nothing is drawn.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// The commands of a batch.
    pub fn batch_commands(&self, batch: &DrawBatch) -> &[IndexedIndirectCommand] {
        let start = batch.first_command as usize;
        &self.commands[start..start + batch.command_count as usize]
    }
}

/// A lane that turns the renderable set into batches of indexed-indirect commands.
#[derive(Debug, Clone)]
pub struct DrawBatchLane {
    limits: BatchLimits,
}

struct Resolved {
    renderable: Renderable,
    region: GeometryRegion,
    binding: MaterialBinding,
}

impl DrawBatchLane {
    /// Creates a lane with the given limits.
    pub fn new(limits: BatchLimits) -> Self {
        Self { limits }
    }

    /// The limits in use.
    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Builds the draw list for `renderables` into `out`.
    ///
    /// Renderables whose mesh or material is not resident are counted in
    /// [`DrawList::excluded`] and skipped; they are picked up by a later build once
    /// resident. Equal sort keys keep their input order.
    pub fn run(
        &self,
        renderables: &[Renderable],
        geometry: &dyn GeometryLookup,
        materials: &dyn MaterialLookup,
        out: &mut DrawList,
    ) {
        out.clear();

        let mut resolved = Vec::with_capacity(renderables.len());
        for renderable in renderables {
            let binding = match materials.binding(renderable.material) {
                Ok(binding) => binding,
                Err(_) => {
                    out.excluded.missing_material += 1;
                    continue;
                }
            };
            let region = match geometry.region(renderable.mesh, renderable.sub_mesh) {
                Ok(region) => region,
                Err(_) => {
                    out.excluded.missing_mesh += 1;
                    continue;
                }
            };
            if region.format != binding.vertex_format {
                log::trace!(
                    "Mesh {} is {:?} but material {} expects {:?}",
                    renderable.mesh,
                    region.format,
                    renderable.material,
                    binding.vertex_format
                );
                out.excluded.format_mismatch += 1;
                continue;
            }
            resolved.push(Resolved {
                renderable: *renderable,
                region,
                binding,
            });
        }

        // `sort_by_key` is stable: equal keys keep the renderable input order.
        resolved.sort_by_key(|r| (r.renderable.material, r.renderable.mesh, r.renderable.sub_mesh));

        let mut current_mesh: Option<(AssetUUID, u32)> = None;
        for item in &resolved {
            if out.instances.len() as u32 >= self.limits.max_instances {
                out.excluded.over_capacity += 1;
                continue;
            }
            let renderable = &item.renderable;
            let mesh_key = (renderable.mesh, renderable.sub_mesh);

            let same_material = out
                .batches
                .last()
                .is_some_and(|batch| batch.material == renderable.material);
            let command_full = out
                .commands
                .last()
                .is_some_and(|command| command.instance_count >= self.limits.max_instances_per_command);

            if !same_material {
                self.begin_batch(out, item);
                self.begin_command(out, item);
            } else if current_mesh != Some(mesh_key) || command_full {
                let batch_full = out
                    .batches
                    .last()
                    .is_some_and(|batch| batch.command_count >= self.limits.max_commands_per_batch);
                if batch_full {
                    self.begin_batch(out, item);
                }
                self.begin_command(out, item);
            }
            current_mesh = Some(mesh_key);

            if let Some(command) = out.commands.last_mut() {
                command.instance_count += 1;
            }
            out.instances.push(DrawInstance {
                entity: renderable.entity,
                material: renderable.material,
            });
        }

        if out.excluded.over_capacity > 0 {
            log::warn!(
                "Draw list full at {} instances, {} renderables dropped",
                self.limits.max_instances,
                out.excluded.over_capacity
            );
        }
        log::trace!(
            "Built {} batches, {} commands, {} instances ({} excluded)",
            out.batches.len(),
            out.commands.len(),
            out.instances.len(),
            out.excluded.total()
        );
    }

    fn begin_batch(&self, out: &mut DrawList, item: &Resolved) {
        out.batches.push(DrawBatch {
            material: item.renderable.material,
            pipeline: item.binding.pipeline,
            vertex_format: item.binding.vertex_format,
            first_command: out.commands.len() as u32,
            command_count: 0,
        });
    }

    fn begin_command(&self, out: &mut DrawList, item: &Resolved) {
        out.commands.push(IndexedIndirectCommand {
            index_count: item.region.index_count,
            instance_count: 0,
            first_index: item.region.index_offset,
            vertex_offset: item.region.vertex_offset as i32,
            first_instance: out.instances.len() as u32,
        });
        if let Some(batch) = out.batches.last_mut() {
            batch.command_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Meshes(HashMap<AssetUUID, Vec<GeometryRegion>>);

    impl GeometryLookup for Meshes {
        fn region(&self, mesh: AssetUUID, sub_mesh: u32) -> Result<GeometryRegion, ResourceError> {
            let regions = self.0.get(&mesh).ok_or(ResourceError::UnknownMesh(mesh))?;
            regions
                .get(sub_mesh as usize)
                .copied()
                .ok_or(ResourceError::OutOfBounds)
        }
    }

    struct Materials(HashMap<AssetUUID, MaterialBinding>);

    impl MaterialLookup for Materials {
        fn binding(&self, material: AssetUUID) -> Result<MaterialBinding, ResourceError> {
            self.0
                .get(&material)
                .copied()
                .ok_or(ResourceError::UnknownMaterial(material))
        }
    }

    const MESH_A: AssetUUID = AssetUUID::from_u128(0xa);
    const MESH_B: AssetUUID = AssetUUID::from_u128(0xb);
    const MESH_C: AssetUUID = AssetUUID::from_u128(0xc);
    const MAT_X: AssetUUID = AssetUUID::from_u128(0x100);
    const MAT_Y: AssetUUID = AssetUUID::from_u128(0x200);

    fn region(vertex_offset: u32, index_offset: u32, index_count: u32) -> GeometryRegion {
        GeometryRegion {
            vertex_offset,
            vertex_count: 4,
            index_offset,
            index_count,
            format: VertexFormat::PositionNormalUv,
            active: true,
        }
    }

    fn meshes() -> Meshes {
        Meshes(HashMap::from([
            (MESH_A, vec![region(0, 0, 6), region(4, 6, 3)]),
            (MESH_B, vec![region(8, 9, 12)]),
            (
                MESH_C,
                vec![GeometryRegion {
                    format: VertexFormat::Position,
                    ..region(0, 0, 3)
                }],
            ),
        ]))
    }

    fn materials() -> Materials {
        let binding = |index, pipeline| MaterialBinding {
            index,
            pipeline: RenderPipelineId(pipeline),
            vertex_format: VertexFormat::PositionNormalUv,
        };
        Materials(HashMap::from([(MAT_X, binding(0, 1)), (MAT_Y, binding(1, 2))]))
    }

    fn renderable(entity: u32, mesh: AssetUUID, material: AssetUUID, sub_mesh: u32) -> Renderable {
        Renderable {
            entity: EntityId::new(entity, 0),
            mesh,
            material,
            sub_mesh,
        }
    }

    fn build(renderables: &[Renderable], limits: BatchLimits) -> DrawList {
        let mut out = DrawList::new();
        DrawBatchLane::new(limits).run(renderables, &meshes(), &materials(), &mut out);
        out
    }

    fn unlimited() -> BatchLimits {
        BatchLimits::new(10_000, 10_000, 10_000).unwrap()
    }

    fn assert_partitioned(list: &DrawList) {
        let mut expected_first = 0;
        for command in &list.commands {
            assert_eq!(command.first_instance, expected_first);
            expected_first += command.instance_count;
        }
        assert_eq!(expected_first as usize, list.instances.len());
        let mut expected_command = 0;
        for batch in &list.batches {
            assert_eq!(batch.first_command, expected_command);
            expected_command += batch.command_count;
        }
        assert_eq!(expected_command as usize, list.commands.len());
    }

    #[test]
    fn test_single_material_two_meshes() {
        let list = build(
            &[
                renderable(1, MESH_A, MAT_X, 0),
                renderable(2, MESH_A, MAT_X, 0),
                renderable(3, MESH_B, MAT_X, 0),
            ],
            unlimited(),
        );

        assert_eq!(list.batches.len(), 1);
        assert_eq!(list.batches[0].material, MAT_X);
        assert_eq!(list.batches[0].command_count, 2);
        assert_eq!(list.commands[0].instance_count, 2);
        assert_eq!(list.commands[0].first_instance, 0);
        assert_eq!(list.commands[0].index_count, 6);
        assert_eq!(list.commands[1].instance_count, 1);
        assert_eq!(list.commands[1].first_instance, 2);
        assert_eq!(list.commands[1].vertex_offset, 8);
        assert_eq!(list.commands[1].first_index, 9);
    }

    #[test]
    fn test_empty_input_produces_no_batches() {
        let list = build(&[], unlimited());
        assert!(list.is_empty());
        assert!(list.commands.is_empty());
        assert_eq!(list.excluded.total(), 0);
    }

    #[test]
    fn test_sort_is_stable_on_equal_keys() {
        let list = build(
            &[
                renderable(5, MESH_B, MAT_Y, 0),
                renderable(1, MESH_A, MAT_X, 0),
                renderable(4, MESH_B, MAT_Y, 0),
                renderable(2, MESH_A, MAT_X, 0),
                renderable(3, MESH_A, MAT_X, 1),
            ],
            unlimited(),
        );

        let order: Vec<u32> = list.instances.iter().map(|i| i.entity.index).collect();
        assert_eq!(order, vec![1, 2, 3, 5, 4]);
        assert_eq!(list.batches.len(), 2);
        assert_eq!(list.batches[0].command_count, 2, "sub-mesh change starts a command");
        assert_eq!(list.commands[1].first_index, 6);
        assert_partitioned(&list);
    }

    #[test]
    fn test_instance_cap_splits_commands() {
        let renderables: Vec<_> = (0..5).map(|i| renderable(i, MESH_A, MAT_X, 0)).collect();
        let list = build(&renderables, BatchLimits::new(2, 10, 100).unwrap());

        let counts: Vec<u32> = list.commands.iter().map(|c| c.instance_count).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(list.batches.len(), 1);
        assert_partitioned(&list);
    }

    #[test]
    fn test_command_cap_splits_batches() {
        let renderables: Vec<_> = (0..5).map(|i| renderable(i, MESH_A, MAT_X, 0)).collect();
        let list = build(&renderables, BatchLimits::new(1, 2, 100).unwrap());

        assert_eq!(list.commands.len(), 5);
        let sizes: Vec<u32> = list.batches.iter().map(|b| b.command_count).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(list.batches.iter().all(|b| b.material == MAT_X));
        assert_partitioned(&list);
    }

    #[test]
    fn test_unresolved_renderables_are_excluded() {
        let unknown_mesh = AssetUUID::from_u128(0xdead);
        let unknown_material = AssetUUID::from_u128(0xbeef);
        let list = build(
            &[
                renderable(1, unknown_mesh, MAT_X, 0),
                renderable(2, MESH_A, unknown_material, 0),
                renderable(3, MESH_C, MAT_X, 0),
                renderable(4, MESH_A, MAT_X, 7),
                renderable(5, MESH_B, MAT_X, 0),
            ],
            unlimited(),
        );

        assert_eq!(list.excluded.missing_mesh, 2);
        assert_eq!(list.excluded.missing_material, 1);
        assert_eq!(list.excluded.format_mismatch, 1);
        assert_eq!(list.instances.len(), 1);
        assert_eq!(list.instances[0].entity.index, 5);
    }

    #[test]
    fn test_draw_list_capacity() {
        let renderables: Vec<_> = (0..5).map(|i| renderable(i, MESH_A, MAT_X, 0)).collect();
        let list = build(&renderables, BatchLimits::new(100, 100, 3).unwrap());
        assert_eq!(list.instances.len(), 3);
        assert_eq!(list.excluded.over_capacity, 2);
        assert_partitioned(&list);
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut renderables = Vec::new();
        for i in 0..200u32 {
            let mesh = [MESH_A, MESH_B][(i * 7 % 2) as usize];
            let material = [MAT_X, MAT_Y][(i * 13 % 3 % 2) as usize];
            renderables.push(renderable(i, mesh, material, 0));
        }
        let limits = BatchLimits::new(16, 4, 10_000).unwrap();
        let first = build(&renderables, limits);
        let second = build(&renderables, limits);

        let bytes: &[u8] = bytemuck::cast_slice(&first.commands);
        assert_eq!(bytes, bytemuck::cast_slice::<_, u8>(&second.commands));
        assert_eq!(first.batches, second.batches);
        assert_eq!(first.instances, second.instances);
        assert_partitioned(&first);
    }

    #[test]
    fn test_instance_counts_match_material_population() {
        let renderables: Vec<_> = (0..50u32)
            .map(|i| renderable(i, MESH_B, [MAT_X, MAT_Y][(i % 2) as usize], 0))
            .collect();
        let list = build(&renderables, BatchLimits::new(4, 3, 1000).unwrap());

        for material in [MAT_X, MAT_Y] {
            let drawn: u32 = list
                .batches
                .iter()
                .filter(|b| b.material == material)
                .flat_map(|b| list.batch_commands(b))
                .map(|c| c.instance_count)
                .sum();
            assert_eq!(drawn, 25);
        }
    }

    #[test]
    fn test_zero_caps_are_rejected() {
        assert_eq!(BatchLimits::new(0, 1, 1), Err(BatchError::ZeroInstanceCap));
        assert_eq!(BatchLimits::new(1, 0, 1), Err(BatchError::ZeroCommandCap));
    }
}
