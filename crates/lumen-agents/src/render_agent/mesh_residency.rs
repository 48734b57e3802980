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

//! Defines the system that makes the meshes referenced by renderables resident.

use lumen_core::asset::{AssetSource, AssetUUID};
use lumen_core::renderer::{FrameRing, GraphicsDevice, ResourceError};
use lumen_data::geometry::GeometryArena;
use lumen_lanes::render_lane::Renderable;
use std::collections::{BTreeSet, HashMap};

/// Outcome of one [`MeshResidencySystem::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshResidencyReport {
    /// Meshes that became resident.
    pub loaded: usize,
    /// Meshes whose asset could not be loaded.
    pub failed: usize,
}

/// Loads referenced meshes into the [`GeometryArena`].
///
/// A mesh whose asset fails to load is remembered and not requested again until
/// [`MeshResidencySystem::retry_failed`] is called, so a broken asset costs one
/// loader call rather than one per frame.
#[derive(Debug, Default)]
pub struct MeshResidencySystem {
    /// Every mesh referenced by the current renderable set, in id order.
    referenced: BTreeSet<AssetUUID>,
    /// Meshes whose last load failed, with the reason.
    failed: HashMap<AssetUUID, String>,
}

impl MeshResidencySystem {
    /// Creates an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of referenced meshes.
    ///
    /// Called whenever the renderable set is rebuilt.
    pub fn track(&mut self, renderables: &[Renderable]) {
        self.referenced.clear();
        self.referenced
            .extend(renderables.iter().map(|renderable| renderable.mesh));
    }

    /// Loads every referenced mesh that is neither resident nor known to fail.
    ///
    /// # Arguments
    ///
    /// * `device`: The device the arena allocates from.
    /// * `ring`: The frame ring, used to retire buffers replaced by a grow.
    /// * `arena`: The arena receiving the geometry.
    /// * `source`: The asset loader.
    ///
    /// # Errors
    ///
    /// Asset and validation failures are absorbed and reported in the returned
    /// [`MeshResidencyReport`]. Any other error, such as an arena that cannot grow,
    /// is returned.
    pub fn run(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        arena: &mut GeometryArena,
        source: &dyn AssetSource,
    ) -> Result<MeshResidencyReport, ResourceError> {
        let mut report = MeshResidencyReport::default();
        for &id in &self.referenced {
            if arena.contains(id) || self.failed.contains_key(&id) {
                continue;
            }
            let result = source
                .load_mesh_bytes(id)
                .map_err(ResourceError::from)
                .and_then(|mesh| arena.add_mesh(device, ring, id, &mesh));
            match result {
                Ok(()) => report.loaded += 1,
                Err(e) if e.is_residency() => {
                    log::warn!("Mesh {id} could not be made resident: {e}");
                    self.failed.insert(id, e.to_string());
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if report.loaded > 0 {
            log::debug!("{} meshes became resident", report.loaded);
        }
        Ok(report)
    }

    /// Returns `true` if the mesh is referenced by the current renderable set.
    pub fn is_referenced(&self, id: AssetUUID) -> bool {
        self.referenced.contains(&id)
    }

    /// The reason the last load of `id` failed, if it did.
    pub fn failure(&self, id: AssetUUID) -> Option<&str> {
        self.failed.get(&id).map(String::as_str)
    }

    /// Number of meshes whose load failed.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Forgets every failure so the next run requests those meshes again.
    /// Returns how many meshes will be retried.
    pub fn retry_failed(&mut self) -> usize {
        let count = self.failed.len();
        self.failed.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::asset::{
        AssetError, BaseMaterialData, MaterialInstanceData, MeshData, TextureData,
    };
    use lumen_core::config::{FrameConfig, GeometryConfig};
    use lumen_core::renderer::VertexFormat;
    use lumen_core::scene::EntityId;
    use lumen_core::testing::MockGraphicsDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Meshes {
        available: HashMap<AssetUUID, MeshData>,
        loads: AtomicUsize,
    }

    impl AssetSource for Meshes {
        fn load_mesh_bytes(&self, id: AssetUUID) -> Result<MeshData, AssetError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.available.get(&id).cloned().ok_or(AssetError::NotFound(id))
        }

        fn load_texture_bytes(&self, id: AssetUUID) -> Result<TextureData, AssetError> {
            Err(AssetError::NotFound(id))
        }

        fn load_material_instance(&self, id: AssetUUID) -> Result<MaterialInstanceData, AssetError> {
            Err(AssetError::NotFound(id))
        }

        fn load_base_material(&self, id: AssetUUID) -> Result<BaseMaterialData, AssetError> {
            Err(AssetError::NotFound(id))
        }

        fn load_shader_bytecode(&self, id: AssetUUID) -> Result<Vec<u8>, AssetError> {
            Err(AssetError::NotFound(id))
        }
    }

    fn triangle() -> MeshData {
        MeshData {
            vertex_bytes: vec![0; 36],
            index_bytes: bytemuck::cast_slice(&[0u32, 1, 2]).to_vec(),
            vertex_format: VertexFormat::Position,
            sub_meshes: Vec::new(),
        }
    }

    fn renderable(index: u32, mesh: AssetUUID) -> Renderable {
        Renderable {
            entity: EntityId::new(index, 0),
            mesh,
            material: AssetUUID::from_u128(100),
            sub_mesh: 0,
        }
    }

    fn setup() -> (MockGraphicsDevice, FrameRing, GeometryArena) {
        let device = MockGraphicsDevice::new();
        let ring = FrameRing::new(&device, &FrameConfig::default()).unwrap();
        let arena = GeometryArena::new(GeometryConfig {
            vertex_page_size: 1024,
            index_page_size: 1024,
            ..Default::default()
        });
        (device, ring, arena)
    }

    #[test]
    fn test_referenced_meshes_become_resident_once() {
        let (device, mut ring, mut arena) = setup();
        let mesh_a = AssetUUID::from_u128(1);
        let mut source = Meshes::default();
        source.available.insert(mesh_a, triangle());

        let mut system = MeshResidencySystem::new();
        system.track(&[renderable(0, mesh_a), renderable(1, mesh_a)]);

        let report = system.run(&device, &mut ring, &mut arena, &source).unwrap();
        assert_eq!(report, MeshResidencyReport { loaded: 1, failed: 0 });
        assert!(arena.contains(mesh_a));

        let report = system.run(&device, &mut ring, &mut arena, &source).unwrap();
        assert_eq!(report, MeshResidencyReport::default());
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_mesh_is_not_requested_until_retried() {
        let (device, mut ring, mut arena) = setup();
        let missing = AssetUUID::from_u128(2);
        let mut source = Meshes::default();

        let mut system = MeshResidencySystem::new();
        system.track(&[renderable(0, missing)]);

        let report = system.run(&device, &mut ring, &mut arena, &source).unwrap();
        assert_eq!(report.failed, 1);
        assert!(system.failure(missing).is_some());
        system.run(&device, &mut ring, &mut arena, &source).unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        source.available.insert(missing, triangle());
        assert_eq!(system.retry_failed(), 1);
        let report = system.run(&device, &mut ring, &mut arena, &source).unwrap();
        assert_eq!(report.loaded, 1);
        assert!(arena.contains(missing));
        assert_eq!(system.failed_count(), 0);
    }

    #[test]
    fn test_arena_exhaustion_is_returned() {
        let (device, mut ring, mut arena) = setup();
        let mesh_a = AssetUUID::from_u128(3);
        let mut source = Meshes::default();
        source.available.insert(mesh_a, triangle());
        device.fail_next_buffer_allocations(8);

        let mut system = MeshResidencySystem::new();
        system.track(&[renderable(0, mesh_a)]);

        let err = system.run(&device, &mut ring, &mut arena, &source).unwrap_err();
        assert!(matches!(err, ResourceError::AllocationFailed { .. }));
        assert_eq!(system.failed_count(), 0);
    }
}
