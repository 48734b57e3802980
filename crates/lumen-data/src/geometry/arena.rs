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

//! The geometry arena: one shared vertex buffer per vertex format plus one shared
//! index buffer, sub-allocated per mesh.

use super::pool::{ArenaPool, PoolKind};
use super::region::{Block, GeometryRegion};
use lumen_core::asset::{AssetUUID, MeshData, SubMeshRange};
use lumen_core::config::GeometryConfig;
use lumen_core::renderer::{BufferId, FrameRing, GraphicsDevice, ResourceError, VertexFormat};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct MeshEntry {
    format: VertexFormat,
    vertices: Block,
    indices: Block,
    sub_meshes: Vec<SubMeshRange>,
    active: bool,
}

impl MeshEntry {
    fn uses(&self, kind: PoolKind) -> bool {
        match kind {
            PoolKind::Vertex(format) => self.format == format,
            PoolKind::Index => true,
        }
    }

    fn block_mut(&mut self, kind: PoolKind) -> &mut Block {
        match kind {
            PoolKind::Vertex(_) => &mut self.vertices,
            PoolKind::Index => &mut self.indices,
        }
    }
}

/// Occupancy counters of the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryStats {
    /// Meshes currently resident.
    pub resident_meshes: usize,
    /// Allocated bytes over every vertex pool.
    pub vertex_capacity_bytes: u64,
    /// Bytes of vertex data owned by resident meshes.
    pub vertex_live_bytes: u64,
    /// Allocated bytes of the index pool.
    pub index_capacity_bytes: u64,
    /// Bytes of index data owned by resident meshes.
    pub index_live_bytes: u64,
    /// Number of successful grow operations. A mesh that overflows both its vertex
    /// pool and the index pool counts as one.
    pub grows: u64,
    /// Number of successful shrink operations.
    pub shrinks: u64,
}

/// Packs the geometry of every resident mesh into a few large GPU buffers.
///
/// Regions handed out never overlap and always lie inside their pool's capacity.
/// Growing or shrinking a pool compacts the live regions in their existing
/// order into a new buffer; the old buffer goes through the frame ring's deferred
/// destruction since in-flight frames may still read it.
///
/// Every change of placement bumps [`GeometryArena::generation`], which tells
/// consumers that cached offsets are stale.
#[derive(Debug)]
pub struct GeometryArena {
    config: GeometryConfig,
    vertex_pools: BTreeMap<VertexFormat, ArenaPool>,
    index_pool: Option<ArenaPool>,
    meshes: HashMap<AssetUUID, MeshEntry>,
    generation: u64,
    grows: u64,
    shrinks: u64,
}

impl GeometryArena {
    /// Creates an empty arena. Pools are allocated on first use.
    pub fn new(config: GeometryConfig) -> Self {
        Self {
            config,
            vertex_pools: BTreeMap::new(),
            index_pool: None,
            meshes: HashMap::new(),
            generation: 0,
            grows: 0,
            shrinks: 0,
        }
    }

    /// Makes a mesh resident.
    ///
    /// Adding a mesh that is already resident is a no-op. A mesh removed earlier
    /// whose bytes were not reclaimed yet is reactivated without uploading again.
    /// Pools grow as needed.
    ///
    /// # Errors
    ///
    /// * [`ResourceError::AssetLoadFailed`] if the payload is inconsistent.
    /// * [`ResourceError::AllocationFailed`] if a pool could not grow even after
    ///   retrying with the minimal size. The arena is left unchanged.
    pub fn add_mesh(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        id: AssetUUID,
        mesh: &MeshData,
    ) -> Result<(), ResourceError> {
        if let Some(entry) = self.meshes.get_mut(&id) {
            if entry.active {
                return Ok(());
            }
            if let Some(pool) = self.vertex_pools.get_mut(&entry.format) {
                pool.reclaim(entry.vertices);
            }
            if let Some(pool) = self.index_pool.as_mut() {
                pool.reclaim(entry.indices);
            }
            entry.active = true;
            self.generation += 1;
            log::trace!("Reactivated mesh {id}");
            return Ok(());
        }

        let sub_meshes = validate_mesh(id, mesh)?;
        let format = mesh.vertex_format;
        let vertex_bytes = &mesh.vertex_bytes[..mesh.vertex_count() as usize * format.stride() as usize];
        let index_bytes = &mesh.index_bytes[..mesh.index_count() as usize * 4];

        let grew = self.ensure_room(device, ring, PoolKind::Vertex(format), vertex_bytes.len() as u64)?;
        if grew {
            self.grows += 1;
        }
        if self.ensure_room(device, ring, PoolKind::Index, index_bytes.len() as u64)? && !grew {
            self.grows += 1;
        }

        let vertex_pool = self
            .vertex_pools
            .get_mut(&format)
            .ok_or(ResourceError::NotFound)?;
        let vertices = vertex_pool.append(device, vertex_bytes)?;
        let index_pool = self.index_pool.as_mut().ok_or(ResourceError::NotFound)?;
        let indices = match index_pool.append(device, index_bytes) {
            Ok(block) => block,
            Err(e) => {
                vertex_pool.release(vertices);
                return Err(e);
            }
        };

        self.meshes.insert(
            id,
            MeshEntry {
                format,
                vertices,
                indices,
                sub_meshes,
                active: true,
            },
        );
        self.generation += 1;
        log::trace!(
            "Mesh {id} resident: {} vertices at {}, {} indices at {}",
            vertices.len,
            vertices.offset,
            indices.len,
            indices.offset
        );
        Ok(())
    }

    /// Marks meshes inactive and returns how many were resident.
    ///
    /// Their space is reclaimed by the next compaction; a pool whose usage falls
    /// below the shrink threshold is compacted right away.
    pub fn remove_meshes(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        ids: &[AssetUUID],
    ) -> Result<usize, ResourceError> {
        let mut removed = 0;
        for id in ids {
            let Some(entry) = self.meshes.get_mut(id) else {
                continue;
            };
            if !entry.active {
                continue;
            }
            entry.active = false;
            if let Some(pool) = self.vertex_pools.get_mut(&entry.format) {
                pool.release(entry.vertices);
            }
            if let Some(pool) = self.index_pool.as_mut() {
                pool.release(entry.indices);
            }
            removed += 1;
        }
        if removed > 0 {
            self.generation += 1;
            log::debug!("Removed {removed} meshes from the geometry arena");
            self.shrink(device, ring)?;
        }
        Ok(removed)
    }

    /// Grows a pool so that at least `min_additional_bytes` more bytes fit after
    /// compaction.
    ///
    /// The new capacity is the larger of twice the current one and the required
    /// size rounded up to whole pages. If that allocation fails the minimal
    /// page-rounded size is tried once. `min_additional_bytes == 0` does nothing.
    pub fn grow(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        kind: PoolKind,
        min_additional_bytes: u64,
    ) -> Result<(), ResourceError> {
        if self.grow_pool(device, ring, kind, min_additional_bytes)? {
            self.grows += 1;
        }
        Ok(())
    }

    /// Relocates a pool into a larger buffer. Returns `false` if nothing was requested.
    fn grow_pool(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        kind: PoolKind,
        min_additional_bytes: u64,
    ) -> Result<bool, ResourceError> {
        if min_additional_bytes == 0 {
            return Ok(false);
        }
        let pool = self.pool_or_create(device, kind)?;
        let required = pool.live() + min_additional_bytes.div_ceil(kind.stride());
        let minimal = pool.round_to_page(required);
        let preferred = (pool.capacity() * 2).max(minimal);

        match self.relocate(device, ring, kind, preferred) {
            Ok(()) => {}
            Err(ResourceError::AllocationFailed { size, .. }) => {
                log::warn!(
                    "Growing {kind:?} to {size} bytes failed, retrying with {} bytes",
                    minimal * kind.stride()
                );
                if let Err(e) = self.relocate(device, ring, kind, minimal) {
                    log::error!("Geometry arena cannot grow {kind:?}: {e}");
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
        Ok(true)
    }

    /// Compacts every pool whose usage is below the configured threshold, targeting
    /// the configured usage and never going below the initial capacity.
    ///
    /// Returns `true` if any pool shrank. A failed allocation keeps the old buffer.
    pub fn shrink(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
    ) -> Result<bool, ResourceError> {
        let threshold = f64::from(self.config.shrink_usage_threshold);
        let target_usage = f64::from(self.config.shrink_target_usage);

        let mut candidates = Vec::new();
        let pools = self
            .vertex_pools
            .iter()
            .map(|(format, pool)| (PoolKind::Vertex(*format), pool))
            .chain(self.index_pool.iter().map(|pool| (PoolKind::Index, pool)));
        for (kind, pool) in pools {
            if pool.capacity() <= pool.min_capacity() {
                continue;
            }
            if (pool.live() as f64) >= pool.capacity() as f64 * threshold {
                continue;
            }
            let wanted = (pool.live() as f64 / target_usage).ceil() as u64;
            let target = pool.round_to_page(wanted).max(pool.min_capacity());
            if target < pool.capacity() {
                candidates.push((kind, target));
            }
        }

        let mut shrank = false;
        for (kind, target) in candidates {
            match self.relocate(device, ring, kind, target) {
                Ok(()) => {
                    self.shrinks += 1;
                    shrank = true;
                }
                Err(ResourceError::AllocationFailed { .. }) => {
                    log::warn!("Could not shrink {kind:?}, keeping the current buffer");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(shrank)
    }

    /// Returns `true` if the mesh is resident.
    pub fn contains(&self, id: AssetUUID) -> bool {
        self.meshes.get(&id).is_some_and(|entry| entry.active)
    }

    fn entry(&self, id: AssetUUID) -> Result<&MeshEntry, ResourceError> {
        self.meshes
            .get(&id)
            .filter(|entry| entry.active)
            .ok_or(ResourceError::UnknownMesh(id))
    }

    /// First vertex of the whole mesh inside its vertex pool.
    pub fn mesh_vertex_offset(&self, id: AssetUUID) -> Result<u32, ResourceError> {
        self.entry(id).map(|e| e.vertices.offset as u32)
    }

    /// First index of the whole mesh inside the index pool.
    pub fn mesh_index_offset(&self, id: AssetUUID) -> Result<u32, ResourceError> {
        self.entry(id).map(|e| e.indices.offset as u32)
    }

    /// Vertex count of the whole mesh.
    pub fn mesh_vertex_count(&self, id: AssetUUID) -> Result<u32, ResourceError> {
        self.entry(id).map(|e| e.vertices.len as u32)
    }

    /// Index count of the whole mesh.
    pub fn mesh_index_count(&self, id: AssetUUID) -> Result<u32, ResourceError> {
        self.entry(id).map(|e| e.indices.len as u32)
    }

    /// Vertex format of the mesh.
    pub fn mesh_format(&self, id: AssetUUID) -> Result<VertexFormat, ResourceError> {
        self.entry(id).map(|e| e.format)
    }

    /// Number of sub-meshes of the mesh.
    pub fn sub_mesh_count(&self, id: AssetUUID) -> Result<u32, ResourceError> {
        self.entry(id).map(|e| e.sub_meshes.len() as u32)
    }

    /// Placement of one sub-mesh.
    ///
    /// # Errors
    ///
    /// [`ResourceError::UnknownMesh`] if the mesh is not resident and
    /// [`ResourceError::OutOfBounds`] if the sub-mesh does not exist.
    pub fn region(&self, id: AssetUUID, sub_mesh: u32) -> Result<GeometryRegion, ResourceError> {
        let entry = self.entry(id)?;
        let range = entry
            .sub_meshes
            .get(sub_mesh as usize)
            .ok_or(ResourceError::OutOfBounds)?;
        Ok(GeometryRegion {
            vertex_offset: entry.vertices.offset as u32 + range.first_vertex,
            vertex_count: range.vertex_count,
            index_offset: entry.indices.offset as u32 + range.first_index,
            index_count: range.index_count,
            format: entry.format,
            active: entry.active,
        })
    }

    /// The vertex buffer holding meshes of `format`, if any was allocated.
    pub fn vertex_buffer(&self, format: VertexFormat) -> Option<BufferId> {
        self.vertex_pools.get(&format).map(ArenaPool::buffer)
    }

    /// The shared index buffer, if allocated.
    pub fn index_buffer(&self) -> Option<BufferId> {
        self.index_pool.as_ref().map(ArenaPool::buffer)
    }

    /// Capacity of a pool in elements.
    pub fn capacity(&self, kind: PoolKind) -> Option<u64> {
        self.pool(kind).map(ArenaPool::capacity)
    }

    /// Bumped whenever a region is added, removed or moved.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ids of every resident mesh, sorted.
    pub fn resident_meshes(&self) -> Vec<AssetUUID> {
        let mut ids: Vec<_> = self
            .meshes
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Occupancy counters.
    pub fn stats(&self) -> GeometryStats {
        let mut stats = GeometryStats {
            resident_meshes: self.meshes.values().filter(|e| e.active).count(),
            grows: self.grows,
            shrinks: self.shrinks,
            ..Default::default()
        };
        for (format, pool) in &self.vertex_pools {
            let stride = u64::from(format.stride());
            stats.vertex_capacity_bytes += pool.capacity() * stride;
            stats.vertex_live_bytes += pool.live() * stride;
        }
        if let Some(pool) = &self.index_pool {
            stats.index_capacity_bytes = pool.capacity() * PoolKind::Index.stride();
            stats.index_live_bytes = pool.live() * PoolKind::Index.stride();
        }
        stats
    }

    /// Destroys every pool immediately. The GPU must be idle.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for pool in self.vertex_pools.values() {
            pool.destroy(device);
        }
        if let Some(pool) = &self.index_pool {
            pool.destroy(device);
        }
        self.vertex_pools.clear();
        self.index_pool = None;
        self.meshes.clear();
        self.generation += 1;
    }

    fn pool(&self, kind: PoolKind) -> Option<&ArenaPool> {
        match kind {
            PoolKind::Vertex(format) => self.vertex_pools.get(&format),
            PoolKind::Index => self.index_pool.as_ref(),
        }
    }

    fn pool_or_create(
        &mut self,
        device: &dyn GraphicsDevice,
        kind: PoolKind,
    ) -> Result<&mut ArenaPool, ResourceError> {
        let page_bytes = match kind {
            PoolKind::Vertex(_) => self.config.vertex_page_size,
            PoolKind::Index => self.config.index_page_size,
        };
        let initial_pages = self.config.initial_pages;
        let slot = match kind {
            PoolKind::Vertex(format) => self.vertex_pools.entry(format),
            PoolKind::Index => {
                if self.index_pool.is_none() {
                    self.index_pool = Some(ArenaPool::new(device, kind, page_bytes, initial_pages)?);
                }
                return self.index_pool.as_mut().ok_or(ResourceError::NotFound);
            }
        };
        match slot {
            std::collections::btree_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::btree_map::Entry::Vacant(entry) => {
                Ok(entry.insert(ArenaPool::new(device, kind, page_bytes, initial_pages)?))
            }
        }
    }

    fn ensure_room(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        kind: PoolKind,
        bytes: u64,
    ) -> Result<bool, ResourceError> {
        let pool = self.pool_or_create(device, kind)?;
        let needed = bytes / kind.stride();
        if needed <= pool.remaining() {
            return Ok(false);
        }
        self.grow_pool(device, ring, kind, bytes)
    }

    fn relocate(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        kind: PoolKind,
        capacity: u64,
    ) -> Result<(), ResourceError> {
        let pool = match kind {
            PoolKind::Vertex(format) => self.vertex_pools.get_mut(&format),
            PoolKind::Index => self.index_pool.as_mut(),
        }
        .ok_or(ResourceError::NotFound)?;
        let blocks = self
            .meshes
            .values_mut()
            .filter(|entry| entry.active && entry.uses(kind))
            .map(|entry| entry.block_mut(kind))
            .collect();
        pool.relocate(device, ring, capacity, blocks)?;

        // Inactive meshes lost their bytes in this pool; they must be uploaded again.
        self.meshes.retain(|_, entry| entry.active || !entry.uses(kind));
        self.generation += 1;
        Ok(())
    }
}

fn validate_mesh(id: AssetUUID, mesh: &MeshData) -> Result<Vec<SubMeshRange>, ResourceError> {
    let malformed = |reason: String| ResourceError::AssetLoadFailed { asset: id, reason };
    let stride = mesh.vertex_format.stride() as usize;
    if mesh.vertex_bytes.len() % stride != 0 {
        return Err(malformed(format!(
            "vertex payload of {} bytes is not a multiple of the {stride}-byte stride",
            mesh.vertex_bytes.len()
        )));
    }
    if mesh.index_bytes.len() % 4 != 0 {
        return Err(malformed("index payload is not made of u32 indices".to_string()));
    }
    let vertex_count = mesh.vertex_count();
    let index_count = mesh.index_count();
    let ranges = mesh.sub_mesh_ranges();
    for (i, range) in ranges.iter().enumerate() {
        let vertex_end = u64::from(range.first_vertex) + u64::from(range.vertex_count);
        let index_end = u64::from(range.first_index) + u64::from(range.index_count);
        if vertex_end > u64::from(vertex_count) || index_end > u64::from(index_count) {
            return Err(malformed(format!("sub-mesh {i} lies outside the mesh payload")));
        }
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::config::FrameConfig;
    use lumen_core::testing::MockGraphicsDevice;

    const POSITION: PoolKind = PoolKind::Vertex(VertexFormat::Position);

    fn config() -> GeometryConfig {
        GeometryConfig {
            vertex_page_size: 12 * 8,
            index_page_size: 4 * 16,
            initial_pages: 1,
            ..Default::default()
        }
    }

    fn setup() -> (MockGraphicsDevice, FrameRing, GeometryArena) {
        let device = MockGraphicsDevice::new();
        let ring = FrameRing::new(&device, &FrameConfig::default()).unwrap();
        (device, ring, GeometryArena::new(config()))
    }

    fn mesh(vertices: u32, indices: u32, seed: u8) -> MeshData {
        let vertex_bytes = (0..vertices as usize * 12)
            .map(|i| seed.wrapping_add(i as u8))
            .collect();
        let index_values: Vec<u32> = (0..indices).map(|i| i % vertices.max(1)).collect();
        MeshData {
            vertex_bytes,
            index_bytes: bytemuck::cast_slice(&index_values).to_vec(),
            vertex_format: VertexFormat::Position,
            sub_meshes: Vec::new(),
        }
    }

    fn assert_no_overlap(arena: &GeometryArena) {
        let mut vertex_blocks: Vec<Block> = Vec::new();
        let mut index_blocks: Vec<Block> = Vec::new();
        for entry in arena.meshes.values().filter(|e| e.active) {
            vertex_blocks.push(entry.vertices);
            index_blocks.push(entry.indices);
        }
        for (blocks, kind) in [(vertex_blocks, POSITION), (index_blocks, PoolKind::Index)] {
            let mut blocks: Vec<_> = blocks.into_iter().filter(|b| b.len > 0).collect();
            blocks.sort_by_key(|b| b.offset);
            for pair in blocks.windows(2) {
                assert!(pair[0].end() <= pair[1].offset, "{pair:?} overlap");
            }
            if let Some(last) = blocks.last() {
                assert!(last.end() <= arena.capacity(kind).unwrap());
            }
        }
    }

    #[test]
    fn test_add_mesh_is_idempotent() {
        let (device, mut ring, mut arena) = setup();
        let id = AssetUUID::from_u128(1);
        arena.add_mesh(&device, &mut ring, id, &mesh(6, 6, 0)).unwrap();
        let buffer = arena.vertex_buffer(VertexFormat::Position).unwrap();
        let writes = device.write_count(buffer);
        let generation = arena.generation();

        arena.add_mesh(&device, &mut ring, id, &mesh(6, 6, 0)).unwrap();

        assert_eq!(device.write_count(buffer), writes);
        assert_eq!(arena.generation(), generation);
        assert_eq!(arena.stats().resident_meshes, 1);
    }

    #[test]
    fn test_second_mesh_triggers_exactly_one_grow() {
        let (device, mut ring, mut arena) = setup();
        let a = AssetUUID::from_u128(1);
        let b = AssetUUID::from_u128(2);
        arena.add_mesh(&device, &mut ring, a, &mesh(6, 6, 0)).unwrap();
        assert_eq!(arena.capacity(POSITION), Some(8));

        arena.add_mesh(&device, &mut ring, b, &mesh(4, 3, 100)).unwrap();

        assert_eq!(arena.stats().grows, 1);
        assert_eq!(arena.capacity(POSITION), Some(16));
        assert_eq!(arena.capacity(PoolKind::Index), Some(16));
        let region = arena.region(b, 0).unwrap();
        assert_eq!(region.vertex_offset, 6);
        assert_eq!(region.index_offset, 6);
        assert_eq!(arena.mesh_vertex_offset(a).unwrap(), 0);
    }

    #[test]
    fn test_grow_preserves_bytes_and_retires_old_buffer() {
        let (device, mut ring, mut arena) = setup();
        let a = AssetUUID::from_u128(1);
        let data = mesh(6, 6, 7);
        arena.add_mesh(&device, &mut ring, a, &data).unwrap();
        let old = arena.vertex_buffer(VertexFormat::Position).unwrap();

        arena.grow(&device, &mut ring, POSITION, 12 * 40).unwrap();

        let new = arena.vertex_buffer(VertexFormat::Position).unwrap();
        assert_ne!(old, new);
        assert!(device.buffer_exists(old), "old buffer must outlive in-flight frames");
        assert_eq!(ring.pending_destructions(), 1);
        let bytes = device.buffer_data(new).unwrap();
        assert_eq!(&bytes[..data.vertex_bytes.len()], data.vertex_bytes.as_slice());
        // 6 live + 40 requested rounds to 48, twice the capacity is only 16.
        assert_eq!(arena.capacity(POSITION), Some(48));
    }

    #[test]
    fn test_grow_by_zero_does_nothing() {
        let (device, mut ring, mut arena) = setup();
        arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(1), &mesh(6, 6, 0))
            .unwrap();
        let created = device.buffers_created();
        let generation = arena.generation();

        arena.grow(&device, &mut ring, POSITION, 0).unwrap();

        assert_eq!(device.buffers_created(), created);
        assert_eq!(arena.generation(), generation);
        assert_eq!(arena.stats().grows, 0);
    }

    #[test]
    fn test_unknown_mesh_lookup() {
        let (_, _, arena) = setup();
        let id = AssetUUID::from_u128(9);
        assert_eq!(arena.mesh_vertex_offset(id), Err(ResourceError::UnknownMesh(id)));
        assert_eq!(arena.region(id, 0), Err(ResourceError::UnknownMesh(id)));
    }

    #[test]
    fn test_sub_mesh_regions() {
        let (device, mut ring, mut arena) = setup();
        arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(1), &mesh(2, 3, 0))
            .unwrap();
        let id = AssetUUID::from_u128(2);
        let mut data = mesh(6, 9, 0);
        data.sub_meshes = vec![
            SubMeshRange { first_vertex: 0, vertex_count: 3, first_index: 0, index_count: 3 },
            SubMeshRange { first_vertex: 3, vertex_count: 3, first_index: 3, index_count: 6 },
        ];
        arena.add_mesh(&device, &mut ring, id, &data).unwrap();

        assert_eq!(arena.sub_mesh_count(id).unwrap(), 2);
        let second = arena.region(id, 1).unwrap();
        assert_eq!(second.vertex_offset, 2 + 3);
        assert_eq!(second.index_offset, 3 + 3);
        assert_eq!(second.index_count, 6);
        assert_eq!(arena.region(id, 2), Err(ResourceError::OutOfBounds));
    }

    #[test]
    fn test_malformed_mesh_is_rejected() {
        let (device, mut ring, mut arena) = setup();
        let id = AssetUUID::from_u128(3);
        let mut data = mesh(4, 6, 0);
        data.vertex_bytes.pop();
        let err = arena.add_mesh(&device, &mut ring, id, &data).unwrap_err();
        assert!(matches!(err, ResourceError::AssetLoadFailed { asset, .. } if asset == id));
        assert!(!arena.contains(id));
    }

    #[test]
    fn test_removed_mesh_is_reactivated_in_place() {
        let (device, mut ring, mut arena) = setup();
        let a = AssetUUID::from_u128(1);
        let b = AssetUUID::from_u128(2);
        arena.add_mesh(&device, &mut ring, a, &mesh(3, 3, 0)).unwrap();
        arena.add_mesh(&device, &mut ring, b, &mesh(3, 3, 0)).unwrap();
        let before = arena.region(b, 0).unwrap();

        assert_eq!(arena.remove_meshes(&device, &mut ring, &[b]).unwrap(), 1);
        assert_eq!(arena.region(b, 0), Err(ResourceError::UnknownMesh(b)));
        let buffer = arena.vertex_buffer(VertexFormat::Position).unwrap();
        let writes = device.write_count(buffer);

        arena.add_mesh(&device, &mut ring, b, &mesh(3, 3, 0)).unwrap();
        assert_eq!(arena.region(b, 0).unwrap(), before);
        assert_eq!(device.write_count(buffer), writes);
    }

    #[test]
    fn test_shrink_after_mass_removal() {
        let (device, mut ring, mut arena) = setup();
        let ids: Vec<_> = (1..=4).map(AssetUUID::from_u128).collect();
        for id in &ids {
            arena.add_mesh(&device, &mut ring, *id, &mesh(8, 3, 0)).unwrap();
        }
        assert_eq!(arena.capacity(POSITION), Some(32));

        arena.remove_meshes(&device, &mut ring, &ids[..3]).unwrap();

        // 8 live vertices at 75% usage round up to two pages.
        assert_eq!(arena.capacity(POSITION), Some(16));
        assert_eq!(arena.region(ids[3], 0).unwrap().vertex_offset, 0);
        assert_eq!(arena.stats().shrinks, 1);
        assert_eq!(arena.capacity(PoolKind::Index), Some(16));
    }

    #[test]
    fn test_shrink_never_goes_below_initial_capacity() {
        let (device, mut ring, mut arena) = setup();
        let a = AssetUUID::from_u128(1);
        let b = AssetUUID::from_u128(2);
        arena.add_mesh(&device, &mut ring, a, &mesh(8, 3, 0)).unwrap();
        arena.add_mesh(&device, &mut ring, b, &mesh(8, 3, 0)).unwrap();
        assert_eq!(arena.capacity(POSITION), Some(16));

        arena.remove_meshes(&device, &mut ring, &[a, b]).unwrap();

        assert_eq!(arena.capacity(POSITION), Some(8));
        assert!(!arena.contains(a));
    }

    #[test]
    fn test_grow_retries_with_minimal_size() {
        let (device, mut ring, mut arena) = setup();
        arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(1), &mesh(8, 3, 0))
            .unwrap();
        arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(2), &mesh(8, 3, 0))
            .unwrap();
        assert_eq!(arena.capacity(POSITION), Some(16));
        device.set_max_buffer_size(Some(24 * 12));

        arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(3), &mesh(1, 3, 0))
            .unwrap();

        assert_eq!(arena.capacity(POSITION), Some(24));
        assert_eq!(arena.stats().grows, 2);
    }

    #[test]
    fn test_grow_failure_after_retry_is_reported() {
        let (device, mut ring, mut arena) = setup();
        let a = AssetUUID::from_u128(1);
        arena.add_mesh(&device, &mut ring, a, &mesh(8, 3, 0)).unwrap();
        device.fail_next_buffer_allocations(2);

        let err = arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(2), &mesh(4, 3, 0))
            .unwrap_err();

        assert!(matches!(err, ResourceError::AllocationFailed { .. }));
        assert_eq!(arena.capacity(POSITION), Some(8));
        assert!(arena.contains(a));
        assert!(!arena.contains(AssetUUID::from_u128(2)));
    }

    #[test]
    fn test_regions_never_overlap() {
        let (device, mut ring, mut arena) = setup();
        let mut state: u64 = 0x2545_f491;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u32
        };
        for _ in 0..300 {
            let id = AssetUUID::from_u128(u128::from(next() % 40));
            if next() % 3 == 0 {
                arena.remove_meshes(&device, &mut ring, &[id]).unwrap();
            } else {
                let vertices = 1 + next() % 20;
                let indices = 3 * (1 + next() % 10);
                arena
                    .add_mesh(&device, &mut ring, id, &mesh(vertices, indices, 0))
                    .unwrap();
            }
            assert_no_overlap(&arena);
        }
    }

    #[test]
    fn test_mesh_overflowing_both_pools_counts_one_grow() {
        let (device, mut ring, mut arena) = setup();
        arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(1), &mesh(6, 14, 0))
            .unwrap();

        arena
            .add_mesh(&device, &mut ring, AssetUUID::from_u128(2), &mesh(4, 4, 0))
            .unwrap();

        assert_eq!(arena.capacity(POSITION), Some(16));
        assert_eq!(arena.capacity(PoolKind::Index), Some(32));
        assert_eq!(arena.stats().grows, 1);
    }

    #[test]
    fn test_failed_compaction_keeps_offsets_and_buffer() {
        let (device, mut ring, mut arena) = setup();
        let a = AssetUUID::from_u128(1);
        let b = AssetUUID::from_u128(2);
        let b_data = mesh(4, 3, 100);
        arena.add_mesh(&device, &mut ring, a, &mesh(6, 6, 0)).unwrap();
        arena.add_mesh(&device, &mut ring, b, &b_data).unwrap();
        assert_eq!(arena.capacity(POSITION), Some(16));
        let buffer = arena.vertex_buffer(VertexFormat::Position).unwrap();
        let before = arena.region(b, 0).unwrap();
        assert_eq!(before.vertex_offset, 6);
        device.lose_device();

        let err = arena.remove_meshes(&device, &mut ring, &[a]).unwrap_err();

        assert!(matches!(err, ResourceError::BackendError(_)));
        assert_eq!(arena.region(b, 0).unwrap(), before);
        assert_eq!(arena.vertex_buffer(VertexFormat::Position), Some(buffer));
        assert_eq!(arena.capacity(POSITION), Some(16));
        assert_eq!(arena.stats().shrinks, 0);
        let bytes = device.buffer_data(buffer).unwrap();
        assert_eq!(&bytes[6 * 12..10 * 12], b_data.vertex_bytes.as_slice());
        assert_no_overlap(&arena);
    }

    #[test]
    fn test_compaction_with_gaps_preserves_bytes() {
        let (device, mut ring, mut arena) = setup();
        let ids: Vec<_> = (1..=5).map(AssetUUID::from_u128).collect();
        let data: Vec<MeshData> = (0..5u32)
            .map(|i| {
                let mut data = mesh(4, 6, (i * 40) as u8);
                let indices: Vec<u32> = (0..6).map(|k| (k + i) % 4).collect();
                data.index_bytes = bytemuck::cast_slice(&indices).to_vec();
                data
            })
            .collect();
        for (id, data) in ids.iter().zip(&data) {
            arena.add_mesh(&device, &mut ring, *id, data).unwrap();
        }
        assert_eq!(arena.capacity(POSITION), Some(32));
        assert_eq!(arena.capacity(PoolKind::Index), Some(32));
        assert_eq!(arena.stats().grows, 2);

        arena
            .remove_meshes(&device, &mut ring, &[ids[0], ids[2], ids[3]])
            .unwrap();

        assert_eq!(arena.stats().shrinks, 2);
        assert_eq!(arena.capacity(POSITION), Some(16));
        assert_eq!(arena.capacity(PoolKind::Index), Some(16));
        let vertices = device
            .buffer_data(arena.vertex_buffer(VertexFormat::Position).unwrap())
            .unwrap();
        let indices = device.buffer_data(arena.index_buffer().unwrap()).unwrap();
        for (survivor, expected_vertex, expected_index) in [(1, 0, 0), (4, 4, 6)] {
            let id = ids[survivor];
            let region = arena.region(id, 0).unwrap();
            assert_eq!(region.vertex_offset, expected_vertex);
            assert_eq!(region.index_offset, expected_index);
            let v = region.vertex_offset as usize * 12;
            let i = region.index_offset as usize * 4;
            assert_eq!(&vertices[v..v + 4 * 12], data[survivor].vertex_bytes.as_slice());
            assert_eq!(&indices[i..i + 6 * 4], data[survivor].index_bytes.as_slice());
        }
        assert_no_overlap(&arena);
    }
}
