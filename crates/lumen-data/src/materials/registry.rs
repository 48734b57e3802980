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

use super::textures::TextureSlotTable;
use lumen_core::asset::{AssetSource, AssetUUID, MaterialInstanceData};
use lumen_core::config::FrameConfig;
use lumen_core::renderer::{
    FrameDirty, FrameRing, GpuMaterialInstanceData, GraphicsDevice, RenderPipelineDescriptor,
    RenderPipelineId, ResourceError, RetiredResource, ShaderModuleDescriptor, ShaderModuleId,
    TextureFormat, VertexFormat, DEPTH_FORMAT, MAX_MATERIAL_SCALARS, MAX_MATERIAL_TEXTURES,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Entry point of the vertex stage in every base material shader.
pub const VERTEX_ENTRY: &str = "vs_main";
/// Entry point of the fragment stage in every base material shader.
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Load state of a material instance or base material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialState {
    /// Queued for the next [`MaterialRegistry::update`].
    Pending,
    /// The last load failed. Stays failed until requested again.
    Failed(String),
    /// Loaded.
    Loaded,
}

/// The cached record of a loaded material instance.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialInstanceRecord {
    /// The instance asset.
    pub id: AssetUUID,
    /// The base material it specialises.
    pub base_material: AssetUUID,
    /// Referenced textures, in parameter order.
    pub textures: Vec<AssetUUID>,
    /// The shader-visible parameter block (bindless texture slots and scalars).
    pub params: GpuMaterialInstanceData,
}

/// What the draw phase needs to draw with a ready material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialBinding {
    /// Index of the material in the per-frame material array.
    pub index: u32,
    /// Pipeline of the base material.
    pub pipeline: RenderPipelineId,
    /// Vertex format the pipeline consumes.
    pub vertex_format: VertexFormat,
}

/// Outcome of one [`MaterialRegistry::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialUpdate {
    /// Material instances that finished loading.
    pub materials_loaded: usize,
    /// Base material pipelines built.
    pub pipelines_built: usize,
    /// Textures uploaded.
    pub textures_uploaded: usize,
    /// Loads that failed this update.
    pub failures: usize,
}

impl MaterialUpdate {
    /// Returns `true` if the set of ready materials may have changed.
    pub fn changed(&self) -> bool {
        self.materials_loaded + self.pipelines_built + self.textures_uploaded + self.failures > 0
    }
}

#[derive(Debug)]
struct InstanceEntry {
    state: MaterialState,
    record: Option<MaterialInstanceRecord>,
}

#[derive(Debug, Clone, Copy)]
struct BasePipeline {
    pipeline: RenderPipelineId,
    vertex_format: VertexFormat,
    vertex_module: ShaderModuleId,
    fragment_module: ShaderModuleId,
}

#[derive(Debug)]
struct BaseEntry {
    state: MaterialState,
    refs: u32,
    gpu: Option<BasePipeline>,
}

/// Deduplicates material instance loads, builds base material pipelines and owns
/// the bindless texture table.
///
/// Resident instances are kept sorted by id; an instance's position in that order
/// is its index in the per-frame material array. Any change to the order marks
/// every frame slot's material upload flag.
#[derive(Debug)]
pub struct MaterialRegistry {
    color_format: TextureFormat,
    max_materials: u32,
    instances: HashMap<AssetUUID, InstanceEntry>,
    instance_queue: Vec<AssetUUID>,
    bases: HashMap<AssetUUID, BaseEntry>,
    base_queue: Vec<AssetUUID>,
    textures: TextureSlotTable,
    order: Vec<AssetUUID>,
    snapshot: Arc<HashMap<AssetUUID, u32>>,
    generation: u64,
    order_generation: u64,
    seen_texture_generation: u64,
}

impl MaterialRegistry {
    /// Creates an empty registry whose pipelines render into `color_format`.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &FrameConfig,
        color_format: TextureFormat,
    ) -> Result<Self, ResourceError> {
        let textures =
            TextureSlotTable::new(device, config.max_textures, config.frames_in_flight)?;
        Ok(Self {
            color_format,
            max_materials: config.max_materials,
            instances: HashMap::new(),
            instance_queue: Vec::new(),
            bases: HashMap::new(),
            base_queue: Vec::new(),
            seen_texture_generation: textures.generation(),
            textures,
            order: Vec::new(),
            snapshot: Arc::new(HashMap::new()),
            generation: 0,
            order_generation: 0,
        })
    }

    /// Queues a material instance for loading.
    ///
    /// Repeated requests before the load resolves are no-ops. Requesting a failed
    /// instance, or a loaded one whose base material or textures failed, queues the
    /// failed part again.
    pub fn request_material_instance(&mut self, id: AssetUUID) {
        match self.instances.get_mut(&id) {
            None => {
                self.instances.insert(
                    id,
                    InstanceEntry {
                        state: MaterialState::Pending,
                        record: None,
                    },
                );
                self.instance_queue.push(id);
                log::trace!("Material instance {id} requested");
            }
            Some(entry) => match &entry.state {
                MaterialState::Pending => {}
                MaterialState::Failed(_) => {
                    entry.state = MaterialState::Pending;
                    self.instance_queue.push(id);
                    log::debug!("Retrying material instance {id}");
                }
                MaterialState::Loaded => {
                    let Some(record) = &entry.record else {
                        return;
                    };
                    let base = record.base_material;
                    for texture in &record.textures {
                        self.textures.retry(*texture);
                    }
                    self.retry_base(base);
                }
            },
        }
    }

    /// Queues every failed instance, base material and texture for another attempt.
    pub fn retry_failed(&mut self) -> usize {
        let mut retried = self.textures.retry_failed();
        for (id, entry) in &mut self.instances {
            if matches!(entry.state, MaterialState::Failed(_)) {
                entry.state = MaterialState::Pending;
                self.instance_queue.push(*id);
                retried += 1;
            }
        }
        for (id, entry) in &mut self.bases {
            if matches!(entry.state, MaterialState::Failed(_)) {
                entry.state = MaterialState::Pending;
                self.base_queue.push(*id);
                retried += 1;
            }
        }
        retried
    }

    fn retry_base(&mut self, id: AssetUUID) {
        if let Some(entry) = self.bases.get_mut(&id) {
            if matches!(entry.state, MaterialState::Failed(_)) {
                entry.state = MaterialState::Pending;
                self.base_queue.push(id);
                log::debug!("Retrying base material {id}");
            }
        }
    }

    /// Resolves every queued load through the asset source.
    ///
    /// Runs once per frame, before batching. Instances are resolved first so that
    /// the base materials and textures they reference load in the same update.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        source: &dyn AssetSource,
    ) -> MaterialUpdate {
        let current_frame = ring.frame_number().saturating_sub(1);
        self.textures.reclaim(current_frame);

        let mut update = MaterialUpdate::default();
        for id in std::mem::take(&mut self.instance_queue) {
            if !matches!(self.state(id), Some(MaterialState::Pending)) {
                continue;
            }
            let result = source
                .load_material_instance(id)
                .map_err(ResourceError::from)
                .and_then(|data| self.build_record(ring, id, &data));
            let Some(entry) = self.instances.get_mut(&id) else {
                continue;
            };
            match result {
                Ok(record) => {
                    log::debug!(
                        "Material instance {id} loaded (base {}, {} textures)",
                        record.base_material,
                        record.textures.len()
                    );
                    entry.record = Some(record);
                    entry.state = MaterialState::Loaded;
                    update.materials_loaded += 1;
                }
                Err(e) => {
                    log::warn!("Material instance {id} failed to load: {e}");
                    entry.state = MaterialState::Failed(e.to_string());
                    update.failures += 1;
                }
            }
        }

        for id in std::mem::take(&mut self.base_queue) {
            let Some(entry) = self.bases.get(&id) else {
                continue;
            };
            if entry.state != MaterialState::Pending {
                continue;
            }
            let result = self.build_pipeline(device, source, id);
            let Some(entry) = self.bases.get_mut(&id) else {
                continue;
            };
            match result {
                Ok(gpu) => {
                    log::debug!("Base material {id} pipeline built ({:?})", gpu.vertex_format);
                    entry.gpu = Some(gpu);
                    entry.state = MaterialState::Loaded;
                    update.pipelines_built += 1;
                }
                Err(e) => {
                    log::warn!("Base material {id} failed to load: {e}");
                    entry.state = MaterialState::Failed(e.to_string());
                    update.failures += 1;
                }
            }
        }

        update.textures_uploaded = self.textures.upload_pending(device, source);

        if update.materials_loaded > 0 {
            self.rebuild_order(ring);
        }
        self.sync_texture_descriptors(ring);
        if update.changed() {
            self.generation += 1;
        }
        update
    }

    fn build_record(
        &mut self,
        ring: &mut FrameRing,
        id: AssetUUID,
        data: &MaterialInstanceData,
    ) -> Result<MaterialInstanceRecord, ResourceError> {
        if data.textures.len() > MAX_MATERIAL_TEXTURES {
            log::warn!(
                "Material instance {id} references {} textures, only {MAX_MATERIAL_TEXTURES} are bound",
                data.textures.len()
            );
        }
        if data.scalars.len() > MAX_MATERIAL_SCALARS {
            log::warn!(
                "Material instance {id} has {} scalars, only {MAX_MATERIAL_SCALARS} are used",
                data.scalars.len()
            );
        }
        let textures: Vec<AssetUUID> = data
            .textures
            .iter()
            .take(MAX_MATERIAL_TEXTURES)
            .copied()
            .collect();

        let mut params = GpuMaterialInstanceData::default();
        for (i, texture) in textures.iter().enumerate() {
            match self.textures.acquire(*texture) {
                Ok(slot) => params.texture_indices[i] = slot,
                Err(e) => {
                    for acquired in &textures[..i] {
                        self.textures.release(ring, *acquired);
                    }
                    return Err(e);
                }
            }
        }
        for (i, value) in data.scalars.iter().take(MAX_MATERIAL_SCALARS).enumerate() {
            params.scalars[i] = *value;
        }

        let base = self.bases.entry(data.base_material).or_insert_with(|| {
            self.base_queue.push(data.base_material);
            BaseEntry {
                state: MaterialState::Pending,
                refs: 0,
                gpu: None,
            }
        });
        base.refs += 1;

        Ok(MaterialInstanceRecord {
            id,
            base_material: data.base_material,
            textures,
            params,
        })
    }

    fn build_pipeline(
        &self,
        device: &dyn GraphicsDevice,
        source: &dyn AssetSource,
        id: AssetUUID,
    ) -> Result<BasePipeline, ResourceError> {
        let data = source.load_base_material(id)?;
        let vertex_code = source.load_shader_bytecode(data.vertex_shader)?;
        let fragment_code = source.load_shader_bytecode(data.fragment_shader)?;

        let vertex_module = device.create_shader_module(&ShaderModuleDescriptor {
            label: Some(format!("base material {id} vertex").into()),
            bytecode: vertex_code.into(),
        })?;
        let fragment_module = match device.create_shader_module(&ShaderModuleDescriptor {
            label: Some(format!("base material {id} fragment").into()),
            bytecode: fragment_code.into(),
        }) {
            Ok(module) => module,
            Err(e) => {
                RetiredResource::ShaderModule(vertex_module).destroy_logged(device);
                return Err(e);
            }
        };

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(format!("base material {id}").into()),
            vertex_module,
            vertex_entry: VERTEX_ENTRY.into(),
            fragment_module,
            fragment_entry: FRAGMENT_ENTRY.into(),
            vertex_format: data.vertex_format,
            color_format: self.color_format,
            depth_format: Some(DEPTH_FORMAT),
        });
        match pipeline {
            Ok(pipeline) => Ok(BasePipeline {
                pipeline,
                vertex_format: data.vertex_format,
                vertex_module,
                fragment_module,
            }),
            Err(e) => {
                RetiredResource::ShaderModule(vertex_module).destroy_logged(device);
                RetiredResource::ShaderModule(fragment_module).destroy_logged(device);
                Err(e)
            }
        }
    }

    fn rebuild_order(&mut self, ring: &mut FrameRing) {
        let mut order: Vec<AssetUUID> = self
            .instances
            .iter()
            .filter(|(_, entry)| entry.record.is_some())
            .map(|(id, _)| *id)
            .collect();
        order.sort();
        if order.len() > self.max_materials as usize {
            log::warn!(
                "{} resident materials exceed the per-frame capacity of {}",
                order.len(),
                self.max_materials
            );
        }
        let snapshot = order
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index as u32))
            .collect();
        self.order = order;
        self.snapshot = Arc::new(snapshot);
        self.order_generation += 1;
        ring.mark_all(FrameDirty::MATERIALS);
    }

    fn sync_texture_descriptors(&mut self, ring: &mut FrameRing) {
        let generation = self.textures.generation();
        if generation != self.seen_texture_generation {
            self.seen_texture_generation = generation;
            ring.mark_all(FrameDirty::TEXTURE_DESCRIPTORS);
        }
    }

    /// Drops a material instance, releasing its textures and, if it was the last
    /// user, its base material pipeline. GPU resources go through deferred destruction.
    pub fn release_material_instance(&mut self, ring: &mut FrameRing, id: AssetUUID) -> bool {
        let Some(entry) = self.instances.remove(&id) else {
            return false;
        };
        self.instance_queue.retain(|queued| *queued != id);
        if let Some(record) = entry.record {
            for texture in &record.textures {
                self.textures.release(ring, *texture);
            }
            self.release_base(ring, record.base_material);
            self.rebuild_order(ring);
        }
        self.sync_texture_descriptors(ring);
        self.generation += 1;
        log::debug!("Material instance {id} released");
        true
    }

    fn release_base(&mut self, ring: &mut FrameRing, id: AssetUUID) {
        let Some(entry) = self.bases.get_mut(&id) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return;
        }
        if let Some(entry) = self.bases.remove(&id) {
            if let Some(gpu) = entry.gpu {
                ring.retire(RetiredResource::RenderPipeline(gpu.pipeline));
                ring.retire(RetiredResource::ShaderModule(gpu.vertex_module));
                ring.retire(RetiredResource::ShaderModule(gpu.fragment_module));
            }
            self.base_queue.retain(|queued| *queued != id);
            log::debug!("Base material {id} released");
        }
    }

    /// Returns the bindless slot of a texture, reserving one on first reference.
    pub fn texture_slot(&mut self, id: AssetUUID) -> Result<u32, ResourceError> {
        self.textures.slot(id)
    }

    /// The bindless texture table.
    pub fn textures(&self) -> &TextureSlotTable {
        &self.textures
    }

    /// Load state of a material instance.
    pub fn state(&self, id: AssetUUID) -> Option<&MaterialState> {
        self.instances.get(&id).map(|entry| &entry.state)
    }

    /// Load state of a base material.
    pub fn base_state(&self, id: AssetUUID) -> Option<&MaterialState> {
        self.bases.get(&id).map(|entry| &entry.state)
    }

    /// The record of a loaded material instance.
    pub fn record(&self, id: AssetUUID) -> Option<&MaterialInstanceRecord> {
        self.instances.get(&id).and_then(|entry| entry.record.as_ref())
    }

    /// Index of the material in the per-frame material array.
    pub fn material_index(&self, id: AssetUUID) -> Option<u32> {
        self.snapshot.get(&id).copied()
    }

    /// An immutable copy of the material-to-index table, safe to hand to workers.
    pub fn index_snapshot(&self) -> Arc<HashMap<AssetUUID, u32>> {
        Arc::clone(&self.snapshot)
    }

    /// Resident material instances, sorted by id.
    pub fn resident_materials(&self) -> &[AssetUUID] {
        &self.order
    }

    /// Parameter blocks of every resident material, in material-index order.
    pub fn gpu_material_data(&self) -> Vec<GpuMaterialInstanceData> {
        self.order
            .iter()
            .filter_map(|id| self.record(*id))
            .map(|record| record.params)
            .collect()
    }

    /// Returns `true` if the instance, its base pipeline and every texture it
    /// references are resident.
    pub fn is_ready(&self, id: AssetUUID) -> bool {
        self.binding(id).is_ok()
    }

    /// Everything needed to draw with a ready material.
    ///
    /// # Errors
    ///
    /// [`ResourceError::UnknownMaterial`] if anything the material depends on is not
    /// resident yet, or if its index does not fit the per-frame material array.
    pub fn binding(&self, id: AssetUUID) -> Result<MaterialBinding, ResourceError> {
        let unknown = ResourceError::UnknownMaterial(id);
        let record = self.record(id).ok_or_else(|| unknown.clone())?;
        let index = self
            .material_index(id)
            .filter(|index| *index < self.max_materials)
            .ok_or_else(|| unknown.clone())?;
        let base = self
            .bases
            .get(&record.base_material)
            .and_then(|entry| entry.gpu)
            .ok_or_else(|| unknown.clone())?;
        if !record.textures.iter().all(|t| self.textures.is_resident(*t)) {
            return Err(unknown);
        }
        Ok(MaterialBinding {
            index,
            pipeline: base.pipeline,
            vertex_format: base.vertex_format,
        })
    }

    /// Every built base material pipeline, sorted.
    pub fn pipelines(&self) -> Vec<RenderPipelineId> {
        let mut pipelines: Vec<_> = self
            .bases
            .values()
            .filter_map(|entry| entry.gpu.map(|gpu| gpu.pipeline))
            .collect();
        pipelines.sort();
        pipelines
    }

    /// Bumped whenever the set of ready materials may have changed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bumped whenever material indices changed.
    pub fn order_generation(&self) -> u64 {
        self.order_generation
    }

    /// Number of instances waiting to load.
    pub fn pending_count(&self) -> usize {
        self.instances
            .values()
            .filter(|entry| entry.state == MaterialState::Pending)
            .count()
    }

    /// Destroys every pipeline and texture immediately. The GPU must be idle.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for (_, entry) in self.bases.drain() {
            if let Some(gpu) = entry.gpu {
                RetiredResource::RenderPipeline(gpu.pipeline).destroy_logged(device);
                RetiredResource::ShaderModule(gpu.vertex_module).destroy_logged(device);
                RetiredResource::ShaderModule(gpu.fragment_module).destroy_logged(device);
            }
        }
        self.textures.destroy(device);
        self.instances.clear();
        self.instance_queue.clear();
        self.base_queue.clear();
        self.order.clear();
        self.snapshot = Arc::new(HashMap::new());
    }
}
