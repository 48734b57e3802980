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

//! Defines the RenderAgent, the central orchestrator for the rendering subsystem.

use super::mesh_residency::MeshResidencySystem;
use super::stats::{RenderMetrics, RenderStats};
use crossbeam_channel::Receiver;
use lumen_core::asset::{AssetSource, AssetUUID};
use lumen_core::config::RendererConfig;
use lumen_core::math::SurfaceSize;
use lumen_core::renderer::{
    BindGroupDescriptor, BindGroupEntry, BindingResource, CommandBufferId, FrameDirty, FrameRing,
    FrameSlot, GpuCameraData, GpuLightData, GpuObjectData, GraphicsDevice, IndexFormat,
    IndexedIndirectCommand, LoadOp, OffscreenTargets, PresentOutcome, PresentationSurface,
    RenderError, RenderPassColorAttachment, RenderPassDepthAttachment, RenderPassDescriptor,
    RenderTargets, SurfaceAcquire, SurfaceImage, TextureFormat,
};
use lumen_core::scene::{EntityId, SceneEvent, SceneSource};
use lumen_core::tasks::WorkerPool;
use lumen_data::geometry::GeometryArena;
use lumen_data::materials::MaterialRegistry;
use lumen_lanes::render_lane::{
    BatchLimits, DrawBatch, DrawBatchLane, DrawList, ExtractRenderablesLane, Interpolation,
    ObjectRefreshLane, RenderWorld,
};
use lumen_telemetry::MetricsRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

pub use lumen_core::renderer::bindings;

const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];

/// What happened to a call of [`RenderAgent::render_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Presented,
    /// The swapchain was out of date and has been reconfigured. The frame, if it
    /// was submitted, may not have been displayed.
    SwapchainRebuilt,
    /// Nothing was rendered because the surface has no area.
    Skipped,
}

/// The generations a draw list was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DrawListKey {
    geometry: u64,
    materials: u64,
    renderables: u64,
}

/// The agent responsible for rendering the scene.
///
/// It owns the frame ring, the geometry arena and the material registry, and
/// runs the lanes over them in a fixed order every frame. Residency problems are
/// absorbed (the affected renderables are simply not drawn); fence timeouts and
/// device loss are returned as fatal [`RenderError`]s.
pub struct RenderAgent {
    // The device every resource is created on.
    device: Arc<dyn GraphicsDevice>,
    // Validated configuration.
    config: RendererConfig,
    // Per-frame GPU state and deferred destruction.
    ring: FrameRing,
    // Shared vertex and index pools.
    geometry: GeometryArena,
    // Material instances, base pipelines and bindless textures.
    materials: MaterialRegistry,
    // Window-sized color and depth targets.
    targets: OffscreenTargets,
    extract_lane: ExtractRenderablesLane,
    batch_lane: DrawBatchLane,
    object_lane: ObjectRefreshLane,
    mesh_residency: MeshResidencySystem,
    // Flat snapshot of the scene.
    render_world: RenderWorld,
    // The current batches, commands and instances.
    draw_list: DrawList,
    draw_list_key: Option<DrawListKey>,
    // CPU copy of the object array, indexed like `draw_list.instances`.
    objects: Vec<GpuObjectData>,
    // CPU copy of the light array.
    lights: Vec<GpuLightData>,
    // Optional scene event feed.
    events: Option<Receiver<SceneEvent>>,
    renderables_dirty: bool,
    renderables_generation: u64,
    // Entities whose transform changed since the last refresh.
    objects_to_refresh: HashSet<EntityId>,
    // Instance positions refreshed every frame because their entity moves.
    moving: Vec<u32>,
    pending_resize: Option<SurfaceSize>,
    stats: RenderStats,
    metrics: Option<RenderMetrics>,
    shut_down: bool,
}

impl RenderAgent {
    /// Creates a new `RenderAgent` and allocates the frame ring.
    ///
    /// # Arguments
    ///
    /// * `device`: The graphics device shared with the rest of the engine.
    /// * `config`: Renderer configuration. It is validated first.
    /// * `color_format`: Format of the presentation surface. Pipelines and the
    ///   offscreen color target use it.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InitializationFailed`] for an invalid configuration,
    /// or the resource error that prevented the per-frame buffers from being
    /// allocated.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        config: RendererConfig,
        color_format: TextureFormat,
    ) -> Result<Self, RenderError> {
        config
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let limits = BatchLimits::from_config(&config.batching, config.frames.max_objects)
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let mut ring = FrameRing::new(device.as_ref(), &config.frames)?;
        let materials = match MaterialRegistry::new(device.as_ref(), &config.frames, color_format) {
            Ok(materials) => materials,
            Err(e) => {
                ring.shutdown(device.as_ref());
                return Err(e.into());
            }
        };

        log::info!(
            "Render agent ready: {} frames in flight, {} objects max, color format {:?}",
            config.frames.frames_in_flight,
            config.frames.max_objects,
            color_format
        );

        Ok(Self {
            geometry: GeometryArena::new(config.geometry.clone()),
            materials,
            targets: OffscreenTargets::new(color_format),
            extract_lane: ExtractRenderablesLane::new(),
            batch_lane: DrawBatchLane::new(limits),
            object_lane: ObjectRefreshLane::new(WorkerPool::from_config(&config.workers)),
            mesh_residency: MeshResidencySystem::new(),
            render_world: RenderWorld::new(),
            draw_list: DrawList::new(),
            draw_list_key: None,
            objects: Vec::new(),
            lights: Vec::new(),
            events: None,
            renderables_dirty: true,
            renderables_generation: 0,
            objects_to_refresh: HashSet::new(),
            moving: Vec::new(),
            pending_resize: None,
            stats: RenderStats::default(),
            metrics: None,
            shut_down: false,
            device,
            config,
            ring,
        })
    }

    /// Attaches a metrics registry to the agent for observability.
    ///
    /// Statistics are published after every presented frame. A registration
    /// failure is logged and leaves the agent without telemetry.
    pub fn with_telemetry(mut self, registry: &MetricsRegistry) -> Self {
        match RenderMetrics::register(registry) {
            Ok(metrics) => self.metrics = Some(metrics),
            Err(e) => log::warn!("Render metrics unavailable: {e}"),
        }
        self
    }

    /// Subscribes to a scene event channel. Pending events are drained at the
    /// start of every frame.
    pub fn attach_events(&mut self, events: Receiver<SceneEvent>) {
        self.events = Some(events);
    }

    /// Applies a scene change notification.
    ///
    /// Any change of the drawable set rebuilds the renderables on the next frame;
    /// a transform change only refreshes the objects of that entity.
    pub fn handle_event(&mut self, event: SceneEvent) {
        match event {
            SceneEvent::RenderableAdded(_)
            | SceneEvent::RenderableUpdated(_)
            | SceneEvent::RenderableRemoved(_) => self.renderables_dirty = true,
            SceneEvent::TransformChanged(entity) => {
                self.objects_to_refresh.insert(entity);
            }
        }
    }

    /// Requests a new surface size. The surface is reconfigured at the start of
    /// the next frame.
    pub fn resize(&mut self, size: SurfaceSize) {
        self.pending_resize = Some(size);
    }

    /// Renders one frame.
    ///
    /// The steps are, in order: acquire a frame slot (waiting on its fence), acquire
    /// a swapchain image, make the offscreen targets match its size, extract the
    /// scene, make meshes and materials resident, rebuild the draw list if anything
    /// it depends on changed, refresh object records on the worker pool, upload
    /// dirty arrays (materials, objects, lights, then indirect commands), encode the
    /// pass, submit and present.
    ///
    /// # Arguments
    ///
    /// * `scene`: The read-only scene view.
    /// * `assets`: The asset loader.
    /// * `surface`: The presentation surface.
    /// * `interpolation`: Render-time extrapolation for moving objects.
    ///
    /// # Errors
    ///
    /// Fatal errors ([`RenderError::is_fatal`]) mean the frame loop must stop.
    /// A recorded frame that fails before submission is abandoned so its slot stays
    /// usable.
    pub fn render_frame(
        &mut self,
        scene: &dyn SceneSource,
        assets: &dyn AssetSource,
        surface: &mut dyn PresentationSurface,
        interpolation: Interpolation,
    ) -> Result<FrameOutcome, RenderError> {
        if self.shut_down {
            return Err(RenderError::Internal("render agent was shut down".to_string()));
        }
        let start = Instant::now();
        self.drain_events();

        if let Some(size) = self.pending_resize.take() {
            log::debug!("Reconfiguring surface to {}x{}", size.width, size.height);
            surface.reconfigure(size)?;
        }
        if surface.size().is_empty() {
            log::trace!("Surface has no area, skipping frame");
            return Ok(FrameOutcome::Skipped);
        }

        let device = Arc::clone(&self.device);
        let device = device.as_ref();
        self.ring.acquire_frame(device)?;

        let image = match surface.acquire_image() {
            Ok(SurfaceAcquire::Ready(image)) => image,
            Ok(SurfaceAcquire::Outdated) => {
                log::debug!("Swapchain out of date on acquire, reconfiguring");
                self.ring.abandon_frame(device)?;
                self.ring.mark_all(FrameDirty::SWAPCHAIN);
                let size = surface.size();
                surface.reconfigure(size)?;
                return Ok(FrameOutcome::SwapchainRebuilt);
            }
            Err(e) => {
                self.abandon(device);
                return Err(e);
            }
        };

        let command_buffer = match self.record_frame(device, scene, assets, image, interpolation) {
            Ok(command_buffer) => command_buffer,
            Err(e) => {
                if e.is_fatal() {
                    log::error!("Frame recording failed: {e}");
                }
                self.abandon(device);
                return Err(e);
            }
        };
        self.ring.submit(device, command_buffer)?;

        let outcome = match self.ring.present(surface, image)? {
            PresentOutcome::Presented => FrameOutcome::Presented,
            PresentOutcome::RebuildSwapchain => {
                let size = surface.size();
                surface.reconfigure(size)?;
                FrameOutcome::SwapchainRebuilt
            }
        };

        self.record_stats(start);
        Ok(outcome)
    }

    fn record_frame(
        &mut self,
        device: &dyn GraphicsDevice,
        scene: &dyn SceneSource,
        assets: &dyn AssetSource,
        image: SurfaceImage,
        interpolation: Interpolation,
    ) -> Result<CommandBufferId, RenderError> {
        let targets = *self.targets.ensure(device, &mut self.ring, image.size)?;

        self.sync_scene(scene);

        // Residency: meshes first, so material updates see the same arena state.
        let meshes = self
            .mesh_residency
            .run(device, &mut self.ring, &mut self.geometry, assets)?;
        let update = self.materials.update(device, &mut self.ring, assets);
        if meshes.loaded > 0 || update.changed() {
            log::trace!("Residency changed: {meshes:?}, {update:?}");
        }

        self.prepare_draws(scene, interpolation);
        self.upload(device)?;
        self.prepare_bind_groups(device)?;
        self.encode(device, &targets, image)
    }

    /// Rebuilds the renderables if the drawable set changed and refreshes the
    /// camera and lights.
    fn sync_scene(&mut self, scene: &dyn SceneSource) {
        if self.renderables_dirty {
            let count = self
                .extract_lane
                .extract_renderables(scene, &mut self.render_world);
            self.renderables_dirty = false;
            self.renderables_generation += 1;
            self.mesh_residency.track(&self.render_world.renderables);
            for renderable in &self.render_world.renderables {
                self.materials.request_material_instance(renderable.material);
            }
            log::debug!("Renderable set rebuilt with {count} entries");
        }

        let previous_lights = std::mem::take(&mut self.render_world.lights);
        self.extract_lane.extract_view(scene, &mut self.render_world);
        if self.render_world.lights != previous_lights {
            self.lights = self.render_world.lights.iter().map(GpuLightData::from).collect();
            self.ring.mark_all(FrameDirty::LIGHTS);
        }
    }

    /// Rebuilds the draw list when the arena, the registry or the renderable set
    /// changed, and refreshes object records otherwise.
    fn prepare_draws(&mut self, scene: &dyn SceneSource, interpolation: Interpolation) {
        let key = DrawListKey {
            geometry: self.geometry.generation(),
            materials: self.materials.generation(),
            renderables: self.renderables_generation,
        };
        let material_indices = self.materials.index_snapshot();

        if self.draw_list_key != Some(key) {
            self.batch_lane.run(
                &self.render_world.renderables,
                &self.geometry,
                &self.materials,
                &mut self.draw_list,
            );
            self.draw_list_key = Some(key);
            let output = self.object_lane.run_all(
                scene,
                &self.draw_list.instances,
                &material_indices,
                interpolation,
                &mut self.objects,
            );
            self.moving = output.moving;
            self.objects_to_refresh.clear();
            self.ring.mark_all(FrameDirty::OBJECTS | FrameDirty::INDIRECT);
            log::debug!(
                "Draw list rebuilt: {} batches, {} commands, {} instances, {} excluded",
                self.draw_list.batches.len(),
                self.draw_list.commands.len(),
                self.draw_list.instances.len(),
                self.draw_list.excluded.total()
            );
            return;
        }

        if self.objects_to_refresh.is_empty() && self.moving.is_empty() {
            return;
        }
        let mut dirty: Vec<u32> = self
            .draw_list
            .instances
            .iter()
            .enumerate()
            .filter(|(_, instance)| self.objects_to_refresh.contains(&instance.entity))
            .map(|(position, _)| position as u32)
            .collect();
        dirty.extend_from_slice(&self.moving);
        dirty.sort_unstable();
        dirty.dedup();
        self.objects_to_refresh.clear();
        if dirty.is_empty() {
            return;
        }

        let output = self.object_lane.run(
            scene,
            &self.draw_list.instances,
            &dirty,
            &material_indices,
            interpolation,
            &mut self.objects,
        );
        self.moving = output.moving;
        if output.refreshed > 0 {
            self.ring.mark_all(FrameDirty::OBJECTS);
        }
    }

    /// Uploads every array the current slot holds a stale copy of.
    ///
    /// The order is fixed: materials, objects, lights, then indirect commands.
    fn upload(&mut self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        let slot = self
            .ring
            .current_slot_mut()
            .ok_or(RenderError::FrameNotAcquired)?;
        slot.clear(FrameDirty::SWAPCHAIN);

        if slot.needs(FrameDirty::MATERIALS) {
            slot.write_materials(device, &self.materials.gpu_material_data())?;
            slot.clear(FrameDirty::MATERIALS);
        }
        if slot.needs(FrameDirty::OBJECTS) {
            slot.write_objects(device, &self.objects)?;
            slot.clear(FrameDirty::OBJECTS);
        }
        if slot.needs(FrameDirty::LIGHTS) {
            slot.write_lights(device, &self.lights)?;
            slot.clear(FrameDirty::LIGHTS);
        }
        if slot.needs(FrameDirty::INDIRECT) {
            slot.write_indirect(device, &self.draw_list.commands)?;
            slot.clear(FrameDirty::INDIRECT);
        }

        let camera = self
            .render_world
            .camera
            .as_ref()
            .map(GpuCameraData::from)
            .unwrap_or_default();
        slot.write_camera(device, &camera)?;
        Ok(())
    }

    /// Makes sure the current slot has a bind group for every pipeline drawn.
    ///
    /// A stale bindless table drops all of the slot's bind groups first. The slot's
    /// fence has been waited on, so the GPU no longer uses them.
    fn prepare_bind_groups(&mut self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        let slot = self
            .ring
            .current_slot_mut()
            .ok_or(RenderError::FrameNotAcquired)?;

        if slot.needs(FrameDirty::TEXTURE_DESCRIPTORS) {
            for group in slot.take_bind_groups() {
                if let Err(e) = device.destroy_bind_group(group) {
                    log::warn!("Failed to destroy bind group {group:?}: {e}");
                }
            }
            slot.clear(FrameDirty::TEXTURE_DESCRIPTORS);
        }

        let buffers = *slot.buffers();
        let mut views = None;
        for batch in &self.draw_list.batches {
            if slot.bind_group(batch.pipeline).is_some() {
                continue;
            }
            let table = views.get_or_insert_with(|| self.materials.textures().views());
            let group = device.create_bind_group(&BindGroupDescriptor {
                label: Some(format!("frame slot {} bindings", slot.index()).into()),
                pipeline: batch.pipeline,
                group: 0,
                entries: vec![
                    BindGroupEntry {
                        binding: bindings::CAMERA,
                        resource: BindingResource::Buffer(buffers.camera),
                    },
                    BindGroupEntry {
                        binding: bindings::OBJECTS,
                        resource: BindingResource::Buffer(buffers.objects),
                    },
                    BindGroupEntry {
                        binding: bindings::MATERIALS,
                        resource: BindingResource::Buffer(buffers.materials),
                    },
                    BindGroupEntry {
                        binding: bindings::LIGHTS,
                        resource: BindingResource::Buffer(buffers.lights),
                    },
                    BindGroupEntry {
                        binding: bindings::TEXTURES,
                        resource: BindingResource::TextureViewArray(table.clone()),
                    },
                ],
            })?;
            slot.set_bind_group(batch.pipeline, group);
        }
        Ok(())
    }

    /// Records the main pass and the copy into the swapchain image.
    fn encode(
        &self,
        device: &dyn GraphicsDevice,
        targets: &RenderTargets,
        image: SurfaceImage,
    ) -> Result<CommandBufferId, RenderError> {
        let slot = self.ring.current_slot().ok_or(RenderError::FrameNotAcquired)?;
        let indirect = slot.buffers().indirect;
        let index_buffer = self.geometry.index_buffer();

        let mut encoder = slot.begin_commands(device);
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("main pass"),
                color_attachment: RenderPassColorAttachment {
                    view: targets.color_view,
                    load: LoadOp::Clear(CLEAR_COLOR),
                },
                depth_attachment: Some(RenderPassDepthAttachment {
                    view: targets.depth_view,
                    load: LoadOp::Clear(1.0),
                }),
            });

            for batch in &self.draw_list.batches {
                let vertex_buffer = self.geometry.vertex_buffer(batch.vertex_format);
                let bind_group = slot.bind_group(batch.pipeline);
                let (Some(vertex_buffer), Some(index_buffer), Some(bind_group)) =
                    (vertex_buffer, index_buffer, bind_group)
                else {
                    log::warn!("Batch of material {} has no bound resources", batch.material);
                    continue;
                };
                pass.set_pipeline(batch.pipeline);
                pass.set_bind_group(0, bind_group);
                pass.set_vertex_buffer(0, vertex_buffer, 0);
                pass.set_index_buffer(index_buffer, 0, IndexFormat::Uint32);
                let commands = batch.first_command..batch.first_command + batch.command_count;
                for command in commands {
                    pass.draw_indexed_indirect(
                        indirect,
                        u64::from(command) * IndexedIndirectCommand::SIZE,
                    );
                }
            }
        }
        encoder.copy_texture_to_texture(targets.color, image.texture, image.size.extent());
        Ok(encoder.finish())
    }

    fn abandon(&mut self, device: &dyn GraphicsDevice) {
        if let Err(e) = self.ring.abandon_frame(device) {
            log::error!("Could not abandon the current frame: {e}");
        }
    }

    fn drain_events(&mut self) {
        if let Some(events) = self.events.take() {
            for event in events.try_iter() {
                self.handle_event(event);
            }
            self.events = Some(events);
        }
    }

    fn record_stats(&mut self, start: Instant) {
        self.stats = RenderStats {
            frame_index: self.ring.frame_number().saturating_sub(1),
            batches: self.draw_list.batches.len() as u32,
            commands: self.draw_list.commands.len() as u32,
            drawn_instances: self.draw_list.instances.len() as u32,
            excluded_instances: self.draw_list.excluded.total(),
            geometry: self.geometry.stats(),
            resident_materials: self.materials.resident_materials().len(),
            resident_textures: self.materials.textures().resident_count(),
            cpu_frame_time: start.elapsed(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.publish(&self.stats);
        }
    }

    /// Evicts meshes from the geometry arena.
    ///
    /// Renderables still referencing them are excluded from the next draw list and
    /// the meshes are loaded again on the following frame. Returns how many meshes
    /// were resident.
    pub fn evict_meshes(&mut self, ids: &[AssetUUID]) -> Result<usize, RenderError> {
        let removed = self
            .geometry
            .remove_meshes(self.device.as_ref(), &mut self.ring, ids)?;
        Ok(removed)
    }

    /// Releases a material instance. Its textures and base pipeline are retired
    /// once nothing else uses them. Returns `false` if it was not loaded.
    pub fn release_material(&mut self, id: AssetUUID) -> bool {
        self.materials.release_material_instance(&mut self.ring, id)
    }

    /// Requests every mesh, material, base material and texture that failed to
    /// load again. Returns how many assets are retried.
    pub fn retry_failed_assets(&mut self) -> usize {
        let retried = self.mesh_residency.retry_failed() + self.materials.retry_failed();
        if retried > 0 {
            log::info!("Retrying {retried} failed assets");
        }
        retried
    }

    /// The slot being recorded, if a frame is in progress.
    pub fn current_frame_slot(&self) -> Option<&FrameSlot> {
        self.ring.current_slot()
    }

    /// The frame ring.
    pub fn frame_ring(&self) -> &FrameRing {
        &self.ring
    }

    /// The geometry arena, for binding the shared vertex and index buffers.
    pub fn geometry_arena(&self) -> &GeometryArena {
        &self.geometry
    }

    /// The material registry.
    pub fn material_registry(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// The mesh residency tracker.
    pub fn mesh_residency(&self) -> &MeshResidencySystem {
        &self.mesh_residency
    }

    /// The ordered batches of the current draw list.
    pub fn draw_batches(&self) -> &[DrawBatch] {
        &self.draw_list.batches
    }

    /// The current draw list.
    pub fn draw_list(&self) -> &DrawList {
        &self.draw_list
    }

    /// The CPU copy of the object array.
    pub fn objects(&self) -> &[GpuObjectData] {
        &self.objects
    }

    /// The offscreen render targets.
    pub fn render_targets(&self) -> Option<&RenderTargets> {
        self.targets.current()
    }

    /// Statistics of the last presented frame.
    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// The configuration in use.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Waits for the GPU to retire every frame, then destroys every GPU resource
    /// the agent owns. Further calls to [`Self::render_frame`] fail.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        let device = Arc::clone(&self.device);
        let device = device.as_ref();
        if self.ring.current_slot().is_some() {
            self.abandon(device);
        }
        self.ring.shutdown(device);
        self.targets.destroy(device);
        self.materials.destroy(device);
        self.geometry.destroy(device);
        self.shut_down = true;
        log::info!("Render agent shut down after {} frames", self.ring.frame_number());
    }
}

impl Drop for RenderAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RenderAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderAgent")
            .field("frame_number", &self.ring.frame_number())
            .field("renderables", &self.render_world.renderables.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
