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


use std::borrow::Cow;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lumen_core::math::Extent3D;
use lumen_core::renderer::traits::CommandEncoder;
use lumen_core::renderer::{
    bindings, BindGroupDescriptor, BindGroupId, BindingResource, BufferDescriptor, BufferId,
    CommandBufferId, FenceId, FenceWait, GraphicsDevice, RenderError, RenderPipelineDescriptor,
    RenderPipelineId, ResourceError, ShaderModuleDescriptor, ShaderModuleId, TextureDescriptor,
    TextureFormat, TextureId, TextureViewId,
};
use wgpu::util::DeviceExt;

use super::command::WgpuCommandEncoder;
use super::context::WgpuGraphicsContext;
use super::conversions::{from_wgpu_texture_format, IntoWgpu};

/// Sleep between two polls of a fence that has not signaled yet.
const FENCE_POLL_INTERVAL: Duration = Duration::from_micros(100);

#[derive(Debug)]
struct WgpuTextureEntry {
    texture: Arc<wgpu::Texture>,
    /// Size accounted in the VRAM counter. Swapchain textures are not ours and count zero.
    size: u64,
}

/// The internal, non-clonable state of the WgpuDevice.
#[derive(Debug)]
struct WgpuDeviceInternal {
    context: WgpuGraphicsContext,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    texture_table_capacity: u32,

    shader_modules: Mutex<HashMap<ShaderModuleId, Arc<wgpu::ShaderModule>>>,
    pipelines: Mutex<HashMap<RenderPipelineId, Arc<wgpu::RenderPipeline>>>,
    bind_groups: Mutex<HashMap<BindGroupId, Arc<wgpu::BindGroup>>>,
    buffers: Mutex<HashMap<BufferId, Arc<wgpu::Buffer>>>,
    textures: Mutex<HashMap<TextureId, WgpuTextureEntry>>,
    texture_views: Mutex<HashMap<TextureViewId, Arc<wgpu::TextureView>>>,
    /// A reset replaces the flag, so a late callback of an older submission
    /// cannot signal the fence again.
    fences: Mutex<HashMap<FenceId, Arc<AtomicBool>>>,
    pending_command_buffers: Mutex<HashMap<CommandBufferId, wgpu::CommandBuffer>>,

    next_shader_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    next_bind_group_id: AtomicUsize,
    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_texture_view_id: AtomicUsize,
    next_fence_id: AtomicUsize,
    next_command_buffer_id: AtomicU64,

    vram_allocated_bytes: AtomicU64,
    vram_peak_bytes: AtomicU64,
}

/// A thread-safe, cloneable handle to the wgpu backend.
///
/// Every resource lives in an id-keyed map behind its own mutex. Ids are never
/// reused, so a stale id fails with [`ResourceError::NotFound`].
#[derive(Debug, Clone)]
pub struct WgpuDevice {
    internal: Arc<WgpuDeviceInternal>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ResourceError> {
    mutex
        .lock()
        .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned ({what}): {e}")))
}

fn lookup<K, V>(mutex: &Mutex<HashMap<K, Arc<V>>>, key: &K) -> Option<Arc<V>>
where
    K: std::hash::Hash + Eq,
{
    mutex.lock().ok()?.get(key).cloned()
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl WgpuDevice {
    /// Wraps an initialized context and builds the bind group layout every
    /// material pipeline shares.
    pub fn new(context: WgpuGraphicsContext, texture_table_capacity: u32) -> Self {
        let bind_group_layout =
            context
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Lumen Frame Bind Group Layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: bindings::CAMERA,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        storage_entry(bindings::OBJECTS),
                        storage_entry(bindings::MATERIALS),
                        storage_entry(bindings::LIGHTS),
                        wgpu::BindGroupLayoutEntry {
                            binding: bindings::TEXTURES,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: NonZeroU32::new(texture_table_capacity),
                        },
                    ],
                });
        let pipeline_layout =
            context
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Lumen Material Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    ..Default::default()
                });

        Self {
            internal: Arc::new(WgpuDeviceInternal {
                context,
                bind_group_layout,
                pipeline_layout,
                texture_table_capacity,
                shader_modules: Mutex::new(HashMap::new()),
                pipelines: Mutex::new(HashMap::new()),
                bind_groups: Mutex::new(HashMap::new()),
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                texture_views: Mutex::new(HashMap::new()),
                fences: Mutex::new(HashMap::new()),
                pending_command_buffers: Mutex::new(HashMap::new()),
                next_shader_id: AtomicUsize::new(0),
                next_pipeline_id: AtomicUsize::new(0),
                next_bind_group_id: AtomicUsize::new(0),
                next_buffer_id: AtomicUsize::new(0),
                next_texture_id: AtomicUsize::new(0),
                next_texture_view_id: AtomicUsize::new(0),
                next_fence_id: AtomicUsize::new(0),
                next_command_buffer_id: AtomicU64::new(0),
                vram_allocated_bytes: AtomicU64::new(0),
                vram_peak_bytes: AtomicU64::new(0),
            }),
        }
    }

    /// Name of the adapter in use.
    pub fn adapter_name(&self) -> &str {
        self.internal.context.adapter_name()
    }

    /// Bytes currently allocated for buffers and textures created through this device.
    pub fn vram_allocated_bytes(&self) -> u64 {
        self.internal.vram_allocated_bytes.load(Ordering::Relaxed)
    }

    /// Highest value [`Self::vram_allocated_bytes`] has reached.
    pub fn vram_peak_bytes(&self) -> u64 {
        self.internal.vram_peak_bytes.load(Ordering::Relaxed)
    }

    fn track_allocation(&self, bytes: u64) {
        let current = self
            .internal
            .vram_allocated_bytes
            .fetch_add(bytes, Ordering::Relaxed)
            + bytes;
        self.internal
            .vram_peak_bytes
            .fetch_max(current, Ordering::Relaxed);
    }

    fn track_release(&self, bytes: u64) {
        self.internal
            .vram_allocated_bytes
            .fetch_sub(bytes, Ordering::Relaxed);
    }

    pub(crate) fn wgpu_device(&self) -> &wgpu::Device {
        &self.internal.context.device
    }

    pub(crate) fn surface_capabilities(
        &self,
        surface: &wgpu::Surface<'_>,
    ) -> wgpu::SurfaceCapabilities {
        surface.get_capabilities(&self.internal.context.adapter)
    }

    /// The format a surface can present that the renderer also understands.
    pub(crate) fn pick_surface_format(
        &self,
        capabilities: &wgpu::SurfaceCapabilities,
    ) -> Option<(wgpu::TextureFormat, TextureFormat)> {
        let supported = capabilities.formats.iter().filter_map(|&format| {
            from_wgpu_texture_format(format).map(|ours| (format, ours))
        });
        let mut fallback = None;
        for (format, ours) in supported {
            if format.is_srgb() {
                return Some((format, ours));
            }
            fallback.get_or_insert((format, ours));
        }
        fallback
    }

    pub(crate) fn get_wgpu_render_pipeline(
        &self,
        id: RenderPipelineId,
    ) -> Option<Arc<wgpu::RenderPipeline>> {
        lookup(&self.internal.pipelines, &id)
    }

    pub(crate) fn get_wgpu_bind_group(&self, id: BindGroupId) -> Option<Arc<wgpu::BindGroup>> {
        lookup(&self.internal.bind_groups, &id)
    }

    pub(crate) fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        lookup(&self.internal.buffers, &id)
    }

    pub(crate) fn get_wgpu_texture(&self, id: TextureId) -> Option<Arc<wgpu::Texture>> {
        let textures = self.internal.textures.lock().ok()?;
        textures.get(&id).map(|entry| Arc::clone(&entry.texture))
    }

    pub(crate) fn get_wgpu_texture_view(
        &self,
        id: TextureViewId,
    ) -> Option<Arc<wgpu::TextureView>> {
        lookup(&self.internal.texture_views, &id)
    }

    /// Registers a texture the device does not own (a swapchain image) so the
    /// renderer can address it by id for the duration of one frame.
    pub(crate) fn register_external_texture(
        &self,
        texture: wgpu::Texture,
    ) -> Result<(TextureId, TextureViewId), ResourceError> {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let texture_id = self.generate_texture_id();
        let view_id = self.generate_texture_view_id();
        lock(&self.internal.textures, "textures")?.insert(
            texture_id,
            WgpuTextureEntry {
                texture: Arc::new(texture),
                size: 0,
            },
        );
        lock(&self.internal.texture_views, "texture_views")?.insert(view_id, Arc::new(view));
        Ok((texture_id, view_id))
    }

    pub(crate) fn unregister_external_texture(&self, texture: TextureId, view: TextureViewId) {
        if let Ok(mut views) = self.internal.texture_views.lock() {
            views.remove(&view);
        }
        if let Ok(mut textures) = self.internal.textures.lock() {
            textures.remove(&texture);
        }
    }

    /// Registers a finished command buffer and returns the id used to submit it.
    pub(crate) fn register_command_buffer(&self, buffer: wgpu::CommandBuffer) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .next_command_buffer_id
                .fetch_add(1, Ordering::SeqCst),
        );
        match self.internal.pending_command_buffers.lock() {
            Ok(mut pending) => {
                pending.insert(id, buffer);
            }
            Err(e) => log::error!("Dropping command buffer {id:?}: {e}"),
        }
        id
    }

    /// Processes completed work without blocking. Submission callbacks run here.
    fn poll(&self) -> Result<(), RenderError> {
        self.internal
            .context
            .device
            .poll(wgpu::PollType::Poll)
            .map(|_| ())
            .map_err(|e| RenderError::DeviceLost(e.to_string()))
    }

    fn fence_flag(&self, id: FenceId) -> Result<Arc<AtomicBool>, ResourceError> {
        lock(&self.internal.fences, "fences")?
            .get(&id)
            .cloned()
            .ok_or(ResourceError::NotFound)
    }

    fn generate_shader_id(&self) -> ShaderModuleId {
        ShaderModuleId(self.internal.next_shader_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_pipeline_id(&self) -> RenderPipelineId {
        RenderPipelineId(
            self.internal
                .next_pipeline_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_bind_group_id(&self) -> BindGroupId {
        BindGroupId(
            self.internal
                .next_bind_group_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_buffer_id(&self) -> BufferId {
        BufferId(self.internal.next_buffer_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_texture_id(&self) -> TextureId {
        TextureId(
            self.internal
                .next_texture_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_texture_view_id(&self) -> TextureViewId {
        TextureViewId(
            self.internal
                .next_texture_view_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }

    fn check_buffer_size(&self, descriptor: &BufferDescriptor) -> Result<(), ResourceError> {
        let max = self.internal.context.device.limits().max_buffer_size;
        if descriptor.size > max {
            return Err(ResourceError::AllocationFailed {
                label: descriptor.label.as_deref().unwrap_or_default().to_string(),
                size: descriptor.size,
            });
        }
        Ok(())
    }

    fn texture_size_in_bytes(descriptor: &TextureDescriptor) -> u64 {
        u64::from(descriptor.size.width)
            * u64::from(descriptor.size.height)
            * u64::from(descriptor.size.depth_or_array_layers)
            * u64::from(descriptor.format.bytes_per_pixel())
    }
}

impl GraphicsDevice for WgpuDevice {
    // --- Shader Module Operations ---

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let source = std::str::from_utf8(&descriptor.bytecode).map_err(|e| {
            ResourceError::BackendError(format!("Shader source is not UTF-8 WGSL: {e}"))
        })?;
        let label = descriptor.label.as_deref();

        let module = self
            .internal
            .context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label,
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_owned())),
            });

        let id = self.generate_shader_id();
        lock(&self.internal.shader_modules, "shader_modules")?.insert(id, Arc::new(module));
        log::info!(
            "WgpuDevice: Created shader module '{}' with ID: {:?}",
            label.unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        if lock(&self.internal.shader_modules, "shader_modules")?
            .remove(&id)
            .is_some()
        {
            log::debug!("WgpuDevice: Destroyed shader module with ID: {id:?}");
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    // --- Render Pipeline Operations ---

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let (vertex_module, fragment_module) = {
            let modules = lock(&self.internal.shader_modules, "shader_modules")?;
            let vertex = modules
                .get(&descriptor.vertex_module)
                .cloned()
                .ok_or(ResourceError::InvalidHandle)?;
            let fragment = modules
                .get(&descriptor.fragment_module)
                .cloned()
                .ok_or(ResourceError::InvalidHandle)?;
            (vertex, fragment)
        };
        let label = descriptor.label.as_deref();

        let attributes: Vec<wgpu::VertexAttribute> = descriptor.vertex_format.into_wgpu();
        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: u64::from(descriptor.vertex_format.stride()),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        };
        let color_targets = [Some(wgpu::ColorTargetState {
            format: descriptor.color_format.into_wgpu(),
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let pipeline =
            self.internal
                .context
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label,
                    layout: Some(&self.internal.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &vertex_module,
                        entry_point: Some(descriptor.vertex_entry.as_ref()),
                        compilation_options: Default::default(),
                        buffers: &[vertex_layout],
                    },
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: Some(wgpu::Face::Back),
                        ..Default::default()
                    },
                    depth_stencil: descriptor.depth_format.map(|format| {
                        wgpu::DepthStencilState {
                            format: format.into_wgpu(),
                            depth_write_enabled: true,
                            depth_compare: wgpu::CompareFunction::Less,
                            stencil: Default::default(),
                            bias: Default::default(),
                        }
                    }),
                    multisample: Default::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &fragment_module,
                        entry_point: Some(descriptor.fragment_entry.as_ref()),
                        compilation_options: Default::default(),
                        targets: &color_targets,
                    }),
                    multiview_mask: None,
                    cache: None,
                });

        let id = self.generate_pipeline_id();
        lock(&self.internal.pipelines, "pipelines")?.insert(id, Arc::new(pipeline));
        log::info!(
            "WgpuDevice: Created render pipeline '{}' with ID: {:?}",
            label.unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        if lock(&self.internal.pipelines, "pipelines")?
            .remove(&id)
            .is_some()
        {
            log::debug!("WgpuDevice: Destroyed render pipeline with ID: {id:?}");
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        if !lock(&self.internal.pipelines, "pipelines")?.contains_key(&descriptor.pipeline) {
            return Err(ResourceError::InvalidHandle);
        }
        if descriptor.group != 0 {
            return Err(ResourceError::BackendError(format!(
                "Only bind group 0 exists, got {}",
                descriptor.group
            )));
        }

        // Resolve every handle first so the wgpu entries can borrow them.
        enum Resolved {
            Buffer(Arc<wgpu::Buffer>),
            Views(Vec<Arc<wgpu::TextureView>>),
        }
        let mut resolved = Vec::with_capacity(descriptor.entries.len());
        for entry in &descriptor.entries {
            let resource = match &entry.resource {
                BindingResource::Buffer(id) => {
                    Resolved::Buffer(self.get_wgpu_buffer(*id).ok_or(ResourceError::NotFound)?)
                }
                BindingResource::TextureViewArray(ids) => {
                    if ids.len() != self.internal.texture_table_capacity as usize {
                        return Err(ResourceError::BackendError(format!(
                            "Texture table has {} views, layout expects {}",
                            ids.len(),
                            self.internal.texture_table_capacity
                        )));
                    }
                    let views = ids
                        .iter()
                        .map(|id| self.get_wgpu_texture_view(*id))
                        .collect::<Option<Vec<_>>>()
                        .ok_or(ResourceError::NotFound)?;
                    Resolved::Views(views)
                }
            };
            resolved.push((entry.binding, resource));
        }

        let view_refs: Vec<Vec<&wgpu::TextureView>> = resolved
            .iter()
            .map(|(_, resource)| match resource {
                Resolved::Views(views) => views.iter().map(Arc::as_ref).collect(),
                Resolved::Buffer(_) => Vec::new(),
            })
            .collect();
        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .zip(&view_refs)
            .map(|((binding, resource), views)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Resolved::Buffer(buffer) => buffer.as_entire_binding(),
                    Resolved::Views(_) => wgpu::BindingResource::TextureViewArray(views),
                },
            })
            .collect();

        let bind_group =
            self.internal
                .context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: descriptor.label.as_deref(),
                    layout: &self.internal.bind_group_layout,
                    entries: &entries,
                });

        let id = self.generate_bind_group_id();
        lock(&self.internal.bind_groups, "bind_groups")?.insert(id, Arc::new(bind_group));
        log::debug!("WgpuDevice: Created bind group with ID: {id:?}");
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        if lock(&self.internal.bind_groups, "bind_groups")?
            .remove(&id)
            .is_some()
        {
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    // --- Buffer Operations ---

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        self.check_buffer_size(descriptor)?;
        let buffer = self
            .internal
            .context
            .device
            .create_buffer(&wgpu::BufferDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size,
                usage: descriptor.usage.into_wgpu(),
                mapped_at_creation: false,
            });

        let id = self.generate_buffer_id();
        self.track_allocation(descriptor.size);
        lock(&self.internal.buffers, "buffers")?.insert(id, Arc::new(buffer));

        log::info!(
            "WgpuDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        self.check_buffer_size(descriptor)?;
        let buffer =
            self.internal
                .context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: descriptor.label.as_deref(),
                    contents: data,
                    usage: descriptor.usage.into_wgpu(),
                });

        let id = self.generate_buffer_id();
        self.track_allocation(buffer.size());
        lock(&self.internal.buffers, "buffers")?.insert(id, Arc::new(buffer));

        log::info!(
            "WgpuDevice: Created buffer '{}' with initial data. ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            data.len()
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        match lock(&self.internal.buffers, "buffers")?.remove(&id) {
            Some(buffer) => {
                self.track_release(buffer.size());
                log::debug!("WgpuDevice: Destroyed buffer with ID: {id:?}");
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        }
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let buffer = self.get_wgpu_buffer(id).ok_or(ResourceError::NotFound)?;

        // Queue writes must cover whole words.
        let padded_len = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || offset + padded_len > buffer.size() {
            return Err(ResourceError::OutOfBounds);
        }

        let queue = &self.internal.context.queue;
        if padded_len == data.len() as u64 {
            queue.write_buffer(&buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len as usize, 0);
            queue.write_buffer(&buffer, offset, &padded);
        }

        log::trace!(
            "WgpuDevice: Wrote {} bytes to buffer ID: {:?} at offset {}",
            data.len(),
            id,
            offset
        );
        Ok(())
    }

    // --- Texture Operations ---

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let texture = self
            .internal
            .context
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size.into_wgpu(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: descriptor.format.into_wgpu(),
                usage: descriptor.usage.into_wgpu(),
                view_formats: &[],
            });

        let id = self.generate_texture_id();
        let size = Self::texture_size_in_bytes(descriptor);
        self.track_allocation(size);
        lock(&self.internal.textures, "textures")?.insert(
            id,
            WgpuTextureEntry {
                texture: Arc::new(texture),
                size,
            },
        );

        log::info!(
            "WgpuDevice: Created texture '{}' with ID: {:?}, size: {} bytes (VRAM)",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            size
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        match lock(&self.internal.textures, "textures")?.remove(&id) {
            Some(entry) => {
                self.track_release(entry.size);
                log::debug!("WgpuDevice: Destroyed texture with ID: {id:?}");
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        }
    }

    fn write_texture(
        &self,
        id: TextureId,
        data: &[u8],
        bytes_per_row: u32,
        size: Extent3D,
    ) -> Result<(), ResourceError> {
        let texture = self.get_wgpu_texture(id).ok_or(ResourceError::NotFound)?;
        let expected = u64::from(bytes_per_row)
            * u64::from(size.height)
            * u64::from(size.depth_or_array_layers);
        if (data.len() as u64) < expected {
            return Err(ResourceError::OutOfBounds);
        }

        self.internal.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(size.height),
            },
            size.into_wgpu(),
        );
        log::debug!(
            "WgpuDevice: Wrote {} bytes to texture ID: {:?}",
            data.len(),
            id
        );
        Ok(())
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError> {
        let wgpu_texture = self.get_wgpu_texture(texture).ok_or(ResourceError::NotFound)?;
        let view = wgpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.generate_texture_view_id();
        lock(&self.internal.texture_views, "texture_views")?.insert(id, Arc::new(view));
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        if lock(&self.internal.texture_views, "texture_views")?
            .remove(&id)
            .is_some()
        {
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    // --- Synchronization ---

    fn create_fence(&self, signaled: bool) -> Result<FenceId, ResourceError> {
        let id = FenceId(self.internal.next_fence_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.internal.fences, "fences")?.insert(id, Arc::new(AtomicBool::new(signaled)));
        Ok(id)
    }

    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        lock(&self.internal.fences, "fences")?
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn wait_for_fence(&self, id: FenceId, timeout: Duration) -> Result<FenceWait, RenderError> {
        let flag = self.fence_flag(id)?;
        let deadline = Instant::now() + timeout;
        loop {
            if flag.load(Ordering::Acquire) {
                return Ok(FenceWait::Signaled);
            }
            self.poll()?;
            if flag.load(Ordering::Acquire) {
                return Ok(FenceWait::Signaled);
            }
            if Instant::now() >= deadline {
                return Ok(FenceWait::TimedOut);
            }
            std::thread::sleep(FENCE_POLL_INTERVAL);
        }
    }

    fn reset_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        let mut fences = lock(&self.internal.fences, "fences")?;
        let flag = fences.get_mut(&id).ok_or(ResourceError::NotFound)?;
        *flag = Arc::new(AtomicBool::new(false));
        Ok(())
    }

    fn is_fence_signaled(&self, id: FenceId) -> Result<bool, ResourceError> {
        let flag = self.fence_flag(id)?;
        if !flag.load(Ordering::Acquire) {
            if let Err(e) = self.poll() {
                log::warn!("WgpuDevice: Polling the device failed: {e}");
            }
        }
        Ok(flag.load(Ordering::Acquire))
    }

    // --- Command Submission ---

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        let encoder = self
            .internal
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        Box::new(WgpuCommandEncoder::new(encoder, self.clone()))
    }

    fn submit_command_buffer(
        &self,
        command_buffer: CommandBufferId,
        signal: Option<FenceId>,
    ) -> Result<(), RenderError> {
        let buffer = lock(
            &self.internal.pending_command_buffers,
            "pending_command_buffers",
        )?
        .remove(&command_buffer)
        .ok_or_else(|| {
            RenderError::Internal(format!(
                "Attempted to submit a CommandBufferId ({command_buffer:?}) that does not exist."
            ))
        })?;
        let flag = signal.map(|fence| self.fence_flag(fence)).transpose()?;

        let queue = &self.internal.context.queue;
        queue.submit(std::iter::once(buffer));
        if let Some(flag) = flag {
            queue.on_submitted_work_done(move || flag.store(true, Ordering::Release));
        }
        Ok(())
    }
}
