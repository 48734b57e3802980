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

use crate::math::Extent3D;
use crate::renderer::api::*;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::{CommandEncoder, FenceWait, GraphicsDevice, RenderPass};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A command recorded by a [`MockCommandEncoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    /// `copy_buffer_to_buffer`.
    CopyBuffer {
        /// Source buffer.
        source: BufferId,
        /// Offset in the source.
        source_offset: u64,
        /// Destination buffer.
        destination: BufferId,
        /// Offset in the destination.
        destination_offset: u64,
        /// Bytes copied.
        size: u64,
    },
    /// `copy_texture_to_texture`.
    CopyTexture {
        /// Source texture.
        source: TextureId,
        /// Destination texture.
        destination: TextureId,
    },
    /// Start of a render pass.
    BeginPass {
        /// The color target.
        color: TextureViewId,
    },
    /// `set_pipeline`.
    SetPipeline(RenderPipelineId),
    /// `set_bind_group`.
    SetBindGroup(u32, BindGroupId),
    /// `set_vertex_buffer`.
    SetVertexBuffer(BufferId),
    /// `set_index_buffer`.
    SetIndexBuffer(BufferId),
    /// `draw_indexed_indirect`.
    DrawIndexedIndirect {
        /// The indirect buffer.
        buffer: BufferId,
        /// Byte offset of the command.
        offset: u64,
    },
}

#[derive(Debug)]
struct MockBuffer {
    label: String,
    usage: BufferUsage,
    data: Vec<u8>,
    writes: usize,
}

#[derive(Debug)]
struct MockTexture {
    size: Extent3D,
    format: TextureFormat,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: usize,
    buffers: HashMap<BufferId, MockBuffer>,
    textures: HashMap<TextureId, MockTexture>,
    views: HashMap<TextureViewId, TextureId>,
    shaders: HashMap<ShaderModuleId, Vec<u8>>,
    pipelines: HashMap<RenderPipelineId, String>,
    bind_groups: HashMap<BindGroupId, BindGroupDescriptor<'static>>,
    fences: HashMap<FenceId, bool>,
    recorded: HashMap<u64, Vec<MockCommand>>,
    submitted: Vec<Vec<MockCommand>>,
    manual_fences: bool,
    fail_buffer_allocations: usize,
    fail_texture_allocations: usize,
    max_buffer_size: Option<u64>,
    buffers_created: usize,
    device_lost: bool,
}

impl MockState {
    fn next(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }
}

/// An in-memory [`GraphicsDevice`].
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockGraphicsDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockGraphicsDevice {
    /// Creates a device whose fences signal as soon as work is submitted.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock device state poisoned")
    }

    /// When `false`, submitted fences stay unsignaled until [`Self::signal_fence`].
    pub fn set_auto_signal(&self, auto: bool) {
        self.state().manual_fences = !auto;
    }

    /// Signals one fence, as the GPU would on completion.
    pub fn signal_fence(&self, fence: FenceId) {
        if let Some(signaled) = self.state().fences.get_mut(&fence) {
            *signaled = true;
        }
    }

    /// Signals every fence.
    pub fn signal_all_fences(&self) {
        for signaled in self.state().fences.values_mut() {
            *signaled = true;
        }
    }

    /// Makes every subsequent fence wait report device loss.
    pub fn lose_device(&self) {
        self.state().device_lost = true;
    }

    /// Makes the next `count` buffer allocations fail.
    pub fn fail_next_buffer_allocations(&self, count: usize) {
        self.state().fail_buffer_allocations = count;
    }

    /// Makes the next `count` texture allocations fail.
    pub fn fail_next_texture_allocations(&self, count: usize) {
        self.state().fail_texture_allocations = count;
    }

    /// Rejects buffer allocations larger than `max` bytes.
    pub fn set_max_buffer_size(&self, max: Option<u64>) {
        self.state().max_buffer_size = max;
    }

    /// Whether the buffer is still alive.
    pub fn buffer_exists(&self, id: BufferId) -> bool {
        self.state().buffers.contains_key(&id)
    }

    /// A copy of the buffer's bytes.
    pub fn buffer_data(&self, id: BufferId) -> Option<Vec<u8>> {
        self.state().buffers.get(&id).map(|b| b.data.clone())
    }

    /// Size of the buffer in bytes.
    pub fn buffer_size(&self, id: BufferId) -> Option<u64> {
        self.state().buffers.get(&id).map(|b| b.data.len() as u64)
    }

    /// The label the buffer was created with.
    pub fn buffer_label(&self, id: BufferId) -> Option<String> {
        self.state().buffers.get(&id).map(|b| b.label.clone())
    }

    /// The usage the buffer was created with.
    pub fn buffer_usage(&self, id: BufferId) -> Option<BufferUsage> {
        self.state().buffers.get(&id).map(|b| b.usage)
    }

    /// How many `write_buffer` calls targeted the buffer.
    pub fn write_count(&self, id: BufferId) -> usize {
        self.state().buffers.get(&id).map_or(0, |b| b.writes)
    }

    /// Number of live buffers.
    pub fn live_buffer_count(&self) -> usize {
        self.state().buffers.len()
    }

    /// Number of buffers ever created.
    pub fn buffers_created(&self) -> usize {
        self.state().buffers_created
    }

    /// Number of live fences.
    pub fn live_fence_count(&self) -> usize {
        self.state().fences.len()
    }

    /// Whether the texture is still alive.
    pub fn texture_exists(&self, id: TextureId) -> bool {
        self.state().textures.contains_key(&id)
    }

    /// A copy of the texture's bytes.
    pub fn texture_data(&self, id: TextureId) -> Option<Vec<u8>> {
        self.state().textures.get(&id).map(|t| t.data.clone())
    }

    /// Number of live textures.
    pub fn live_texture_count(&self) -> usize {
        self.state().textures.len()
    }

    /// Number of live render pipelines.
    pub fn live_pipeline_count(&self) -> usize {
        self.state().pipelines.len()
    }

    /// The descriptor a bind group was created from.
    pub fn bind_group(&self, id: BindGroupId) -> Option<BindGroupDescriptor<'static>> {
        self.state().bind_groups.get(&id).cloned()
    }

    /// Every submitted command buffer, in submission order.
    pub fn submissions(&self) -> Vec<Vec<MockCommand>> {
        self.state().submitted.clone()
    }

    /// The commands of the last submission.
    pub fn last_submission(&self) -> Vec<MockCommand> {
        self.state().submitted.last().cloned().unwrap_or_default()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        if descriptor.bytecode.is_empty() {
            return Err(ResourceError::BackendError("empty shader bytecode".into()));
        }
        let mut state = self.state();
        let id = ShaderModuleId(state.next());
        state.shaders.insert(id, descriptor.bytecode.to_vec());
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.state()
            .shaders
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let mut state = self.state();
        if !state.shaders.contains_key(&descriptor.vertex_module)
            || !state.shaders.contains_key(&descriptor.fragment_module)
        {
            return Err(ResourceError::InvalidHandle);
        }
        let id = RenderPipelineId(state.next());
        let label = descriptor.label.as_deref().unwrap_or("pipeline").to_string();
        state.pipelines.insert(id, label);
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        self.state()
            .pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let mut state = self.state();
        if !state.pipelines.contains_key(&descriptor.pipeline) {
            return Err(ResourceError::InvalidHandle);
        }
        let id = BindGroupId(state.next());
        let owned = BindGroupDescriptor {
            label: descriptor.label.as_ref().map(|l| l.to_string().into()),
            pipeline: descriptor.pipeline,
            group: descriptor.group,
            entries: descriptor.entries.clone(),
        };
        state.bind_groups.insert(id, owned);
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        self.state()
            .bind_groups
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let mut state = self.state();
        let too_large = state.max_buffer_size.is_some_and(|max| descriptor.size > max);
        if state.fail_buffer_allocations > 0 || too_large {
            state.fail_buffer_allocations = state.fail_buffer_allocations.saturating_sub(1);
            return Err(ResourceError::AllocationFailed {
                label: descriptor.label.as_deref().unwrap_or("buffer").to_string(),
                size: descriptor.size,
            });
        }
        let id = BufferId(state.next());
        state.buffers.insert(
            id,
            MockBuffer {
                label: descriptor.label.as_deref().unwrap_or_default().to_string(),
                usage: descriptor.usage,
                data: vec![0; descriptor.size as usize],
                writes: 0,
            },
        );
        state.buffers_created += 1;
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let id = self.create_buffer(descriptor)?;
        self.write_buffer(id, 0, data)?;
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.state()
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        let buffer = state.buffers.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.data.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer.data[start..end].copy_from_slice(data);
        buffer.writes += 1;
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut state = self.state();
        let bytes = u64::from(descriptor.size.width)
            * u64::from(descriptor.size.height)
            * u64::from(descriptor.size.depth_or_array_layers.max(1))
            * u64::from(descriptor.format.bytes_per_pixel());
        if state.fail_texture_allocations > 0 {
            state.fail_texture_allocations -= 1;
            return Err(ResourceError::AllocationFailed {
                label: descriptor.label.as_deref().unwrap_or("texture").to_string(),
                size: bytes,
            });
        }
        let id = TextureId(state.next());
        state.textures.insert(
            id,
            MockTexture {
                size: descriptor.size,
                format: descriptor.format,
                data: vec![0; bytes as usize],
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.state()
            .textures
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn write_texture(
        &self,
        id: TextureId,
        data: &[u8],
        bytes_per_row: u32,
        size: Extent3D,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        let texture = state.textures.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        let expected = bytes_per_row as usize * size.height as usize;
        if size.width > texture.size.width
            || size.height > texture.size.height
            || data.len() < expected
            || bytes_per_row < size.width * texture.format.bytes_per_pixel()
        {
            return Err(ResourceError::OutOfBounds);
        }
        let len = expected.min(texture.data.len());
        texture.data[..len].copy_from_slice(&data[..len]);
        Ok(())
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError> {
        let mut state = self.state();
        if !state.textures.contains_key(&texture) {
            return Err(ResourceError::InvalidHandle);
        }
        let id = TextureViewId(state.next());
        state.views.insert(id, texture);
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.state()
            .views
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceId, ResourceError> {
        let mut state = self.state();
        let id = FenceId(state.next());
        state.fences.insert(id, signaled);
        Ok(id)
    }

    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        self.state()
            .fences
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn wait_for_fence(&self, id: FenceId, _timeout: Duration) -> Result<FenceWait, RenderError> {
        let state = self.state();
        if state.device_lost {
            return Err(RenderError::DeviceLost("mock device lost".into()));
        }
        match state.fences.get(&id) {
            Some(true) => Ok(FenceWait::Signaled),
            // Nothing can signal while the caller blocks, so report the timeout at once.
            Some(false) => Ok(FenceWait::TimedOut),
            None => Err(RenderError::Resource(ResourceError::InvalidHandle)),
        }
    }

    fn reset_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        let mut state = self.state();
        let fence = state.fences.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        *fence = false;
        Ok(())
    }

    fn is_fence_signaled(&self, id: FenceId) -> Result<bool, ResourceError> {
        self.state()
            .fences
            .get(&id)
            .copied()
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(MockCommandEncoder {
            state: Arc::clone(&self.state),
            commands: Vec::new(),
        })
    }

    fn submit_command_buffer(
        &self,
        command_buffer: CommandBufferId,
        signal: Option<FenceId>,
    ) -> Result<(), RenderError> {
        let mut state = self.state();
        if state.device_lost {
            return Err(RenderError::DeviceLost("mock device lost".into()));
        }
        let commands = state
            .recorded
            .remove(&command_buffer.0)
            .ok_or(RenderError::Resource(ResourceError::InvalidHandle))?;

        for command in &commands {
            if let MockCommand::CopyBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } = *command
            {
                let bytes = {
                    let src = state
                        .buffers
                        .get(&source)
                        .ok_or(RenderError::Resource(ResourceError::InvalidHandle))?;
                    let start = source_offset as usize;
                    src.data
                        .get(start..start + size as usize)
                        .ok_or(RenderError::Resource(ResourceError::OutOfBounds))?
                        .to_vec()
                };
                let dst = state
                    .buffers
                    .get_mut(&destination)
                    .ok_or(RenderError::Resource(ResourceError::InvalidHandle))?;
                let start = destination_offset as usize;
                dst.data
                    .get_mut(start..start + size as usize)
                    .ok_or(RenderError::Resource(ResourceError::OutOfBounds))?
                    .copy_from_slice(&bytes);
            }
        }

        state.submitted.push(commands);
        if let Some(fence) = signal {
            let auto = !state.manual_fences;
            let entry = state
                .fences
                .get_mut(&fence)
                .ok_or(RenderError::Resource(ResourceError::InvalidHandle))?;
            *entry = auto;
        }
        Ok(())
    }
}

/// Encoder of the [`MockGraphicsDevice`].
#[derive(Debug)]
pub struct MockCommandEncoder {
    state: Arc<Mutex<MockState>>,
    commands: Vec<MockCommand>,
}

struct MockRenderPass<'a> {
    commands: &'a mut Vec<MockCommand>,
}

impl<'a> RenderPass<'a> for MockRenderPass<'a> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(MockCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId) {
        self.commands.push(MockCommand::SetBindGroup(index, bind_group));
    }

    fn set_vertex_buffer(&mut self, _slot: u32, buffer: BufferId, _offset: u64) {
        self.commands.push(MockCommand::SetVertexBuffer(buffer));
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, _index_format: IndexFormat) {
        self.commands.push(MockCommand::SetIndexBuffer(buffer));
    }

    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, indirect_offset: u64) {
        self.commands.push(MockCommand::DrawIndexedIndirect {
            buffer: indirect_buffer,
            offset: indirect_offset,
        });
    }
}

impl CommandEncoder for MockCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        self.commands.push(MockCommand::BeginPass {
            color: descriptor.color_attachment.view,
        });
        Box::new(MockRenderPass {
            commands: &mut self.commands,
        })
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(MockCommand::CopyBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId, _size: Extent3D) {
        self.commands.push(MockCommand::CopyTexture {
            source,
            destination,
        });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let this = *self;
        let mut state = this.state.lock().expect("mock device state poisoned");
        let id = state.next() as u64;
        state.recorded.insert(id, this.commands);
        CommandBufferId(id)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
