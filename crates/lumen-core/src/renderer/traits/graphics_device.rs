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

use crate::renderer::api::*;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;
use std::time::Duration;

/// Result of waiting on a [`FenceId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceWait {
    /// The GPU finished the work guarded by the fence.
    Signaled,
    /// The wait bound elapsed first.
    TimedOut,
}

/// The GPU device abstraction every backend implements.
///
/// All methods take `&self`; implementations synchronise internally so the device
/// can be shared behind an `Arc`.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Creates a shader module from backend bytecode.
    /// ## Arguments
    /// * `descriptor` - The label and bytecode of the module.
    /// ## Returns
    /// The id of the created shader module.
    /// ## Errors
    /// * `ResourceError` - If the bytecode is rejected by the backend.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys a shader module.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Creates a render pipeline.
    /// ## Arguments
    /// * `descriptor` - Shader stages, vertex layout and target formats.
    /// ## Returns
    /// The id of the created render pipeline.
    /// ## Errors
    /// * `ResourceError` - If a shader module is unknown or the pipeline fails validation.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys a render pipeline.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    /// Creates a bind group following the layout of a pipeline.
    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - Size, usage and label of the buffer.
    /// ## Returns
    /// The id of the created buffer.
    /// ## Errors
    /// * `ResourceError::AllocationFailed` - If the device is out of memory.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer and initializes it with `data`.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a buffer.
    ///
    /// The caller guarantees no submitted work still reads the buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes `data` into a buffer at `offset`.
    ///
    /// The write is ordered before the next submitted command buffer.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If the range exceeds the buffer.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Creates a texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Uploads tightly packed pixel rows into the first mip of a texture.
    fn write_texture(
        &self,
        id: TextureId,
        data: &[u8],
        bytes_per_row: u32,
        size: crate::math::Extent3D,
    ) -> Result<(), ResourceError>;

    /// Creates a default view of a texture.
    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Creates a CPU-waitable fence.
    /// ## Arguments
    /// * `signaled` - Whether the fence starts in the signaled state.
    fn create_fence(&self, signaled: bool) -> Result<FenceId, ResourceError>;

    /// Destroys a fence.
    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Blocks until the fence signals or `timeout` elapses.
    /// ## Returns
    /// Whether the fence signaled or the wait timed out.
    /// ## Errors
    /// * `RenderError::DeviceLost` - If the device stopped responding.
    fn wait_for_fence(&self, id: FenceId, timeout: Duration) -> Result<FenceWait, RenderError>;

    /// Returns the fence to the unsignaled state.
    fn reset_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Non-blocking query of a fence.
    fn is_fence_signaled(&self, id: FenceId) -> Result<bool, ResourceError>;

    /// Creates a command encoder.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a finished command buffer. Returns immediately.
    /// ## Arguments
    /// * `command_buffer` - The buffer returned by [`CommandEncoder::finish`].
    /// * `signal` - A fence the GPU signals once this submission completes.
    /// ## Errors
    /// * `RenderError::DeviceLost` - If the queue rejected the submission.
    fn submit_command_buffer(
        &self,
        command_buffer: CommandBufferId,
        signal: Option<FenceId>,
    ) -> Result<(), RenderError>;
}
