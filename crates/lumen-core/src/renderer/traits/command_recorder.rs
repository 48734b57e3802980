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
use crate::renderer::api::{
    BindGroupId, BufferId, CommandBufferId, IndexFormat, RenderPassDescriptor, RenderPipelineId,
    TextureId,
};
use std::any::Any;

/// An active render pass, used for recording drawing commands.
///
/// The `'pass` lifetime ties the pass to the [`CommandEncoder`] that created it.
pub trait RenderPass<'pass> {
    /// Sets the active render pipeline for subsequent draw calls.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a bind group at `index`.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId);

    /// Binds a vertex buffer to a specific slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Issues one indexed draw whose arguments are read from `indirect_buffer`.
    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, indirect_offset: u64);
}

/// An object that records a sequence of GPU commands.
///
/// A `CommandEncoder` builds a [`CommandBufferId`]. It creates render passes and
/// records copies that happen outside of a pass.
pub trait CommandEncoder {
    /// Begins a new render pass.
    ///
    /// The pass borrows the encoder mutably, so only one pass can be active at a
    /// time. Dropping it ends the pass.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder>;

    /// Records a command to copy data from one buffer to another on the GPU.
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Records a full-extent copy between two textures of the same format.
    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId, size: Extent3D);

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
