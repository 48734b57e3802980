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

//! Defines data structures used for recording and describing GPU commands.

use super::TextureViewId;

/// An opaque handle to a recorded command buffer that is ready for submission.
///
/// Returned by [`crate::renderer::CommandEncoder::finish`] and consumed by
/// [`crate::renderer::GraphicsDevice::submit_command_buffer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// An opaque handle to a CPU-waitable GPU completion fence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceId(pub usize);

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment will be loaded into the pass.
    Load,
    /// The attachment will be cleared to the specified value before the pass begins.
    Clear(V),
}

/// A color attachment of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassColorAttachment {
    /// The view rendered to.
    pub view: TextureViewId,
    /// What happens to the previous contents.
    pub load: LoadOp<[f32; 4]>,
}

/// A depth attachment of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDepthAttachment {
    /// The depth view.
    pub view: TextureViewId,
    /// What happens to the previous depth values.
    pub load: LoadOp<f32>,
}

/// A descriptor for a render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// The color target.
    pub color_attachment: RenderPassColorAttachment,
    /// An optional depth target.
    pub depth_attachment: Option<RenderPassDepthAttachment>,
}
