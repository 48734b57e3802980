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

use crate::renderer::api::{
    BindGroupId, BufferId, RenderPipelineId, ShaderModuleId, TextureId, TextureViewId,
};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::collections::VecDeque;

/// A FIFO of items tagged with the frame number after which the GPU stops using them.
///
/// An item tagged `t` is released once the ring has acquired frame `t + depth`: by
/// then the slot that recorded frame `t` has been waited on, and every earlier
/// submission has completed as well.
#[derive(Debug)]
pub struct RetirementFifo<T> {
    entries: VecDeque<(u64, T)>,
    depth: u64,
}

impl<T> RetirementFifo<T> {
    /// Creates an empty FIFO for a ring of `depth` slots.
    pub fn new(depth: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            depth: depth as u64,
        }
    }

    /// Queues `item`, last used by frame `tag`.
    ///
    /// Tags must be pushed in non-decreasing order; the ring guarantees it.
    pub fn push(&mut self, tag: u64, item: T) {
        debug_assert!(
            self.entries.back().map_or(true, |(last, _)| *last <= tag),
            "retirement tags must be monotonic"
        );
        self.entries.push_back((tag, item));
    }

    /// Pops every item that is safe to release when acquiring `current_frame`.
    pub fn drain_ready(&mut self, current_frame: u64) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some((tag, _)) = self.entries.front() {
            if tag + self.depth > current_frame {
                break;
            }
            if let Some((_, item)) = self.entries.pop_front() {
                ready.push(item);
            }
        }
        ready
    }

    /// Pops everything regardless of tags. Only valid once the GPU is idle.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|(_, item)| item).collect()
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A GPU resource waiting for the frames that may still read it to retire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetiredResource {
    /// A buffer, e.g. a geometry pool replaced by `grow` or `shrink`.
    Buffer(BufferId),
    /// A texture, e.g. a resized offscreen target.
    Texture(TextureId),
    /// A texture view.
    TextureView(TextureViewId),
    /// A bind group.
    BindGroup(BindGroupId),
    /// A render pipeline.
    RenderPipeline(RenderPipelineId),
    /// A shader module.
    ShaderModule(ShaderModuleId),
}

impl RetiredResource {
    /// Releases the resource on the device.
    pub fn destroy(self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        match self {
            RetiredResource::Buffer(id) => device.destroy_buffer(id),
            RetiredResource::Texture(id) => device.destroy_texture(id),
            RetiredResource::TextureView(id) => device.destroy_texture_view(id),
            RetiredResource::BindGroup(id) => device.destroy_bind_group(id),
            RetiredResource::RenderPipeline(id) => device.destroy_render_pipeline(id),
            RetiredResource::ShaderModule(id) => device.destroy_shader_module(id),
        }
    }

    /// Releases the resource now. A failure is logged rather than returned.
    pub fn destroy_logged(self, device: &dyn GraphicsDevice) {
        if let Err(e) = self.destroy(device) {
            log::warn!("Failed to destroy {self:?}: {e}");
        }
    }
}

/// The deferred-destruction list of the frame ring.
#[derive(Debug)]
pub struct DeferredDestructionQueue {
    fifo: RetirementFifo<RetiredResource>,
}

impl DeferredDestructionQueue {
    /// Creates an empty queue for a ring of `frames_in_flight` slots.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            fifo: RetirementFifo::new(frames_in_flight),
        }
    }

    /// Queues a resource last used by frame `last_use`.
    pub fn push(&mut self, last_use: u64, resource: RetiredResource) {
        log::trace!("Retiring {resource:?} (last used by frame {last_use})");
        self.fifo.push(last_use, resource);
    }

    /// Destroys every resource no in-flight frame can still read.
    ///
    /// Returns the number of destroyed resources. Destruction failures are logged
    /// and do not stop the collection.
    pub fn collect(&mut self, device: &dyn GraphicsDevice, current_frame: u64) -> usize {
        Self::destroy_all(device, self.fifo.drain_ready(current_frame))
    }

    /// Destroys everything. The caller must have waited for the GPU to go idle.
    pub fn flush(&mut self, device: &dyn GraphicsDevice) -> usize {
        Self::destroy_all(device, self.fifo.drain_all())
    }

    /// Number of resources waiting to be destroyed.
    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    fn destroy_all(device: &dyn GraphicsDevice, resources: Vec<RetiredResource>) -> usize {
        let count = resources.len();
        for resource in resources {
            resource.destroy_logged(device);
        }
        count
    }
}
