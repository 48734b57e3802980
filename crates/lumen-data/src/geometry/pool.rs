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

use super::region::Block;
use lumen_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, FrameRing, GraphicsDevice, ResourceError,
    RetiredResource, VertexFormat,
};

/// Identifies one of the arena's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolKind {
    /// The vertex pool of a vertex format.
    Vertex(VertexFormat),
    /// The shared `u32` index pool.
    Index,
}

impl PoolKind {
    /// Size of one element in bytes.
    pub fn stride(&self) -> u64 {
        match self {
            PoolKind::Vertex(format) => u64::from(format.stride()),
            PoolKind::Index => std::mem::size_of::<u32>() as u64,
        }
    }

    fn usage(&self) -> BufferUsage {
        let copy = BufferUsage::COPY_DST | BufferUsage::COPY_SRC;
        match self {
            PoolKind::Vertex(_) => BufferUsage::VERTEX | copy,
            PoolKind::Index => BufferUsage::INDEX | copy,
        }
    }

    fn label(&self) -> String {
        match self {
            PoolKind::Vertex(format) => format!("geometry arena vertices ({format:?})"),
            PoolKind::Index => "geometry arena indices".to_string(),
        }
    }
}

/// One growable GPU buffer with an append-only write cursor.
///
/// All quantities are in elements of `kind.stride()` bytes. Space behind the
/// cursor is only reclaimed by [`ArenaPool::relocate`], which copies the live
/// blocks into a fresh buffer.
#[derive(Debug)]
pub(crate) struct ArenaPool {
    kind: PoolKind,
    buffer: BufferId,
    capacity: u64,
    cursor: u64,
    live: u64,
    page: u64,
    min_capacity: u64,
}

impl ArenaPool {
    pub fn new(
        device: &dyn GraphicsDevice,
        kind: PoolKind,
        page_bytes: u64,
        initial_pages: u64,
    ) -> Result<Self, ResourceError> {
        let page = (page_bytes / kind.stride()).max(1);
        let capacity = page * initial_pages.max(1);
        let buffer = Self::allocate(device, kind, capacity)?;
        log::debug!(
            "Created {} with {capacity} elements",
            kind.label()
        );
        Ok(Self {
            kind,
            buffer,
            capacity,
            cursor: 0,
            live: 0,
            page,
            min_capacity: capacity,
        })
    }

    fn allocate(
        device: &dyn GraphicsDevice,
        kind: PoolKind,
        capacity: u64,
    ) -> Result<BufferId, ResourceError> {
        device.create_buffer(&BufferDescriptor::new(
            kind.label(),
            capacity * kind.stride(),
            kind.usage(),
        ))
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn live(&self) -> u64 {
        self.live
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.cursor
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn min_capacity(&self) -> u64 {
        self.min_capacity
    }

    /// Rounds `elements` up to a whole number of pages.
    pub fn round_to_page(&self, elements: u64) -> u64 {
        elements.div_ceil(self.page).max(1) * self.page
    }

    /// Writes `bytes` at the cursor. The caller made sure there is room.
    pub fn append(&mut self, device: &dyn GraphicsDevice, bytes: &[u8]) -> Result<Block, ResourceError> {
        let stride = self.kind.stride();
        let len = bytes.len() as u64 / stride;
        if len > self.remaining() {
            return Err(ResourceError::OutOfBounds);
        }
        let block = Block {
            offset: self.cursor,
            len,
        };
        if !bytes.is_empty() {
            device.write_buffer(self.buffer, block.offset * stride, bytes)?;
        }
        self.cursor += len;
        self.live += len;
        Ok(block)
    }

    /// Marks a block as garbage. Its bytes stay in place until the next relocation.
    pub fn release(&mut self, block: Block) {
        self.live = self.live.saturating_sub(block.len);
    }

    /// Counts a previously released block as live again.
    pub fn reclaim(&mut self, block: Block) {
        self.live += block.len;
    }

    /// Moves every block of `blocks` into a new buffer of `new_capacity` elements,
    /// packed in their current relative order, and retires the old buffer.
    ///
    /// On error nothing changed.
    pub fn relocate(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        new_capacity: u64,
        mut blocks: Vec<&mut Block>,
    ) -> Result<(), ResourceError> {
        let live: u64 = blocks.iter().map(|b| b.len).sum();
        if live > new_capacity {
            return Err(ResourceError::OutOfBounds);
        }
        let new_buffer = Self::allocate(device, self.kind, new_capacity)?;

        blocks.sort_by_key(|b| b.offset);
        let stride = self.kind.stride();
        let mut encoder = device.create_command_encoder(Some("geometry arena relocation"));
        let mut cursor = 0;
        let mut offsets = Vec::with_capacity(blocks.len());
        // (source offset, destination offset, length) of the pending merged copy.
        let mut run: Option<(u64, u64, u64)> = None;
        for block in &blocks {
            if block.len > 0 {
                run = match run {
                    Some((src, dst, len)) if src + len == block.offset => {
                        Some((src, dst, len + block.len))
                    }
                    Some((src, dst, len)) => {
                        encoder.copy_buffer_to_buffer(
                            self.buffer,
                            src * stride,
                            new_buffer,
                            dst * stride,
                            len * stride,
                        );
                        Some((block.offset, cursor, block.len))
                    }
                    None => Some((block.offset, cursor, block.len)),
                };
            }
            offsets.push(cursor);
            cursor += block.len;
        }
        if let Some((src, dst, len)) = run {
            encoder.copy_buffer_to_buffer(self.buffer, src * stride, new_buffer, dst * stride, len * stride);
        }

        if let Err(e) = device.submit_command_buffer(encoder.finish(), None) {
            if let Err(destroy) = device.destroy_buffer(new_buffer) {
                log::warn!("Failed to destroy unused {}: {destroy}", self.kind.label());
            }
            return Err(ResourceError::BackendError(format!(
                "geometry relocation submit failed: {e}"
            )));
        }

        for (block, offset) in blocks.iter_mut().zip(offsets) {
            block.offset = offset;
        }
        ring.retire(RetiredResource::Buffer(self.buffer));
        log::debug!(
            "Relocated {}: {} -> {new_capacity} elements ({live} live)",
            self.kind.label(),
            self.capacity
        );
        self.buffer = new_buffer;
        self.capacity = new_capacity;
        self.cursor = cursor;
        self.live = live;
        Ok(())
    }

    /// Destroys the buffer immediately. The GPU must be idle.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_buffer(self.buffer) {
            log::warn!("Failed to destroy {}: {e}", self.kind.label());
        }
    }
}
