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

use lumen_core::renderer::VertexFormat;

/// Where one mesh (or sub-mesh) lives inside the arena.
///
/// Offsets and counts are in elements: vertices of the mesh's vertex format, and
/// `u32` indices. `vertex_offset` is the base vertex added to every index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryRegion {
    /// First vertex inside the vertex pool of `format`.
    pub vertex_offset: u32,
    /// Number of vertices.
    pub vertex_count: u32,
    /// First index inside the index pool.
    pub index_offset: u32,
    /// Number of indices.
    pub index_count: u32,
    /// The vertex pool the region lives in.
    pub format: VertexFormat,
    /// `false` once the mesh was removed and before its space is reclaimed.
    pub active: bool,
}

/// A contiguous range of elements inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    pub offset: u64,
    pub len: u64,
}

impl Block {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}
