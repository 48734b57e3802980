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

//! Shader modules, render pipelines and bind groups.

use super::{BufferId, TextureFormat, TextureViewId, VertexFormat};
use std::borrow::Cow;

/// Bind group slots shared by every material pipeline.
pub mod bindings {
    /// Camera uniform.
    pub const CAMERA: u32 = 0;
    /// Object array.
    pub const OBJECTS: u32 = 1;
    /// Material array.
    pub const MATERIALS: u32 = 2;
    /// Light array.
    pub const LIGHTS: u32 = 3;
    /// Bindless texture table.
    pub const TEXTURES: u32 = 4;
}

/// An opaque handle to a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderModuleId(pub usize);

/// An opaque handle to a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPipelineId(pub usize);

/// An opaque handle to a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupId(pub usize);

/// A descriptor used to create a [`ShaderModuleId`] from backend bytecode.
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The compiled bytecode, or UTF-8 source for text-based backends.
    pub bytecode: Cow<'a, [u8]>,
}

/// A descriptor used to create a [`RenderPipelineId`].
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Module providing the vertex stage.
    pub vertex_module: ShaderModuleId,
    /// Entry point of the vertex stage.
    pub vertex_entry: Cow<'a, str>,
    /// Module providing the fragment stage.
    pub fragment_module: ShaderModuleId,
    /// Entry point of the fragment stage.
    pub fragment_entry: Cow<'a, str>,
    /// Layout of vertex buffer slot 0.
    pub vertex_format: VertexFormat,
    /// Format of the single color target.
    pub color_format: TextureFormat,
    /// Format of the depth target, if depth testing is enabled.
    pub depth_format: Option<TextureFormat>,
}

/// A resource bound at a given binding index.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingResource {
    /// A whole buffer.
    Buffer(BufferId),
    /// A runtime-sized array of texture views (bindless table).
    TextureViewArray(Vec<TextureViewId>),
}

/// A single entry of a bind group.
#[derive(Debug, Clone, PartialEq)]
pub struct BindGroupEntry {
    /// The binding index in the shader.
    pub binding: u32,
    /// The bound resource.
    pub resource: BindingResource,
}

/// A descriptor used to create a [`BindGroupId`] compatible with a pipeline.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The pipeline whose layout the bind group follows.
    pub pipeline: RenderPipelineId,
    /// The group index inside that layout.
    pub group: u32,
    /// The bound resources.
    pub entries: Vec<BindGroupEntry>,
}
