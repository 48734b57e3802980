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

//! Plain-old-data layouts shared with shaders.
//!
//! Every struct here is `#[repr(C)]` and [`bytemuck::Pod`] so that slices of them
//! can be uploaded with a single `write_buffer` call.

use crate::math::Mat4;
use crate::scene::{CameraView, LightDesc, LightKind};
use bytemuck::{Pod, Zeroable};

/// Maximum number of textures referenced by one material instance.
pub const MAX_MATERIAL_TEXTURES: usize = 8;

/// Maximum number of scalar parameters carried by one material instance.
pub const MAX_MATERIAL_SCALARS: usize = 8;

/// Texture index written for an unused texture reference.
pub const NO_TEXTURE: u32 = u32::MAX;

/// One indexed-indirect draw, in the layout the GPU consumes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct IndexedIndirectCommand {
    /// Number of indices drawn.
    pub index_count: u32,
    /// Number of instances drawn.
    pub instance_count: u32,
    /// First index inside the shared index buffer.
    pub first_index: u32,
    /// Value added to every index before fetching a vertex.
    pub vertex_offset: i32,
    /// First instance, i.e. the first slot of the per-frame object array.
    pub first_instance: u32,
}

impl IndexedIndirectCommand {
    /// Size of one command in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Per-object data read by the vertex stage through `instance_index`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuObjectData {
    /// Column-major model matrix.
    pub model: [[f32; 4]; 4],
    /// Index into the per-frame material array.
    pub material_index: u32,
    /// Explicit padding to a 16-byte multiple.
    pub _padding: [u32; 3],
}

impl GpuObjectData {
    /// Builds the record from a world matrix and a material index.
    pub fn new(model: Mat4, material_index: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            material_index,
            _padding: [0; 3],
        }
    }
}

impl Default for GpuObjectData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, 0)
    }
}

/// Shader-visible parameter block of a material instance.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMaterialInstanceData {
    /// Bindless texture slots, [`NO_TEXTURE`] when unused.
    pub texture_indices: [u32; MAX_MATERIAL_TEXTURES],
    /// Scalar parameters.
    pub scalars: [f32; MAX_MATERIAL_SCALARS],
}

impl Default for GpuMaterialInstanceData {
    fn default() -> Self {
        Self {
            texture_indices: [NO_TEXTURE; MAX_MATERIAL_TEXTURES],
            scalars: [0.0; MAX_MATERIAL_SCALARS],
        }
    }
}

/// Camera uniform.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuCameraData {
    /// World-to-view matrix.
    pub view: [[f32; 4]; 4],
    /// View-to-clip matrix.
    pub projection: [[f32; 4]; 4],
    /// World-to-clip matrix.
    pub view_projection: [[f32; 4]; 4],
    /// Eye position, `w` unused.
    pub position: [f32; 4],
}

impl From<&CameraView> for GpuCameraData {
    fn from(camera: &CameraView) -> Self {
        Self {
            view: camera.view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            view_projection: (camera.projection * camera.view).to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
        }
    }
}

impl Default for GpuCameraData {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            view: identity,
            projection: identity,
            view_projection: identity,
            position: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// A light source as laid out for the light array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Default)]
pub struct GpuLightData {
    /// `xyz` position, `w` range.
    pub position_range: [f32; 4],
    /// `xyz` direction, `w` cosine of the cone angle.
    pub direction_cone: [f32; 4],
    /// `rgb` color, `a` intensity.
    pub color_intensity: [f32; 4],
    /// `x` kind (0 directional, 1 point, 2 spot), rest unused.
    pub kind: [u32; 4],
}

impl From<&LightDesc> for GpuLightData {
    fn from(light: &LightDesc) -> Self {
        let kind = match light.kind {
            LightKind::Directional => 0,
            LightKind::Point => 1,
            LightKind::Spot => 2,
        };
        Self {
            position_range: light.position.extend(light.range).to_array(),
            direction_cone: light.direction.extend(light.cone_angle.cos()).to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
            kind: [kind, 0, 0, 0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(IndexedIndirectCommand::SIZE, 20);
        assert_eq!(std::mem::size_of::<GpuObjectData>(), 80);
        assert_eq!(std::mem::size_of::<GpuMaterialInstanceData>(), 64);
        assert_eq!(std::mem::size_of::<GpuCameraData>(), 208);
        assert_eq!(std::mem::size_of::<GpuLightData>(), 64);
    }

    #[test]
    fn test_default_material_has_no_textures() {
        let block = GpuMaterialInstanceData::default();
        assert!(block.texture_indices.iter().all(|&t| t == NO_TEXTURE));
    }
}
