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

//! The narrow contract through which the renderer pulls raw asset payloads.

use super::AssetUUID;
use crate::renderer::api::{TextureFormat, VertexFormat};
use std::fmt;

/// An error reported by an [`AssetSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// No asset is registered under the requested id.
    NotFound(AssetUUID),
    /// The asset exists but its payload could not be decoded.
    Malformed {
        /// The offending asset.
        id: AssetUUID,
        /// What was wrong with the payload.
        reason: String,
    },
    /// The asset could not be read from its backing storage.
    Io {
        /// The offending asset.
        id: AssetUUID,
        /// The underlying I/O error message.
        message: String,
    },
}

impl AssetError {
    /// The id of the asset that failed to load.
    pub fn asset(&self) -> AssetUUID {
        match self {
            AssetError::NotFound(id) => *id,
            AssetError::Malformed { id, .. } | AssetError::Io { id, .. } => *id,
        }
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotFound(id) => write!(f, "Asset not found: {id}"),
            AssetError::Malformed { id, reason } => {
                write!(f, "Asset {id} is malformed: {reason}")
            }
            AssetError::Io { id, message } => write!(f, "I/O error while loading {id}: {message}"),
        }
    }
}

impl std::error::Error for AssetError {}

/// A contiguous piece of a mesh drawn with its own index range.
///
/// Index values inside a sub-mesh are relative to its `first_vertex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMeshRange {
    /// First vertex of the sub-mesh inside the mesh's vertex payload.
    pub first_vertex: u32,
    /// Number of vertices owned by the sub-mesh.
    pub vertex_count: u32,
    /// First index of the sub-mesh inside the mesh's index payload.
    pub first_index: u32,
    /// Number of indices owned by the sub-mesh.
    pub index_count: u32,
}

/// Raw geometry returned by [`AssetSource::load_mesh_bytes`].
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Interleaved vertex payload laid out according to `vertex_format`.
    pub vertex_bytes: Vec<u8>,
    /// Little-endian `u32` index payload.
    pub index_bytes: Vec<u8>,
    /// The layout of a single vertex.
    pub vertex_format: VertexFormat,
    /// Sub-mesh partition. Empty means the whole mesh is one sub-mesh.
    pub sub_meshes: Vec<SubMeshRange>,
}

impl MeshData {
    /// Number of whole vertices in the payload.
    pub fn vertex_count(&self) -> u32 {
        (self.vertex_bytes.len() / self.vertex_format.stride() as usize) as u32
    }

    /// Number of indices in the payload.
    pub fn index_count(&self) -> u32 {
        (self.index_bytes.len() / std::mem::size_of::<u32>()) as u32
    }

    /// The sub-mesh table, synthesising a single entry when none was provided.
    pub fn sub_mesh_ranges(&self) -> Vec<SubMeshRange> {
        if self.sub_meshes.is_empty() {
            vec![SubMeshRange {
                first_vertex: 0,
                vertex_count: self.vertex_count(),
                first_index: 0,
                index_count: self.index_count(),
            }]
        } else {
            self.sub_meshes.clone()
        }
    }
}

/// Decoded texture pixels returned by [`AssetSource::load_texture_bytes`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    /// Tightly packed pixel rows.
    pub pixels: Vec<u8>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Pixel format of `pixels`.
    pub format: TextureFormat,
}

/// A material instance: a base material plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialInstanceData {
    /// The base material (pipeline) this instance specialises.
    pub base_material: AssetUUID,
    /// Texture references, at most [`crate::renderer::api::MAX_MATERIAL_TEXTURES`] are used.
    pub textures: Vec<AssetUUID>,
    /// Scalar parameters, at most [`crate::renderer::api::MAX_MATERIAL_SCALARS`] are used.
    pub scalars: Vec<f32>,
}

/// A base material: the shaders and vertex layout of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseMaterialData {
    /// Shader asset providing the vertex stage.
    pub vertex_shader: AssetUUID,
    /// Shader asset providing the fragment stage.
    pub fragment_shader: AssetUUID,
    /// The vertex layout every mesh drawn with this material must use.
    pub vertex_format: VertexFormat,
}

/// The asset-loader collaborator.
///
/// Every call is fallible. A failure leaves the requesting record pending; it is
/// never fatal to the frame.
pub trait AssetSource: Send + Sync {
    /// Loads the vertex and index payload of a mesh.
    fn load_mesh_bytes(&self, id: AssetUUID) -> Result<MeshData, AssetError>;

    /// Loads the pixels of a texture.
    fn load_texture_bytes(&self, id: AssetUUID) -> Result<TextureData, AssetError>;

    /// Loads a material instance description.
    fn load_material_instance(&self, id: AssetUUID) -> Result<MaterialInstanceData, AssetError>;

    /// Loads a base material description.
    fn load_base_material(&self, id: AssetUUID) -> Result<BaseMaterialData, AssetError>;

    /// Loads compiled shader bytecode (or source text for text-based backends).
    fn load_shader_bytecode(&self, id: AssetUUID) -> Result<Vec<u8>, AssetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_without_sub_meshes_is_single_range() {
        let mesh = MeshData {
            vertex_bytes: vec![0; VertexFormat::PositionNormalUv.stride() as usize * 4],
            index_bytes: bytemuck::cast_slice(&[0u32, 1, 2, 2, 3, 0]).to_vec(),
            vertex_format: VertexFormat::PositionNormalUv,
            sub_meshes: Vec::new(),
        };
        let ranges = mesh.sub_mesh_ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].vertex_count, 4);
        assert_eq!(ranges[0].index_count, 6);
    }

    #[test]
    fn test_asset_error_display() {
        let id = AssetUUID::from_u128(7);
        let err = AssetError::Malformed {
            id,
            reason: "truncated".to_string(),
        };
        assert_eq!(err.asset(), id);
        assert!(err.to_string().contains("truncated"));
    }
}
