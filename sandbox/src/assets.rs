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


//! An in-memory asset source holding the demo's meshes, textures and materials.

use lumen_core::asset::{
    AssetError, AssetSource, AssetUUID, BaseMaterialData, MaterialInstanceData, MeshData,
    TextureData,
};
use lumen_core::math::Vec3;
use lumen_core::renderer::{TextureFormat, VertexFormat};
use std::collections::HashMap;

const LIT_SHADER: &str = include_str!("../shaders/lit.wgsl");

/// Ids of every asset the demo scene references.
pub mod ids {
    use lumen_core::asset::AssetUUID;

    /// Unit cube with per-face normals.
    pub fn cube() -> AssetUUID {
        AssetUUID::new_v5("sandbox/mesh/cube")
    }
    /// Unit quad in the XZ plane facing up.
    pub fn ground() -> AssetUUID {
        AssetUUID::new_v5("sandbox/mesh/ground")
    }
    /// Checkered material.
    pub fn checker() -> AssetUUID {
        AssetUUID::new_v5("sandbox/material/checker")
    }
    /// Striped material.
    pub fn stripes() -> AssetUUID {
        AssetUUID::new_v5("sandbox/material/stripes")
    }
    /// Untextured ground material.
    pub fn floor() -> AssetUUID {
        AssetUUID::new_v5("sandbox/material/floor")
    }
    pub(super) fn lit() -> AssetUUID {
        AssetUUID::new_v5("sandbox/base/lit")
    }
    pub(super) fn lit_shader() -> AssetUUID {
        AssetUUID::new_v5("sandbox/shader/lit")
    }
    pub(super) fn checker_texture() -> AssetUUID {
        AssetUUID::new_v5("sandbox/texture/checker")
    }
    pub(super) fn stripes_texture() -> AssetUUID {
        AssetUUID::new_v5("sandbox/texture/stripes")
    }
}

/// Assets generated at startup and served from memory.
#[derive(Debug)]
pub struct DemoAssets {
    meshes: HashMap<AssetUUID, MeshData>,
    textures: HashMap<AssetUUID, TextureData>,
    instances: HashMap<AssetUUID, MaterialInstanceData>,
    bases: HashMap<AssetUUID, BaseMaterialData>,
    shaders: HashMap<AssetUUID, &'static str>,
}

impl DemoAssets {
    /// Builds the demo's asset set.
    pub fn new() -> Self {
        let meshes = HashMap::from([(ids::cube(), cube_mesh()), (ids::ground(), ground_mesh())]);
        let textures = HashMap::from([
            (
                ids::checker_texture(),
                pattern_texture(8, |x, y| (x + y) % 2 == 0),
            ),
            (ids::stripes_texture(), pattern_texture(8, |x, _| x % 4 < 2)),
        ]);
        let instance = |textures: Vec<AssetUUID>, tint: [f32; 3], ambient: f32| {
            MaterialInstanceData {
                base_material: ids::lit(),
                textures,
                scalars: vec![tint[0], tint[1], tint[2], ambient],
            }
        };
        let instances = HashMap::from([
            (
                ids::checker(),
                instance(vec![ids::checker_texture()], [1.0, 0.6, 0.3], 0.15),
            ),
            (
                ids::stripes(),
                instance(vec![ids::stripes_texture()], [0.4, 0.7, 1.0], 0.15),
            ),
            (ids::floor(), instance(Vec::new(), [0.45, 0.45, 0.5], 0.2)),
        ]);
        let bases = HashMap::from([(
            ids::lit(),
            BaseMaterialData {
                vertex_shader: ids::lit_shader(),
                fragment_shader: ids::lit_shader(),
                vertex_format: VertexFormat::PositionNormalUv,
            },
        )]);
        let shaders = HashMap::from([(ids::lit_shader(), LIT_SHADER)]);

        Self {
            meshes,
            textures,
            instances,
            bases,
            shaders,
        }
    }
}

impl AssetSource for DemoAssets {
    fn load_mesh_bytes(&self, id: AssetUUID) -> Result<MeshData, AssetError> {
        self.meshes.get(&id).cloned().ok_or(AssetError::NotFound(id))
    }

    fn load_texture_bytes(&self, id: AssetUUID) -> Result<TextureData, AssetError> {
        self.textures.get(&id).cloned().ok_or(AssetError::NotFound(id))
    }

    fn load_material_instance(&self, id: AssetUUID) -> Result<MaterialInstanceData, AssetError> {
        self.instances.get(&id).cloned().ok_or(AssetError::NotFound(id))
    }

    fn load_base_material(&self, id: AssetUUID) -> Result<BaseMaterialData, AssetError> {
        self.bases.get(&id).cloned().ok_or(AssetError::NotFound(id))
    }

    fn load_shader_bytecode(&self, id: AssetUUID) -> Result<Vec<u8>, AssetError> {
        self.shaders
            .get(&id)
            .map(|source| source.as_bytes().to_vec())
            .ok_or(AssetError::NotFound(id))
    }
}

/// Interleaved position, normal and uv.
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

fn mesh_data(vertices: &[Vertex], indices: &[u32]) -> MeshData {
    MeshData {
        vertex_bytes: bytemuck::cast_slice(vertices).to_vec(),
        index_bytes: indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
        vertex_format: VertexFormat::PositionNormalUv,
        sub_meshes: Vec::new(),
    }
}

/// Appends a counter-clockwise quad centred on `center`, spanned by `u` and `v`
/// with `u x v` pointing outwards.
fn push_quad(vertices: &mut Vec<Vertex>, indices: &mut Vec<u32>, center: Vec3, u: Vec3, v: Vec3) {
    let normal = u.cross(v).normalize().to_array();
    let base = vertices.len() as u32;
    let corners = [
        (center - u - v, [0.0, 1.0]),
        (center + u - v, [1.0, 1.0]),
        (center + u + v, [1.0, 0.0]),
        (center - u + v, [0.0, 0.0]),
    ];
    vertices.extend(corners.iter().map(|(position, uv)| Vertex {
        position: position.to_array(),
        normal,
        uv: *uv,
    }));
    indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
}

fn cube_mesh() -> MeshData {
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        push_quad(&mut vertices, &mut indices, normal * 0.5, u * 0.5, v * 0.5);
    }
    mesh_data(&vertices, &indices)
}

fn ground_mesh() -> MeshData {
    let mut vertices = Vec::with_capacity(4);
    let mut indices = Vec::with_capacity(6);
    push_quad(&mut vertices, &mut indices, Vec3::ZERO, Vec3::X, Vec3::NEG_Z);
    mesh_data(&vertices, &indices)
}

fn pattern_texture(size: u32, lit: impl Fn(u32, u32) -> bool) -> TextureData {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let value = if lit(x, y) { 255 } else { 90 };
            pixels.extend([value, value, value, 255]);
        }
    }
    TextureData {
        pixels,
        width: size,
        height: size,
        format: TextureFormat::Rgba8Unorm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_faces_point_outwards() {
        let mesh = cube_mesh();
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.index_count(), 36);

        let stride = std::mem::size_of::<Vertex>();
        for chunk in mesh.vertex_bytes.chunks_exact(stride) {
            let vertex: Vertex = bytemuck::pod_read_unaligned(chunk);
            let position = Vec3::from_array(vertex.position);
            let normal = Vec3::from_array(vertex.normal);
            assert!(position.dot(normal) > 0.0);
        }
    }

    #[test]
    fn test_every_material_resolves() {
        let assets = DemoAssets::new();
        for material in [ids::checker(), ids::stripes(), ids::floor()] {
            let instance = assets.load_material_instance(material).unwrap();
            let base = assets.load_base_material(instance.base_material).unwrap();
            assert!(assets.load_shader_bytecode(base.vertex_shader).is_ok());
            for texture in instance.textures {
                assert!(assets.load_texture_bytes(texture).is_ok());
            }
        }
    }

    #[test]
    fn test_shader_declares_entry_points() {
        assert!(LIT_SHADER.contains("fn vs_main"));
        assert!(LIT_SHADER.contains("fn fs_main"));
    }
}
