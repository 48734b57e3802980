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

//! Shared fixtures for the render agent integration tests.

#![allow(dead_code)]

use lumen_agents::render_agent::RenderAgent;
use lumen_core::asset::{
    AssetError, AssetSource, AssetUUID, BaseMaterialData, MaterialInstanceData, MeshData,
    TextureData,
};
use lumen_core::config::{BatchingConfig, FrameConfig, GeometryConfig, RendererConfig};
use lumen_core::math::{Mat4, Transform, Vec3};
use lumen_core::renderer::{IndexedIndirectCommand, TextureFormat, VertexFormat};
use lumen_core::scene::{CameraView, EntityId, RenderableDesc, SceneSource};
use lumen_core::testing::{MockCommand, MockGraphicsDevice};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const MESH_A: AssetUUID = AssetUUID::from_u128(0xa1);
pub const MESH_B: AssetUUID = AssetUUID::from_u128(0xa2);
pub const MAT_X: AssetUUID = AssetUUID::from_u128(0xc1);
pub const MAT_Y: AssetUUID = AssetUUID::from_u128(0xc2);
pub const BASE: AssetUUID = AssetUUID::from_u128(0xb0);
pub const VS: AssetUUID = AssetUUID::from_u128(0x51);
pub const FS: AssetUUID = AssetUUID::from_u128(0x52);
pub const TEX: AssetUUID = AssetUUID::from_u128(0x70);

/// An in-memory asset loader. Assets listed in `broken` fail with an I/O error.
#[derive(Default)]
pub struct TestAssets {
    pub meshes: HashMap<AssetUUID, MeshData>,
    pub broken: HashSet<AssetUUID>,
    mesh_loads: AtomicUsize,
}

impl TestAssets {
    pub fn new() -> Self {
        let mut meshes = HashMap::new();
        meshes.insert(MESH_A, triangle(3, 0));
        meshes.insert(MESH_B, triangle(6, 1));
        Self {
            meshes,
            ..Default::default()
        }
    }

    /// Number of mesh payloads requested so far.
    pub fn mesh_loads(&self) -> usize {
        self.mesh_loads.load(Ordering::SeqCst)
    }

    fn check(&self, id: AssetUUID) -> Result<(), AssetError> {
        if self.broken.contains(&id) {
            return Err(AssetError::Io {
                id,
                message: "read error".to_string(),
            });
        }
        Ok(())
    }
}

impl AssetSource for TestAssets {
    fn load_mesh_bytes(&self, id: AssetUUID) -> Result<MeshData, AssetError> {
        self.mesh_loads.fetch_add(1, Ordering::SeqCst);
        self.check(id)?;
        self.meshes.get(&id).cloned().ok_or(AssetError::NotFound(id))
    }

    fn load_texture_bytes(&self, id: AssetUUID) -> Result<TextureData, AssetError> {
        self.check(id)?;
        Ok(TextureData {
            pixels: vec![200; 16],
            width: 2,
            height: 2,
            format: TextureFormat::Rgba8Unorm,
        })
    }

    fn load_material_instance(&self, id: AssetUUID) -> Result<MaterialInstanceData, AssetError> {
        self.check(id)?;
        if id != MAT_X && id != MAT_Y {
            return Err(AssetError::NotFound(id));
        }
        Ok(MaterialInstanceData {
            base_material: BASE,
            textures: vec![TEX],
            scalars: vec![1.0],
        })
    }

    fn load_base_material(&self, id: AssetUUID) -> Result<BaseMaterialData, AssetError> {
        self.check(id)?;
        Ok(BaseMaterialData {
            vertex_shader: VS,
            fragment_shader: FS,
            vertex_format: VertexFormat::Position,
        })
    }

    fn load_shader_bytecode(&self, id: AssetUUID) -> Result<Vec<u8>, AssetError> {
        self.check(id)?;
        Ok(b"fn vs_main() {} fn fs_main() {}".to_vec())
    }
}

/// A position-only mesh of `vertices` vertices drawn as a triangle list.
pub fn triangle(vertices: u32, seed: u8) -> MeshData {
    let vertex_bytes = (0..vertices as usize * 12)
        .map(|i| seed.wrapping_add(i as u8))
        .collect();
    let indices: Vec<u32> = (0..vertices).collect();
    MeshData {
        vertex_bytes,
        index_bytes: bytemuck::cast_slice(&indices).to_vec(),
        vertex_format: VertexFormat::Position,
        sub_meshes: Vec::new(),
    }
}

/// A flat scene: every entity is a root placed at `(index, 0, 0)`.
#[derive(Default)]
pub struct TestScene {
    pub renderables: Vec<RenderableDesc>,
    pub transforms: HashMap<EntityId, Transform>,
    pub velocities: HashMap<EntityId, Vec3>,
}

impl TestScene {
    pub fn add(&mut self, index: u32, mesh: AssetUUID, material: AssetUUID) -> EntityId {
        let entity = EntityId::new(index, 0);
        self.renderables.push(RenderableDesc {
            entity,
            mesh,
            material,
            sub_mesh: 0,
        });
        self.transforms.insert(
            entity,
            Transform::from_translation(Vec3::new(index as f32, 0.0, 0.0)),
        );
        entity
    }
}

impl SceneSource for TestScene {
    fn renderables(&self) -> Vec<RenderableDesc> {
        self.renderables.clone()
    }

    fn local_transform(&self, entity: EntityId) -> Option<Transform> {
        self.transforms.get(&entity).copied()
    }

    fn parent(&self, _entity: EntityId) -> Option<EntityId> {
        None
    }

    fn linear_velocity(&self, entity: EntityId) -> Option<Vec3> {
        self.velocities.get(&entity).copied()
    }

    fn active_camera(&self) -> Option<CameraView> {
        Some(CameraView {
            view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y),
            projection: Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0),
            position: Vec3::new(0.0, 0.0, 10.0),
        })
    }
}

/// The three-renderable scene: two instances of mesh A and one of mesh B, all
/// drawn with material X.
pub fn three_renderables() -> TestScene {
    let mut scene = TestScene::default();
    scene.add(1, MESH_A, MAT_X);
    scene.add(2, MESH_A, MAT_X);
    scene.add(3, MESH_B, MAT_X);
    scene
}

/// A small configuration so the mock device does not allocate the default pools.
pub fn config() -> RendererConfig {
    RendererConfig {
        frames: FrameConfig {
            frames_in_flight: 2,
            max_objects: 64,
            max_materials: 16,
            max_lights: 4,
            max_textures: 16,
            ..FrameConfig::default()
        },
        geometry: GeometryConfig {
            vertex_page_size: 12 * 64,
            index_page_size: 4 * 64,
            ..GeometryConfig::default()
        },
        batching: BatchingConfig {
            max_instances_per_command: 64,
            max_commands_per_batch: 64,
        },
        ..RendererConfig::default()
    }
}

pub fn agent(device: &MockGraphicsDevice) -> RenderAgent {
    RenderAgent::new(
        Arc::new(device.clone()),
        config(),
        TextureFormat::Bgra8UnormSrgb,
    )
    .unwrap()
}

/// Decodes the first `count` commands of an indirect buffer.
pub fn read_commands(bytes: &[u8], count: usize) -> Vec<IndexedIndirectCommand> {
    let size = IndexedIndirectCommand::SIZE as usize;
    (0..count)
        .map(|i| bytemuck::pod_read_unaligned(&bytes[i * size..(i + 1) * size]))
        .collect()
}

/// The indirect draws recorded by a submission.
pub fn indirect_draws(commands: &[MockCommand]) -> Vec<u64> {
    commands
        .iter()
        .filter_map(|command| match command {
            MockCommand::DrawIndexedIndirect { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect()
}
