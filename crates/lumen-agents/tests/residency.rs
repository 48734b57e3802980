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

//! Residency failures, eviction and recovery as seen through the draw list.

mod common;

use common::*;
use lumen_agents::render_agent::FrameOutcome;
use lumen_core::testing::{MockGraphicsDevice, MockSurface};
use lumen_lanes::render_lane::Interpolation;

#[test]
fn test_missing_mesh_is_excluded_until_retried() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let mut assets = TestAssets::new();
    assets.broken.insert(MESH_B);
    let scene = three_renderables();
    let mut agent = agent(&device);

    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
    let list = agent.draw_list();
    assert_eq!(list.commands.len(), 1);
    assert_eq!(list.commands[0].instance_count, 2);
    assert_eq!(list.excluded.missing_mesh, 1);
    assert!(agent.mesh_residency().failure(MESH_B).is_some());

    // The failure is remembered: no reload on later frames.
    let loads = assets.mesh_loads();
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(assets.mesh_loads(), loads);

    assets.broken.clear();
    assert_eq!(agent.retry_failed_assets(), 1);
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    let list = agent.draw_list();
    assert_eq!(list.commands.len(), 2);
    assert_eq!(list.excluded.total(), 0);
    assert_eq!(agent.objects().len(), 3);
}

#[test]
fn test_failed_base_material_excludes_its_renderables() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let mut assets = TestAssets::new();
    assets.broken.insert(BASE);
    let scene = three_renderables();
    let mut agent = agent(&device);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert!(agent.draw_batches().is_empty());
    assert_eq!(agent.draw_list().excluded.missing_material, 3);
    assert!(!agent.material_registry().is_ready(MAT_X));

    assets.broken.clear();
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert!(agent.draw_batches().is_empty());

    assert!(agent.retry_failed_assets() >= 1);
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(agent.draw_batches().len(), 1);
    assert_eq!(agent.draw_list().instances.len(), 3);
}

#[test]
fn test_evicted_mesh_is_loaded_again() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(assets.mesh_loads(), 2);

    assert_eq!(agent.evict_meshes(&[MESH_B]).unwrap(), 1);
    assert!(!agent.geometry_arena().contains(MESH_B));
    assert_eq!(agent.evict_meshes(&[MESH_B]).unwrap(), 0);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(assets.mesh_loads(), 3);
    assert!(agent.geometry_arena().contains(MESH_B));
    assert_eq!(agent.draw_list().commands.len(), 2);
}

#[test]
fn test_geometry_grows_with_the_scene() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let mut assets = TestAssets::new();
    let mut scene = three_renderables();
    let mut agent = agent(&device);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    let before = agent.geometry_arena().stats();

    // Enough new meshes to overflow the initial page of each pool.
    for i in 0..12u32 {
        let id = lumen_core::asset::AssetUUID::from_u128(0x1000 + u128::from(i));
        assets.meshes.insert(id, triangle(12, i as u8));
        scene.add(10 + i, id, MAT_X);
    }
    agent.handle_event(lumen_core::scene::SceneEvent::RenderableAdded(
        lumen_core::scene::EntityId::new(10, 0),
    ));
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();

    let after = agent.geometry_arena().stats();
    assert!(after.grows > before.grows);
    assert_eq!(agent.draw_list().excluded.total(), 0);
    assert_eq!(agent.draw_list().instances.len(), 15);
}

#[test]
fn test_released_material_stops_drawing() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let mut scene = three_renderables();
    scene.add(4, MESH_A, MAT_Y);
    let mut agent = agent(&device);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(agent.draw_batches().len(), 2);
    assert!(agent.material_registry().material_index(MAT_Y).is_some());

    assert!(agent.release_material(MAT_Y));
    assert!(!agent.release_material(MAT_Y));
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();

    assert_eq!(agent.draw_batches().len(), 1);
    assert_eq!(agent.draw_batches()[0].material, MAT_X);
    assert_eq!(agent.draw_list().excluded.missing_material, 1);
    // Material X is now the only resident instance.
    assert_eq!(agent.material_registry().material_index(MAT_X), Some(0));
}
