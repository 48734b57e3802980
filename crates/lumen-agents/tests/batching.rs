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

//! Draw list construction and per-slot uploads, end to end on the mock device.

mod common;

use common::*;
use lumen_agents::render_agent::{bindings, FrameOutcome};
use lumen_core::math::{Vec3, Vec4};
use lumen_core::renderer::FrameDirty;
use lumen_core::scene::{EntityId, SceneEvent};
use lumen_core::testing::{MockCommand, MockGraphicsDevice, MockSurface};
use lumen_lanes::render_lane::Interpolation;

fn translation(agent: &lumen_agents::render_agent::RenderAgent, entity: EntityId) -> Vec4 {
    let position = agent
        .draw_list()
        .instances
        .iter()
        .position(|instance| instance.entity == entity)
        .unwrap();
    Vec4::from_array(agent.objects()[position].model[3])
}

#[test]
fn test_shared_material_is_drawn_in_one_batch() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(surface.presented, 1);

    let batches = agent.draw_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].material, MAT_X);
    assert_eq!(batches[0].command_count, 2);

    let list = agent.draw_list();
    assert_eq!(list.commands.len(), 2);
    assert_eq!(list.commands[0].instance_count, 2);
    assert_eq!(list.commands[0].first_instance, 0);
    assert_eq!(list.commands[1].instance_count, 1);
    assert_eq!(list.commands[1].first_instance, 2);
    assert_eq!(list.excluded.total(), 0);
    assert_eq!(agent.objects().len(), 3);

    // The GPU copy of the commands matches the CPU one.
    let indirect = agent.frame_ring().slots()[0].buffers().indirect;
    let uploaded = read_commands(&device.buffer_data(indirect).unwrap(), 2);
    assert_eq!(uploaded, list.commands);

    let submission = device.last_submission();
    assert_eq!(indirect_draws(&submission), vec![0, 20]);
    assert!(submission
        .iter()
        .any(|command| matches!(command, MockCommand::SetPipeline(p) if *p == batches[0].pipeline)));
    assert!(submission
        .iter()
        .any(|command| matches!(command, MockCommand::CopyTexture { .. })));
}

#[test]
fn test_empty_scene_presents_without_draws() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = TestScene::default();
    let mut agent = agent(&device);

    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
    assert!(agent.draw_batches().is_empty());
    assert!(indirect_draws(&device.last_submission()).is_empty());
    assert!(device
        .last_submission()
        .iter()
        .any(|command| matches!(command, MockCommand::BeginPass { .. })));
}

#[test]
fn test_unchanged_frames_skip_uploads() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    for _ in 0..4 {
        agent
            .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
            .unwrap();
    }

    for slot in agent.frame_ring().slots() {
        let buffers = slot.buffers();
        // Each slot uploaded its arrays once, when it first recorded.
        assert_eq!(device.write_count(buffers.objects), 1);
        assert_eq!(device.write_count(buffers.indirect), 1);
        assert_eq!(device.write_count(buffers.materials), 1);
        // The camera is written every time the slot records.
        assert_eq!(device.write_count(buffers.camera), 2);
        assert!(!slot.needs(FrameDirty::OBJECTS | FrameDirty::INDIRECT));
    }
}

#[test]
fn test_bind_group_uses_frame_buffers() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();

    let pipeline = agent.draw_batches()[0].pipeline;
    let slot = &agent.frame_ring().slots()[0];
    let group = slot.bind_group(pipeline).unwrap();
    let descriptor = device.bind_group(group).unwrap();
    assert_eq!(descriptor.pipeline, pipeline);
    assert_eq!(descriptor.group, 0);
    let slots: Vec<u32> = descriptor.entries.iter().map(|e| e.binding).collect();
    assert_eq!(
        slots,
        vec![
            bindings::CAMERA,
            bindings::OBJECTS,
            bindings::MATERIALS,
            bindings::LIGHTS,
            bindings::TEXTURES
        ]
    );
}

#[test]
fn test_transform_event_refreshes_one_object() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let mut scene = three_renderables();
    let mut agent = agent(&device);
    let (sender, receiver) = crossbeam_channel::unbounded();
    agent.attach_events(receiver);

    for _ in 0..2 {
        agent
            .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
            .unwrap();
    }
    let moved = EntityId::new(2, 0);
    assert_eq!(translation(&agent, moved), Vec4::new(2.0, 0.0, 0.0, 1.0));

    scene.transforms.insert(
        moved,
        lumen_core::math::Transform::from_translation(Vec3::new(5.0, 1.0, 0.0)),
    );
    sender.send(SceneEvent::TransformChanged(moved)).unwrap();
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();

    assert_eq!(translation(&agent, moved), Vec4::new(5.0, 1.0, 0.0, 1.0));
    assert_eq!(
        translation(&agent, EntityId::new(1, 0)),
        Vec4::new(1.0, 0.0, 0.0, 1.0)
    );
    let objects = agent.frame_ring().slots()[0].buffers().objects;
    assert_eq!(device.write_count(objects), 2);
    // The draw list itself did not change.
    let indirect = agent.frame_ring().slots()[0].buffers().indirect;
    assert_eq!(device.write_count(indirect), 1);
}

#[test]
fn test_moving_objects_are_extrapolated_every_frame() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let mut scene = three_renderables();
    let mover = EntityId::new(3, 0);
    scene.velocities.insert(mover, Vec3::new(0.0, 10.0, 0.0));
    let mut agent = agent(&device);
    let interpolation = Interpolation {
        alpha: 0.5,
        fixed_step: 0.1,
    };

    for _ in 0..3 {
        agent
            .render_frame(&scene, &assets, &mut surface, interpolation)
            .unwrap();
    }

    let t = translation(&agent, mover);
    assert!((t - Vec4::new(3.0, 0.5, 0.0, 1.0)).length() < 1e-5);
    // Slot 0 recorded frames 0 and 2 and uploaded objects both times.
    let objects = agent.frame_ring().slots()[0].buffers().objects;
    assert_eq!(device.write_count(objects), 2);
}

#[test]
fn test_renderable_added_rebuilds_draw_list() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let mut scene = three_renderables();
    let mut agent = agent(&device);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(agent.objects().len(), 3);

    let added = scene.add(4, MESH_B, MAT_X);
    agent.handle_event(SceneEvent::RenderableAdded(added));
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();

    assert_eq!(agent.objects().len(), 4);
    let list = agent.draw_list();
    assert_eq!(list.commands.len(), 2);
    assert_eq!(list.commands[1].instance_count, 2);
}
