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

//! Frame loop behaviour: swapchain rebuilds, fence timeouts, telemetry and shutdown.

mod common;

use common::*;
use lumen_agents::render_agent::{FrameOutcome, RenderAgent};
use lumen_core::config::RendererConfig;
use lumen_core::math::SurfaceSize;
use lumen_core::renderer::{FrameDirty, RenderError, TextureFormat};
use lumen_core::testing::{MockGraphicsDevice, MockSurface};
use lumen_lanes::render_lane::Interpolation;
use lumen_telemetry::metrics::{MetricId, MetricValue};
use lumen_telemetry::MetricsRegistry;
use std::sync::Arc;

#[test]
fn test_invalid_config_is_rejected() {
    let device = MockGraphicsDevice::new();
    let mut config = RendererConfig::default();
    config.frames.frames_in_flight = 5;
    let result = RenderAgent::new(Arc::new(device.clone()), config, TextureFormat::Bgra8UnormSrgb);
    assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    assert_eq!(device.live_buffer_count(), 0);
}

#[test]
fn test_resize_reconfigures_surface_and_targets() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(agent.render_targets().unwrap().size, SurfaceSize::new(320, 240));

    agent.resize(SurfaceSize::new(640, 480));
    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(surface.reconfigurations, 1);
    assert_eq!(agent.render_targets().unwrap().size, SurfaceSize::new(640, 480));
}

#[test]
fn test_zero_sized_surface_skips_frames() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    agent.resize(SurfaceSize::new(0, 0));
    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped);
    assert_eq!(agent.frame_ring().frame_number(), 0);
    assert_eq!(surface.presented, 0);

    agent.resize(SurfaceSize::new(320, 240));
    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
}

#[test]
fn test_outdated_acquire_abandons_the_frame() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    surface.fail_next_acquire();
    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::SwapchainRebuilt);
    assert_eq!(surface.reconfigurations, 1);
    assert_eq!(surface.presented, 0);
    assert!(agent.current_frame_slot().is_none());
    assert!(agent
        .frame_ring()
        .slots()
        .iter()
        .all(|slot| slot.needs(FrameDirty::SWAPCHAIN)));

    // The abandoned slot is usable again straight away.
    for _ in 0..2 {
        let outcome = agent
            .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
    }
    assert_eq!(surface.presented, 2);
}

#[test]
fn test_outdated_present_rebuilds_swapchain() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    surface.fail_next_present();
    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::SwapchainRebuilt);
    assert_eq!(surface.reconfigurations, 1);

    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
}

#[test]
fn test_unretired_slot_is_a_fatal_timeout() {
    let device = MockGraphicsDevice::new();
    device.set_auto_signal(false);
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    for _ in 0..2 {
        agent
            .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
            .unwrap();
    }
    let camera = agent.frame_ring().slots()[0].buffers().camera;
    let writes = device.write_count(camera);

    // Slot 0 is still in flight: the third frame must not touch it.
    let err = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap_err();
    assert!(matches!(err, RenderError::DeviceTimeout { slot: 0, .. }));
    assert!(err.is_fatal());
    assert_eq!(device.write_count(camera), writes);

    device.signal_all_fences();
    let outcome = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(device.write_count(camera), writes + 1);
    device.signal_all_fences();
}

#[test]
fn test_lost_device_is_fatal() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    device.lose_device();
    let err = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap_err();
    assert!(matches!(err, RenderError::DeviceLost(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_telemetry_counts_frames() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let registry = MetricsRegistry::new();
    let mut agent = agent(&device).with_telemetry(&registry);

    for _ in 0..3 {
        agent
            .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
            .unwrap();
    }

    let frames = registry.get_metric(&MetricId::new("renderer", "frames")).unwrap();
    assert_eq!(frames.value, MetricValue::Counter(3));
    let drawn = registry.get_metric(&MetricId::new("renderer", "drawn_instances")).unwrap();
    assert_eq!(drawn.value, MetricValue::Gauge(3.0));
    let resident = registry.get_metric(&MetricId::new("geometry", "resident_meshes")).unwrap();
    assert_eq!(resident.value, MetricValue::Gauge(2.0));

    let stats = agent.stats();
    assert_eq!(stats.frame_index, 2);
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.commands, 2);
    assert_eq!(stats.resident_materials, 1);
}

#[test]
fn test_shutdown_releases_every_resource() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);

    for _ in 0..3 {
        agent
            .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
            .unwrap();
    }
    assert!(device.live_pipeline_count() > 0);

    agent.shutdown();
    agent.shutdown();
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(device.live_fence_count(), 0);
    assert_eq!(device.live_pipeline_count(), 0);
    // Only the swapchain image owned by the surface is left.
    assert_eq!(device.live_texture_count(), 1);

    let err = agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap_err();
    assert!(matches!(err, RenderError::Internal(_)));
}

#[test]
fn test_dropping_the_agent_shuts_it_down() {
    let device = MockGraphicsDevice::new();
    let mut surface = MockSurface::new(&device, 320, 240);
    let assets = TestAssets::new();
    let scene = three_renderables();
    let mut agent = agent(&device);
    agent
        .render_frame(&scene, &assets, &mut surface, Interpolation::NONE)
        .unwrap();

    drop(agent);
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(device.live_fence_count(), 0);
}
