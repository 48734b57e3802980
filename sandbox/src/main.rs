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


//! lumen sandbox: opens a window and renders the animated demo scene.
//!
//! Usage: `sandbox [config.ron]`. Without an argument the default renderer
//! configuration is used. Set `LUMEN_LOG` to change the log filter.

mod assets;
mod scene;

use anyhow::{Context, Result};
use assets::DemoAssets;
use crossbeam_channel::{Receiver, Sender};
use lumen_agents::render_agent::{FrameOutcome, RenderAgent};
use lumen_core::math::SurfaceSize;
use lumen_core::renderer::{GraphicsDevice, PresentationSurface};
use lumen_core::scene::SceneEvent;
use lumen_core::RendererConfig;
use lumen_infra::{WgpuDevice, WgpuSurface};
use lumen_lanes::render_lane::Interpolation;
use lumen_telemetry::MetricsRegistry;
use scene::DemoScene;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

/// Simulation rate of the demo scene.
const FIXED_STEP: f32 = 1.0 / 60.0;
/// Upper bound on simulation steps per rendered frame.
const MAX_STEPS_PER_FRAME: u32 = 5;
const SUMMARY_PERIOD: Duration = Duration::from_secs(2);

/// Everything that only exists while a window is open. Field order is drop
/// order: the agent must release its GPU resources before the surface goes.
struct Runtime {
    agent: RenderAgent,
    surface: WgpuSurface,
    device: WgpuDevice,
    window: Arc<Window>,
}

/// Accumulates wall time into fixed simulation steps.
struct FixedClock {
    last: Instant,
    accumulator: f32,
}

impl FixedClock {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            accumulator: 0.0,
        }
    }

    /// Returns how many fixed steps to simulate now.
    fn advance(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last).as_secs_f32();
        self.last = now;
        let steps = (self.accumulator / FIXED_STEP) as u32;
        self.accumulator -= steps as f32 * FIXED_STEP;
        if steps > MAX_STEPS_PER_FRAME {
            log::debug!("Simulation fell behind by {} steps", steps - MAX_STEPS_PER_FRAME);
        }
        steps.min(MAX_STEPS_PER_FRAME)
    }

    fn interpolation(&self) -> Interpolation {
        Interpolation {
            alpha: (self.accumulator / FIXED_STEP).clamp(0.0, 1.0),
            fixed_step: FIXED_STEP,
        }
    }
}

struct Sandbox {
    config: RendererConfig,
    runtime: Option<Runtime>,
    assets: DemoAssets,
    scene: DemoScene,
    events: Sender<SceneEvent>,
    event_receiver: Option<Receiver<SceneEvent>>,
    metrics: MetricsRegistry,
    clock: FixedClock,
    last_summary: Instant,
    failure: Option<anyhow::Error>,
}

impl Sandbox {
    fn new(config: RendererConfig) -> Self {
        let (events, event_receiver) = crossbeam_channel::unbounded();
        Self {
            config,
            runtime: None,
            assets: DemoAssets::new(),
            scene: DemoScene::new(16.0 / 9.0),
            events,
            event_receiver: Some(event_receiver),
            metrics: MetricsRegistry::new(),
            clock: FixedClock::new(),
            last_summary: Instant::now(),
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<Runtime> {
        let attributes = Window::default_attributes()
            .with_title("lumen sandbox")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create the window")?,
        );
        let size = window.inner_size();
        self.scene
            .set_aspect(size.width as f32 / size.height.max(1) as f32);

        let (device, surface) =
            lumen_infra::create_backend(Arc::clone(&window), self.config.frames.max_textures)?;
        log::info!("Rendering on \"{}\"", device.adapter_name());

        let shared: Arc<dyn GraphicsDevice> = Arc::new(device.clone());
        let mut agent = RenderAgent::new(shared, self.config.clone(), surface.format())?
            .with_telemetry(&self.metrics);
        if let Some(receiver) = self.event_receiver.take() {
            agent.attach_events(receiver);
        }

        Ok(Runtime {
            agent,
            surface,
            device,
            window,
        })
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        for _ in 0..self.clock.advance() {
            self.scene.step(FIXED_STEP, &self.events);
        }

        match runtime.agent.render_frame(
            &self.scene,
            &self.assets,
            &mut runtime.surface,
            self.clock.interpolation(),
        ) {
            Ok(FrameOutcome::Presented) => {}
            Ok(outcome) => log::debug!("Frame outcome: {outcome:?}"),
            Err(e) if e.is_fatal() => {
                log::error!("Rendering stopped: {e}");
                self.failure = Some(e.into());
                event_loop.exit();
                return;
            }
            Err(e) => log::warn!("Frame dropped: {e}"),
        }

        if self.last_summary.elapsed() >= SUMMARY_PERIOD {
            self.last_summary = Instant::now();
            log_summary(runtime);
        }
    }
}

fn log_summary(runtime: &Runtime) {
    let stats = runtime.agent.stats();
    log::info!("--- Frame {} ---", stats.frame_index);
    log::info!(
        "  CPU: {:.2} ms, {} batches, {} commands, {} drawn, {} excluded",
        stats.cpu_frame_time.as_secs_f64() * 1000.0,
        stats.batches,
        stats.commands,
        stats.drawn_instances,
        stats.excluded_instances
    );
    log::info!(
        "  Resident: {} materials, {} textures",
        stats.resident_materials,
        stats.resident_textures
    );
    log::info!(
        "  VRAM: {:.2} MB (Peak: {:.2} MB)",
        runtime.device.vram_allocated_bytes() as f64 / (1024.0 * 1024.0),
        runtime.device.vram_peak_bytes() as f64 / (1024.0 * 1024.0)
    );
}

impl ApplicationHandler for Sandbox {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.runtime.is_some() {
            return;
        }
        log::info!("Application resumed. Initializing window and renderer...");
        match self.start(event_loop) {
            Ok(runtime) => self.runtime = Some(runtime),
            Err(e) => {
                log::error!("Sandbox failed to start: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match self.runtime.as_ref() {
            Some(runtime) if runtime.window.id() == id => {}
            _ => return,
        }
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Shutdown requested, exiting event loop...");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::info!("Window resized to: {}x{}", size.width, size.height);
                if size.height > 0 {
                    self.scene
                        .set_aspect(size.width as f32 / size.height as f32);
                }
                if let Some(runtime) = self.runtime.as_mut() {
                    runtime
                        .agent
                        .resize(SurfaceSize::new(size.width, size.height));
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(runtime) = self.runtime.as_ref() {
            runtime.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut runtime) = self.runtime.take() {
            runtime.agent.shutdown();
            log_summary(&runtime);
        }
        log::info!("Sandbox shut down.");
    }
}

fn load_config() -> Result<RendererConfig> {
    match std::env::args_os().nth(1) {
        Some(path) => {
            RendererConfig::load(&path)
                .with_context(|| format!("Failed to load {}", path.to_string_lossy()))
        }
        None => Ok(RendererConfig::default()),
    }
}

fn main() -> Result<()> {
    lumen_telemetry::init_logging();
    let config = load_config()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut sandbox = Sandbox::new(config);
    event_loop.run_app(&mut sandbox)?;

    match sandbox.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
