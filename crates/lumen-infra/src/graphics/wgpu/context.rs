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


use anyhow::{anyhow, Result};
use std::sync::Arc;
use winit::window::Window;

/// Features the bindless texture table cannot work without.
fn required_features() -> wgpu::Features {
    wgpu::Features::TEXTURE_BINDING_ARRAY
        | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING
}

/// Holds the core WGPU state objects required for rendering.
///
/// The surface is handed back separately so it can be owned by the presentation
/// side while the device is shared with the render agent.
#[derive(Debug)]
pub struct WgpuGraphicsContext {
    #[allow(dead_code)]
    pub(crate) instance: wgpu::Instance,
    pub(crate) adapter: wgpu::Adapter,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) adapter_info: wgpu::AdapterInfo,
}

impl WgpuGraphicsContext {
    /// Asynchronously initializes the graphics context for a window.
    ///
    /// ## Arguments
    /// * `window` - The window to present to. It is kept alive by the surface.
    /// * `texture_table_capacity` - Size of the bindless texture table, checked
    ///   against the adapter limits.
    ///
    /// ## Returns
    /// * `Result<(Self, wgpu::Surface)>` - The context and the unconfigured surface.
    pub async fn new(
        window: Arc<Window>,
        texture_table_capacity: u32,
    ) -> Result<(Self, wgpu::Surface<'static>)> {
        log::info!("Initializing WGPU graphics context...");

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|e| anyhow!("Failed to create surface: {e}"))?;
        log::debug!("WGPU surface created for the window.");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("No suitable graphics adapter: {e}"))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?}, Type: {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let available = adapter.features();
        let mut features = required_features();
        if !available.contains(features) {
            return Err(anyhow!(
                "Adapter \"{}\" lacks bindless texture support (requires {:?})",
                adapter_info.name,
                features
            ));
        }
        if available.contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
            features |= wgpu::Features::INDIRECT_FIRST_INSTANCE;
        } else {
            log::warn!("INDIRECT_FIRST_INSTANCE unsupported; batched instances will alias.");
        }

        let limits = adapter.limits();
        if texture_table_capacity > limits.max_binding_array_elements_per_shader_stage {
            return Err(anyhow!(
                "Texture table of {} entries exceeds the adapter limit of {}",
                texture_table_capacity,
                limits.max_binding_array_elements_per_shader_stage
            ));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Lumen Logical Device"),
                required_features: features,
                required_limits: limits,
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {e}"))?;
        log::info!("Logical device and command queue created.");

        device.on_uncaptured_error(std::sync::Arc::new(|e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
        }));
        log::debug!("Active device features: {:?}", device.features());

        Ok((
            Self {
                instance,
                adapter,
                device,
                queue,
                adapter_info,
            },
            surface,
        ))
    }

    /// Name of the adapter backing this context.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }
}
