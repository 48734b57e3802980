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


use anyhow::anyhow;
use lumen_core::math::SurfaceSize;
use lumen_core::renderer::{
    PresentStatus, PresentationSurface, RenderError, SurfaceAcquire, SurfaceImage, TextureFormat,
    TextureId, TextureViewId,
};

use super::device::WgpuDevice;

/// A swapchain image handed out to the renderer and not presented yet.
#[derive(Debug)]
struct AcquiredImage {
    surface_texture: wgpu::SurfaceTexture,
    texture: TextureId,
    view: TextureViewId,
}

/// The swapchain of a window, presenting through a [`WgpuDevice`].
///
/// Acquired images are registered in the device as external textures so the
/// renderer can copy into them by id. They are unregistered again on present.
#[derive(Debug)]
pub struct WgpuSurface {
    surface: wgpu::Surface<'static>,
    device: WgpuDevice,
    config: wgpu::SurfaceConfiguration,
    format: TextureFormat,
    size: SurfaceSize,
    current: Option<AcquiredImage>,
}

impl WgpuSurface {
    /// Picks a format and present mode, then configures the swapchain.
    pub fn new(
        surface: wgpu::Surface<'static>,
        device: WgpuDevice,
        size: SurfaceSize,
    ) -> anyhow::Result<Self> {
        let capabilities = device.surface_capabilities(&surface);
        let (wgpu_format, format) = device
            .pick_surface_format(&capabilities)
            .ok_or_else(|| anyhow!("No supported swapchain format in {:?}", capabilities.formats))?;
        let alpha_mode = capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format: wgpu_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: capabilities
                .present_modes
                .iter()
                .copied()
                .find(|m| *m == wgpu::PresentMode::Mailbox)
                .unwrap_or(wgpu::PresentMode::Fifo), // Fifo is guaranteed to be supported
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        if !size.is_empty() {
            surface.configure(device.wgpu_device(), &config);
        }
        log::info!(
            "WgpuSurface: Configured {}x{} swapchain ({:?}, {:?}).",
            size.width,
            size.height,
            wgpu_format,
            config.present_mode
        );

        Ok(Self {
            surface,
            device,
            config,
            format,
            size,
            current: None,
        })
    }

    fn release_current(&mut self) -> Option<wgpu::SurfaceTexture> {
        let acquired = self.current.take()?;
        self.device
            .unregister_external_texture(acquired.texture, acquired.view);
        Some(acquired.surface_texture)
    }
}

impl PresentationSurface for WgpuSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn reconfigure(&mut self, size: SurfaceSize) -> Result<(), RenderError> {
        // An image acquired for the old swapchain cannot be presented anymore.
        drop(self.release_current());
        self.size = size;
        if size.is_empty() {
            log::debug!("WgpuSurface: Surface has no area; configuration deferred.");
            return Ok(());
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(self.device.wgpu_device(), &self.config);
        log::info!(
            "WgpuSurface: Reconfigured swapchain to {}x{}.",
            size.width,
            size.height
        );
        Ok(())
    }

    fn acquire_image(&mut self) -> Result<SurfaceAcquire, RenderError> {
        if self.size.is_empty() {
            return Ok(SurfaceAcquire::Outdated);
        }
        if let Some(current) = &self.current {
            return Err(RenderError::SurfaceAcquisitionFailed(format!(
                "Swapchain image {:?} was acquired and never presented",
                current.texture
            )));
        }

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(e @ wgpu::SurfaceError::Lost) | Err(e @ wgpu::SurfaceError::Outdated) => {
                log::warn!("WgpuSurface: Swapchain surface lost or outdated ({e:?}).");
                return Ok(SurfaceAcquire::Outdated);
            }
            Err(e @ wgpu::SurfaceError::OutOfMemory) => {
                log::error!("WgpuSurface: Swapchain OutOfMemory! ({e:?})");
                return Err(RenderError::DeviceLost(format!("OutOfMemory: {e:?}")));
            }
            Err(e @ wgpu::SurfaceError::Timeout) => {
                log::warn!("WgpuSurface: Swapchain Timeout acquiring frame. ({e:?})");
                return Err(RenderError::SurfaceAcquisitionFailed(format!(
                    "Timeout: {e:?}"
                )));
            }
            Err(e) => {
                log::error!("WgpuSurface: Unexpected SurfaceError: {e:?}");
                return Err(RenderError::SurfaceAcquisitionFailed(format!(
                    "Unexpected SurfaceError: {e:?}"
                )));
            }
        };

        let (texture, view) = self
            .device
            .register_external_texture(surface_texture.texture.clone())?;
        self.current = Some(AcquiredImage {
            surface_texture,
            texture,
            view,
        });
        Ok(SurfaceAcquire::Ready(SurfaceImage {
            texture,
            view,
            size: self.size,
        }))
    }

    fn present(&mut self, image: SurfaceImage) -> Result<PresentStatus, RenderError> {
        match &self.current {
            Some(current) if current.texture == image.texture => {}
            _ => {
                return Err(RenderError::Internal(format!(
                    "Presenting swapchain image {:?} that is not the acquired one",
                    image.texture
                )))
            }
        }
        let Some(surface_texture) = self.release_current() else {
            return Err(RenderError::FrameNotAcquired);
        };
        let suboptimal = surface_texture.suboptimal;
        surface_texture.present();
        if suboptimal {
            log::debug!("WgpuSurface: Presented a suboptimal image; swapchain needs a rebuild.");
            Ok(PresentStatus::Outdated)
        } else {
            Ok(PresentStatus::Presented)
        }
    }
}
