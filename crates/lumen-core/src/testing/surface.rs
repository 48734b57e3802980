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

use super::MockGraphicsDevice;
use crate::math::SurfaceSize;
use crate::renderer::api::{
    PresentStatus, SurfaceAcquire, SurfaceImage, TextureDescriptor, TextureFormat, TextureUsage,
};
use crate::renderer::error::RenderError;
use crate::renderer::traits::{GraphicsDevice, PresentationSurface};

/// A scriptable [`PresentationSurface`] backed by a [`MockGraphicsDevice`].
#[derive(Debug)]
pub struct MockSurface {
    device: MockGraphicsDevice,
    size: SurfaceSize,
    format: TextureFormat,
    image: Option<SurfaceImage>,
    outdated_acquires: usize,
    outdated_presents: usize,
    /// Number of `reconfigure` calls.
    pub reconfigurations: usize,
    /// Number of images presented.
    pub presented: usize,
}

impl MockSurface {
    /// Creates a surface of the given size.
    pub fn new(device: &MockGraphicsDevice, width: u32, height: u32) -> Self {
        Self {
            device: device.clone(),
            size: SurfaceSize::new(width, height),
            format: TextureFormat::Bgra8UnormSrgb,
            image: None,
            outdated_acquires: 0,
            outdated_presents: 0,
            reconfigurations: 0,
            presented: 0,
        }
    }

    /// Simulates a window resize without reconfiguring the swapchain.
    pub fn resize_window(&mut self, width: u32, height: u32) {
        self.size = SurfaceSize::new(width, height);
        self.image = None;
    }

    /// The next acquisition reports an outdated swapchain.
    pub fn fail_next_acquire(&mut self) {
        self.outdated_acquires += 1;
    }

    /// The next present reports an outdated swapchain.
    pub fn fail_next_present(&mut self) {
        self.outdated_presents += 1;
    }

    /// Returns the swapchain image, creating it on first use.
    pub fn next_image(&mut self) -> SurfaceImage {
        if let Some(image) = self.image {
            return image;
        }
        let texture = self
            .device
            .create_texture(&TextureDescriptor {
                label: Some("mock swapchain image".into()),
                size: self.size.extent(),
                format: self.format,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST,
            })
            .expect("mock swapchain texture");
        let view = self
            .device
            .create_texture_view(texture)
            .expect("mock swapchain view");
        let image = SurfaceImage {
            texture,
            view,
            size: self.size,
        };
        self.image = Some(image);
        image
    }
}

impl PresentationSurface for MockSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn reconfigure(&mut self, size: SurfaceSize) -> Result<(), RenderError> {
        self.size = size;
        self.image = None;
        self.reconfigurations += 1;
        Ok(())
    }

    fn acquire_image(&mut self) -> Result<SurfaceAcquire, RenderError> {
        if self.outdated_acquires > 0 {
            self.outdated_acquires -= 1;
            return Ok(SurfaceAcquire::Outdated);
        }
        Ok(SurfaceAcquire::Ready(self.next_image()))
    }

    fn present(&mut self, _image: SurfaceImage) -> Result<PresentStatus, RenderError> {
        self.presented += 1;
        if self.outdated_presents > 0 {
            self.outdated_presents -= 1;
            return Ok(PresentStatus::Outdated);
        }
        Ok(PresentStatus::Presented)
    }
}
