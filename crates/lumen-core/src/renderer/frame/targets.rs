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

use super::{FrameDirty, FrameRing, RetiredResource};
use crate::math::SurfaceSize;
use crate::renderer::api::{TextureDescriptor, TextureFormat, TextureId, TextureUsage, TextureViewId};
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::GraphicsDevice;

/// Format of the offscreen depth target.
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// A color and depth target pair sized to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargets {
    /// Size of both targets.
    pub size: SurfaceSize,
    /// Offscreen color texture.
    pub color: TextureId,
    /// View of the color texture.
    pub color_view: TextureViewId,
    /// Depth texture.
    pub depth: TextureId,
    /// View of the depth texture.
    pub depth_view: TextureViewId,
}

impl RenderTargets {
    fn create(
        device: &dyn GraphicsDevice,
        size: SurfaceSize,
        color_format: TextureFormat,
    ) -> Result<Self, ResourceError> {
        let color = device.create_texture(&TextureDescriptor {
            label: Some("offscreen color".into()),
            size: size.extent(),
            format: color_format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        })?;
        let depth = match device.create_texture(&TextureDescriptor {
            label: Some("offscreen depth".into()),
            size: size.extent(),
            format: DEPTH_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
        }) {
            Ok(depth) => depth,
            Err(e) => {
                RetiredResource::Texture(color).destroy_logged(device);
                return Err(e);
            }
        };
        let color_view = device.create_texture_view(color);
        let depth_view = device.create_texture_view(depth);
        match (color_view, depth_view) {
            (Ok(color_view), Ok(depth_view)) => Ok(Self {
                size,
                color,
                color_view,
                depth,
                depth_view,
            }),
            (color_view, depth_view) => {
                let mut error = ResourceError::NotFound;
                for view in [color_view, depth_view] {
                    match view {
                        Ok(view) => {
                            RetiredResource::TextureView(view).destroy_logged(device);
                        }
                        Err(e) => error = e,
                    }
                }
                RetiredResource::Texture(color).destroy_logged(device);
                RetiredResource::Texture(depth).destroy_logged(device);
                Err(error)
            }
        }
    }

    fn resources(&self) -> [RetiredResource; 4] {
        [
            RetiredResource::TextureView(self.color_view),
            RetiredResource::TextureView(self.depth_view),
            RetiredResource::Texture(self.color),
            RetiredResource::Texture(self.depth),
        ]
    }
}

/// Window-size-dependent targets, recreated on resize.
///
/// The previous pair stays alive until every frame slot has acquired a frame
/// against the new size; only then is it handed to deferred destruction.
#[derive(Debug)]
pub struct OffscreenTargets {
    color_format: TextureFormat,
    current: Option<RenderTargets>,
    stale: Vec<RenderTargets>,
    recreations: u64,
}

impl OffscreenTargets {
    /// Creates an empty set; targets are allocated on the first [`Self::ensure`].
    pub fn new(color_format: TextureFormat) -> Self {
        Self {
            color_format,
            current: None,
            stale: Vec::new(),
            recreations: 0,
        }
    }

    /// The targets matching the last requested size.
    pub fn current(&self) -> Option<&RenderTargets> {
        self.current.as_ref()
    }

    /// Number of pairs waiting for every slot to move to the new size.
    pub fn stale_count(&self) -> usize {
        self.stale.len()
    }

    /// How many times the targets were (re)created.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Changes the color format; the next [`Self::ensure`] recreates the targets.
    pub fn set_color_format(&mut self, format: TextureFormat) {
        if self.color_format != format {
            self.color_format = format;
            if let Some(current) = self.current.take() {
                self.stale.push(current);
            }
        }
    }

    /// Makes sure targets of `size` exist, recreating them if needed.
    ///
    /// Must be called while a frame is being recorded. Allocation failure is retried
    /// once; a second failure is fatal.
    pub fn ensure(
        &mut self,
        device: &dyn GraphicsDevice,
        ring: &mut FrameRing,
        size: SurfaceSize,
    ) -> Result<&RenderTargets, RenderError> {
        let up_to_date = self.current.as_ref().is_some_and(|t| t.size == size);
        if !up_to_date {
            let targets = match RenderTargets::create(device, size, self.color_format) {
                Ok(targets) => targets,
                Err(first) => {
                    log::warn!("Offscreen target allocation failed ({first}), retrying once");
                    RenderTargets::create(device, size, self.color_format).map_err(|e| {
                        log::error!("Offscreen target allocation failed again: {e}");
                        RenderError::Resource(ResourceError::AllocationFailed {
                            label: "offscreen targets".to_string(),
                            size: u64::from(size.width)
                                * u64::from(size.height)
                                * u64::from(self.color_format.bytes_per_pixel()
                                    + DEPTH_FORMAT.bytes_per_pixel()),
                        })
                    })?
                }
            };
            if let Some(previous) = self.current.replace(targets) {
                self.stale.push(previous);
            }
            self.recreations += 1;
            ring.mark_all(FrameDirty::OFFSCREEN);
            log::info!("Offscreen targets recreated at {}x{}", size.width, size.height);
        }

        self.note_slot_rendered(ring);
        self.current
            .as_ref()
            .ok_or_else(|| RenderError::Internal("offscreen targets missing".to_string()))
    }

    /// Clears the current slot's [`FrameDirty::OFFSCREEN`] flag and retires the old
    /// targets once no slot is left on the previous size.
    fn note_slot_rendered(&mut self, ring: &mut FrameRing) {
        if let Some(slot) = ring.current_slot_mut() {
            slot.clear(FrameDirty::OFFSCREEN);
        }
        if !self.stale.is_empty() && !ring.any_slot_needs(FrameDirty::OFFSCREEN) {
            for targets in self.stale.drain(..) {
                for resource in targets.resources() {
                    ring.retire(resource);
                }
            }
        }
    }

    /// Destroys every owned texture. The GPU must be idle.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for targets in self.current.take().into_iter().chain(self.stale.drain(..)) {
            for resource in targets.resources() {
                if let Err(e) = resource.destroy(device) {
                    log::warn!("Failed to destroy offscreen {resource:?}: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use crate::testing::MockGraphicsDevice;

    fn frame(
        ring: &mut FrameRing,
        targets: &mut OffscreenTargets,
        device: &MockGraphicsDevice,
        size: SurfaceSize,
    ) -> RenderTargets {
        ring.acquire_frame(device).unwrap();
        let current = *targets.ensure(device, ring, size).unwrap();
        let encoder = device.create_command_encoder(None);
        ring.submit(device, encoder.finish()).unwrap();
        current
    }

    #[test]
    fn test_old_targets_outlive_every_slot_on_old_size() {
        let device = MockGraphicsDevice::new();
        let mut ring = FrameRing::new(&device, &FrameConfig::default()).unwrap();
        let mut targets = OffscreenTargets::new(TextureFormat::Bgra8UnormSrgb);
        let small = SurfaceSize::new(320, 240);
        let large = SurfaceSize::new(640, 480);

        let old = frame(&mut ring, &mut targets, &device, small); // frame 0, slot 0
        frame(&mut ring, &mut targets, &device, small); // frame 1, slot 1

        let new = frame(&mut ring, &mut targets, &device, large); // frame 2, slot 0
        assert_ne!(old.color, new.color);
        assert_eq!(targets.stale_count(), 1);
        assert!(device.texture_exists(old.color));

        // Frame 3 is the last slot to move to the new size; the old pair is retired.
        frame(&mut ring, &mut targets, &device, large);
        assert_eq!(targets.stale_count(), 0);
        assert!(device.texture_exists(old.color));

        // Two more frames cycle the ring past the retirement point.
        frame(&mut ring, &mut targets, &device, large);
        frame(&mut ring, &mut targets, &device, large);
        assert!(!device.texture_exists(old.color));
        assert!(!device.texture_exists(old.depth));
        assert!(device.texture_exists(new.color));
    }

    #[test]
    fn test_allocation_is_retried_once() {
        let device = MockGraphicsDevice::new();
        let mut ring = FrameRing::new(&device, &FrameConfig::default()).unwrap();
        let mut targets = OffscreenTargets::new(TextureFormat::Rgba8Unorm);

        device.fail_next_texture_allocations(1);
        ring.acquire_frame(&device).unwrap();
        assert!(targets.ensure(&device, &mut ring, SurfaceSize::new(64, 64)).is_ok());
    }

    #[test]
    fn test_second_allocation_failure_is_fatal() {
        let device = MockGraphicsDevice::new();
        let mut ring = FrameRing::new(&device, &FrameConfig::default()).unwrap();
        let mut targets = OffscreenTargets::new(TextureFormat::Rgba8Unorm);

        device.fail_next_texture_allocations(2);
        ring.acquire_frame(&device).unwrap();
        let err = targets
            .ensure(&device, &mut ring, SurfaceSize::new(64, 64))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Resource(ResourceError::AllocationFailed { .. })
        ));
        assert!(err.is_fatal());
    }
}
