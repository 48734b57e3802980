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

//! The wgpu backend.
//!
//! Resource ids handed out by [`WgpuDevice`] index into mutex-guarded maps of
//! wgpu objects. Every pipeline shares one bind group layout, laid out the way the
//! render agent binds its per-frame buffers and the bindless texture table.

mod command;
mod context;
mod conversions;
mod device;
mod surface;

pub use self::context::WgpuGraphicsContext;
pub use self::conversions::{from_wgpu_texture_format, IntoWgpu};
pub use self::device::WgpuDevice;
pub use self::surface::WgpuSurface;

use lumen_core::math::SurfaceSize;
use std::sync::Arc;
use winit::window::Window;

/// Boots wgpu for `window`: picks an adapter, opens the device and configures the
/// swapchain.
///
/// `texture_table_capacity` is the length of the bindless texture array every
/// pipeline is laid out for. It must match the renderer's `max_textures`.
pub fn create_backend(
    window: Arc<Window>,
    texture_table_capacity: u32,
) -> anyhow::Result<(WgpuDevice, WgpuSurface)> {
    let size = window.inner_size();
    let (context, surface) =
        pollster::block_on(WgpuGraphicsContext::new(window, texture_table_capacity))?;
    let device = WgpuDevice::new(context, texture_table_capacity);
    let surface = WgpuSurface::new(
        surface,
        device.clone(),
        SurfaceSize::new(size.width, size.height),
    )?;
    Ok((device, surface))
}
