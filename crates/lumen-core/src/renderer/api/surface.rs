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

//! Types exchanged with the presentation surface.

use super::{TextureId, TextureViewId};
use crate::math::SurfaceSize;

/// A swapchain image acquired for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceImage {
    /// The swapchain texture.
    pub texture: TextureId,
    /// A render-target view of it.
    pub view: TextureViewId,
    /// Its size.
    pub size: SurfaceSize,
}

/// Outcome of a swapchain image acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceAcquire {
    /// An image is ready to be rendered into.
    Ready(SurfaceImage),
    /// The swapchain no longer matches the surface and must be rebuilt.
    Outdated,
}

/// Outcome of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// The image was queued for display.
    Presented,
    /// The image was displayed or dropped, and the swapchain must be rebuilt
    /// before the next frame.
    Outdated,
}
