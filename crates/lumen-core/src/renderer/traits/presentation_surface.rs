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

use crate::math::SurfaceSize;
use crate::renderer::api::{PresentStatus, SurfaceAcquire, SurfaceImage, TextureFormat};
use crate::renderer::error::RenderError;
use std::fmt::Debug;

/// The windowing/presentation collaborator.
pub trait PresentationSurface: Send + Debug {
    /// The current size of the swapchain images.
    fn size(&self) -> SurfaceSize;

    /// The texel format of the swapchain images.
    fn format(&self) -> TextureFormat;

    /// Rebuilds the swapchain for a new size.
    fn reconfigure(&mut self, size: SurfaceSize) -> Result<(), RenderError>;

    /// Acquires the next swapchain image, blocking up to the backend's bound.
    fn acquire_image(&mut self) -> Result<SurfaceAcquire, RenderError>;

    /// Presents a previously acquired image.
    fn present(&mut self, image: SurfaceImage) -> Result<PresentStatus, RenderError>;
}
