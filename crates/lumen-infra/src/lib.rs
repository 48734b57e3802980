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

//! Concrete implementations of the lumen contracts on top of external crates.
//!
//! The only backend today is wgpu: [`WgpuDevice`] implements
//! [`lumen_core::renderer::GraphicsDevice`] and [`WgpuSurface`] implements
//! [`lumen_core::renderer::PresentationSurface`] for a winit window.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::wgpu::{create_backend, WgpuDevice, WgpuGraphicsContext, WgpuSurface};
