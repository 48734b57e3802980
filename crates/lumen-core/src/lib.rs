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

//! Foundational contracts for the lumen renderer.
//!
//! This crate holds everything the other layers agree on: GPU resource ids and
//! descriptors, the [`renderer::GraphicsDevice`] abstraction, the frame ring that
//! keeps in-flight frames safe to mutate, and the collaborator traits through which
//! the scene and the asset loader are consumed.

#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod asset;
pub mod config;
pub mod math;
pub mod renderer;
pub mod scene;
pub mod tasks;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::RendererConfig;
