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

//! Acts as the agent of the rendering subsystem.
//!
//! The agent keeps the GPU-side caches (frame ring, geometry arena, material
//! registry) and runs the lanes in a fixed order every frame. Residency problems
//! are absorbed here: a renderable whose mesh or material is not resident is
//! simply not drawn. Synchronization and device failures are returned to the
//! owner of the frame loop.

mod agent;
mod mesh_residency;
mod stats;

pub use agent::*;
pub use mesh_residency::*;
pub use stats::*;
