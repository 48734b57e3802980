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

//! Agents orchestrating the renderer's lanes and caches.
//!
//! An agent owns the long-lived state of a subsystem and decides, frame by frame,
//! which lanes run and what they run on. The [`render_agent::RenderAgent`] drives
//! one frame end to end: frame acquisition, residency, batching, uploads,
//! encoding, submission and presentation.

#![warn(missing_docs)]

pub mod render_agent;
