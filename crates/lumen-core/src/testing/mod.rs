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

//! In-memory test doubles for the GPU and the presentation surface.
//!
//! The mock device keeps every buffer's bytes on the CPU, applies recorded copies
//! at submission time, and exposes fences that tests signal by hand, so frame
//! lifecycle rules can be checked without a GPU.

mod device;
mod surface;

pub use self::device::*;
pub use self::surface::*;
