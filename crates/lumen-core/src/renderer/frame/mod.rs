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

//! Frame lifecycle: the ring of in-flight frame slots, deferred destruction of
//! retired GPU resources, and the surface-sized offscreen targets.
//!
//! ```text
//! frame F   : acquire slot F % N -> wait fence -> write slot buffers -> submit (fence) -> present
//! frame F+N : acquire the same slot -> its fence proves frame F retired -> reuse
//! ```

mod deferred;
mod ring;
mod slot;
mod targets;

pub use self::deferred::*;
pub use self::ring::*;
pub use self::slot::*;
pub use self::targets::*;
