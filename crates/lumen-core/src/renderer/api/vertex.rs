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

//! Vertex layouts understood by the geometry arena and the pipelines.

use serde::{Deserialize, Serialize};

/// The scalar layout of a single vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
}

impl VertexAttributeFormat {
    /// Size of the attribute in bytes.
    pub const fn size(&self) -> u32 {
        match self {
            VertexAttributeFormat::Float32x2 => 8,
            VertexAttributeFormat::Float32x3 => 12,
            VertexAttributeFormat::Float32x4 => 16,
        }
    }
}

/// A single attribute inside an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader location.
    pub location: u32,
    /// Byte offset inside the vertex.
    pub offset: u32,
    /// Attribute layout.
    pub format: VertexAttributeFormat,
}

/// An interleaved vertex layout.
///
/// The geometry arena keeps one vertex pool per format so that every command of
/// a batch can be drawn from a single bound vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexFormat {
    /// `position: vec3`.
    Position,
    /// `position: vec3, normal: vec3, uv: vec2`.
    PositionNormalUv,
    /// `position: vec3, normal: vec3, uv: vec2, tangent: vec4`.
    PositionNormalUvTangent,
}

const POSITION: &[VertexAttribute] = &[VertexAttribute {
    location: 0,
    offset: 0,
    format: VertexAttributeFormat::Float32x3,
}];

const POSITION_NORMAL_UV: &[VertexAttribute] = &[
    VertexAttribute {
        location: 0,
        offset: 0,
        format: VertexAttributeFormat::Float32x3,
    },
    VertexAttribute {
        location: 1,
        offset: 12,
        format: VertexAttributeFormat::Float32x3,
    },
    VertexAttribute {
        location: 2,
        offset: 24,
        format: VertexAttributeFormat::Float32x2,
    },
];

const POSITION_NORMAL_UV_TANGENT: &[VertexAttribute] = &[
    VertexAttribute {
        location: 0,
        offset: 0,
        format: VertexAttributeFormat::Float32x3,
    },
    VertexAttribute {
        location: 1,
        offset: 12,
        format: VertexAttributeFormat::Float32x3,
    },
    VertexAttribute {
        location: 2,
        offset: 24,
        format: VertexAttributeFormat::Float32x2,
    },
    VertexAttribute {
        location: 3,
        offset: 32,
        format: VertexAttributeFormat::Float32x4,
    },
];

impl VertexFormat {
    /// Every supported format.
    pub const ALL: [VertexFormat; 3] = [
        VertexFormat::Position,
        VertexFormat::PositionNormalUv,
        VertexFormat::PositionNormalUvTangent,
    ];

    /// Size of one vertex in bytes.
    pub const fn stride(&self) -> u32 {
        match self {
            VertexFormat::Position => 12,
            VertexFormat::PositionNormalUv => 32,
            VertexFormat::PositionNormalUvTangent => 48,
        }
    }

    /// The attributes of the layout, in location order.
    pub const fn attributes(&self) -> &'static [VertexAttribute] {
        match self {
            VertexFormat::Position => POSITION,
            VertexFormat::PositionNormalUv => POSITION_NORMAL_UV,
            VertexFormat::PositionNormalUvTangent => POSITION_NORMAL_UV_TANGENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_fill_stride() {
        for format in VertexFormat::ALL {
            let end = format
                .attributes()
                .iter()
                .map(|a| a.offset + a.format.size())
                .max()
                .unwrap_or(0);
            assert_eq!(end, format.stride(), "{format:?}");
        }
    }
}
