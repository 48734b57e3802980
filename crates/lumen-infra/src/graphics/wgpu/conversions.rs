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


use lumen_core::math::Extent3D;
use lumen_core::renderer::{
    BufferUsage, IndexFormat, LoadOp, TextureFormat, TextureUsage, VertexAttributeFormat,
    VertexFormat,
};

/// A local extension trait to convert lumen types into wgpu types.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_wgpu()` syntax.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into a wgpu type.
    fn into_wgpu(self) -> T;
}

impl IntoWgpu<wgpu::Extent3d> for Extent3D {
    fn into_wgpu(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth_or_array_layers,
        }
    }
}

impl IntoWgpu<wgpu::TextureFormat> for TextureFormat {
    fn into_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

/// Maps a wgpu format back, for the formats a swapchain can report.
pub fn from_wgpu_texture_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    match format {
        wgpu::TextureFormat::R8Unorm => Some(TextureFormat::R8Unorm),
        wgpu::TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
        wgpu::TextureFormat::Rgba8UnormSrgb => Some(TextureFormat::Rgba8UnormSrgb),
        wgpu::TextureFormat::Bgra8Unorm => Some(TextureFormat::Bgra8Unorm),
        wgpu::TextureFormat::Bgra8UnormSrgb => Some(TextureFormat::Bgra8UnormSrgb),
        wgpu::TextureFormat::Rgba16Float => Some(TextureFormat::Rgba16Float),
        wgpu::TextureFormat::Depth32Float => Some(TextureFormat::Depth32Float),
        _ => None,
    }
}

impl IntoWgpu<wgpu::BufferUsages> for BufferUsage {
    fn into_wgpu(self) -> wgpu::BufferUsages {
        let mut usages = wgpu::BufferUsages::empty();
        for (flag, wgpu_flag) in [
            (BufferUsage::MAP_READ, wgpu::BufferUsages::MAP_READ),
            (BufferUsage::MAP_WRITE, wgpu::BufferUsages::MAP_WRITE),
            (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
            (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
            (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
            (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
            (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
            (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
            (BufferUsage::INDIRECT, wgpu::BufferUsages::INDIRECT),
        ] {
            if self.contains(flag) {
                usages |= wgpu_flag;
            }
        }
        usages
    }
}

impl IntoWgpu<wgpu::TextureUsages> for TextureUsage {
    fn into_wgpu(self) -> wgpu::TextureUsages {
        let mut usages = wgpu::TextureUsages::empty();
        for (flag, wgpu_flag) in [
            (TextureUsage::COPY_SRC, wgpu::TextureUsages::COPY_SRC),
            (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
            (TextureUsage::TEXTURE_BINDING, wgpu::TextureUsages::TEXTURE_BINDING),
            (TextureUsage::RENDER_ATTACHMENT, wgpu::TextureUsages::RENDER_ATTACHMENT),
        ] {
            if self.contains(flag) {
                usages |= wgpu_flag;
            }
        }
        usages
    }
}

impl IntoWgpu<wgpu::IndexFormat> for IndexFormat {
    fn into_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

impl IntoWgpu<wgpu::VertexFormat> for VertexAttributeFormat {
    fn into_wgpu(self) -> wgpu::VertexFormat {
        match self {
            VertexAttributeFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexAttributeFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexAttributeFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

impl IntoWgpu<Vec<wgpu::VertexAttribute>> for VertexFormat {
    fn into_wgpu(self) -> Vec<wgpu::VertexAttribute> {
        self.attributes()
            .iter()
            .map(|attribute| wgpu::VertexAttribute {
                format: attribute.format.into_wgpu(),
                offset: u64::from(attribute.offset),
                shader_location: attribute.location,
            })
            .collect()
    }
}

impl IntoWgpu<wgpu::LoadOp<wgpu::Color>> for LoadOp<[f32; 4]> {
    fn into_wgpu(self) -> wgpu::LoadOp<wgpu::Color> {
        match self {
            LoadOp::Load => wgpu::LoadOp::Load,
            LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
        }
    }
}

impl IntoWgpu<wgpu::LoadOp<f32>> for LoadOp<f32> {
    fn into_wgpu(self) -> wgpu::LoadOp<f32> {
        match self {
            LoadOp::Load => wgpu::LoadOp::Load,
            LoadOp::Clear(value) => wgpu::LoadOp::Clear(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_conversion() {
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::INDIRECT;
        let converted: wgpu::BufferUsages = usage.into_wgpu();
        assert_eq!(
            converted,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::INDIRECT
        );
    }

    #[test]
    fn test_texture_format_roundtrip() {
        for format in [
            TextureFormat::R8Unorm,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Depth32Float,
        ] {
            let converted: wgpu::TextureFormat = format.into_wgpu();
            assert_eq!(from_wgpu_texture_format(converted), Some(format));
        }
        assert_eq!(from_wgpu_texture_format(wgpu::TextureFormat::Rg8Unorm), None);
    }

    #[test]
    fn test_vertex_layout_matches_format() {
        let attributes: Vec<wgpu::VertexAttribute> = VertexFormat::PositionNormalUv.into_wgpu();
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(attributes[2].format, wgpu::VertexFormat::Float32x2);
    }

    #[test]
    fn test_clear_color_conversion() {
        let load: wgpu::LoadOp<wgpu::Color> = LoadOp::Clear([1.0, 0.5, 0.0, 1.0]).into_wgpu();
        assert_eq!(
            load,
            wgpu::LoadOp::Clear(wgpu::Color {
                r: 1.0,
                g: 0.5,
                b: 0.0,
                a: 1.0
            })
        );
    }
}
