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
use lumen_core::renderer::traits::{CommandEncoder, RenderPass};
use lumen_core::renderer::{
    BindGroupId, BufferId, CommandBufferId, IndexFormat, RenderPassDescriptor, RenderPipelineId,
    TextureId,
};
use std::any::Any;

use super::conversions::IntoWgpu;
use super::device::WgpuDevice;

/// A recording render pass. Ids are resolved against the device on every call.
pub struct WgpuRenderPass<'a> {
    pass: wgpu::RenderPass<'a>,
    device: &'a WgpuDevice,
}

impl<'pass> RenderPass<'pass> for WgpuRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        if let Some(pipeline) = self.device.get_wgpu_render_pipeline(pipeline) {
            self.pass.set_pipeline(&pipeline);
        } else {
            log::warn!("WgpuRenderPass: RenderPipelineId {pipeline:?} not found.");
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId) {
        if let Some(group) = self.device.get_wgpu_bind_group(bind_group) {
            self.pass.set_bind_group(index, group.as_ref(), &[]);
        } else {
            log::warn!("WgpuRenderPass: BindGroupId {bind_group:?} not found.");
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64) {
        if let Some(wgpu_buffer) = self.device.get_wgpu_buffer(buffer) {
            self.pass.set_vertex_buffer(slot, wgpu_buffer.slice(offset..));
        } else {
            log::warn!("WgpuRenderPass: Vertex BufferId {buffer:?} not found.");
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat) {
        if let Some(wgpu_buffer) = self.device.get_wgpu_buffer(buffer) {
            self.pass
                .set_index_buffer(wgpu_buffer.slice(offset..), index_format.into_wgpu());
        } else {
            log::warn!("WgpuRenderPass: Index BufferId {buffer:?} not found.");
        }
    }

    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, indirect_offset: u64) {
        if let Some(wgpu_buffer) = self.device.get_wgpu_buffer(indirect_buffer) {
            self.pass.draw_indexed_indirect(&wgpu_buffer, indirect_offset);
        } else {
            log::warn!("WgpuRenderPass: Indirect BufferId {indirect_buffer:?} not found.");
        }
    }
}

/// Records GPU commands into a `wgpu::CommandEncoder`.
pub struct WgpuCommandEncoder {
    encoder: wgpu::CommandEncoder,
    device: WgpuDevice,
}

impl WgpuCommandEncoder {
    pub(crate) fn new(encoder: wgpu::CommandEncoder, device: WgpuDevice) -> Self {
        Self { encoder, device }
    }

    /// Escape hatch for backend-specific recording.
    pub fn wgpu_encoder_mut(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }
}

impl CommandEncoder for WgpuCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        let color_view = self
            .device
            .get_wgpu_texture_view(descriptor.color_attachment.view);
        if color_view.is_none() {
            log::warn!(
                "WgpuCommandEncoder: color view {:?} not found; the pass has no color target.",
                descriptor.color_attachment.view
            );
        }
        let depth = descriptor.depth_attachment.and_then(|attachment| {
            self.device
                .get_wgpu_texture_view(attachment.view)
                .map(|view| (view, attachment.load))
        });

        let color_attachments = [color_view.as_ref().map(|view| wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: descriptor.color_attachment.load.into_wgpu(),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })];
        let depth_stencil_attachment =
            depth
                .as_ref()
                .map(|(view, load)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: (*load).into_wgpu(),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: descriptor.label,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            ..Default::default()
        });

        Box::new(WgpuRenderPass {
            pass,
            device: &self.device,
        })
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        if let (Some(source_buffer), Some(destination_buffer)) = (
            self.device.get_wgpu_buffer(source),
            self.device.get_wgpu_buffer(destination),
        ) {
            self.encoder.copy_buffer_to_buffer(
                &source_buffer,
                source_offset,
                &destination_buffer,
                destination_offset,
                size,
            );
        } else {
            log::warn!("WgpuCommandEncoder: buffer copy {source:?} -> {destination:?} skipped.");
        }
    }

    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId, size: Extent3D) {
        if let (Some(source_texture), Some(destination_texture)) = (
            self.device.get_wgpu_texture(source),
            self.device.get_wgpu_texture(destination),
        ) {
            self.encoder.copy_texture_to_texture(
                source_texture.as_image_copy(),
                destination_texture.as_image_copy(),
                size.into_wgpu(),
            );
        } else {
            log::warn!("WgpuCommandEncoder: texture copy {source:?} -> {destination:?} skipped.");
        }
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let Self { encoder, device } = *self;
        device.register_command_buffer(encoder.finish())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
