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

use crate::config::FrameConfig;
use crate::renderer::api::{
    BindGroupId, BufferDescriptor, BufferId, BufferUsage, FenceId, GpuCameraData,
    GpuLightData, GpuMaterialInstanceData, GpuObjectData, IndexedIndirectCommand,
    RenderPipelineId,
};
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::{CommandEncoder, GraphicsDevice};
use bytemuck::Pod;
use std::collections::HashMap;

lumen_bitflags! {
    /// Per-slot staleness flags.
    ///
    /// A flag set on a slot means that slot's private copy of the data no longer
    /// matches the CPU state and must be refreshed the next time the slot is recorded.
    pub struct FrameDirty: u32 {
        /// The object array must be re-uploaded.
        const OBJECTS = 1 << 0;
        /// The material array must be re-uploaded.
        const MATERIALS = 1 << 1;
        /// The light array must be re-uploaded.
        const LIGHTS = 1 << 2;
        /// The indirect-command array must be re-uploaded.
        const INDIRECT = 1 << 3;
        /// The bindless texture table bound by this slot is outdated.
        const TEXTURE_DESCRIPTORS = 1 << 4;
        /// The swapchain was rebuilt since this slot last rendered.
        const SWAPCHAIN = 1 << 5;
        /// The offscreen targets were resized since this slot last rendered.
        const OFFSCREEN = 1 << 6;
    }
}

/// Where a slot is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Not acquired; its last submission (if any) may still be running.
    Idle,
    /// Acquired by the CPU; its buffers may be written.
    Recording,
    /// Submitted; the GPU may be reading its buffers.
    InFlight,
}

/// The private per-frame buffers of a slot.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffers {
    /// Camera uniform.
    pub camera: BufferId,
    /// Object array (storage).
    pub objects: BufferId,
    /// Material array (storage).
    pub materials: BufferId,
    /// Light array (storage).
    pub lights: BufferId,
    /// Indirect-command array.
    pub indirect: BufferId,
}

/// Element capacities of the [`FrameBuffers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCapacities {
    /// Object records.
    pub objects: u32,
    /// Material records.
    pub materials: u32,
    /// Light records.
    pub lights: u32,
    /// Indirect commands. One command per object at most.
    pub commands: u32,
}

impl From<&FrameConfig> for FrameCapacities {
    fn from(config: &FrameConfig) -> Self {
        Self {
            objects: config.max_objects,
            materials: config.max_materials,
            lights: config.max_lights,
            commands: config.max_objects,
        }
    }
}

/// One entry of the frame ring.
///
/// Allocated once, reused forever, destroyed only at shutdown. Its buffers may only
/// be written while it is [`SlotState::Recording`], i.e. between a successful
/// `acquire_frame` (which waited on its fence) and `submit`.
#[derive(Debug)]
pub struct FrameSlot {
    index: usize,
    fence: FenceId,
    buffers: FrameBuffers,
    capacities: FrameCapacities,
    dirty: FrameDirty,
    state: SlotState,
    frame: Option<u64>,
    bind_groups: HashMap<RenderPipelineId, BindGroupId>,
}

impl FrameSlot {
    pub(crate) fn new(
        device: &dyn GraphicsDevice,
        index: usize,
        capacities: FrameCapacities,
    ) -> Result<Self, ResourceError> {
        let storage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        let buffers = FrameBuffers {
            camera: create(
                device,
                index,
                "camera",
                std::mem::size_of::<GpuCameraData>() as u64,
                BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            )?,
            objects: create(
                device,
                index,
                "objects",
                array_size::<GpuObjectData>(capacities.objects),
                storage,
            )?,
            materials: create(
                device,
                index,
                "materials",
                array_size::<GpuMaterialInstanceData>(capacities.materials),
                storage,
            )?,
            lights: create(
                device,
                index,
                "lights",
                array_size::<GpuLightData>(capacities.lights),
                storage,
            )?,
            indirect: create(
                device,
                index,
                "indirect",
                array_size::<IndexedIndirectCommand>(capacities.commands),
                BufferUsage::INDIRECT | storage,
            )?,
        };
        // Created signaled so the first acquisition does not wait.
        let fence = device.create_fence(true)?;

        Ok(Self {
            index,
            fence,
            buffers,
            capacities,
            dirty: FrameDirty::all(),
            state: SlotState::Idle,
            frame: None,
            bind_groups: HashMap::new(),
        })
    }

    /// Position of the slot in the ring.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The retirement fence.
    pub fn fence(&self) -> FenceId {
        self.fence
    }

    /// The slot's private buffers.
    pub fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    /// Element capacities of the slot's buffers.
    pub fn capacities(&self) -> FrameCapacities {
        self.capacities
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// The frame number last acquired on this slot.
    pub fn frame(&self) -> Option<u64> {
        self.frame
    }

    /// Current dirty flags.
    pub fn dirty(&self) -> FrameDirty {
        self.dirty
    }

    /// Returns `true` if any of `flags` is set.
    pub fn needs(&self, flags: FrameDirty) -> bool {
        self.dirty.intersects(flags)
    }

    /// Sets `flags`.
    pub fn mark(&mut self, flags: FrameDirty) {
        self.dirty.insert(flags);
    }

    /// Clears `flags`.
    pub fn clear(&mut self, flags: FrameDirty) {
        self.dirty.remove(flags);
    }

    /// Opens the slot's command-submission context.
    pub fn begin_commands(&self, device: &dyn GraphicsDevice) -> Box<dyn CommandEncoder> {
        device.create_command_encoder(Some(&format!("frame slot {}", self.index)))
    }

    /// The bind group created for `pipeline` on this slot, if any.
    pub fn bind_group(&self, pipeline: RenderPipelineId) -> Option<BindGroupId> {
        self.bind_groups.get(&pipeline).copied()
    }

    /// Caches the bind group of `pipeline` for this slot.
    pub fn set_bind_group(&mut self, pipeline: RenderPipelineId, bind_group: BindGroupId) {
        self.bind_groups.insert(pipeline, bind_group);
    }

    /// Drops every cached bind group, returning them for destruction.
    ///
    /// Only called while recording: the slot's fence has been waited on, so none
    /// of them is still referenced by the GPU.
    pub fn take_bind_groups(&mut self) -> Vec<BindGroupId> {
        self.bind_groups.drain().map(|(_, group)| group).collect()
    }

    /// Uploads the camera uniform.
    pub fn write_camera(
        &self,
        device: &dyn GraphicsDevice,
        camera: &GpuCameraData,
    ) -> Result<(), RenderError> {
        self.ensure_recording()?;
        device.write_buffer(self.buffers.camera, 0, bytemuck::bytes_of(camera))?;
        Ok(())
    }

    /// Uploads the object array. Returns the number of records written.
    pub fn write_objects(
        &self,
        device: &dyn GraphicsDevice,
        objects: &[GpuObjectData],
    ) -> Result<u32, RenderError> {
        self.write_array(device, self.buffers.objects, self.capacities.objects, objects, "objects")
    }

    /// Uploads the material array. Returns the number of records written.
    pub fn write_materials(
        &self,
        device: &dyn GraphicsDevice,
        materials: &[GpuMaterialInstanceData],
    ) -> Result<u32, RenderError> {
        self.write_array(
            device,
            self.buffers.materials,
            self.capacities.materials,
            materials,
            "materials",
        )
    }

    /// Uploads the light array. Returns the number of records written.
    pub fn write_lights(
        &self,
        device: &dyn GraphicsDevice,
        lights: &[GpuLightData],
    ) -> Result<u32, RenderError> {
        self.write_array(device, self.buffers.lights, self.capacities.lights, lights, "lights")
    }

    /// Uploads the indirect-command array. Returns the number of commands written.
    pub fn write_indirect(
        &self,
        device: &dyn GraphicsDevice,
        commands: &[IndexedIndirectCommand],
    ) -> Result<u32, RenderError> {
        self.write_array(
            device,
            self.buffers.indirect,
            self.capacities.commands,
            commands,
            "indirect commands",
        )
    }

    fn write_array<T: Pod>(
        &self,
        device: &dyn GraphicsDevice,
        buffer: BufferId,
        capacity: u32,
        data: &[T],
        what: &str,
    ) -> Result<u32, RenderError> {
        self.ensure_recording()?;
        let count = data.len().min(capacity as usize);
        if count < data.len() {
            log::warn!(
                "Frame slot {}: {} {what} exceed the capacity of {capacity}, truncating",
                self.index,
                data.len()
            );
        }
        if count > 0 {
            device.write_buffer(buffer, 0, bytemuck::cast_slice(&data[..count]))?;
        }
        Ok(count as u32)
    }

    fn ensure_recording(&self) -> Result<(), RenderError> {
        if self.state == SlotState::Recording {
            Ok(())
        } else {
            Err(RenderError::FrameNotAcquired)
        }
    }

    pub(crate) fn begin_recording(&mut self, frame: u64) {
        self.state = SlotState::Recording;
        self.frame = Some(frame);
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = SlotState::InFlight;
    }

    pub(crate) fn destroy(&mut self, device: &dyn GraphicsDevice) {
        let buffers = [
            self.buffers.camera,
            self.buffers.objects,
            self.buffers.materials,
            self.buffers.lights,
            self.buffers.indirect,
        ];
        for buffer in buffers {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Failed to destroy buffer of frame slot {}: {e}", self.index);
            }
        }
        for group in self.take_bind_groups() {
            if let Err(e) = device.destroy_bind_group(group) {
                log::warn!("Failed to destroy bind group of frame slot {}: {e}", self.index);
            }
        }
        if let Err(e) = device.destroy_fence(self.fence) {
            log::warn!("Failed to destroy fence of frame slot {}: {e}", self.index);
        }
        self.state = SlotState::Idle;
    }
}

fn array_size<T>(capacity: u32) -> u64 {
    std::mem::size_of::<T>() as u64 * capacity.max(1) as u64
}

fn create(
    device: &dyn GraphicsDevice,
    slot: usize,
    name: &str,
    size: u64,
    usage: BufferUsage,
) -> Result<BufferId, ResourceError> {
    device.create_buffer(&BufferDescriptor::new(
        format!("frame slot {slot} {name}"),
        size,
        usage,
    ))
}
