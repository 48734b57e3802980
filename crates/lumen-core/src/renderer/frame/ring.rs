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

use super::{DeferredDestructionQueue, FrameCapacities, FrameDirty, FrameSlot, RetiredResource, SlotState};
use crate::config::FrameConfig;
use crate::renderer::api::{CommandBufferId, PresentStatus, SurfaceImage};
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::{FenceWait, GraphicsDevice, PresentationSurface};
use std::time::Duration;

/// What the caller must do after presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Nothing; the next frame can be acquired.
    Presented,
    /// The swapchain is out of date; swapchain-dependent resources must be rebuilt.
    RebuildSwapchain,
}

/// The frame-ring lifecycle manager.
///
/// Guarantees at most `frames_in_flight` frames are in flight and that a slot's
/// buffers are never written while the GPU may still read them: a slot is only
/// handed out after its retirement fence signaled.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    /// Number of frames acquired so far.
    frame_number: u64,
    /// Slot currently being recorded.
    recording: Option<usize>,
    /// Slot submitted last, waiting to be presented.
    submitted: Option<usize>,
    retired: DeferredDestructionQueue,
    fence_timeout: Duration,
}

impl FrameRing {
    /// Allocates every slot with its buffers and a signaled fence.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if any per-frame resource cannot be created.
    pub fn new(device: &dyn GraphicsDevice, config: &FrameConfig) -> Result<Self, ResourceError> {
        let capacities = FrameCapacities::from(config);
        let slots = (0..config.frames_in_flight)
            .map(|index| FrameSlot::new(device, index, capacities))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "Frame ring created with {} slots (fence timeout {:?})",
            slots.len(),
            config.fence_timeout()
        );
        Ok(Self {
            slots,
            frame_number: 0,
            recording: None,
            submitted: None,
            retired: DeferredDestructionQueue::new(config.frames_in_flight),
            fence_timeout: config.fence_timeout(),
        })
    }

    /// Acquires the next slot for CPU recording.
    ///
    /// Blocks until the slot's retirement fence signals (bounded by the configured
    /// timeout), resets the fence, then destroys every retired resource that no
    /// in-flight frame can still read.
    ///
    /// # Errors
    ///
    /// * [`RenderError::FrameAlreadyAcquired`] if the previous frame was not submitted.
    /// * [`RenderError::DeviceTimeout`] if the GPU did not retire the slot in time (fatal).
    /// * [`RenderError::DeviceLost`] if the device stopped responding (fatal).
    pub fn acquire_frame(&mut self, device: &dyn GraphicsDevice) -> Result<&mut FrameSlot, RenderError> {
        if let Some(slot) = self.recording {
            return Err(RenderError::FrameAlreadyAcquired { slot });
        }
        let frame = self.frame_number;
        let index = (frame % self.slots.len() as u64) as usize;
        let fence = self.slots[index].fence();

        match device.wait_for_fence(fence, self.fence_timeout)? {
            FenceWait::Signaled => {}
            FenceWait::TimedOut => {
                log::error!(
                    "Frame slot {index} was not retired within {:?}",
                    self.fence_timeout
                );
                return Err(RenderError::DeviceTimeout {
                    frame,
                    slot: index,
                    waited: self.fence_timeout,
                });
            }
        }
        device.reset_fence(fence)?;

        self.frame_number += 1;
        self.recording = Some(index);
        if self.submitted == Some(index) {
            self.submitted = None;
        }

        let destroyed = self.retired.collect(device, frame);
        if destroyed > 0 {
            log::debug!("Destroyed {destroyed} retired resources at frame {frame}");
        }

        let slot = &mut self.slots[index];
        slot.begin_recording(frame);
        log::trace!("Acquired frame {frame} on slot {index}");
        Ok(slot)
    }

    /// Submits the recorded commands of the current slot.
    ///
    /// Returns immediately; the GPU signals the slot's fence once the work completes.
    pub fn submit(
        &mut self,
        device: &dyn GraphicsDevice,
        command_buffer: CommandBufferId,
    ) -> Result<(), RenderError> {
        let index = self.recording.ok_or(RenderError::FrameNotAcquired)?;
        let slot = &mut self.slots[index];
        device.submit_command_buffer(command_buffer, Some(slot.fence()))?;
        slot.mark_submitted();
        self.recording = None;
        self.submitted = Some(index);
        Ok(())
    }

    /// Gives up on the current frame without drawing.
    ///
    /// An empty submission still signals the slot's fence, otherwise the next
    /// acquisition of this slot would time out.
    pub fn abandon_frame(&mut self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        let index = self.recording.ok_or(RenderError::FrameNotAcquired)?;
        let encoder = self.slots[index].begin_commands(device);
        self.submit(device, encoder.finish())?;
        self.submitted = None;
        log::debug!("Abandoned frame on slot {index}");
        Ok(())
    }

    /// Presents the image rendered by the last submitted frame.
    ///
    /// On an out-of-date swapchain every slot is flagged [`FrameDirty::SWAPCHAIN`]
    /// and the caller is told to rebuild swapchain-dependent resources.
    pub fn present(
        &mut self,
        surface: &mut dyn PresentationSurface,
        image: SurfaceImage,
    ) -> Result<PresentOutcome, RenderError> {
        if self.submitted.take().is_none() {
            return Err(RenderError::FrameNotAcquired);
        }
        match surface.present(image)? {
            PresentStatus::Presented => Ok(PresentOutcome::Presented),
            PresentStatus::Outdated => {
                log::debug!("Swapchain out of date after present");
                self.mark_all(FrameDirty::SWAPCHAIN);
                Ok(PresentOutcome::RebuildSwapchain)
            }
        }
    }

    /// Hands a resource to deferred destruction.
    ///
    /// It is tagged with the newest frame that may have used it and destroyed once
    /// the ring has cycled through every slot past that frame.
    pub fn retire(&mut self, resource: RetiredResource) {
        let last_use = self.frame_number.saturating_sub(1);
        self.retired.push(last_use, resource);
    }

    /// Sets `flags` on every slot.
    pub fn mark_all(&mut self, flags: FrameDirty) {
        for slot in &mut self.slots {
            slot.mark(flags);
        }
    }

    /// Returns `true` if any slot still has one of `flags` set.
    pub fn any_slot_needs(&self, flags: FrameDirty) -> bool {
        self.slots.iter().any(|slot| slot.needs(flags))
    }

    /// The slot currently being recorded.
    pub fn current_slot(&self) -> Option<&FrameSlot> {
        self.recording.map(|index| &self.slots[index])
    }

    /// Mutable access to the slot currently being recorded.
    pub fn current_slot_mut(&mut self) -> Option<&mut FrameSlot> {
        self.recording.map(move |index| &mut self.slots[index])
    }

    /// The frame number of the slot being recorded.
    pub fn current_frame(&self) -> Option<u64> {
        self.recording.map(|_| self.frame_number - 1)
    }

    /// All slots, in ring order.
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// Number of slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames acquired so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of resources waiting for deferred destruction.
    pub fn pending_destructions(&self) -> usize {
        self.retired.len()
    }

    /// Waits for every slot to retire, then destroys all ring-owned resources and
    /// everything still queued for deferred destruction.
    pub fn shutdown(&mut self, device: &dyn GraphicsDevice) {
        for slot in &self.slots {
            if slot.state() == SlotState::Recording {
                continue;
            }
            match device.wait_for_fence(slot.fence(), self.fence_timeout) {
                Ok(FenceWait::Signaled) => {}
                Ok(FenceWait::TimedOut) => {
                    log::warn!("Frame slot {} still busy at shutdown", slot.index())
                }
                Err(e) => log::warn!("Fence wait failed at shutdown: {e}"),
            }
        }
        let flushed = self.retired.flush(device);
        for slot in &mut self.slots {
            slot.destroy(device);
        }
        self.recording = None;
        self.submitted = None;
        log::info!("Frame ring shut down ({flushed} deferred resources flushed)");
    }
}
