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

use lumen_core::asset::{AssetSource, AssetUUID, TextureData};
use lumen_core::math::Extent3D;
use lumen_core::renderer::{
    FrameRing, GraphicsDevice, ResourceError, RetiredResource, RetirementFifo, TextureDescriptor,
    TextureFormat, TextureId, TextureUsage, TextureViewId,
};
use std::collections::{BTreeSet, HashMap};

/// Load state of a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureResidency {
    /// Queued for the next update.
    Pending,
    /// The last load failed. The texture stays out of use until retried.
    Failed(String),
    /// Uploaded and bound in the bindless table.
    Resident,
}

#[derive(Debug)]
struct TextureEntry {
    slot: u32,
    refs: u32,
    residency: TextureResidency,
    gpu: Option<(TextureId, TextureViewId)>,
}

/// Maps texture asset ids to stable bindless slot indices and owns the textures.
///
/// A slot stays bound to its texture for as long as any material references it.
/// Once released, the slot cools down for `frames_in_flight` generations before it
/// can be handed out again, so no in-flight frame samples a different texture
/// through a stale index.
#[derive(Debug)]
pub struct TextureSlotTable {
    capacity: u32,
    entries: HashMap<AssetUUID, TextureEntry>,
    free: BTreeSet<u32>,
    high_water: u32,
    cooling: RetirementFifo<u32>,
    queue: Vec<AssetUUID>,
    fallback: (TextureId, TextureViewId),
    generation: u64,
}

impl TextureSlotTable {
    /// Creates an empty table with room for `capacity` slots.
    ///
    /// A 1x1 white texture is created to fill every unused entry of the bindless array.
    pub fn new(
        device: &dyn GraphicsDevice,
        capacity: u32,
        frames_in_flight: usize,
    ) -> Result<Self, ResourceError> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("bindless fallback texture".into()),
            size: Extent3D::flat(1, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let view = device
            .write_texture(texture, &[255; 4], 4, Extent3D::flat(1, 1))
            .and_then(|()| device.create_texture_view(texture));
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                RetiredResource::Texture(texture).destroy_logged(device);
                return Err(e);
            }
        };
        Ok(Self {
            capacity,
            entries: HashMap::new(),
            free: BTreeSet::new(),
            high_water: 0,
            cooling: RetirementFifo::new(frames_in_flight),
            queue: Vec::new(),
            fallback: (texture, view),
            generation: 0,
        })
    }

    /// Returns the bindless slot of a texture, reserving one on first reference.
    ///
    /// A newly reserved texture is queued for upload.
    pub fn slot(&mut self, id: AssetUUID) -> Result<u32, ResourceError> {
        if let Some(entry) = self.entries.get(&id) {
            return Ok(entry.slot);
        }
        let slot = match self.free.pop_first() {
            Some(slot) => slot,
            None if self.high_water < self.capacity => {
                self.high_water += 1;
                self.high_water - 1
            }
            None => {
                return Err(ResourceError::AllocationFailed {
                    label: "bindless texture slot".to_string(),
                    size: u64::from(self.capacity),
                });
            }
        };
        self.entries.insert(
            id,
            TextureEntry {
                slot,
                refs: 0,
                residency: TextureResidency::Pending,
                gpu: None,
            },
        );
        self.queue.push(id);
        self.generation += 1;
        log::trace!("Texture {id} reserved bindless slot {slot}");
        Ok(slot)
    }

    /// The slot of a texture, if it has one.
    pub fn get(&self, id: AssetUUID) -> Option<u32> {
        self.entries.get(&id).map(|entry| entry.slot)
    }

    /// The load state of a texture.
    pub fn residency(&self, id: AssetUUID) -> Option<&TextureResidency> {
        self.entries.get(&id).map(|entry| &entry.residency)
    }

    /// Returns `true` if the texture is uploaded.
    pub fn is_resident(&self, id: AssetUUID) -> bool {
        matches!(self.residency(id), Some(TextureResidency::Resident))
    }

    /// Reserves a slot if needed and counts one more material referencing the texture.
    pub fn acquire(&mut self, id: AssetUUID) -> Result<u32, ResourceError> {
        let slot = self.slot(id)?;
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.refs += 1;
        }
        Ok(slot)
    }

    /// Drops one reference. The last one retires the texture and starts the
    /// cool-down of its slot.
    pub fn release(&mut self, ring: &mut FrameRing, id: AssetUUID) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return;
        }
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        if let Some((texture, view)) = entry.gpu {
            ring.retire(RetiredResource::TextureView(view));
            ring.retire(RetiredResource::Texture(texture));
        }
        self.queue.retain(|queued| *queued != id);
        self.cooling
            .push(ring.frame_number().saturating_sub(1), entry.slot);
        self.generation += 1;
        log::debug!("Texture {id} released, slot {} cooling down", entry.slot);
    }

    /// Returns slots whose cool-down elapsed to the free list.
    pub fn reclaim(&mut self, current_frame: u64) -> usize {
        let ready = self.cooling.drain_ready(current_frame);
        let count = ready.len();
        self.free.extend(ready);
        count
    }

    /// Queues one failed texture for another attempt.
    pub fn retry(&mut self, id: AssetUUID) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if matches!(entry.residency, TextureResidency::Failed(_)) => {
                entry.residency = TextureResidency::Pending;
                self.queue.push(id);
                true
            }
            _ => false,
        }
    }

    /// Queues every failed texture for another attempt.
    pub fn retry_failed(&mut self) -> usize {
        let mut retried = 0;
        for (id, entry) in &mut self.entries {
            if matches!(entry.residency, TextureResidency::Failed(_)) {
                entry.residency = TextureResidency::Pending;
                self.queue.push(*id);
                retried += 1;
            }
        }
        retried
    }

    /// Loads and uploads every queued texture. Returns how many became resident.
    pub fn upload_pending(&mut self, device: &dyn GraphicsDevice, source: &dyn AssetSource) -> usize {
        let mut uploaded = 0;
        for id in std::mem::take(&mut self.queue) {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.residency != TextureResidency::Pending {
                continue;
            }
            let result = source
                .load_texture_bytes(id)
                .map_err(ResourceError::from)
                .and_then(|data| upload(device, id, &data));
            match result {
                Ok(gpu) => {
                    entry.gpu = Some(gpu);
                    entry.residency = TextureResidency::Resident;
                    uploaded += 1;
                    log::debug!("Texture {id} resident in slot {}", entry.slot);
                }
                Err(e) => {
                    log::warn!("Texture {id} failed to load: {e}");
                    entry.residency = TextureResidency::Failed(e.to_string());
                }
            }
        }
        if uploaded > 0 {
            self.generation += 1;
        }
        uploaded
    }

    /// Length of the prefix of the bindless array that holds valid slots.
    pub fn valid_len(&self) -> u32 {
        self.high_water
    }

    /// Maximum number of slots.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of uploaded textures.
    pub fn resident_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.residency == TextureResidency::Resident)
            .count()
    }

    /// Bumped whenever the content of the bindless array changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The full bindless array: one view per slot, unused slots pointing at the
    /// fallback texture.
    pub fn views(&self) -> Vec<TextureViewId> {
        let mut views = vec![self.fallback.1; self.capacity.max(1) as usize];
        for entry in self.entries.values() {
            if let Some((_, view)) = entry.gpu {
                views[entry.slot as usize] = view;
            }
        }
        views
    }

    /// Destroys every texture immediately. The GPU must be idle.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for (_, entry) in self.entries.drain() {
            if let Some((texture, view)) = entry.gpu {
                RetiredResource::TextureView(view).destroy_logged(device);
                RetiredResource::Texture(texture).destroy_logged(device);
            }
        }
        RetiredResource::TextureView(self.fallback.1).destroy_logged(device);
        RetiredResource::Texture(self.fallback.0).destroy_logged(device);
        self.queue.clear();
        self.free.clear();
        self.cooling.drain_all();
    }
}

fn upload(
    device: &dyn GraphicsDevice,
    id: AssetUUID,
    data: &TextureData,
) -> Result<(TextureId, TextureViewId), ResourceError> {
    let malformed = |reason: &str| ResourceError::AssetLoadFailed {
        asset: id,
        reason: reason.to_string(),
    };
    if data.format.is_depth() {
        return Err(malformed("depth formats cannot be sampled as material textures"));
    }
    if data.width == 0 || data.height == 0 {
        return Err(malformed("texture has no pixels"));
    }
    let bytes_per_row = data.width * data.format.bytes_per_pixel();
    if data.pixels.len() < bytes_per_row as usize * data.height as usize {
        return Err(malformed("pixel payload is shorter than width * height"));
    }

    let size = Extent3D::flat(data.width, data.height);
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(format!("texture {id}").into()),
        size,
        format: data.format,
        usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
    })?;
    let view = device
        .write_texture(texture, &data.pixels, bytes_per_row, size)
        .and_then(|()| device.create_texture_view(texture));
    match view {
        Ok(view) => Ok((texture, view)),
        Err(e) => {
            RetiredResource::Texture(texture).destroy_logged(device);
            Err(e)
        }
    }
}
