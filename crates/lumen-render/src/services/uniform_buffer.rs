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

use super::{RenderService, ServiceError, TransferService};
use lumen_core::renderer::api::{BufferDescriptor, BufferId, BufferUsage};
use lumen_core::renderer::{GraphicsDevice, ResourceError};
use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};

/// Size of one element, aligned for uniform buffer offsets.
pub const UNIFORM_ELEMENT_SIZE: u64 = 256;
/// Elements carved out of one device buffer.
pub const ELEMENTS_PER_BUFFER: u32 = 64;

/// One element of a shared uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformSlot {
    /// The buffer holding the element.
    pub buffer: BufferId,
    /// Element index inside the buffer.
    pub index: u32,
    /// Byte offset of the element.
    pub offset: u64,
    /// Byte size of the element.
    pub size: u64,
}

#[derive(Debug)]
struct Page {
    buffer: BufferId,
    free: Vec<u32>,
}

/// Fixed-size uniform elements carved out of a growing set of buffers.
#[derive(Debug, Default)]
pub struct SharedUniformBufferService {
    pages: Mutex<Vec<Page>>,
    active: bool,
}

impl SharedUniformBufferService {
    fn create_page(device: &dyn GraphicsDevice, number: usize) -> Result<Page, ResourceError> {
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(format!("Shared Uniform Buffer {number}"))),
            size: UNIFORM_ELEMENT_SIZE * ELEMENTS_PER_BUFFER as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        Ok(Page {
            buffer,
            free: (0..ELEMENTS_PER_BUFFER).rev().collect(),
        })
    }

    /// Reserves one element, growing by one buffer when every page is full.
    pub fn allocate(&self, device: &dyn GraphicsDevice) -> Result<UniformSlot, ServiceError> {
        if !self.active {
            return Err(ServiceError::NotInitialized(self.name()));
        }
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        if !pages.iter().any(|page| !page.free.is_empty()) {
            let page = Self::create_page(device, pages.len())?;
            pages.push(page);
        }
        let page = pages
            .iter_mut()
            .find(|page| !page.free.is_empty())
            .ok_or_else(|| ServiceError::Exhausted("no free uniform element".to_string()))?;
        let index = page
            .free
            .pop()
            .ok_or_else(|| ServiceError::Exhausted("no free uniform element".to_string()))?;
        Ok(UniformSlot {
            buffer: page.buffer,
            index,
            offset: index as u64 * UNIFORM_ELEMENT_SIZE,
            size: UNIFORM_ELEMENT_SIZE,
        })
    }

    /// Returns an element to its buffer.
    pub fn free(&self, slot: UniformSlot) {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        match pages.iter_mut().find(|page| page.buffer == slot.buffer) {
            Some(page) if !page.free.contains(&slot.index) => page.free.push(slot.index),
            Some(_) => log::warn!("SharedUniformBufferService: double free of {slot:?}"),
            None => log::warn!("SharedUniformBufferService: unknown slot {slot:?}"),
        }
    }

    /// Writes `data` into the element.
    pub fn write(
        &self,
        device: &dyn GraphicsDevice,
        transfer: &TransferService,
        slot: &UniformSlot,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        if data.len() as u64 > slot.size {
            return Err(ResourceError::OutOfBounds);
        }
        transfer.upload(device, slot.buffer, slot.offset, data)
    }

    /// Number of elements in use.
    pub fn used_elements(&self) -> usize {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|page| ELEMENTS_PER_BUFFER as usize - page.free.len())
            .sum()
    }
}

impl RenderService for SharedUniformBufferService {
    fn name(&self) -> &'static str {
        "SharedUniformBufferService"
    }

    fn initialize(&mut self, device: &Arc<dyn GraphicsDevice>) -> Result<(), ServiceError> {
        let page = Self::create_page(device.as_ref(), 0)?;
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page);
        self.active = true;
        Ok(())
    }

    fn terminate(&mut self, device: &dyn GraphicsDevice) -> usize {
        self.active = false;
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .filter(|page| device.destroy_buffer(page.buffer).is_err())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::testing::RecordingDevice;

    #[test]
    fn grows_when_full_and_reuses_freed_elements() {
        let recording = Arc::new(RecordingDevice::new());
        let device: Arc<dyn GraphicsDevice> = recording.clone();
        let mut service = SharedUniformBufferService::default();
        service.initialize(&device).unwrap();

        let slots: Vec<_> = (0..=ELEMENTS_PER_BUFFER)
            .map(|_| service.allocate(device.as_ref()).unwrap())
            .collect();
        assert_eq!(recording.counters().buffers_created, 2);
        assert_eq!(slots[1].offset, UNIFORM_ELEMENT_SIZE);
        assert_ne!(slots[0].buffer, slots[ELEMENTS_PER_BUFFER as usize].buffer);

        service.free(slots[3]);
        let again = service.allocate(device.as_ref()).unwrap();
        assert_eq!(again, slots[3]);
        assert_eq!(service.used_elements(), ELEMENTS_PER_BUFFER as usize + 1);
        assert_eq!(service.terminate(device.as_ref()), 0);
        assert_eq!(recording.live_buffers(), 0);
    }

    #[test]
    fn oversized_writes_are_rejected() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(RecordingDevice::new());
        let mut service = SharedUniformBufferService::default();
        service.initialize(&device).unwrap();
        let slot = service.allocate(device.as_ref()).unwrap();
        let transfer = TransferService::default();
        let data = vec![0u8; UNIFORM_ELEMENT_SIZE as usize + 1];
        assert!(matches!(
            service.write(device.as_ref(), &transfer, &slot, &data),
            Err(ResourceError::OutOfBounds)
        ));
    }
}
