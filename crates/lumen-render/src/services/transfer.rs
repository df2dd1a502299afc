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

use super::{RenderService, ServiceError};
use lumen_core::renderer::api::{BufferDescriptor, BufferId};
use lumen_core::renderer::{GraphicsDevice, ResourceError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Upload counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Successful uploads.
    pub uploads: usize,
    /// Bytes written to the device.
    pub bytes: u64,
    /// Failed uploads.
    pub failures: usize,
}

/// Funnels every host-to-device buffer write.
#[derive(Debug, Default)]
pub struct TransferService {
    uploads: AtomicUsize,
    bytes: AtomicU64,
    failures: AtomicUsize,
}

impl TransferService {
    /// Writes `data` into `buffer` at `offset`.
    pub fn upload(
        &self,
        device: &dyn GraphicsDevice,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        match device.write_buffer(buffer, offset, data) {
            Ok(()) => {
                self.uploads.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("TransferService: upload to {buffer:?} failed: {e}");
                Err(e)
            }
        }
    }

    /// Creates a buffer and fills it with `data`.
    pub fn create_buffer_with_data(
        &self,
        device: &dyn GraphicsDevice,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let buffer = device.create_buffer(descriptor)?;
        if let Err(e) = self.upload(device, buffer, 0, data) {
            if let Err(destroy) = device.destroy_buffer(buffer) {
                log::error!("TransferService: failed to release {buffer:?}: {destroy}");
            }
            return Err(e);
        }
        Ok(buffer)
    }

    /// Current counters.
    pub fn stats(&self) -> TransferStats {
        TransferStats {
            uploads: self.uploads.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl RenderService for TransferService {
    fn name(&self) -> &'static str {
        "TransferService"
    }

    fn initialize(&mut self, device: &Arc<dyn GraphicsDevice>) -> Result<(), ServiceError> {
        log::debug!(
            "TransferService: uploads go through the queue of '{}'",
            device.adapter_info().name
        );
        Ok(())
    }

    fn terminate(&mut self, _device: &dyn GraphicsDevice) -> usize {
        let stats = self.stats();
        log::debug!(
            "TransferService: {} uploads, {} bytes, {} failures",
            stats.uploads,
            stats.bytes,
            stats.failures
        );
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::BufferUsage;
    use lumen_core::renderer::testing::RecordingDevice;

    #[test]
    fn uploads_are_counted() {
        let device = RecordingDevice::new();
        let service = TransferService::default();
        let buffer = service
            .create_buffer_with_data(
                &device,
                &BufferDescriptor {
                    label: None,
                    size: 8,
                    usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                },
                &[1, 2, 3, 4],
            )
            .unwrap();
        assert_eq!(&device.buffer_contents(buffer).unwrap()[..4], &[1, 2, 3, 4]);
        assert!(service.upload(&device, buffer, 6, &[0; 4]).is_err());
        let stats = service.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.bytes, 4);
        assert_eq!(stats.failures, 1);
    }
}
