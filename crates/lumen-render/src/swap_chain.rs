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

//! The presentable image chain and its per-image command resources.

use lumen_core::renderer::api::{
    CommandBufferId, CommandPoolDescriptor, CommandPoolId, Extent2D, PresentMode, PresentStatus,
    SubmissionId, SubmitInfo, SwapChainDescriptor, SwapChainId, SwapChainInfo, TextureFormat,
    TextureViewId,
};
use lumen_core::renderer::{GraphicsDevice, RenderError, SurfaceError};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

/// Health of a [`SwapChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapChainStatus {
    /// Images can be acquired.
    Ready,
    /// The chain no longer matches its surface and must be recreated first.
    Degraded,
}

/// One acquired image together with the command buffer that renders into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainFrame {
    /// Index of the acquired image.
    pub image_index: u32,
    /// View of the acquired image.
    pub view: TextureViewId,
    /// Primary command buffer of this frame slot.
    pub command_buffer: CommandBufferId,
    /// Frame slot, in `0..image_count`.
    pub frame_index: usize,
}

#[derive(Debug, Clone, Copy)]
struct FrameResources {
    command_pool: CommandPoolId,
    command_buffer: CommandBufferId,
}

/// A ring of presentable images, each with its own command pool and buffer.
///
/// No image is handed out while the chain is [`SwapChainStatus::Degraded`].
/// The owner must call [`SwapChain::recreate`] first.
#[derive(Debug)]
pub struct SwapChain {
    id: SwapChainId,
    info: SwapChainInfo,
    present_mode: PresentMode,
    frames: Vec<FrameResources>,
    current_frame: usize,
    degraded: AtomicBool,
    recreate_after_present: bool,
    generation: u64,
}

impl SwapChain {
    /// Creates the device swap chain and one command pool + buffer per image.
    pub fn create(
        device: &dyn GraphicsDevice,
        descriptor: &SwapChainDescriptor,
    ) -> Result<Self, RenderError> {
        let (id, info) = device.create_swap_chain(descriptor)?;
        let mut chain = Self {
            id,
            info,
            present_mode: descriptor.present_mode,
            frames: Vec::new(),
            current_frame: 0,
            degraded: AtomicBool::new(false),
            recreate_after_present: false,
            generation: 0,
        };
        if let Err(e) = chain.create_frames(device) {
            chain.destroy(device);
            return Err(e);
        }
        log::info!(
            "SwapChain: created {} images of {}x{} ({:?})",
            info.image_count,
            info.extent.width,
            info.extent.height,
            info.format
        );
        Ok(chain)
    }

    fn create_frames(&mut self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        for index in 0..self.info.image_count {
            let command_pool = device.create_command_pool(&CommandPoolDescriptor {
                label: Some(Cow::Owned(format!("Swap Chain Frame Pool {index}"))),
                transient: false,
                resettable: true,
            })?;
            self.frames.push(FrameResources {
                command_pool,
                command_buffer: device.allocate_command_buffer(command_pool)?,
            });
        }
        Ok(())
    }

    fn destroy_frames(&mut self, device: &dyn GraphicsDevice) -> usize {
        let mut errors = 0;
        for frame in self.frames.drain(..) {
            if let Err(e) = device.destroy_command_pool(frame.command_pool) {
                log::error!("SwapChain: failed to destroy frame command pool: {e}");
                errors += 1;
            }
        }
        errors
    }

    /// The device handle.
    pub fn id(&self) -> SwapChainId {
        self.id
    }

    /// Current status.
    pub fn status(&self) -> SwapChainStatus {
        if self.degraded.load(Ordering::Acquire) {
            SwapChainStatus::Degraded
        } else {
            SwapChainStatus::Ready
        }
    }

    /// Flags the chain for recreation.
    pub fn mark_degraded(&self) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            log::debug!("SwapChain: marked degraded");
        }
    }

    /// Incremented by every successful recreation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Image size.
    pub fn extent(&self) -> Extent2D {
        self.info.extent
    }

    /// Image format.
    pub fn format(&self) -> TextureFormat {
        self.info.format
    }

    /// Number of images, and of frame slots.
    pub fn image_count(&self) -> u32 {
        self.info.image_count
    }

    /// The frame slot the next acquisition will use.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Acquires the next image.
    ///
    /// ## Errors
    /// [`SurfaceError::Degraded`] while the chain awaits recreation. An
    /// out-of-date or lost surface marks the chain degraded. A suboptimal
    /// image is still returned; the chain is marked degraded once that image
    /// has been presented, so the next frame recreates it.
    pub fn acquire_next_image(
        &mut self,
        device: &dyn GraphicsDevice,
    ) -> Result<SwapChainFrame, SurfaceError> {
        if self.status() == SwapChainStatus::Degraded {
            return Err(SurfaceError::Degraded);
        }
        let resources = *self
            .frames
            .get(self.current_frame)
            .ok_or_else(|| SurfaceError::Other("swap chain has no frame resources".into()))?;
        match device.acquire_next_image(self.id) {
            Ok(image) => {
                if image.suboptimal {
                    self.recreate_after_present = true;
                }
                Ok(SwapChainFrame {
                    image_index: image.index,
                    view: image.view,
                    command_buffer: resources.command_buffer,
                    frame_index: self.current_frame,
                })
            }
            Err(e) => {
                if e.requires_recreation() {
                    self.mark_degraded();
                }
                Err(e)
            }
        }
    }

    /// Submits the frame's command buffer after its image is available, then
    /// presents the image and advances to the next frame slot.
    ///
    /// A failed submission releases the image, so the next frame can
    /// acquire again.
    ///
    /// ## Returns
    /// The submission, so dependents can wait for its completion.
    pub fn submit_and_present(
        &mut self,
        device: &dyn GraphicsDevice,
        frame: &SwapChainFrame,
    ) -> Result<SubmissionId, RenderError> {
        let submission = match device.submit(&SubmitInfo {
            command_buffer: frame.command_buffer,
            wait_image: Some((self.id, frame.image_index)),
        }) {
            Ok(submission) => submission,
            Err(e) => {
                self.release(device, frame);
                return Err(e);
            }
        };
        self.current_frame = (self.current_frame + 1) % self.frames.len().max(1);
        if std::mem::take(&mut self.recreate_after_present) {
            self.mark_degraded();
        }
        match device.present(self.id, frame.image_index) {
            Ok(PresentStatus::Optimal) => Ok(submission),
            Ok(PresentStatus::Suboptimal) => {
                self.mark_degraded();
                Ok(submission)
            }
            Err(e) => {
                if e.requires_recreation() {
                    self.mark_degraded();
                }
                Err(RenderError::Surface(e))
            }
        }
    }

    /// Gives the image of a dropped frame back without presenting it.
    ///
    /// The frame slot is reused by the next acquisition. If the device
    /// refuses, the chain is marked degraded so recreation reclaims the image.
    pub fn release(&mut self, device: &dyn GraphicsDevice, frame: &SwapChainFrame) {
        if std::mem::take(&mut self.recreate_after_present) {
            self.mark_degraded();
        }
        if let Err(e) = device.release_image(self.id, frame.image_index) {
            log::warn!(
                "SwapChain: failed to release image {}: {e}",
                frame.image_index
            );
            self.mark_degraded();
        }
    }

    /// Rebuilds the chain for `extent` and returns it to
    /// [`SwapChainStatus::Ready`].
    ///
    /// On failure the chain stays degraded and its previous command
    /// resources remain valid.
    pub fn recreate(
        &mut self,
        device: &dyn GraphicsDevice,
        extent: Extent2D,
    ) -> Result<(), RenderError> {
        device.wait_idle()?;
        let descriptor = SwapChainDescriptor {
            extent,
            image_count: self.info.image_count,
            present_mode: self.present_mode,
        };
        let info = device.recreate_swap_chain(self.id, &descriptor)?;
        self.destroy_frames(device);
        self.info = info;
        self.current_frame = 0;
        self.recreate_after_present = false;
        self.create_frames(device)?;
        self.generation += 1;
        self.degraded.store(false, Ordering::Release);
        log::info!(
            "SwapChain: recreated at {}x{} (generation {})",
            extent.width,
            extent.height,
            self.generation
        );
        Ok(())
    }

    /// Destroys the command resources and the device swap chain.
    ///
    /// ## Returns
    /// The number of objects that failed to be destroyed.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) -> usize {
        let mut errors = self.destroy_frames(device);
        if let Err(e) = device.destroy_swap_chain(self.id) {
            log::error!("SwapChain: failed to destroy swap chain: {e}");
            errors += 1;
        }
        self.degraded.store(true, Ordering::Release);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::testing::RecordingDevice;
    use lumen_core::renderer::CommandBufferUsage;

    fn descriptor() -> SwapChainDescriptor {
        SwapChainDescriptor {
            extent: Extent2D::new(640, 480),
            image_count: 3,
            present_mode: PresentMode::Fifo,
        }
    }

    fn record_empty(device: &RecordingDevice, frame: &SwapChainFrame) {
        let recorder = device
            .begin_command_buffer(frame.command_buffer, CommandBufferUsage::OneTimeSubmit)
            .unwrap();
        recorder.finish().unwrap();
    }

    #[test]
    fn frames_cycle_through_slots() {
        let device = RecordingDevice::new();
        let mut chain = SwapChain::create(&device, &descriptor()).unwrap();
        assert_eq!(device.counters().command_buffers_allocated, 3);
        for expected in [0, 1, 2, 0] {
            let frame = chain.acquire_next_image(&device).unwrap();
            assert_eq!(frame.frame_index, expected);
            record_empty(&device, &frame);
            chain.submit_and_present(&device, &frame).unwrap();
        }
        assert_eq!(device.counters().presents, 4);
    }

    #[test]
    fn out_of_date_degrades_and_blocks_acquisition() {
        let device = RecordingDevice::new();
        let mut chain = SwapChain::create(&device, &descriptor()).unwrap();
        device.fail_next_acquire(SurfaceError::OutOfDate);
        assert_eq!(
            chain.acquire_next_image(&device),
            Err(SurfaceError::OutOfDate)
        );
        assert_eq!(chain.status(), SwapChainStatus::Degraded);
        assert_eq!(
            chain.acquire_next_image(&device),
            Err(SurfaceError::Degraded)
        );
        assert_eq!(device.counters().acquisitions, 0);

        chain.recreate(&device, Extent2D::new(800, 600)).unwrap();
        assert_eq!(chain.status(), SwapChainStatus::Ready);
        assert_eq!(chain.generation(), 1);
        assert_eq!(chain.extent(), Extent2D::new(800, 600));
        assert!(chain.acquire_next_image(&device).is_ok());
    }

    #[test]
    fn suboptimal_image_degrades_after_present() {
        let device = RecordingDevice::new();
        let mut chain = SwapChain::create(&device, &descriptor()).unwrap();
        device.suboptimal_next_acquires(1);
        let frame = chain.acquire_next_image(&device).unwrap();
        assert_eq!(chain.status(), SwapChainStatus::Ready);
        record_empty(&device, &frame);
        chain.submit_and_present(&device, &frame).unwrap();
        assert_eq!(chain.status(), SwapChainStatus::Degraded);
    }

    #[test]
    fn failed_recreation_stays_degraded() {
        let device = RecordingDevice::new();
        let mut chain = SwapChain::create(&device, &descriptor()).unwrap();
        chain.mark_degraded();
        device.fail_recreations(1);
        assert!(chain.recreate(&device, Extent2D::new(10, 10)).is_err());
        assert_eq!(chain.status(), SwapChainStatus::Degraded);
        assert_eq!(chain.generation(), 0);
    }

    #[test]
    fn destroy_reports_no_errors() {
        let device = RecordingDevice::new();
        let mut chain = SwapChain::create(&device, &descriptor()).unwrap();
        assert_eq!(chain.destroy(&device), 0);
    }

    #[test]
    fn failed_submission_releases_the_image() {
        let device = RecordingDevice::new();
        let mut chain = SwapChain::create(&device, &descriptor()).unwrap();
        let frame = chain.acquire_next_image(&device).unwrap();
        record_empty(&device, &frame);
        device.fail_next_submit(1);
        assert!(chain.submit_and_present(&device, &frame).is_err());
        assert_eq!(device.held_image(chain.id()), None);
        assert_eq!(chain.status(), SwapChainStatus::Ready);

        let retry = chain.acquire_next_image(&device).unwrap();
        assert_eq!(retry.frame_index, frame.frame_index);
        record_empty(&device, &retry);
        chain.submit_and_present(&device, &retry).unwrap();
        assert_eq!(device.counters().presents, 1);
    }

    #[test]
    fn released_suboptimal_image_degrades() {
        let device = RecordingDevice::new();
        let mut chain = SwapChain::create(&device, &descriptor()).unwrap();
        device.suboptimal_next_acquires(1);
        let frame = chain.acquire_next_image(&device).unwrap();
        chain.release(&device, &frame);
        assert_eq!(device.counters().releases, 1);
        assert_eq!(chain.status(), SwapChainStatus::Degraded);
    }
}
