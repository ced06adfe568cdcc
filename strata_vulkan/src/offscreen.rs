// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surfaceless device for offscreen rendering and semaphore interop.

use std::sync::Arc;

use ash::vk;
use strata_core::canvas::RasterSurface;

use crate::context::VulkanContext;
use crate::device::{DeviceQueue, QueueSpecifier, VulkanDevice};
use crate::error::VulkanError;

const OFFSCREEN_QUEUE: &str = "offscreen";

/// A device with a single graphics queue and no window surface.
#[derive(Debug)]
pub struct Offscreen {
    device: Arc<VulkanDevice>,
    queue: DeviceQueue,
}

impl Offscreen {
    /// Creates the device.
    pub fn new(context: Arc<VulkanContext>) -> Result<Self, VulkanError> {
        let specifiers = [QueueSpecifier::graphics(OFFSCREEN_QUEUE, 1)];
        let device = VulkanDevice::new(context, &specifiers, &[])?;
        let queue = device
            .queue(OFFSCREEN_QUEUE, 0)
            .ok_or(VulkanError::UnsatisfiedQueue(crate::QueueSelector::Graphics))?;
        Ok(Self { device, queue })
    }

    /// The offscreen device.
    #[must_use]
    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// Allocates a render target of `width` x `height`.
    #[must_use]
    pub fn make_render_target(&self, width: u32, height: u32) -> Option<RasterSurface> {
        let surface = RasterSurface::new(width, height);
        if surface.is_none() {
            log::error!("Failed to allocate a {width}x{height} offscreen render target");
        }
        surface
    }

    /// Submits an empty batch that waits on `wait` and signals `signal`.
    ///
    /// Offscreen frames are complete once drawn, so the batch only keeps the
    /// semaphore protocol of external consumers intact.
    pub fn signal_semaphores(
        &self,
        signal: &[vk::Semaphore],
        wait: &[vk::Semaphore],
    ) -> Result<(), VulkanError> {
        if signal.is_empty() && wait.is_empty() {
            return Ok(());
        }
        let stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait.len()];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(wait)
            .wait_dst_stage_mask(&stages)
            .signal_semaphores(signal);
        // SAFETY: the semaphores belong to this device.
        unsafe {
            self.device
                .raw()
                .queue_submit(self.queue.queue, &[submit], vk::Fence::null())
        }?;
        Ok(())
    }
}
