// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Window swapchain fed by CPU-rasterized frames.
//!
//! Each swapchain image has a [`GpuBuffer`] holding the semaphore that
//! orders presentation after the upload, a fence guarding reuse of the
//! buffer's command buffer and staging memory, and the acquire semaphore of
//! the image it currently owns. One spare buffer lets the next frame be
//! acquired while the previous one is still being presented.
//!
//! The frame cycle is [`Swapchain::next_frame`], drawing into the returned
//! [`RasterSurface`], [`Swapchain::submit_frame`], then
//! [`Swapchain::present_frame`].

use core::ffi::CStr;
use core::fmt;
use std::sync::Arc;

use ash::{khr, vk};
use strata_core::canvas::RasterSurface;

use crate::device::{DeviceQueue, QueueSpecifier, VulkanDevice};
use crate::error::VulkanError;
use crate::select;
use crate::upload::{StagingBuffer, record_copy_to_image};

/// Creates window-system surfaces. Implemented by windowing backends.
pub trait SurfaceFactory: fmt::Debug {
    /// Instance extensions the surface type needs, besides
    /// `VK_KHR_surface`.
    fn required_instance_extensions(&self) -> Vec<&'static CStr>;

    /// Creates a surface on `instance`.
    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR, VulkanError>;
}

const GRAPHICS_QUEUE: &str = "graphics";
const PRESENT_QUEUE: &str = "present";

#[derive(Debug)]
struct GpuBuffer {
    /// Signaled by the upload, waited on by presentation.
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    in_flight: bool,
    command_buffer: vk::CommandBuffer,
    staging: StagingBuffer,
    acquire_semaphore: Option<vk::Semaphore>,
    image_index: Option<u32>,
}

/// A `VkSwapchainKHR` plus the per-image resources needed to present CPU
/// frames.
pub struct Swapchain {
    device: Arc<VulkanDevice>,
    loader: khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    graphics: DeviceQueue,
    present: DeviceQueue,
    command_pool: vk::CommandPool,
    buffers: Vec<GpuBuffer>,
    current: usize,
    frame: Option<RasterSurface>,
}

impl fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swapchain")
            .field("format", &self.format)
            .field("present_mode", &self.present_mode)
            .field("extent", &self.extent)
            .field("images", &self.images.len())
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl Swapchain {
    /// Creates a surface with `factory`, a device able to present to it and
    /// a swapchain of `width` x `height`.
    ///
    /// The context must have been created with the factory's instance
    /// extensions.
    pub fn create(
        context: Arc<crate::VulkanContext>,
        factory: &dyn SurfaceFactory,
        width: u32,
        height: u32,
    ) -> Result<Self, VulkanError> {
        let surface = factory.create_surface(context.entry(), context.instance())?;
        let specifiers = [
            QueueSpecifier::graphics(GRAPHICS_QUEUE, 1),
            QueueSpecifier::present(PRESENT_QUEUE, surface),
        ];
        let device = match VulkanDevice::new(Arc::clone(&context), &specifiers, &[]) {
            Ok(device) => device,
            Err(err) => {
                // SAFETY: nothing else references the surface yet.
                unsafe { context.surface_instance().destroy_surface(surface, None) };
                return Err(err);
            }
        };
        Self::new(device, surface, width, height)
    }

    /// Creates a swapchain on `surface`, taking ownership of it.
    ///
    /// `device` must have been created with a `"graphics"` and a `"present"`
    /// queue specifier.
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, VulkanError> {
        let graphics = device.queue(GRAPHICS_QUEUE, 0);
        let present = device.queue(PRESENT_QUEUE, 0);
        let (Some(graphics), Some(present)) = (graphics, present) else {
            let context = device.context();
            // SAFETY: the surface is owned by this call and unused.
            unsafe { context.surface_instance().destroy_surface(surface, None) };
            return Err(VulkanError::UnsatisfiedQueue(
                crate::device::QueueSelector::Present,
            ));
        };
        let loader = khr::swapchain::Device::new(device.context().instance(), device.raw());
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics.family_index);
        // SAFETY: the device is valid.
        let command_pool = unsafe { device.raw().create_command_pool(&pool_info, None) }?;

        let mut swapchain = Self {
            device,
            loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            graphics,
            present,
            command_pool,
            buffers: Vec::new(),
            current: 0,
            frame: None,
        };
        // On failure the partially built swapchain drops and releases what
        // it holds.
        swapchain.build(width, height)?;
        Ok(swapchain)
    }

    fn build(&mut self, width: u32, height: u32) -> Result<(), VulkanError> {
        let context = Arc::clone(self.device.context());
        let surfaces = context.surface_instance();
        let physical = context.physical_device();
        // SAFETY: the surface belongs to this instance.
        let caps =
            unsafe { surfaces.get_physical_device_surface_capabilities(physical, self.surface) }?;
        select::check_surface_usage(&caps)?;
        // SAFETY: as above.
        let formats =
            unsafe { surfaces.get_physical_device_surface_formats(physical, self.surface) }?;
        self.format = select::pick_surface_format(&formats)
            .ok_or(VulkanError::UnsupportedSurface("an sRGB non-linear format"))?;
        // SAFETY: as above.
        let modes =
            unsafe { surfaces.get_physical_device_surface_present_modes(physical, self.surface) }?;
        self.present_mode = select::pick_present_mode(&modes);
        self.extent = select::pick_extent(&caps, width, height);

        let families = [self.graphics.family_index, self.present.family_index];
        let sharing = if families[0] == families[1] {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        };
        let composite_alpha = if caps
            .supported_composite_alpha
            .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
        {
            vk::CompositeAlphaFlagsKHR::OPAQUE
        } else {
            vk::CompositeAlphaFlagsKHR::INHERIT
        };
        let old = self.swapchain;
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(select::pick_image_count(&caps))
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(select::REQUIRED_SWAPCHAIN_USAGE)
            .image_sharing_mode(sharing)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old);
        if sharing == vk::SharingMode::CONCURRENT {
            info = info.queue_family_indices(&families);
        }
        // SAFETY: info and everything it points to outlive the call.
        self.swapchain = unsafe { self.loader.create_swapchain(&info, None) }?;
        if old != vk::SwapchainKHR::null() {
            // SAFETY: the device was idled before rebuilding.
            unsafe { self.loader.destroy_swapchain(old, None) };
        }
        // SAFETY: the swapchain was just created.
        self.images = unsafe { self.loader.get_swapchain_images(self.swapchain) }?;

        let frame_bytes = vk::DeviceSize::from(self.extent.width)
            * vk::DeviceSize::from(self.extent.height)
            * 4;
        for _ in 0..=self.images.len() {
            let buffer = self.create_buffer(frame_bytes)?;
            self.buffers.push(buffer);
        }
        self.current = 0;
        log::info!(
            "Created swapchain {}x{} with {} images ({:?}, {:?})",
            self.extent.width,
            self.extent.height,
            self.images.len(),
            self.format.format,
            self.present_mode
        );
        Ok(())
    }

    fn create_buffer(&self, frame_bytes: vk::DeviceSize) -> Result<GpuBuffer, VulkanError> {
        let raw = self.device.raw();
        let staging = StagingBuffer::new(&self.device, frame_bytes)?;
        let allocate = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let mut buffer = GpuBuffer {
            semaphore: vk::Semaphore::null(),
            fence: vk::Fence::null(),
            in_flight: false,
            command_buffer: vk::CommandBuffer::null(),
            staging,
            acquire_semaphore: None,
            image_index: None,
        };
        let result: Result<(), VulkanError> = (|| {
            // SAFETY: the pool belongs to this device.
            buffer.command_buffer = unsafe { raw.allocate_command_buffers(&allocate) }?
                .first()
                .copied()
                .unwrap_or_default();
            buffer.semaphore = self.device.create_semaphore()?;
            // SAFETY: the device is valid.
            buffer.fence = unsafe { raw.create_fence(&vk::FenceCreateInfo::default(), None) }?;
            Ok(())
        })();
        match result {
            Ok(()) => Ok(buffer),
            Err(err) => {
                self.destroy_buffer(buffer);
                Err(err)
            }
        }
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        let raw = self.device.raw();
        // SAFETY: the device is idle or the buffer was never submitted; null
        // handles are ignored by the destroy calls.
        unsafe {
            if buffer.command_buffer != vk::CommandBuffer::null() {
                raw.free_command_buffers(self.command_pool, &[buffer.command_buffer]);
            }
            raw.destroy_fence(buffer.fence, None);
            raw.destroy_semaphore(buffer.semaphore, None);
            if let Some(acquire) = buffer.acquire_semaphore {
                raw.destroy_semaphore(acquire, None);
            }
        }
        buffer.staging.destroy(raw);
    }

    fn destroy_buffers(&mut self) {
        for buffer in core::mem::take(&mut self.buffers) {
            self.destroy_buffer(buffer);
        }
    }

    /// The device the swapchain presents with.
    #[must_use]
    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// Pixel format of the swapchain images.
    #[must_use]
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Size of the swapchain images.
    #[must_use]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of swapchain images.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Number of frame buffers, one more than the image count.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// The most recently drawn frame, kept until the next acquire.
    #[must_use]
    pub fn last_frame(&self) -> Option<&RasterSurface> {
        self.frame.as_ref()
    }

    /// Acquires the next image if the current buffer does not own one yet
    /// and returns the surface to draw the frame into.
    pub fn next_frame(&mut self) -> Result<&mut RasterSurface, VulkanError> {
        let raw = self.device.raw();
        let buffer = &mut self.buffers[self.current];
        if buffer.image_index.is_none() {
            if buffer.in_flight {
                // SAFETY: the fence was submitted with the buffer's last upload.
                unsafe {
                    raw.wait_for_fences(&[buffer.fence], true, u64::MAX)?;
                    raw.reset_fences(&[buffer.fence])?;
                }
                buffer.in_flight = false;
            }
            if let Some(old) = buffer.acquire_semaphore.take() {
                // SAFETY: the upload that waited on it has completed.
                unsafe { raw.destroy_semaphore(old, None) };
            }
            let semaphore = self.device.create_semaphore()?;
            // SAFETY: the swapchain and semaphore are valid and unsignaled.
            let acquired = unsafe {
                self.loader.acquire_next_image(
                    self.swapchain,
                    u64::MAX,
                    semaphore,
                    vk::Fence::null(),
                )
            };
            let index = match acquired {
                Ok((index, suboptimal)) => {
                    if suboptimal {
                        log::debug!("Swapchain is suboptimal for its surface");
                    }
                    index
                }
                Err(err) => {
                    self.device.destroy_semaphore(semaphore);
                    return Err(match err {
                        vk::Result::ERROR_OUT_OF_DATE_KHR => VulkanError::OutOfDate,
                        other => other.into(),
                    });
                }
            };
            buffer.acquire_semaphore = Some(semaphore);
            buffer.image_index = Some(index);
        }

        let (width, height) = (self.extent.width, self.extent.height);
        let frame = match self.frame.take() {
            Some(frame) if frame.width() == width && frame.height() == height => frame,
            _ => RasterSurface::new(width, height)
                .ok_or(VulkanError::UnsupportedSurface("a zero-sized extent"))?,
        };
        Ok(self.frame.insert(frame))
    }

    /// Uploads the frame to the acquired image.
    ///
    /// The upload waits on the acquire semaphore and `wait`, and signals the
    /// buffer's presentation semaphore followed by `signal`.
    pub fn submit_frame(
        &mut self,
        signal: &[vk::Semaphore],
        wait: &[vk::Semaphore],
    ) -> Result<(), VulkanError> {
        let raw = self.device.raw();
        let buffer = &mut self.buffers[self.current];
        let (Some(index), Some(acquire), Some(frame)) =
            (buffer.image_index, buffer.acquire_semaphore, self.frame.as_ref())
        else {
            log::error!("Swapchain frame submitted without an acquired image");
            return Err(VulkanError::Vk(vk::Result::ERROR_UNKNOWN));
        };
        let image = self.images[index as usize];
        buffer.staging.write(raw, frame.pixmap(), self.format.format)?;
        record_copy_to_image(
            raw,
            buffer.command_buffer,
            buffer.staging.buffer(),
            image,
            self.extent,
        )?;

        let waits: Vec<vk::Semaphore> =
            core::iter::once(acquire).chain(wait.iter().copied()).collect();
        let stages = vec![vk::PipelineStageFlags::TRANSFER; waits.len()];
        let signals: Vec<vk::Semaphore> =
            core::iter::once(buffer.semaphore).chain(signal.iter().copied()).collect();
        let command_buffers = [buffer.command_buffer];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signals);
        // SAFETY: every handle belongs to this device and the command buffer
        // is fully recorded.
        unsafe { raw.queue_submit(self.graphics.queue, &[submit], buffer.fence) }?;
        buffer.in_flight = true;
        Ok(())
    }

    /// Presents the submitted image and advances to the next buffer.
    pub fn present_frame(&mut self) -> Result<(), VulkanError> {
        let buffer = &mut self.buffers[self.current];
        let Some(index) = buffer.image_index.take() else {
            log::error!("Swapchain presented without an acquired image");
            return Err(VulkanError::Vk(vk::Result::ERROR_UNKNOWN));
        };
        let waits = [buffer.semaphore];
        let swapchains = [self.swapchain];
        let indices = [index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        self.current = (self.current + 1) % self.buffers.len();
        // SAFETY: the image was acquired and its upload submitted.
        match unsafe { self.loader.queue_present(self.present.queue, &info) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                log::debug!("Presented to a suboptimal swapchain");
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(VulkanError::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }

    /// Recreates the swapchain for a new surface size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), VulkanError> {
        self.device.wait_idle()?;
        self.frame = None;
        self.destroy_buffers();
        self.build(width, height)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to idle the device before destroying the swapchain: {err}");
        }
        self.destroy_buffers();
        // SAFETY: the device is idle and nothing references these handles.
        unsafe {
            self.device.raw().destroy_command_pool(self.command_pool, None);
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.device
                .context()
                .surface_instance()
                .destroy_surface(self.surface, None);
        }
    }
}
