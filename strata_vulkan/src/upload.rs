// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Copies CPU-rendered frames into swapchain images.

use ash::vk;
use tiny_skia::Pixmap;

use crate::device::VulkanDevice;
use crate::error::VulkanError;
use crate::select;

/// Copies premultiplied RGBA8 pixels into a buffer laid out for `format`.
///
/// BGRA formats get their red and blue channels swapped; every other format
/// receives the bytes unchanged. Copies as many whole pixels as both slices
/// hold.
pub fn write_pixels(src: &[u8], dst: &mut [u8], format: vk::Format) {
    let swap = matches!(
        format,
        vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB
    );
    let len = src.len().min(dst.len()) / 4 * 4;
    if !swap {
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }
    for (d, s) in dst[..len].chunks_exact_mut(4).zip(src[..len].chunks_exact(4)) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
        d[3] = s[3];
    }
}

/// A host-visible buffer holding one frame worth of pixels.
#[derive(Debug)]
pub(crate) struct StagingBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl StagingBuffer {
    pub(crate) fn new(device: &VulkanDevice, size: vk::DeviceSize) -> Result<Self, VulkanError> {
        let raw = device.raw();
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        // SAFETY: the device is valid.
        let buffer = unsafe { raw.create_buffer(&info, None) }?;
        // SAFETY: `buffer` was just created on this device.
        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let Some(memory_type) = select::find_memory_type(
            device.memory_properties(),
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) else {
            // SAFETY: `buffer` is unused.
            unsafe { raw.destroy_buffer(buffer, None) };
            return Err(VulkanError::NoMemoryType("staging buffer"));
        };
        let allocate = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        // SAFETY: the device is valid.
        let memory = match unsafe { raw.allocate_memory(&allocate, None) } {
            Ok(memory) => memory,
            Err(err) => {
                // SAFETY: `buffer` is unused.
                unsafe { raw.destroy_buffer(buffer, None) };
                return Err(err.into());
            }
        };
        let staging = Self {
            buffer,
            memory,
            size,
        };
        // SAFETY: the memory type is compatible with the buffer.
        if let Err(err) = unsafe { raw.bind_buffer_memory(buffer, memory, 0) } {
            staging.destroy(raw);
            return Err(err.into());
        }
        Ok(staging)
    }

    pub(crate) fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    /// Writes `pixmap` into the buffer. The buffer must not be in use by the
    /// device.
    pub(crate) fn write(
        &self,
        device: &ash::Device,
        pixmap: &Pixmap,
        format: vk::Format,
    ) -> Result<(), VulkanError> {
        // SAFETY: the memory is host-visible and not mapped elsewhere.
        let ptr = unsafe {
            device.map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        }?;
        let len = usize::try_from(self.size).unwrap_or(usize::MAX);
        // SAFETY: the mapping covers `size` bytes and nothing else aliases it
        // until it is unmapped below.
        let dst = unsafe { core::slice::from_raw_parts_mut(ptr.cast::<u8>(), len) };
        write_pixels(pixmap.data(), dst, format);
        // SAFETY: `dst` is not used past this point.
        unsafe { device.unmap_memory(self.memory) };
        Ok(())
    }

    pub(crate) fn destroy(self, device: &ash::Device) {
        // SAFETY: callers wait for every submission using the buffer.
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Records `buffer -> image` with the layout transitions around it. The
/// image ends in `PRESENT_SRC_KHR`.
pub(crate) fn record_copy_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> Result<(), VulkanError> {
    let to_transfer = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range());
    let to_present = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::empty())
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range());
    let region = vk::BufferImageCopy::default()
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });

    // SAFETY: `cmd` is a primary command buffer of this device that is not
    // pending execution; every handle recorded belongs to the same device.
    unsafe {
        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(
            cmd,
            &vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
        )?;
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_present],
        );
        device.end_command_buffer(cmd)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_swaps_red_and_blue() {
        let src = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0_u8; 8];
        write_pixels(&src, &mut dst, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(dst, [3, 2, 1, 4, 7, 6, 5, 8], "channels 0 and 2 swap");
    }

    #[test]
    fn rgba_copies_verbatim() {
        let src = [1, 2, 3, 4];
        let mut dst = [0_u8; 4];
        write_pixels(&src, &mut dst, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(dst, src, "no swizzle for RGBA");
    }

    #[test]
    fn short_destination_truncates_to_whole_pixels() {
        let src = [9_u8; 12];
        let mut dst = [0_u8; 7];
        write_pixels(&src, &mut dst, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(dst, [9, 9, 9, 9, 0, 0, 0], "partial pixel left untouched");
    }
}
