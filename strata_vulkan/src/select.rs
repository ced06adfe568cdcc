// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Selection rules for formats, present modes, queue families and memory.
//!
//! These functions only look at property structs, so they are usable (and
//! tested) without a GPU.

use core::ffi::CStr;

use ash::vk;

use crate::device::QueueSelector;
use crate::error::VulkanError;

/// Lowest accepted instance API version.
pub const REQUIRED_API_VERSION: u32 = vk::API_VERSION_1_2;

/// Image usages the swapchain images must support.
pub const REQUIRED_SWAPCHAIN_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::TRANSFER_SRC.as_raw()
        | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// Formats `version` as `major.minor`.
#[must_use]
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}",
        vk::api_version_major(version),
        vk::api_version_minor(version)
    )
}

/// Fails unless `available` is at least [`REQUIRED_API_VERSION`].
pub fn check_api_version(available: u32) -> Result<(), VulkanError> {
    let major_minor = |v: u32| (vk::api_version_major(v), vk::api_version_minor(v));
    if major_minor(available) < major_minor(REQUIRED_API_VERSION) {
        return Err(VulkanError::ApiVersionTooOld {
            required: version_string(REQUIRED_API_VERSION),
            available: version_string(available),
        });
    }
    Ok(())
}

/// Returns the entries of `required` missing from `available`.
#[must_use]
pub fn missing_extensions<'a>(available: &[&CStr], required: &[&'a CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

/// Picks an sRGB non-linear format, preferring `B8G8R8A8_UNORM`.
#[must_use]
pub fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let srgb = || {
        formats
            .iter()
            .filter(|f| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };
    srgb()
        .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
        .or_else(|| srgb().next())
        .copied()
}

/// Prefers `MAILBOX`, falling back to `FIFO` which every device supports.
#[must_use]
pub fn pick_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// `minImageCount + 1`, clamped to `maxImageCount` when the surface has one.
#[must_use]
pub fn pick_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// The surface's current extent, or the requested size clamped to the
/// supported range when the surface lets the swapchain decide.
#[must_use]
pub fn pick_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Fails unless the surface supports [`REQUIRED_SWAPCHAIN_USAGE`].
pub fn check_surface_usage(caps: &vk::SurfaceCapabilitiesKHR) -> Result<(), VulkanError> {
    let supported = caps.supported_usage_flags;
    let checks = [
        (vk::ImageUsageFlags::COLOR_ATTACHMENT, "color attachment usage"),
        (vk::ImageUsageFlags::TRANSFER_SRC, "transfer source usage"),
        (vk::ImageUsageFlags::TRANSFER_DST, "transfer destination usage"),
    ];
    for (flag, what) in checks {
        if !supported.contains(flag) {
            return Err(VulkanError::UnsupportedSurface(what));
        }
    }
    Ok(())
}

/// Finds the first queue family matching `selector` with at least `count`
/// queues. `supports_present` is consulted for [`QueueSelector::Present`].
#[must_use]
pub fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    selector: QueueSelector,
    count: u32,
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    (0_u32..)
        .zip(families)
        .find(|(index, family)| {
            family.queue_count >= count
                && match selector {
                    QueueSelector::Graphics => family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    QueueSelector::Present => supports_present(*index),
                }
        })
        .map(|(index, _)| index)
}

/// Finds a memory type allowed by `type_bits` with all of `flags`.
#[must_use]
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = properties.memory_type_count as usize;
    (0_u32..)
        .zip(properties.memory_types.iter().take(count))
        .find(|(index, memory_type)| {
            type_bits & (1 << *index) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(index, _)| index)
}
