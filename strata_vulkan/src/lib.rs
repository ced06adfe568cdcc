// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vulkan plumbing for the Strata present thread.
//!
//! - [`VulkanContext`]: instance, optional validation messenger forwarding to
//!   `log`, and the physical device.
//! - [`VulkanDevice`]: logical device with named queues and semaphore fd
//!   import/export.
//! - [`Swapchain`]: presents CPU-rasterized frames to a window surface made
//!   by a [`SurfaceFactory`].
//! - [`Offscreen`]: a surfaceless device used when hardware-composed
//!   presentation is disabled.
//!
//! Selection rules (surface format, present mode, image count, queue family)
//! are plain functions in [`select`] so they can be tested without a GPU.
//!
//! All handles are owned by the present thread; none of the types here are
//! meant to be shared across threads.

#![expect(unsafe_code, reason = "every Vulkan call goes through ash's unsafe API")]

mod context;
mod device;
mod error;
mod offscreen;
pub mod select;
mod swapchain;
mod upload;

pub use ash::vk;
pub use context::{ContextOptions, DebugFilter, DebugMessageType, DebugSeverity, VulkanContext};
pub use device::{DeviceQueue, QueueSelector, QueueSpecifier, VulkanDevice};
pub use error::VulkanError;
pub use offscreen::Offscreen;
pub use swapchain::{SurfaceFactory, Swapchain};
pub use upload::write_pixels;
