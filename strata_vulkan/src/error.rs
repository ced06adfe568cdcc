// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for Vulkan setup and frame operations.

use ash::vk;

use crate::device::QueueSelector;

/// Failures of the Vulkan layer.
#[derive(Debug, thiserror::Error)]
pub enum VulkanError {
    /// The Vulkan loader library could not be loaded.
    #[error("failed to load the Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),
    /// A Vulkan call returned an error code.
    #[error("Vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
    /// The instance does not support the required API version.
    #[error("Vulkan {required} required, instance supports {available}")]
    ApiVersionTooOld {
        /// Required version, formatted `major.minor`.
        required: String,
        /// Available version, formatted `major.minor`.
        available: String,
    },
    /// A required instance or device extension is not available.
    #[error("missing required extension {0}")]
    MissingExtension(String),
    /// No physical device supports every required device extension.
    #[error("no physical device supports the required extensions")]
    NoSuitableDevice,
    /// No queue family satisfies a queue specifier.
    #[error("no queue family satisfies the {0:?} queue specifier")]
    UnsatisfiedQueue(QueueSelector),
    /// A present queue specifier carries no surface.
    #[error("present queue specifier without a surface")]
    MissingSurface,
    /// The surface lacks a capability the swapchain needs.
    #[error("surface does not support {0}")]
    UnsupportedSurface(&'static str),
    /// No memory type satisfies an allocation.
    #[error("no suitable memory type for {0}")]
    NoMemoryType(&'static str),
    /// The external semaphore extensions are not enabled.
    #[error("external semaphore fd interop is unavailable")]
    SemaphoreInteropUnavailable,
    /// The swapchain is out of date and must be resized.
    #[error("swapchain is out of date")]
    OutOfDate,
}
