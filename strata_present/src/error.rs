// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use core::fmt;

use strata_vulkan::VulkanError;

/// Failures of present-thread setup and rendering.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    /// The OS refused to spawn the present thread.
    #[error("failed to spawn the present thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The present thread exited before publishing its queue.
    #[error("the present thread exited during startup")]
    Startup,
    /// The present thread has terminated and accepts no more messages.
    #[error("the present thread is not running")]
    QueueClosed,
    /// Options could not be parsed.
    #[error("invalid present options: {0}")]
    Options(#[from] serde_json::Error),
    /// A Vulkan operation failed.
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
    /// A render target of the given size could not be allocated.
    #[error("failed to allocate a {width}x{height} render target")]
    Allocation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// A frame operation was issued out of order.
    #[error("render target is not inside a frame")]
    NotInFrame,
    /// The surface was closed.
    #[error("the surface is closed")]
    SurfaceClosed,
}

/// Logs a broken API contract and aborts the process.
///
/// Used for programmer errors that leave the message bus in an undefined
/// state, such as a trampoline reading an argument of the wrong type.
pub(crate) fn contract_violation(what: fmt::Arguments<'_>) -> ! {
    log::error!("Contract violation: {what}");
    std::process::abort()
}
