// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Present thread, message bus and content aggregation for Strata.
//!
//! Rendering runs on a dedicated present thread. The host thread talks to
//! the objects living there through a pair of message queues:
//!
//! ```text
//!   host thread                                 present thread
//!   ───────────                                 ──────────────
//!   RemoteHandle::invoke ──► present queue ──► DispatchTable trampoline
//!                                                   │
//!   callback(RemoteReturn) ◄── host queue ◄─────────┤ result
//!   host slots ◄──────────────  host queue ◄──────── emit(signal) ─► local slots
//! ```
//!
//! [`PresentThread`] starts the thread and dispatches what comes back.
//! Objects addressable from the host implement [`RemoteObject`]: the
//! [`TaskRunner`], the [`Display`], its [`Surface`]s and their
//! [`ContentAggregator`]s. Objects that may hold GPU resources cross the
//! thread boundary inside a [`GpuObjectGuard`] so they are always released
//! on the present thread.
//!
//! A [`ContentAggregator`] renders `strata_core` layer trees into a surface's
//! [`RenderTarget`]: a CPU raster target or a Vulkan swapchain from
//! `strata_vulkan`.

mod aggregator;
mod display;
mod error;
mod gpu_guard;
mod link;
mod local_context;
mod message;
mod options;
mod queue;
mod remote_call;
mod remote_handle;
mod render_target;
mod surface;
mod task_runner;
mod thread;
mod transfer_profiler;

pub use aggregator::{ContentAggregator, FrameSchedule, UpdateResult};
pub use display::{BoxedSurfaceFactory, Display};
pub use error::PresentError;
pub use gpu_guard::{GpuObjectCollector, GpuObjectGuard};
pub use link::ThreadLink;
pub use local_context::LocalContext;
pub use message::{MessageMilestone, Milestones, SignalInfo};
pub use options::{
    ApplicationVersion, DebugLevel, DebugType, PresentOptions, VulkanDebugOptions,
};
pub use remote_call::{
    OpCode, RemoteArgs, RemoteCallStatus, RemoteCallback, RemoteError, RemoteResult,
    RemoteReturn, RemoteValue, remote_ok,
};
pub use remote_handle::{DispatchTable, RemoteHandle, RemoteObject, SignalCode, SlotId};
pub use render_target::{
    BuffersDescriptor, FrameSubmission, HwComposeRenderTarget, RasterRenderTarget, RenderTarget,
    RenderTargetKind,
};
pub use surface::{Surface, WindowState};
pub use task_runner::{ReleaseQueue, Task, TaskRunner};
pub use thread::PresentThread;
