// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource tracing for memory diagnostics.
//!
//! Objects that own pixel storage or GPU handles implement [`Trackable`] and
//! report what they hold to a [`ResourceTracer`]. Members that are themselves
//! trackable are reported through [`ResourceTracer::trace_member`], which lets
//! a tracer build a nested view (`strata_debug::resources` renders it as
//! JSON).

/// Kind of traced resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackableType {
    /// A sampled image or texture.
    Texture,
    /// A render target or imported surface.
    Surface,
    /// A GPU semaphore.
    Semaphore,
    /// A recorded display list.
    Picture,
    /// Any other handle.
    Handle,
}

impl TrackableType {
    /// Stable string used in exported traces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Texture => "texture",
            Self::Surface => "surface",
            Self::Semaphore => "semaphore",
            Self::Picture => "picture",
            Self::Handle => "handle",
        }
    }
}

/// Memory the traced resource lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackableDevice {
    /// Host memory.
    Cpu,
    /// Device memory.
    Gpu,
}

impl TrackableDevice {
    /// Stable string used in exported traces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

/// Whether the tracing object is the sole owner of the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackableOwnership {
    /// Released when the tracing object is released.
    StrictOwned,
    /// Reference counted and possibly shared with other owners.
    Shared,
}

impl TrackableOwnership {
    /// Stable string used in exported traces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrictOwned => "strict-owned",
            Self::Shared => "shared",
        }
    }
}

/// A single resource reported to a tracer.
#[derive(Clone, Copy, Debug)]
pub struct TracedResource<'a> {
    /// Human-readable description.
    pub annotation: &'a str,
    /// Resource kind.
    pub kind: TrackableType,
    /// Memory location.
    pub device: TrackableDevice,
    /// Ownership.
    pub ownership: TrackableOwnership,
    /// Identifier, unique within its kind.
    pub id: u64,
    /// Approximate size in bytes, when known.
    pub size: Option<usize>,
}

/// Receiver of resource reports.
pub trait ResourceTracer {
    /// Records a resource held directly by the object being traced.
    fn trace_resource(&mut self, resource: TracedResource<'_>);

    /// Records a trackable member; implementations usually recurse into
    /// `member.trace`.
    fn trace_member(&mut self, annotation: &str, member: &dyn Trackable);
}

/// An object that can report the resources it holds.
pub trait Trackable {
    /// Reports held resources to `tracer`.
    fn trace(&self, tracer: &mut dyn ResourceTracer);
}
