// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A window-system surface and its render target.

use core::fmt;
use std::sync::{Arc, LazyLock, Weak};

use strata_core::geometry::ISize;
use strata_core::image::Image;

use crate::aggregator::ContentAggregator;
use crate::error::{PresentError, contract_violation};
use crate::gpu_guard::GpuObjectGuard;
use crate::local_context::LocalContext;
use crate::message::SignalInfo;
use crate::remote_call::{OpCode, RemoteArgs, RemoteError, remote_ok};
use crate::remote_handle::{DispatchTable, RemoteHandle, RemoteObject, SignalCode};
use crate::render_target::{BuffersDescriptor, RenderTarget};

/// Window state requested through the surface operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowState {
    /// Window title.
    pub title: String,
    /// Smallest size the window may be resized to.
    pub min_size: Option<ISize>,
    /// Largest size the window may be resized to.
    pub max_size: Option<ISize>,
    /// The window is maximized.
    pub maximized: bool,
    /// The window is minimized.
    pub minimized: bool,
    /// The window covers its monitor.
    pub fullscreen: bool,
}

struct SurfaceState {
    target: Box<dyn RenderTarget>,
    window: WindowState,
    closed: bool,
    frame_requested: bool,
}

fn size_args(args: &mut RemoteArgs) -> (u32, u32) {
    (args.take(0), args.take(1))
}

static DISPATCH: LazyLock<DispatchTable> = LazyLock::new(|| {
    DispatchTable::new::<Surface>()
        .with(Surface::OP_CLOSE, 0, |surface: &Surface, _| {
            surface.close();
            remote_ok(())
        })
        .with(Surface::OP_RESIZE, 2, |surface: &Surface, args| {
            let (width, height) = size_args(args);
            surface.resize(width, height).map_err(|err| err.to_string())?;
            remote_ok(())
        })
        .with(Surface::OP_SET_TITLE, 1, |surface: &Surface, args| {
            surface.set_title(args.take(0));
            remote_ok(())
        })
        .with(Surface::OP_GET_BUFFERS_DESCRIPTOR, 0, |surface: &Surface, _| {
            surface
                .buffers_descriptor()
                .ok_or_else(|| PresentError::SurfaceClosed.to_string())
                .and_then(remote_ok)
        })
        .with(Surface::OP_REQUEST_NEXT_FRAME, 0, |surface: &Surface, _| {
            remote_ok(surface.request_next_frame())
        })
        .with(Surface::OP_SET_MIN_SIZE, 2, |surface: &Surface, args| {
            let (width, height) = size_args(args);
            surface.set_min_size(width, height);
            remote_ok(())
        })
        .with(Surface::OP_SET_MAX_SIZE, 2, |surface: &Surface, args| {
            let (width, height) = size_args(args);
            surface.set_max_size(width, height);
            remote_ok(())
        })
        .with(Surface::OP_SET_MAXIMIZED, 1, |surface: &Surface, args| {
            surface.set_maximized(args.take(0));
            remote_ok(())
        })
        .with(Surface::OP_SET_MINIMIZED, 1, |surface: &Surface, args| {
            surface.set_minimized(args.take(0));
            remote_ok(())
        })
        .with(Surface::OP_SET_FULLSCREEN, 1, |surface: &Surface, args| {
            surface.set_fullscreen(args.take(0));
            remote_ok(())
        })
        .with(Surface::OP_CREATE_CONTENT_AGGREGATOR, 0, |surface: &Surface, _| {
            surface
                .create_content_aggregator()
                .ok_or_else(|| PresentError::SurfaceClosed.to_string())
                .and_then(remote_ok)
        })
        .with(Surface::OP_SNAPSHOT_PRESENTED, 0, |surface: &Surface, _| {
            remote_ok(surface.snapshot_presented())
        })
});

/// A surface frames are presented to.
///
/// Created by a [`Display`](crate::Display). Its `frame` signal fires once
/// per [`request_next_frame`](Self::request_next_frame) when the surface can
/// accept the next frame; it drives every content aggregator attached to
/// the surface.
pub struct Surface {
    handle: RemoteHandle,
    state: GpuObjectGuard<SurfaceState>,
    this: Weak<Self>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("handle", &self.handle)
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl RemoteObject for Surface {
    fn remote_handle(&self) -> &RemoteHandle {
        &self.handle
    }
}

impl Surface {
    /// Closes the surface.
    pub const OP_CLOSE: OpCode = 1;
    /// Resizes the render target: `(width: u32, height: u32)`.
    pub const OP_RESIZE: OpCode = 2;
    /// Sets the window title: `(String)`.
    pub const OP_SET_TITLE: OpCode = 3;
    /// Returns the [`BuffersDescriptor`].
    pub const OP_GET_BUFFERS_DESCRIPTOR: OpCode = 4;
    /// Requests a `frame` signal; returns `bool`.
    pub const OP_REQUEST_NEXT_FRAME: OpCode = 5;
    /// `(width: u32, height: u32)`.
    pub const OP_SET_MIN_SIZE: OpCode = 6;
    /// `(width: u32, height: u32)`.
    pub const OP_SET_MAX_SIZE: OpCode = 7;
    /// `(bool)`.
    pub const OP_SET_MAXIMIZED: OpCode = 8;
    /// `(bool)`.
    pub const OP_SET_MINIMIZED: OpCode = 9;
    /// `(bool)`.
    pub const OP_SET_FULLSCREEN: OpCode = 10;
    /// Returns an `Arc<ContentAggregator>`.
    pub const OP_CREATE_CONTENT_AGGREGATOR: OpCode = 11;
    /// Returns the last presented frame as `Option<Image>`.
    pub const OP_SNAPSHOT_PRESENTED: OpCode = 12;

    /// The surface was closed. No arguments.
    pub const SIGNAL_CLOSED: SignalCode = 1;
    /// The render target was resized: `(width: u32, height: u32)`.
    pub const SIGNAL_RESIZE: SignalCode = 2;
    /// The window state changed: `(WindowState)`.
    pub const SIGNAL_CONFIGURE: SignalCode = 3;
    /// The window system asked to close the surface.
    pub const SIGNAL_CLOSE: SignalCode = 4;
    /// The surface is ready for the next frame. No arguments.
    pub const SIGNAL_FRAME: SignalCode = 5;
    /// The pointer entered or left the surface: `(bool)`.
    pub const SIGNAL_POINTER_HOVERING: SignalCode = 6;
    /// The pointer moved: `(x: f64, y: f64)`.
    pub const SIGNAL_POINTER_MOTION: SignalCode = 7;
    /// A pointer button changed: `(button: u32, pressed: bool)`.
    pub const SIGNAL_POINTER_BUTTON: SignalCode = 8;

    /// Wraps `target` in a surface. Must be called on the present thread.
    pub fn create(target: Box<dyn RenderTarget>) -> Arc<Self> {
        let Some(context) = LocalContext::current() else {
            contract_violation(format_args!("surfaces are created on the present thread"));
        };
        let state = SurfaceState {
            target,
            window: WindowState::default(),
            closed: false,
            frame_requested: false,
        };
        Arc::new_cyclic(|this| Self {
            handle: RemoteHandle::new(context.link(), &DISPATCH),
            state: GpuObjectGuard::for_present_thread(state, true),
            this: this.clone(),
        })
    }

    fn this(&self) -> Option<Arc<Self>> {
        self.this.upgrade()
    }

    /// Runs `f` with the render target unless the surface is closed.
    pub fn with_render_target<R>(&self, f: impl FnOnce(&mut dyn RenderTarget) -> R) -> Option<R> {
        self.state
            .with_mut(|state| (!state.closed).then(|| f(state.target.as_mut())))
            .flatten()
    }

    /// Current size, unless the surface is closed.
    #[must_use]
    pub fn size(&self) -> Option<ISize> {
        self.with_render_target(|target| target.size())
    }

    /// Returns `true` once the surface was closed or collected.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.with(|state| state.closed).unwrap_or(true)
    }

    /// Returns `true` if frames are composed on a GPU device.
    #[must_use]
    pub fn has_gpu_context(&self) -> bool {
        self.with_render_target(|target| target.has_gpu_context())
            .unwrap_or(false)
    }

    /// Requested window state.
    #[must_use]
    pub fn window_state(&self) -> WindowState {
        self.state
            .with(|state| state.window.clone())
            .unwrap_or_default()
    }

    /// Closes the surface and emits `closed`. Idempotent.
    pub fn close(&self) {
        let was_open = self
            .state
            .with_mut(|state| !core::mem::replace(&mut state.closed, true))
            .unwrap_or(false);
        if was_open {
            log::debug!("Surface closed");
            self.handle.emit(Self::SIGNAL_CLOSED, SignalInfo::new());
        }
    }

    /// Resizes the render target and emits `resize`.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), PresentError> {
        self.with_render_target(|target| target.resize(width, height))
            .ok_or(PresentError::SurfaceClosed)??;
        self.handle.emit(
            Self::SIGNAL_RESIZE,
            SignalInfo::new().with(width).with(height),
        );
        Ok(())
    }

    fn update_window(&self, update: impl FnOnce(&mut WindowState)) {
        let window = self.state.with_mut(|state| {
            update(&mut state.window);
            state.window.clone()
        });
        if let Some(window) = window {
            self.handle
                .emit(Self::SIGNAL_CONFIGURE, SignalInfo::new().with(window));
        }
    }

    /// Sets the window title.
    pub fn set_title(&self, title: String) {
        self.update_window(|window| window.title = title);
    }

    /// Sets the minimum window size.
    pub fn set_min_size(&self, width: u32, height: u32) {
        self.update_window(|window| window.min_size = Some(ISize::new(width, height)));
    }

    /// Sets the maximum window size.
    pub fn set_max_size(&self, width: u32, height: u32) {
        self.update_window(|window| window.max_size = Some(ISize::new(width, height)));
    }

    /// Maximizes or restores the window.
    pub fn set_maximized(&self, maximized: bool) {
        self.update_window(|window| window.maximized = maximized);
    }

    /// Minimizes or restores the window.
    pub fn set_minimized(&self, minimized: bool) {
        self.update_window(|window| window.minimized = minimized);
    }

    /// Enters or leaves fullscreen.
    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.update_window(|window| window.fullscreen = fullscreen);
    }

    /// Buffer layout of the render target.
    #[must_use]
    pub fn buffers_descriptor(&self) -> Option<BuffersDescriptor> {
        self.with_render_target(|target| target.buffers_descriptor())
    }

    /// The last presented frame.
    #[must_use]
    pub fn snapshot_presented(&self) -> Option<Image> {
        self.with_render_target(|target| target.snapshot()).flatten()
    }

    /// Schedules one `frame` signal for the next idle pass of the present
    /// loop. Requests made before it fires are coalesced. Returns `false` if
    /// the surface is closed.
    pub fn request_next_frame(&self) -> bool {
        let Some(schedule) = self.state.with_mut(|state| {
            if state.closed {
                return None;
            }
            Some(!core::mem::replace(&mut state.frame_requested, true))
        }) else {
            return false;
        };
        match schedule {
            None => false,
            Some(false) => true,
            Some(true) => {
                let Some(context) = LocalContext::current() else {
                    contract_violation(format_args!("frames are requested on the present thread"));
                };
                let this = self.this.clone();
                context.post_idle(move || {
                    if let Some(surface) = this.upgrade() {
                        surface.fire_frame();
                    }
                });
                true
            }
        }
    }

    fn fire_frame(&self) {
        let open = self
            .state
            .with_mut(|state| {
                state.frame_requested = false;
                !state.closed
            })
            .unwrap_or(false);
        if open {
            self.handle.emit(Self::SIGNAL_FRAME, SignalInfo::new());
        }
    }

    /// Creates a content aggregator drawing into this surface.
    pub fn create_content_aggregator(&self) -> Option<Arc<ContentAggregator>> {
        if self.is_closed() {
            return None;
        }
        self.this().map(|this| ContentAggregator::new(&this))
    }

    /// Host side: resizes the surface.
    pub fn invoke_resize(
        self: &Arc<Self>,
        width: u32,
        height: u32,
        on_done: impl FnOnce(Result<(), RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_RESIZE,
            RemoteArgs::new().with(width).with(height),
            on_done,
        )
    }

    /// Host side: requests a `frame` signal.
    pub fn invoke_request_next_frame(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<bool, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(self, Self::OP_REQUEST_NEXT_FRAME, RemoteArgs::new(), on_done)
    }

    /// Host side: creates a content aggregator.
    pub fn invoke_create_content_aggregator(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<Arc<ContentAggregator>, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_CREATE_CONTENT_AGGREGATOR,
            RemoteArgs::new(),
            on_done,
        )
    }

    /// Host side: closes the surface.
    pub fn invoke_close(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<(), RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(self, Self::OP_CLOSE, RemoteArgs::new(), on_done)
    }
}
