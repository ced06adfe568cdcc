// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The display: the factory of surfaces.

use core::fmt;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;
use strata_vulkan::SurfaceFactory;

use crate::error::{PresentError, contract_violation};
use crate::link::ThreadLink;
use crate::local_context::LocalContext;
use crate::message::SignalInfo;
use crate::remote_call::{OpCode, RemoteArgs, RemoteError, remote_ok};
use crate::remote_handle::{DispatchTable, RemoteHandle, RemoteObject, SignalCode};
use crate::render_target::{HwComposeRenderTarget, RasterRenderTarget};
use crate::surface::Surface;

/// A Vulkan surface factory handed to the present thread.
pub type BoxedSurfaceFactory = Box<dyn SurfaceFactory + Send>;

#[derive(Default)]
struct DisplayState {
    closed: bool,
    surfaces: Vec<Weak<Surface>>,
}

static DISPATCH: LazyLock<DispatchTable> = LazyLock::new(|| {
    DispatchTable::new::<Display>()
        .with(Display::OP_CLOSE, 0, |display: &Display, _| {
            display.close();
            remote_ok(())
        })
        .with(Display::OP_CREATE_RASTER_SURFACE, 2, |display: &Display, args| {
            let surface = display
                .create_raster_surface(args.take(0), args.take(1))
                .map_err(|err| err.to_string())?;
            remote_ok(surface)
        })
        .with(Display::OP_CREATE_HW_COMPOSE_SURFACE, 3, |display: &Display, args| {
            let factory: BoxedSurfaceFactory = args.take(0);
            let surface = display
                .create_hw_compose_surface(&*factory, args.take(1), args.take(2))
                .map_err(|err| err.to_string())?;
            remote_ok(surface)
        })
});

/// Creates surfaces and closes them all when it is closed.
pub struct Display {
    handle: RemoteHandle,
    state: Mutex<DisplayState>,
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Display")
            .field("handle", &self.handle)
            .field("closed", &state.closed)
            .field("surfaces", &state.surfaces.len())
            .finish()
    }
}

impl RemoteObject for Display {
    fn remote_handle(&self) -> &RemoteHandle {
        &self.handle
    }
}

impl Display {
    /// Closes the display and every surface it created.
    pub const OP_CLOSE: OpCode = 1;
    /// `(width: u32, height: u32)`; returns `Arc<Surface>`.
    pub const OP_CREATE_RASTER_SURFACE: OpCode = 2;
    /// `(BoxedSurfaceFactory, width: u32, height: u32)`; returns
    /// `Arc<Surface>`.
    pub const OP_CREATE_HW_COMPOSE_SURFACE: OpCode = 3;

    /// The display was closed. No arguments.
    pub const SIGNAL_CLOSED: SignalCode = 1;
    /// A monitor was connected. Emitted by windowing backends.
    pub const SIGNAL_MONITOR_ADDED: SignalCode = 2;
    /// A monitor was disconnected. Emitted by windowing backends.
    pub const SIGNAL_MONITOR_REMOVED: SignalCode = 3;

    pub(crate) fn new(link: &Arc<ThreadLink>) -> Arc<Self> {
        Arc::new(Self {
            handle: RemoteHandle::new(link, &DISPATCH),
            state: Mutex::new(DisplayState::default()),
        })
    }

    /// Returns `true` once the display was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Surfaces created by this display that are still alive.
    #[must_use]
    pub fn surfaces(&self) -> Vec<Arc<Surface>> {
        self.state
            .lock()
            .surfaces
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn adopt(&self, surface: &Arc<Surface>) -> Result<(), PresentError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PresentError::SurfaceClosed);
        }
        state.surfaces.retain(|surface| surface.strong_count() > 0);
        state.surfaces.push(Arc::downgrade(surface));
        Ok(())
    }

    /// Creates a surface drawn on the CPU.
    pub fn create_raster_surface(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Arc<Surface>, PresentError> {
        if self.is_closed() {
            return Err(PresentError::SurfaceClosed);
        }
        let target = RasterRenderTarget::new(width, height).inspect_err(|err| {
            log::error!("Failed to create a {width}x{height} raster surface: {err}");
        })?;
        let surface = Surface::create(Box::new(target));
        self.adopt(&surface)?;
        log::debug!("Created a {width}x{height} raster surface");
        Ok(surface)
    }

    /// Creates a surface composed on a Vulkan device.
    ///
    /// With `disable-hw-compose-present` set the frames stay offscreen and
    /// `factory` is not used.
    pub fn create_hw_compose_surface(
        &self,
        factory: &dyn SurfaceFactory,
        width: u32,
        height: u32,
    ) -> Result<Arc<Surface>, PresentError> {
        if self.is_closed() {
            return Err(PresentError::SurfaceClosed);
        }
        let Some(context) = LocalContext::current() else {
            contract_violation(format_args!("surfaces are created on the present thread"));
        };
        let offscreen_only = context.options().disable_hw_compose_present;
        let extensions = if offscreen_only {
            Vec::new()
        } else {
            factory.required_instance_extensions()
        };
        let target = context
            .vulkan_context(&extensions)
            .and_then(|vulkan| {
                HwComposeRenderTarget::new(vulkan, factory, width, height, offscreen_only)
            })
            .inspect_err(|err| {
                log::error!("Failed to create a {width}x{height} hw-compose surface: {err}");
            })?;
        let surface = Surface::create(Box::new(target));
        self.adopt(&surface)?;
        Ok(surface)
    }

    /// Closes every surface and emits `closed`. Idempotent.
    pub fn close(&self) {
        let surfaces = {
            let mut state = self.state.lock();
            if core::mem::replace(&mut state.closed, true) {
                return;
            }
            core::mem::take(&mut state.surfaces)
        };
        for surface in surfaces.iter().filter_map(Weak::upgrade) {
            surface.close();
        }
        self.handle.emit(Self::SIGNAL_CLOSED, SignalInfo::new());
    }

    /// Host side: creates a raster surface.
    pub fn invoke_create_raster_surface(
        self: &Arc<Self>,
        width: u32,
        height: u32,
        on_done: impl FnOnce(Result<Arc<Surface>, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_CREATE_RASTER_SURFACE,
            RemoteArgs::new().with(width).with(height),
            on_done,
        )
    }

    /// Host side: creates a hardware-composed surface.
    pub fn invoke_create_hw_compose_surface(
        self: &Arc<Self>,
        factory: BoxedSurfaceFactory,
        width: u32,
        height: u32,
        on_done: impl FnOnce(Result<Arc<Surface>, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_CREATE_HW_COMPOSE_SURFACE,
            RemoteArgs::new().with(factory).with(width).with(height),
            on_done,
        )
    }

    /// Host side: closes the display.
    pub fn invoke_close(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<(), RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(self, Self::OP_CLOSE, RemoteArgs::new(), on_done)
    }
}
