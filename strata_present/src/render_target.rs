// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Where a surface's frames are drawn and presented.
//!
//! A frame goes through `begin_frame`, drawing into the returned surface,
//! `submit` and finally `present` once the surface signals it may show the
//! next frame. Both implementations draw on the CPU; the hardware-composed
//! target uploads each frame to a Vulkan swapchain image.

use core::fmt;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use strata_core::canvas::RasterSurface;
use strata_core::damage::DamageRegion;
use strata_core::geometry::ISize;
use strata_core::image::Image;
use strata_core::resource::GpuSemaphore;
use strata_vulkan::vk::{self, Handle as _};
use strata_vulkan::{Offscreen, SurfaceFactory, Swapchain, VulkanContext, VulkanDevice, VulkanError};

use crate::error::PresentError;

/// How a render target reaches the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTargetKind {
    /// CPU buffers handed to the windowing system.
    Raster,
    /// Vulkan images, presented through a swapchain or kept offscreen.
    HwCompose,
}

/// Layout of a render target's buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuffersDescriptor {
    /// Render target kind.
    pub kind: RenderTargetKind,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of buffers frames cycle through.
    pub buffer_count: usize,
}

/// What a frame submit hands to the render target.
#[derive(Clone, Debug, Default)]
pub struct FrameSubmission {
    /// Region modified by the frame.
    pub damage: DamageRegion,
    /// Semaphores to signal once the frame is rendered.
    pub signal: Vec<GpuSemaphore>,
    /// Semaphores the frame waits on before rendering completes.
    pub wait: Vec<GpuSemaphore>,
}

/// Frame sink of a surface.
pub trait RenderTarget: Send + fmt::Debug {
    /// Kind of target.
    fn kind(&self) -> RenderTargetKind;

    /// Current size in pixels.
    fn size(&self) -> ISize;

    /// Returns `true` if frames are composed on a GPU device.
    fn has_gpu_context(&self) -> bool;

    /// Reallocates the buffers for a new size.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), PresentError>;

    /// Starts a frame and returns the surface to draw it into.
    ///
    /// Calling it again before `submit` returns the same surface.
    fn begin_frame(&mut self) -> Result<&mut RasterSurface, PresentError>;

    /// Finishes drawing the current frame.
    fn submit(&mut self, submission: FrameSubmission) -> Result<(), PresentError>;

    /// Shows the submitted frame.
    fn present(&mut self) -> Result<(), PresentError>;

    /// Buffer layout.
    fn buffers_descriptor(&self) -> BuffersDescriptor;

    /// The most recent frame, if any.
    fn snapshot(&self) -> Option<Image>;

    /// Imports a sync file descriptor as a semaphore owned by the target's
    /// device. Targets without a device drop (and thereby close) `fd`.
    fn import_semaphore(&mut self, fd: OwnedFd) -> Option<GpuSemaphore> {
        drop(fd);
        None
    }

    /// Destroys a semaphore created by [`import_semaphore`](Self::import_semaphore).
    fn destroy_semaphore(&mut self, semaphore: GpuSemaphore) {
        log::warn!("{semaphore:?} does not belong to a {:?} render target", self.kind());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FramePhase {
    Idle,
    Drawing,
    Submitted,
}

/// Double-buffered CPU render target.
#[derive(Debug)]
pub struct RasterRenderTarget {
    back: RasterSurface,
    front: RasterSurface,
    phase: FramePhase,
    presented_frames: u64,
}

fn allocate(width: u32, height: u32) -> Result<RasterSurface, PresentError> {
    RasterSurface::new(width, height).ok_or(PresentError::Allocation { width, height })
}

impl RasterRenderTarget {
    /// Allocates both buffers.
    pub fn new(width: u32, height: u32) -> Result<Self, PresentError> {
        Ok(Self {
            back: allocate(width, height)?,
            front: allocate(width, height)?,
            phase: FramePhase::Idle,
            presented_frames: 0,
        })
    }

    /// The buffer shown by the last `present`.
    #[must_use]
    pub fn front_buffer(&self) -> &RasterSurface {
        &self.front
    }

    /// Number of frames presented so far.
    #[must_use]
    pub fn presented_frames(&self) -> u64 {
        self.presented_frames
    }
}

impl RenderTarget for RasterRenderTarget {
    fn kind(&self) -> RenderTargetKind {
        RenderTargetKind::Raster
    }

    fn size(&self) -> ISize {
        self.back.size()
    }

    fn has_gpu_context(&self) -> bool {
        false
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PresentError> {
        self.back = allocate(width, height)?;
        self.front = allocate(width, height)?;
        self.phase = FramePhase::Idle;
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<&mut RasterSurface, PresentError> {
        self.phase = FramePhase::Drawing;
        Ok(&mut self.back)
    }

    fn submit(&mut self, _submission: FrameSubmission) -> Result<(), PresentError> {
        if self.phase != FramePhase::Drawing {
            return Err(PresentError::NotInFrame);
        }
        self.phase = FramePhase::Submitted;
        Ok(())
    }

    fn present(&mut self) -> Result<(), PresentError> {
        if self.phase != FramePhase::Submitted {
            return Err(PresentError::NotInFrame);
        }
        core::mem::swap(&mut self.back, &mut self.front);
        self.phase = FramePhase::Idle;
        self.presented_frames += 1;
        Ok(())
    }

    fn buffers_descriptor(&self) -> BuffersDescriptor {
        let size = self.size();
        BuffersDescriptor {
            kind: RenderTargetKind::Raster,
            width: size.width,
            height: size.height,
            buffer_count: 2,
        }
    }

    fn snapshot(&self) -> Option<Image> {
        Some(self.front.snapshot())
    }
}

enum HwBackend {
    Swapchain(Swapchain),
    /// Frames stay on the device; `presented` keeps the last shown frame.
    Offscreen {
        offscreen: Offscreen,
        surface: RasterSurface,
        presented: Option<RasterSurface>,
    },
}

impl fmt::Debug for HwBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swapchain(swapchain) => f.debug_tuple("Swapchain").field(swapchain).finish(),
            Self::Offscreen { offscreen, surface, .. } => f
                .debug_struct("Offscreen")
                .field("offscreen", offscreen)
                .field("size", &surface.size())
                .finish_non_exhaustive(),
        }
    }
}

/// Render target backed by a Vulkan device.
#[derive(Debug)]
pub struct HwComposeRenderTarget {
    backend: HwBackend,
    size: ISize,
    phase: FramePhase,
}

fn to_vk(semaphores: &[GpuSemaphore]) -> Vec<vk::Semaphore> {
    semaphores
        .iter()
        .map(|semaphore| vk::Semaphore::from_raw(semaphore.0))
        .collect()
}

impl HwComposeRenderTarget {
    /// Creates a swapchain on a surface made by `factory`, or an offscreen
    /// device when `offscreen_only` is set.
    pub fn new(
        context: Arc<VulkanContext>,
        factory: &dyn SurfaceFactory,
        width: u32,
        height: u32,
        offscreen_only: bool,
    ) -> Result<Self, PresentError> {
        let backend = if offscreen_only {
            HwBackend::Offscreen {
                offscreen: Offscreen::new(context)?,
                surface: allocate(width, height)?,
                presented: None,
            }
        } else {
            let swapchain = Swapchain::create(context, factory, width, height)?;
            log::info!(
                "Created a {}x{} swapchain with {} images",
                width,
                height,
                swapchain.image_count()
            );
            HwBackend::Swapchain(swapchain)
        };
        Ok(Self {
            backend,
            size: ISize::new(width, height),
            phase: FramePhase::Idle,
        })
    }

    /// The device frames are composed on.
    #[must_use]
    pub fn device(&self) -> &Arc<VulkanDevice> {
        match &self.backend {
            HwBackend::Swapchain(swapchain) => swapchain.device(),
            HwBackend::Offscreen { offscreen, .. } => offscreen.device(),
        }
    }

    /// Returns `true` when frames are presented through a swapchain.
    #[must_use]
    pub fn is_presenting(&self) -> bool {
        matches!(self.backend, HwBackend::Swapchain(_))
    }
}

impl RenderTarget for HwComposeRenderTarget {
    fn kind(&self) -> RenderTargetKind {
        RenderTargetKind::HwCompose
    }

    fn size(&self) -> ISize {
        self.size
    }

    fn has_gpu_context(&self) -> bool {
        true
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PresentError> {
        match &mut self.backend {
            HwBackend::Swapchain(swapchain) => swapchain.resize(width, height)?,
            HwBackend::Offscreen { surface, presented, .. } => {
                *surface = allocate(width, height)?;
                *presented = None;
            }
        }
        self.size = ISize::new(width, height);
        self.phase = FramePhase::Idle;
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<&mut RasterSurface, PresentError> {
        let ISize { width, height } = self.size;
        let surface = match &mut self.backend {
            HwBackend::Swapchain(swapchain) => {
                if let Err(VulkanError::OutOfDate) = swapchain.next_frame().map(|_| ()) {
                    log::debug!("Swapchain out of date, recreating at {width}x{height}");
                    swapchain.resize(width, height)?;
                }
                swapchain.next_frame()?
            }
            HwBackend::Offscreen { surface, .. } => surface,
        };
        self.phase = FramePhase::Drawing;
        Ok(surface)
    }

    fn submit(&mut self, submission: FrameSubmission) -> Result<(), PresentError> {
        if self.phase != FramePhase::Drawing {
            return Err(PresentError::NotInFrame);
        }
        let signal = to_vk(&submission.signal);
        let wait = to_vk(&submission.wait);
        match &mut self.backend {
            HwBackend::Swapchain(swapchain) => swapchain.submit_frame(&signal, &wait)?,
            HwBackend::Offscreen { offscreen, .. } => offscreen.signal_semaphores(&signal, &wait)?,
        }
        self.phase = FramePhase::Submitted;
        Ok(())
    }

    fn present(&mut self) -> Result<(), PresentError> {
        if self.phase != FramePhase::Submitted {
            return Err(PresentError::NotInFrame);
        }
        self.phase = FramePhase::Idle;
        match &mut self.backend {
            HwBackend::Swapchain(swapchain) => match swapchain.present_frame() {
                Err(VulkanError::OutOfDate) => {
                    let ISize { width, height } = self.size;
                    log::debug!("Swapchain out of date after present, recreating");
                    swapchain.resize(width, height)?;
                }
                other => other?,
            },
            HwBackend::Offscreen { surface, presented, .. } => {
                *presented = Some(surface.clone());
            }
        }
        Ok(())
    }

    fn buffers_descriptor(&self) -> BuffersDescriptor {
        let buffer_count = match &self.backend {
            HwBackend::Swapchain(swapchain) => swapchain.buffer_count(),
            HwBackend::Offscreen { .. } => 1,
        };
        BuffersDescriptor {
            kind: RenderTargetKind::HwCompose,
            width: self.size.width,
            height: self.size.height,
            buffer_count,
        }
    }

    fn snapshot(&self) -> Option<Image> {
        match &self.backend {
            HwBackend::Swapchain(swapchain) => swapchain.last_frame().map(RasterSurface::snapshot),
            HwBackend::Offscreen { presented, .. } => presented.as_ref().map(RasterSurface::snapshot),
        }
    }

    fn import_semaphore(&mut self, fd: OwnedFd) -> Option<GpuSemaphore> {
        let device = self.device();
        if !device.supports_semaphore_interop() {
            log::error!("Device cannot import semaphores from file descriptors");
            return None;
        }
        match device.import_semaphore_from_fd(fd) {
            Ok(semaphore) => Some(GpuSemaphore(semaphore.as_raw())),
            Err(err) => {
                log::error!("Failed to import a semaphore: {err}");
                None
            }
        }
    }

    fn destroy_semaphore(&mut self, semaphore: GpuSemaphore) {
        self.device()
            .destroy_semaphore(vk::Semaphore::from_raw(semaphore.0));
    }
}
