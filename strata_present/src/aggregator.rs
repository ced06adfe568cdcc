// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Turns layer trees into frames on a surface.
//!
//! A [`ContentAggregator`] owns everything a frame needs besides the layer
//! tree itself: the generation and raster caches, the textures and GPU
//! resources imported by the host, and the frame schedule. An update
//! prerolls the tree, paints it into the render target through a
//! multiplexer canvas and submits the frame; the surface's `frame` signal
//! later presents it. Updates arriving while a frame is still waiting for
//! that signal are dropped.

use core::fmt;
use std::os::fd::OwnedFd;
use std::sync::{Arc, LazyLock, Weak};

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};
use strata_core::cache::{LayerGenerationCache, RasterCache};
use strata_core::canvas::{Canvas, MultiplexerCanvas, PictureRecorder};
use strata_core::damage::DamageRegion;
use strata_core::geometry::ISize;
use strata_core::image::Image;
use strata_core::layer::{FrameObserver, LayerId, LayerTree, PaintContext, PrerollContext, SharedFrameObserver};
use strata_core::paint::Color;
use strata_core::profiler::{FrameMilestone, FrameProfiler, FrameReport};
use strata_core::resource::{GpuSemaphore, ImportedResources};
use strata_core::texture::{TextureFactory, TextureManager};
use strata_core::trace::{
    ResourceTracer, Trackable, TrackableDevice, TrackableOwnership, TrackableType, TracedResource,
};

use crate::error::{PresentError, contract_violation};
use crate::gpu_guard::GpuObjectGuard;
use crate::local_context::LocalContext;
use crate::message::SignalInfo;
use crate::remote_call::{OpCode, RemoteArgs, RemoteError, remote_ok};
use crate::remote_handle::{DispatchTable, RemoteHandle, RemoteObject, SignalCode, SlotId};
use crate::render_target::FrameSubmission;
use crate::surface::Surface;

/// Where the aggregator is in its frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameSchedule {
    /// No frame was submitted yet.
    Idle,
    /// A frame was submitted and waits for the surface's `frame` signal.
    PendingFrame,
    /// The last submitted frame was presented.
    Presented,
    /// The aggregator was disposed.
    Disposed,
}

/// Outcome of [`ContentAggregator::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateResult {
    /// The frame was painted and submitted.
    Success,
    /// A frame is still pending; nothing was painted.
    FrameDropped,
    /// The frame could not be rendered.
    Error,
}

/// GPU resources the host imported, addressed by the ids handed out at
/// import time.
#[derive(Debug, Default)]
struct ImportTable {
    next_id: i64,
    semaphores: HashMap<i64, GpuSemaphore>,
    surfaces: HashMap<i64, Image>,
}

impl ImportTable {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl ImportedResources for ImportTable {
    fn imported_surface(&self, id: i64) -> Option<Image> {
        self.surfaces.get(&id).cloned()
    }

    fn imported_semaphore(&self, id: i64) -> Option<GpuSemaphore> {
        self.semaphores.get(&id).copied()
    }
}

/// Frame state readable without waiting for a frame in progress.
#[derive(Clone, Debug)]
struct FrameSnapshot {
    schedule: FrameSchedule,
    damage: DamageRegion,
}

struct AggregatorState {
    published: Arc<Mutex<FrameSnapshot>>,
    surface: Weak<Surface>,
    surface_slots: Vec<SlotId>,
    layer_tree: Option<LayerTree>,
    schedule: FrameSchedule,
    /// Observers that saw the frame in flight.
    frame_observers: Vec<SharedFrameObserver>,
    damage: DamageRegion,
    capture_pending: bool,
    capture_serial: u64,
    imports: ImportTable,
    cache: LayerGenerationCache,
    raster_cache: RasterCache,
}

impl AggregatorState {
    fn publish(&self) {
        *self.published.lock() = FrameSnapshot {
            schedule: self.schedule,
            damage: self.damage.clone(),
        };
    }
}

impl Drop for AggregatorState {
    fn drop(&mut self) {
        self.published.lock().schedule = FrameSchedule::Disposed;
    }
}

static DISPATCH: LazyLock<DispatchTable> = LazyLock::new(|| {
    DispatchTable::new::<ContentAggregator>()
        .with(ContentAggregator::OP_DISPOSE, 0, |aggregator: &ContentAggregator, _| {
            aggregator.dispose();
            remote_ok(())
        })
        .with(ContentAggregator::OP_UPDATE, 1, |aggregator: &ContentAggregator, args| {
            remote_ok(aggregator.update(args.take(0)))
        })
        .with(
            ContentAggregator::OP_CAPTURE_NEXT_FRAME_AS_PICTURE,
            0,
            |aggregator: &ContentAggregator, _| remote_ok(aggregator.capture_next_frame_as_picture()),
        )
        .with(
            ContentAggregator::OP_PURGE_RASTER_CACHE_RESOURCES,
            0,
            |aggregator: &ContentAggregator, _| {
                aggregator.purge_raster_cache_resources();
                remote_ok(())
            },
        )
        .with(
            ContentAggregator::OP_IMPORT_GPU_SEMAPHORE_FROM_FD,
            1,
            |aggregator: &ContentAggregator, args| {
                remote_ok(aggregator.import_gpu_semaphore_from_fd(args.take(0)))
            },
        )
        .with(
            ContentAggregator::OP_DELETE_IMPORTED_GPU_SEMAPHORE,
            1,
            |aggregator: &ContentAggregator, args| {
                remote_ok(aggregator.delete_imported_gpu_semaphore(args.take(0)))
            },
        )
        .with(
            ContentAggregator::OP_IMPORT_GPU_SURFACE,
            1,
            |aggregator: &ContentAggregator, args| {
                remote_ok(aggregator.import_gpu_surface(args.take(0)))
            },
        )
        .with(
            ContentAggregator::OP_DELETE_IMPORTED_GPU_SURFACE,
            1,
            |aggregator: &ContentAggregator, args| {
                remote_ok(aggregator.delete_imported_gpu_surface(args.take(0)))
            },
        )
        .with(ContentAggregator::OP_CACHE_STATS, 0, |aggregator: &ContentAggregator, _| {
            remote_ok(aggregator.cache_stats())
        })
});

/// Renders layer trees into a [`Surface`].
///
/// Created on the present thread by
/// [`Surface::create_content_aggregator`]; the host drives it through the
/// `invoke_*` methods.
pub struct ContentAggregator {
    handle: RemoteHandle,
    state: GpuObjectGuard<AggregatorState>,
    published: Arc<Mutex<FrameSnapshot>>,
    texture_manager: Arc<TextureManager>,
    profiler: Option<FrameProfiler>,
}

impl fmt::Debug for ContentAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentAggregator")
            .field("handle", &self.handle)
            .field("schedule", &self.frame_schedule())
            .field("profiling", &self.profiler.is_some())
            .finish_non_exhaustive()
    }
}

impl RemoteObject for ContentAggregator {
    fn remote_handle(&self) -> &RemoteHandle {
        &self.handle
    }
}

impl ContentAggregator {
    /// Releases the caches and imported resources.
    pub const OP_DISPOSE: OpCode = 1;
    /// `(LayerTree)`; returns [`UpdateResult`].
    pub const OP_UPDATE: OpCode = 2;
    /// Returns the capture serial as `u64`.
    pub const OP_CAPTURE_NEXT_FRAME_AS_PICTURE: OpCode = 3;
    /// Drops every cached snapshot.
    pub const OP_PURGE_RASTER_CACHE_RESOURCES: OpCode = 4;
    /// `(OwnedFd)`; returns the import id as `i64`, `-1` on failure.
    pub const OP_IMPORT_GPU_SEMAPHORE_FROM_FD: OpCode = 5;
    /// `(i64)`; returns `bool`.
    pub const OP_DELETE_IMPORTED_GPU_SEMAPHORE: OpCode = 6;
    /// `(Image)`; returns the import id as `i64`.
    pub const OP_IMPORT_GPU_SURFACE: OpCode = 7;
    /// `(i64)`; returns `bool`.
    pub const OP_DELETE_IMPORTED_GPU_SURFACE: OpCode = 8;
    /// Returns one line per generation-cache record as `Vec<String>`.
    pub const OP_CACHE_STATS: OpCode = 9;

    /// A requested capture finished:
    /// `(GpuObjectGuard<Picture>, serial: u64)`.
    pub const SIGNAL_PICTURE_CAPTURED: SignalCode = 1;

    pub(crate) fn new(surface: &Arc<Surface>) -> Arc<Self> {
        let Some(context) = LocalContext::current() else {
            contract_violation(format_args!("content aggregators are created on the present thread"));
        };
        let options = context.options();
        let has_gpu_context = surface.has_gpu_context();
        let profiler = options
            .profile_frames
            .then(|| FrameProfiler::new(options.frame_profiler_threshold));

        let published = Arc::new(Mutex::new(FrameSnapshot {
            schedule: FrameSchedule::Idle,
            damage: DamageRegion::Full,
        }));
        let aggregator = Arc::new({
            let state = AggregatorState {
                published: Arc::clone(&published),
                surface: Arc::downgrade(surface),
                surface_slots: Vec::new(),
                layer_tree: None,
                schedule: FrameSchedule::Idle,
                frame_observers: Vec::new(),
                damage: DamageRegion::Full,
                capture_pending: false,
                capture_serial: 0,
                imports: ImportTable::default(),
                cache: LayerGenerationCache::new(),
                raster_cache: RasterCache::new(has_gpu_context),
            };
            Self {
                handle: RemoteHandle::new(context.link(), &DISPATCH),
                state: GpuObjectGuard::for_present_thread(state, true),
                published,
                texture_manager: Arc::new(TextureManager::new(TextureFactory::new(has_gpu_context))),
                profiler,
            }
        });

        let surface_handle = surface.remote_handle();
        let weak = Arc::downgrade(&aggregator);
        let on_resize = surface_handle.connect(Surface::SIGNAL_RESIZE, true, move |info| {
            if let Some(aggregator) = weak.upgrade() {
                aggregator.on_surface_resize(*info.get::<u32>(0), *info.get::<u32>(1));
            }
        });
        let weak = Arc::downgrade(&aggregator);
        let on_frame = surface_handle.connect(Surface::SIGNAL_FRAME, true, move |_| {
            if let Some(aggregator) = weak.upgrade() {
                aggregator.on_surface_frame();
            }
        });
        aggregator.state.with_mut(|state| {
            state.surface_slots = vec![on_resize, on_frame];
        });
        aggregator
    }

    /// Frame schedule as of the last finished update or present. Does not
    /// wait for a frame in progress.
    #[must_use]
    pub fn frame_schedule(&self) -> FrameSchedule {
        self.published.lock().schedule
    }

    /// Textures available to texture layers.
    #[must_use]
    pub fn texture_manager(&self) -> &Arc<TextureManager> {
        &self.texture_manager
    }

    /// Milestones of the recent frames, when frame profiling is enabled.
    #[must_use]
    pub fn frame_profile_report(&self) -> Option<FrameReport> {
        self.profiler.as_ref()?.generate_report()
    }

    /// Returns `true` if the generation cache holds a snapshot for `layer`.
    #[must_use]
    pub fn has_cached_snapshot(&self, layer: LayerId) -> bool {
        self.state
            .with(|state| state.cache.snapshot(layer).is_some())
            .unwrap_or(false)
    }

    /// Damage reported with the last submitted frame.
    #[must_use]
    pub fn last_damage(&self) -> DamageRegion {
        self.published.lock().damage.clone()
    }

    /// One line per generation-cache record.
    #[must_use]
    pub fn cache_stats(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.state
            .with(|state| state.cache.print_cache_stat(|line| lines.push(line)));
        lines
    }

    /// Renders `tree` and submits the frame.
    ///
    /// Returns [`UpdateResult::FrameDropped`] without painting while the
    /// previous frame has not been presented yet.
    pub fn update(&self, tree: LayerTree) -> UpdateResult {
        let result = self.state.with_mut(|state| self.update_locked(state, tree));
        result.unwrap_or_else(|| {
            log::error!("Update on a collected content aggregator");
            UpdateResult::Error
        })
    }

    fn update_locked(&self, state: &mut AggregatorState, mut tree: LayerTree) -> UpdateResult {
        match state.schedule {
            FrameSchedule::PendingFrame => {
                log::warn!("Frame dropped: the previous frame has not been presented");
                return UpdateResult::FrameDropped;
            }
            FrameSchedule::Disposed => {
                log::error!("Update on a disposed content aggregator");
                return UpdateResult::Error;
            }
            FrameSchedule::Idle | FrameSchedule::Presented => {}
        }
        let Some(surface) = state.surface.upgrade() else {
            log::error!("Update after the surface was destroyed");
            return UpdateResult::Error;
        };

        if let Some(profiler) = &self.profiler {
            profiler.begin_frame();
            profiler.mark_milestone(FrameMilestone::PrerollBegin);
        }
        let mut preroll = PrerollContext {
            has_gpu_context: surface.has_gpu_context(),
            ..PrerollContext::default()
        };
        tree.preroll(&mut preroll);
        let cull_rect = preroll.cull_rect;

        let observers = tree.observers().to_vec();
        let capture = state.capture_pending;
        let painted = surface
            .with_render_target(|target| {
                let has_gpu_context = target.has_gpu_context();
                let frame_size = tree.frame_size();
                let (captured, finished, wait) = {
                    let frame = target.begin_frame()?;
                    state.raster_cache.increase_frame_count();
                    state.cache.begin_frame();

                    let mut frame_canvas = frame.canvas();
                    frame_canvas.clear(Color::BLACK);
                    let mut locked: Vec<MutexGuard<'_, dyn FrameObserver>> =
                        observers.iter().map(|observer| observer.lock()).collect();
                    let mut recorder = capture.then(|| PictureRecorder::new(frame_size.to_rect()));

                    let mut multiplexer = MultiplexerCanvas::new();
                    multiplexer.add_canvas(&mut frame_canvas);
                    for observer in &mut locked {
                        if let Some(canvas) = observer.begin_frame(frame_size) {
                            multiplexer.add_canvas(canvas);
                        }
                    }
                    if let Some(recorder) = recorder.as_mut() {
                        multiplexer.add_canvas(recorder);
                    }

                    if let Some(profiler) = &self.profiler {
                        profiler.mark_milestone(FrameMilestone::PrerollEnd);
                        profiler.mark_milestone(FrameMilestone::PaintBegin);
                    }
                    let mut paint = PaintContext::new(&mut multiplexer, cull_rect);
                    paint.has_gpu_context = has_gpu_context;
                    paint.texture_manager = Some(self.texture_manager.as_ref());
                    paint.imported_resources = Some(&state.imports as &dyn ImportedResources);
                    paint.cache = Some(&mut state.cache);
                    paint.raster_cache = Some(&mut state.raster_cache);
                    tree.paint(&mut paint);
                    if let Some(profiler) = &self.profiler {
                        profiler.mark_milestone(FrameMilestone::PaintEnd);
                    }
                    let retained = paint.has_gpu_retained_resource;
                    let finished = core::mem::take(&mut paint.gpu_finished_semaphores);
                    let wait = core::mem::take(&mut paint.gpu_wait_semaphores);
                    drop(paint);
                    drop(multiplexer);
                    state.cache.end_frame();
                    (recorder.map(|recorder| (recorder.finish(), retained)), finished, wait)
                };

                let damage = DamageRegion::from_rect(cull_rect);
                state.damage = damage.clone();
                target.submit(FrameSubmission {
                    damage,
                    signal: finished,
                    wait,
                })?;
                Ok::<_, PresentError>(captured)
            })
            .unwrap_or(Err(PresentError::SurfaceClosed));

        let captured = match painted {
            Ok(captured) => captured,
            Err(err) => {
                log::error!("Failed to render frame: {err}");
                if let Some(profiler) = &self.profiler {
                    profiler.end_frame();
                }
                return UpdateResult::Error;
            }
        };

        if let Some((picture, retained)) = captured {
            state.capture_pending = false;
            let picture = GpuObjectGuard::for_present_thread(picture, retained);
            log::debug!("Captured frame as picture, serial {}", state.capture_serial);
            self.handle.emit(
                Self::SIGNAL_PICTURE_CAPTURED,
                SignalInfo::new().with(picture).with(state.capture_serial),
            );
        }

        surface.request_next_frame();
        if let Some(profiler) = &self.profiler {
            profiler.mark_milestone(FrameMilestone::Requested);
        }
        state.frame_observers = observers;
        state.layer_tree = Some(tree);
        state.schedule = FrameSchedule::PendingFrame;
        state.publish();
        UpdateResult::Success
    }

    fn on_surface_resize(&self, width: u32, height: u32) {
        self.state.with_mut(|state| {
            if let Some(tree) = &mut state.layer_tree {
                tree.set_frame_size(ISize::new(width, height));
            }
        });
    }

    fn on_surface_frame(&self) {
        self.state.with_mut(|state| self.present_locked(state));
    }

    fn present_locked(&self, state: &mut AggregatorState) {
        if state.schedule != FrameSchedule::PendingFrame {
            log::warn!("Surface frame signal without a pending frame");
            return;
        }
        let presented = state
            .surface
            .upgrade()
            .and_then(|surface| surface.with_render_target(|target| target.present()));
        match presented {
            Some(Ok(())) => {}
            Some(Err(err)) => log::error!("Failed to present frame: {err}"),
            None => log::debug!("Surface went away before its frame was presented"),
        }
        for observer in core::mem::take(&mut state.frame_observers) {
            observer.lock().end_frame();
        }
        if let Some(profiler) = &self.profiler {
            profiler.mark_milestone(FrameMilestone::Presented);
            profiler.end_frame();
        }
        state.schedule = FrameSchedule::Presented;
        state.publish();
    }

    /// Requests that the next frame is also recorded as a picture and
    /// emitted through `picture-captured`. Returns the request's serial.
    /// Requests made before that frame coalesce into one picture carrying
    /// the last serial.
    pub fn capture_next_frame_as_picture(&self) -> u64 {
        self.state
            .with_mut(|state| {
                state.capture_pending = true;
                state.capture_serial += 1;
                state.capture_serial
            })
            .unwrap_or(0)
    }

    /// Drops every cached snapshot and picture cache.
    pub fn purge_raster_cache_resources(&self) {
        self.state.with_mut(|state| {
            state.cache.purge_cache_resources(false);
            state.raster_cache.purge_all();
        });
    }

    /// Imports a semaphore exported by another device. The descriptor is
    /// consumed. Returns `-1` unless the surface composes on a GPU.
    pub fn import_gpu_semaphore_from_fd(&self, fd: OwnedFd) -> i64 {
        self.state
            .with_mut(|state| {
                let semaphore = state
                    .surface
                    .upgrade()
                    .and_then(|surface| surface.with_render_target(|target| target.import_semaphore(fd)))
                    .flatten()?;
                let id = state.imports.allocate_id();
                state.imports.semaphores.insert(id, semaphore);
                log::debug!("Imported {semaphore:?} as #{id}");
                Some(id)
            })
            .flatten()
            .unwrap_or(-1)
    }

    /// Destroys an imported semaphore. Returns `false` for unknown ids.
    pub fn delete_imported_gpu_semaphore(&self, id: i64) -> bool {
        self.state
            .with_mut(|state| {
                let Some(semaphore) = state.imports.semaphores.remove(&id) else {
                    log::warn!("No imported semaphore #{id}");
                    return false;
                };
                if let Some(surface) = state.surface.upgrade() {
                    surface.with_render_target(|target| target.destroy_semaphore(semaphore));
                }
                true
            })
            .unwrap_or(false)
    }

    /// Makes `image` available to `GpuSurfaceView` layers. Returns its id.
    pub fn import_gpu_surface(&self, image: Image) -> i64 {
        self.state
            .with_mut(|state| {
                let id = state.imports.allocate_id();
                log::debug!("Imported {}x{} surface as #{id}", image.width(), image.height());
                state.imports.surfaces.insert(id, image);
                id
            })
            .unwrap_or(-1)
    }

    /// Forgets an imported surface. Returns `false` for unknown ids.
    pub fn delete_imported_gpu_surface(&self, id: i64) -> bool {
        self.state
            .with_mut(|state| state.imports.surfaces.remove(&id).is_some())
            .unwrap_or(false)
    }

    /// Presents a pending frame, releases the caches and imported
    /// resources and disconnects from the surface. Idempotent.
    pub fn dispose(&self) {
        self.state.with_mut(|state| {
            if state.schedule == FrameSchedule::Disposed {
                return;
            }
            if state.schedule == FrameSchedule::PendingFrame {
                self.present_locked(state);
            }
            let surface = state.surface.upgrade();
            let semaphores: Vec<GpuSemaphore> =
                state.imports.semaphores.drain().map(|(_, s)| s).collect();
            if let Some(surface) = &surface {
                surface.with_render_target(|target| {
                    for semaphore in semaphores {
                        target.destroy_semaphore(semaphore);
                    }
                });
                for slot in state.surface_slots.drain(..) {
                    surface.remote_handle().disconnect(slot);
                }
            }
            state.imports.surfaces.clear();
            state.cache.purge_cache_resources(true);
            state.raster_cache.purge_all();
            state.layer_tree = None;
            state.schedule = FrameSchedule::Disposed;
            state.publish();
            log::debug!("Content aggregator disposed");
        });
    }

    /// Host side: renders `tree`.
    pub fn invoke_update(
        self: &Arc<Self>,
        tree: LayerTree,
        on_done: impl FnOnce(Result<UpdateResult, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(self, Self::OP_UPDATE, RemoteArgs::new().with(tree), on_done)
    }

    /// Host side: requests a capture of the next frame.
    pub fn invoke_capture_next_frame_as_picture(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<u64, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_CAPTURE_NEXT_FRAME_AS_PICTURE,
            RemoteArgs::new(),
            on_done,
        )
    }

    /// Host side: drops cached snapshots.
    pub fn invoke_purge_raster_cache_resources(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<(), RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_PURGE_RASTER_CACHE_RESOURCES,
            RemoteArgs::new(),
            on_done,
        )
    }

    /// Host side: imports a semaphore file descriptor.
    pub fn invoke_import_gpu_semaphore_from_fd(
        self: &Arc<Self>,
        fd: OwnedFd,
        on_done: impl FnOnce(Result<i64, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_IMPORT_GPU_SEMAPHORE_FROM_FD,
            RemoteArgs::new().with(fd),
            on_done,
        )
    }

    /// Host side: destroys an imported semaphore.
    pub fn invoke_delete_imported_gpu_semaphore(
        self: &Arc<Self>,
        id: i64,
        on_done: impl FnOnce(Result<bool, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_DELETE_IMPORTED_GPU_SEMAPHORE,
            RemoteArgs::new().with(id),
            on_done,
        )
    }

    /// Host side: imports a surface image.
    pub fn invoke_import_gpu_surface(
        self: &Arc<Self>,
        image: Image,
        on_done: impl FnOnce(Result<i64, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_IMPORT_GPU_SURFACE,
            RemoteArgs::new().with(image),
            on_done,
        )
    }

    /// Host side: forgets an imported surface.
    pub fn invoke_delete_imported_gpu_surface(
        self: &Arc<Self>,
        id: i64,
        on_done: impl FnOnce(Result<bool, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(
            self,
            Self::OP_DELETE_IMPORTED_GPU_SURFACE,
            RemoteArgs::new().with(id),
            on_done,
        )
    }

    /// Host side: disposes the aggregator.
    pub fn invoke_dispose(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<(), RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(self, Self::OP_DISPOSE, RemoteArgs::new(), on_done)
    }

    /// Host side: fetches the generation-cache statistics.
    pub fn invoke_cache_stats(
        self: &Arc<Self>,
        on_done: impl FnOnce(Result<Vec<String>, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        RemoteHandle::call(self, Self::OP_CACHE_STATS, RemoteArgs::new(), on_done)
    }
}

impl Trackable for ContentAggregator {
    fn trace(&self, tracer: &mut dyn ResourceTracer) {
        tracer.trace_member("TextureManager", &*self.texture_manager);
        self.state.with(|state| {
            tracer.trace_member("LayerGenerationCache", &state.cache);
            tracer.trace_member("RasterCache", &state.raster_cache);
            for (id, image) in &state.imports.surfaces {
                tracer.trace_resource(TracedResource {
                    annotation: &format!("ImportedSurface#{id}"),
                    kind: TrackableType::Texture,
                    device: TrackableDevice::Gpu,
                    ownership: TrackableOwnership::Shared,
                    id: image.unique_id(),
                    size: Some(image.byte_size()),
                });
            }
        });
    }
}
