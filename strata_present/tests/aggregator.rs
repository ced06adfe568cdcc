// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame scheduling, capture and resource import through a content
//! aggregator on a raster surface.

mod common;

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use kurbo::Rect;
use parking_lot::Mutex;
use strata_core::canvas::{Canvas as _, Picture, RasterSurface};
use strata_core::geometry::ISize;
use strata_core::image::Image;
use strata_core::damage::DamageRegion;
use strata_core::layer::{FrameObserver, Layer, LayerTree};
use strata_core::paint::{Color, Paint};
use strata_core::profiler::FrameMilestone;
use strata_core::resource::GpuSemaphore;
use strata_debug::resources::JsonResourceTracer;
use strata_present::{
    BuffersDescriptor, ContentAggregator, FrameSchedule, FrameSubmission, GpuObjectGuard,
    LocalContext, PresentError, PresentOptions, PresentThread, RasterRenderTarget, RemoteObject as _,
    RenderTarget, RenderTargetKind, Surface, UpdateResult,
};

use common::{DEADLINE, dispatch_until, on_present, start, start_with};

fn red_square() -> Picture {
    let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
    Picture::record(rect, |c| c.draw_rect(rect, &Paint::fill(Color::RED)))
}

fn picture_tree() -> LayerTree {
    let root = Layer::container().with_child(Layer::picture(red_square()));
    LayerTree::new(root, ISize::new(200, 200))
}

fn raster_aggregator(thread: &mut PresentThread) -> (Arc<Surface>, Arc<ContentAggregator>) {
    let display = thread.open_display();
    on_present(thread, move || {
        let surface = display.create_raster_surface(200, 200).unwrap();
        let aggregator = surface.create_content_aggregator().unwrap();
        (surface, aggregator)
    })
}

/// Updates and lets the present loop deliver the surface's `frame` signal.
fn render(thread: &mut PresentThread, aggregator: &Arc<ContentAggregator>, tree: LayerTree) -> UpdateResult {
    let aggregator = Arc::clone(aggregator);
    let result = on_present(thread, move || aggregator.update(tree));
    // Idle work of the update, including the frame signal, runs before the
    // next message.
    on_present(thread, || ());
    result
}

#[test]
fn single_picture_frame() {
    let mut thread = start();
    let (surface, aggregator) = raster_aggregator(&mut thread);

    assert_eq!(render(&mut thread, &aggregator, picture_tree()), UpdateResult::Success);
    let (schedule, frame) = on_present(&mut thread, move || {
        (aggregator.frame_schedule(), surface.snapshot_presented())
    });
    assert_eq!(schedule, FrameSchedule::Presented);
    let frame = frame.unwrap();
    assert_eq!(frame.pixel(50, 50), Some(Color::RED));
    assert_eq!(frame.pixel(150, 150), Some(Color::BLACK));
    thread.shutdown();
}

#[test]
fn opacity_layer_is_snapshotted_once_stable() {
    let mut thread = start();
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    let root = Layer::opacity(0.5).with_child(Layer::picture(red_square()));
    let tree = LayerTree::new(root, ISize::new(200, 200));
    let id = tree.root().id();

    for frame in 1..=24 {
        let aggregator = Arc::clone(&aggregator);
        let tree = tree.clone();
        let (result, cached) = on_present(&mut thread, move || {
            let result = aggregator.update(tree);
            (result, aggregator.has_cached_snapshot(id))
        });
        assert_eq!(result, UpdateResult::Success, "frame {frame}");
        assert_eq!(cached, frame == 24, "snapshot state at frame {frame}");
    }

    let lines = on_present(&mut thread, move || aggregator.cache_stats());
    assert!(lines.iter().any(|line| line.contains("<Image>")), "{lines:?}");
    thread.shutdown();
}

/// Raster target counting the calls it receives.
#[derive(Debug)]
struct CountingTarget {
    inner: RasterRenderTarget,
    counts: Arc<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    begin: AtomicUsize,
    submit: AtomicUsize,
    present: AtomicUsize,
}

impl RenderTarget for CountingTarget {
    fn kind(&self) -> RenderTargetKind {
        self.inner.kind()
    }

    fn size(&self) -> ISize {
        self.inner.size()
    }

    fn has_gpu_context(&self) -> bool {
        false
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PresentError> {
        self.inner.resize(width, height)
    }

    fn begin_frame(&mut self) -> Result<&mut RasterSurface, PresentError> {
        self.counts.begin.fetch_add(1, Ordering::Relaxed);
        self.inner.begin_frame()
    }

    fn submit(&mut self, submission: FrameSubmission) -> Result<(), PresentError> {
        self.counts.submit.fetch_add(1, Ordering::Relaxed);
        self.inner.submit(submission)
    }

    fn present(&mut self) -> Result<(), PresentError> {
        self.counts.present.fetch_add(1, Ordering::Relaxed);
        self.inner.present()
    }

    fn buffers_descriptor(&self) -> BuffersDescriptor {
        self.inner.buffers_descriptor()
    }

    fn snapshot(&self) -> Option<Image> {
        self.inner.snapshot()
    }
}

#[test]
fn update_while_pending_drops_the_frame() {
    let mut thread = start();
    let counts = Arc::new(Counts::default());
    let target_counts = Arc::clone(&counts);
    let aggregator = on_present(&mut thread, move || {
        let target = CountingTarget {
            inner: RasterRenderTarget::new(200, 200).unwrap(),
            counts: target_counts,
        };
        Surface::create(Box::new(target))
            .create_content_aggregator()
            .unwrap()
    });

    let task_aggregator = Arc::clone(&aggregator);
    let (first, second, schedule) = on_present(&mut thread, move || {
        let first = task_aggregator.update(picture_tree());
        let second = task_aggregator.update(picture_tree());
        (first, second, task_aggregator.frame_schedule())
    });
    assert_eq!(first, UpdateResult::Success);
    assert_eq!(second, UpdateResult::FrameDropped);
    assert_eq!(schedule, FrameSchedule::PendingFrame);
    assert_eq!(counts.begin.load(Ordering::Relaxed), 1);
    assert_eq!(counts.submit.load(Ordering::Relaxed), 1);

    let schedule = on_present(&mut thread, move || aggregator.frame_schedule());
    assert_eq!(schedule, FrameSchedule::Presented);
    assert_eq!(counts.present.load(Ordering::Relaxed), 1);
    thread.shutdown();
}

type Captures = Arc<Mutex<Vec<(GpuObjectGuard<Picture>, u64)>>>;

fn watch_captures(aggregator: &ContentAggregator) -> Captures {
    let captures: Captures = Arc::default();
    let sink = Arc::clone(&captures);
    aggregator.remote_handle().connect(
        ContentAggregator::SIGNAL_PICTURE_CAPTURED,
        false,
        move |info| {
            let picture = info.get::<GpuObjectGuard<Picture>>(0).clone();
            sink.lock().push((picture, *info.get::<u64>(1)));
        },
    );
    captures
}

#[test]
fn captured_picture_matches_the_frame() {
    let mut thread = start();
    let (surface, aggregator) = raster_aggregator(&mut thread);
    let captures = watch_captures(&aggregator);

    let task_aggregator = Arc::clone(&aggregator);
    let serial = on_present(&mut thread, move || task_aggregator.capture_next_frame_as_picture());
    assert_eq!(render(&mut thread, &aggregator, picture_tree()), UpdateResult::Success);
    dispatch_until(&mut thread, || !captures.lock().is_empty());

    let (picture, captured_serial) = captures.lock()[0].clone();
    assert_eq!(captured_serial, serial);
    let mut replay = RasterSurface::new(200, 200).unwrap();
    picture
        .with(|picture| picture.playback(&mut replay.canvas()))
        .unwrap();
    let frame = on_present(&mut thread, move || surface.snapshot_presented()).unwrap();
    assert_eq!(replay.pixel(50, 50), frame.pixel(50, 50));
    assert_eq!(replay.pixel(50, 50), Some(Color::RED));
    thread.shutdown();
}

#[test]
fn capture_is_emitted_once_per_request() {
    let mut thread = start();
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    let captures = watch_captures(&aggregator);

    let task_aggregator = Arc::clone(&aggregator);
    let serial = on_present(&mut thread, move || task_aggregator.capture_next_frame_as_picture());
    render(&mut thread, &aggregator, picture_tree());
    render(&mut thread, &aggregator, picture_tree());
    on_present(&mut thread, || ());
    thread.dispatch_pending();

    let serials: Vec<u64> = captures.lock().iter().map(|(_, serial)| *serial).collect();
    assert_eq!(serials, vec![serial]);
    thread.shutdown();
}

#[test]
fn captured_picture_outlives_dispose_without_host_release() {
    let mut thread = start();
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    let captures = watch_captures(&aggregator);

    let task_aggregator = Arc::clone(&aggregator);
    on_present(&mut thread, move || task_aggregator.capture_next_frame_as_picture());
    render(&mut thread, &aggregator, picture_tree());
    dispatch_until(&mut thread, || !captures.lock().is_empty());
    let (picture, _) = captures.lock().pop().unwrap();

    let task_aggregator = Arc::clone(&aggregator);
    let schedule = on_present(&mut thread, move || {
        task_aggregator.dispose();
        task_aggregator.frame_schedule()
    });
    assert_eq!(schedule, FrameSchedule::Disposed);
    assert!(picture.is_valid(), "dispose leaves host references alone");

    thread.shutdown();
    assert!(!picture.is_valid(), "termination collects every guard");
    drop(picture);
}

/// Records which thread dropped it.
#[derive(Debug)]
struct DropProbe(Arc<AtomicBool>);

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.store(LocalContext::is_present_thread(), Ordering::Relaxed);
    }
}

#[test]
fn retained_guard_is_released_on_the_present_thread() {
    let mut thread = start();
    let on_present_thread = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&on_present_thread);
    let guard = on_present(&mut thread, move || {
        GpuObjectGuard::for_present_thread(DropProbe(flag), true)
    });
    assert!(guard.is_retained());
    drop(guard);
    on_present(&mut thread, || ());
    assert!(on_present_thread.load(Ordering::Relaxed));
    thread.shutdown();
}

#[test]
fn raster_surface_rejects_semaphore_import() {
    let mut thread = start();
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    let fd = OwnedFd::from(File::open("/dev/null").unwrap());
    let id = on_present(&mut thread, move || aggregator.import_gpu_semaphore_from_fd(fd));
    assert_eq!(id, -1);
    thread.shutdown();
}

/// Raster target that pretends to compose on a GPU.
#[derive(Debug)]
struct FakeGpuTarget {
    inner: RasterRenderTarget,
    next_semaphore: u64,
    submissions: Arc<Mutex<Vec<FrameSubmission>>>,
    destroyed: Arc<Mutex<Vec<GpuSemaphore>>>,
}

impl RenderTarget for FakeGpuTarget {
    fn kind(&self) -> RenderTargetKind {
        RenderTargetKind::HwCompose
    }

    fn size(&self) -> ISize {
        self.inner.size()
    }

    fn has_gpu_context(&self) -> bool {
        true
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PresentError> {
        self.inner.resize(width, height)
    }

    fn begin_frame(&mut self) -> Result<&mut RasterSurface, PresentError> {
        self.inner.begin_frame()
    }

    fn submit(&mut self, submission: FrameSubmission) -> Result<(), PresentError> {
        self.submissions.lock().push(submission.clone());
        self.inner.submit(submission)
    }

    fn present(&mut self) -> Result<(), PresentError> {
        self.inner.present()
    }

    fn buffers_descriptor(&self) -> BuffersDescriptor {
        self.inner.buffers_descriptor()
    }

    fn snapshot(&self) -> Option<Image> {
        self.inner.snapshot()
    }

    fn import_semaphore(&mut self, fd: OwnedFd) -> Option<GpuSemaphore> {
        drop(fd);
        self.next_semaphore += 1;
        Some(GpuSemaphore(self.next_semaphore))
    }

    fn destroy_semaphore(&mut self, semaphore: GpuSemaphore) {
        self.destroyed.lock().push(semaphore);
    }
}

fn green_image() -> Image {
    let mut surface = RasterSurface::new(50, 50).unwrap();
    surface.canvas().clear(Color::GREEN);
    surface.snapshot()
}

#[test]
fn imported_surface_is_drawn_with_its_semaphores() {
    let mut thread = start();
    let submissions = Arc::new(Mutex::new(Vec::new()));
    let destroyed = Arc::new(Mutex::new(Vec::new()));
    let target = FakeGpuTarget {
        inner: RasterRenderTarget::new(200, 200).unwrap(),
        next_semaphore: 0,
        submissions: Arc::clone(&submissions),
        destroyed: Arc::clone(&destroyed),
    };
    let (surface, aggregator) = on_present(&mut thread, move || {
        let surface = Surface::create(Box::new(target));
        let aggregator = surface.create_content_aggregator().unwrap();
        (surface, aggregator)
    });

    let task_aggregator = Arc::clone(&aggregator);
    let (wait, signal, view) = on_present(&mut thread, move || {
        let devnull = || OwnedFd::from(File::open("/dev/null").unwrap());
        (
            task_aggregator.import_gpu_semaphore_from_fd(devnull()),
            task_aggregator.import_gpu_semaphore_from_fd(devnull()),
            task_aggregator.import_gpu_surface(green_image()),
        )
    });
    assert!(wait > 0 && signal > 0 && view > 0);
    assert_ne!(wait, signal);

    let root = Layer::container().with_child(Layer::gpu_surface_view(
        view,
        Rect::new(0.0, 0.0, 50.0, 50.0),
        wait,
        signal,
    ));
    let result = render(&mut thread, &aggregator, LayerTree::new(root, ISize::new(200, 200)));
    assert_eq!(result, UpdateResult::Success);

    {
        let submissions = submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].wait, vec![GpuSemaphore(1)]);
        assert_eq!(submissions[0].signal, vec![GpuSemaphore(2)]);
    }
    let frame = on_present(&mut thread, move || surface.snapshot_presented()).unwrap();
    assert_eq!(frame.pixel(10, 10), Some(Color::GREEN));

    let task_aggregator = Arc::clone(&aggregator);
    let (deleted, deleted_again) = on_present(&mut thread, move || {
        (
            task_aggregator.delete_imported_gpu_surface(view),
            task_aggregator.delete_imported_gpu_surface(view),
        )
    });
    assert!(deleted);
    assert!(!deleted_again);

    on_present(&mut thread, move || aggregator.dispose());
    let mut destroyed = destroyed.lock().clone();
    destroyed.sort();
    assert_eq!(destroyed, vec![GpuSemaphore(1), GpuSemaphore(2)]);
    thread.shutdown();
}

#[test]
fn frame_profiler_records_presented_frames() {
    let mut thread = start_with(PresentOptions {
        profile_frames: true,
        frame_profiler_threshold: 4,
        ..PresentOptions::default()
    });
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    for _ in 0..6 {
        render(&mut thread, &aggregator, picture_tree());
    }
    let report = aggregator.frame_profile_report().unwrap();
    assert_eq!(report.entries.len(), 4);
    for entry in &report.entries {
        let requested = entry.milestone(FrameMilestone::Requested).unwrap();
        let presented = entry.milestone(FrameMilestone::Presented).unwrap();
        assert!(presented >= requested, "frame {}", entry.frame);
    }
    thread.shutdown();
}

#[test]
fn surface_resize_reaches_the_aggregator_and_the_host() {
    let mut thread = start();
    let (surface, aggregator) = raster_aggregator(&mut thread);
    let resized: Arc<Mutex<Vec<(u32, u32)>>> = Arc::default();
    {
        let resized = Arc::clone(&resized);
        surface.remote_handle().connect(Surface::SIGNAL_RESIZE, false, move |info| {
            resized.lock().push((*info.get::<u32>(0), *info.get::<u32>(1)));
        });
    }
    render(&mut thread, &aggregator, picture_tree());

    let done = Arc::new(AtomicBool::new(false));
    {
        let done = Arc::clone(&done);
        surface
            .invoke_resize(320, 240, move |result| {
                assert!(result.is_ok());
                done.store(true, Ordering::Relaxed);
            })
            .unwrap();
    }
    dispatch_until(&mut thread, || done.load(Ordering::Relaxed));
    dispatch_until(&mut thread, || !resized.lock().is_empty());
    assert_eq!(*resized.lock(), vec![(320, 240)]);

    let descriptor = on_present(&mut thread, move || surface.buffers_descriptor()).unwrap();
    assert_eq!((descriptor.width, descriptor.height), (320, 240));
    assert_eq!(descriptor.kind, RenderTargetKind::Raster);
    thread.shutdown();
}

#[test]
fn frame_requests_are_coalesced() {
    let mut thread = start();
    let (surface, _aggregator) = raster_aggregator(&mut thread);
    let frames = Arc::new(AtomicU64::new(0));
    {
        let frames = Arc::clone(&frames);
        surface.remote_handle().connect(Surface::SIGNAL_FRAME, false, move |_| {
            frames.fetch_add(1, Ordering::Relaxed);
        });
    }
    let task_surface = Arc::clone(&surface);
    let accepted = on_present(&mut thread, move || {
        (task_surface.request_next_frame(), task_surface.request_next_frame())
    });
    assert_eq!(accepted, (true, true));
    on_present(&mut thread, || ());
    thread.dispatch_pending();
    assert_eq!(frames.load(Ordering::Relaxed), 1);

    let closed = on_present(&mut thread, move || {
        surface.close();
        (surface.is_closed(), surface.request_next_frame())
    });
    assert_eq!(closed, (true, false));
    thread.shutdown();
}

#[test]
fn closing_the_display_closes_its_surfaces() {
    let mut thread = start();
    let display = thread.open_display();
    let closed = Arc::new(AtomicUsize::new(0));
    {
        let closed = Arc::clone(&closed);
        display
            .remote_handle()
            .connect(strata_present::Display::SIGNAL_CLOSED, false, move |_| {
                closed.fetch_add(1, Ordering::Relaxed);
            });
    }
    let task_display = Arc::clone(&display);
    let surface = on_present(&mut thread, move || task_display.create_raster_surface(64, 64).unwrap());

    let done = Arc::new(AtomicBool::new(false));
    {
        let done = Arc::clone(&done);
        display
            .invoke_close(move |result| {
                assert!(result.is_ok());
                done.store(true, Ordering::Relaxed);
            })
            .unwrap();
    }
    dispatch_until(&mut thread, || done.load(Ordering::Relaxed));
    assert_eq!(closed.load(Ordering::Relaxed), 1);
    assert!(surface.is_closed());

    let task_display = Arc::clone(&display);
    let refused = on_present(&mut thread, move || task_display.create_raster_surface(8, 8).is_err());
    assert!(refused);
    thread.shutdown();
}

#[test]
fn resource_trace_lists_cached_snapshots() {
    let mut thread = start();
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    let root = Layer::opacity(0.5).with_child(Layer::picture(red_square()));
    let tree = LayerTree::new(root, ISize::new(200, 200));
    for _ in 0..strata_core::cache::OPACITY_STABLE_THRESHOLD {
        render(&mut thread, &aggregator, tree.clone());
    }

    let json = on_present(&mut thread, move || {
        let mut tracer = JsonResourceTracer::new("aggregator");
        tracer.trace_root("ContentAggregator", &*aggregator);
        tracer.to_json()
    });
    let members = json["tracings"][0]["members"].as_array().unwrap();
    let cache = members
        .iter()
        .find(|member| member["annotation"] == "LayerGenerationCache")
        .unwrap();
    let objects = cache["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["device"], "cpu");
    assert!(objects[0]["size"].as_u64().unwrap() > 0);
    thread.shutdown();
}

#[test]
fn frame_profile_exports_as_chrome_trace() {
    let mut thread = start_with(PresentOptions {
        profile_frames: true,
        ..PresentOptions::default()
    });
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    render(&mut thread, &aggregator, picture_tree());
    render(&mut thread, &aggregator, picture_tree());

    let report = aggregator.frame_profile_report().unwrap();
    let mut out = Vec::new();
    strata_debug::chrome::export(&report, &mut out).unwrap();
    let events: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
    let presented = events
        .iter()
        .filter(|event| event["name"] == "Presented")
        .count();
    assert_eq!(presented, 2);
    thread.shutdown();
}

/// Holds the frame open inside `begin_frame` until released.
struct GatedObserver {
    entered: crossbeam_channel::Sender<()>,
    release: crossbeam_channel::Receiver<()>,
}

impl FrameObserver for GatedObserver {
    fn name(&self) -> &str {
        "gated"
    }

    fn begin_frame(&mut self, _size: ISize) -> Option<&mut dyn strata_core::canvas::Canvas> {
        let _ = self.entered.send(());
        let _ = self.release.recv_timeout(DEADLINE);
        None
    }

    fn end_frame(&mut self) {}
}

#[test]
fn frame_state_is_readable_while_a_frame_renders() {
    let mut thread = start();
    let (_surface, aggregator) = raster_aggregator(&mut thread);
    let (entered_tx, entered) = crossbeam_channel::bounded(1);
    let (release, release_rx) = crossbeam_channel::bounded(1);
    let mut tree = picture_tree();
    tree.add_observer(Arc::new(Mutex::new(GatedObserver {
        entered: entered_tx,
        release: release_rx,
    })));

    let result = Arc::new(Mutex::new(None));
    {
        let result = Arc::clone(&result);
        aggregator
            .invoke_update(tree, move |r| *result.lock() = Some(r))
            .unwrap();
    }
    entered.recv_timeout(DEADLINE).unwrap();
    // The present thread is painting and holds the aggregator state.
    assert_eq!(aggregator.frame_schedule(), FrameSchedule::Idle);
    assert_eq!(aggregator.last_damage(), DamageRegion::Full);
    release.send(()).unwrap();

    dispatch_until(&mut thread, || result.lock().is_some());
    assert_eq!(result.lock().take(), Some(Ok(UpdateResult::Success)));
    assert!(matches!(
        aggregator.frame_schedule(),
        FrameSchedule::PendingFrame | FrameSchedule::Presented
    ));
    assert_eq!(
        aggregator.last_damage(),
        DamageRegion::from_rect(Rect::new(0.0, 0.0, 100.0, 100.0))
    );
    thread.shutdown();
    assert_eq!(aggregator.frame_schedule(), FrameSchedule::Disposed);
}
