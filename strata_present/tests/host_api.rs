// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Driving displays, surfaces and aggregators through host-side calls.

mod common;

use std::sync::Arc;

use kurbo::Rect;
use parking_lot::Mutex;
use strata_core::canvas::{Canvas as _, Picture, RasterSurface};
use strata_core::geometry::ISize;
use strata_core::layer::{Layer, LayerTree};
use strata_core::paint::{Color, Paint};
use strata_present::{
    BuffersDescriptor, ContentAggregator, PresentThread, RemoteArgs, RemoteCallStatus,
    RemoteError, RemoteHandle, RemoteObject as _, RenderTargetKind, Surface, UpdateResult,
    WindowState,
};

use common::{dispatch_until, on_present, start};

type Reply<T> = Arc<Mutex<Option<T>>>;

fn reply<T: Send + 'static>() -> (Reply<T>, impl FnOnce(T) + Send + 'static) {
    let slot: Reply<T> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    (slot, move |value| *sink.lock() = Some(value))
}

fn wait<T>(thread: &mut PresentThread, slot: &Reply<T>) -> T {
    dispatch_until(thread, || slot.lock().is_some());
    slot.lock().take().unwrap()
}

fn blue_tree(size: ISize) -> LayerTree {
    let rect = Rect::new(0.0, 0.0, 40.0, 40.0);
    let picture = Picture::record(rect, |c| c.draw_rect(rect, &Paint::fill(Color::BLUE)));
    LayerTree::new(Layer::container().with_child(Layer::picture(picture)), size)
}

fn host_surface(thread: &mut PresentThread, width: u32, height: u32) -> Arc<Surface> {
    let display = thread.open_display();
    let (slot, done) = reply();
    display
        .invoke_create_raster_surface(width, height, done)
        .unwrap();
    wait(thread, &slot).unwrap()
}

fn host_aggregator(thread: &mut PresentThread, surface: &Arc<Surface>) -> Arc<ContentAggregator> {
    let (slot, done) = reply();
    surface.invoke_create_content_aggregator(done).unwrap();
    wait(thread, &slot).unwrap()
}

#[test]
fn host_calls_drive_a_frame() {
    let mut thread = start();
    let surface = host_surface(&mut thread, 120, 80);
    let aggregator = host_aggregator(&mut thread, &surface);

    let (slot, done) = reply();
    aggregator.invoke_capture_next_frame_as_picture(done).unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(1));

    let (slot, done) = reply();
    aggregator
        .invoke_update(blue_tree(ISize::new(120, 80)), done)
        .unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(UpdateResult::Success));

    let (slot, done) = reply();
    aggregator.invoke_cache_stats(done).unwrap();
    let lines: Vec<String> = wait(&mut thread, &slot).unwrap();
    assert!(lines.iter().all(|line| line.contains("<Recording>")), "{lines:?}");

    let (slot, done) = reply::<Result<BuffersDescriptor, RemoteError>>();
    RemoteHandle::call(
        &surface,
        Surface::OP_GET_BUFFERS_DESCRIPTOR,
        RemoteArgs::new(),
        done,
    )
    .unwrap();
    let descriptor = wait(&mut thread, &slot).unwrap();
    assert_eq!(descriptor.kind, RenderTargetKind::Raster);
    assert_eq!((descriptor.width, descriptor.height), (120, 80));

    let (slot, done) = reply();
    aggregator.invoke_purge_raster_cache_resources(done).unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(()));

    let (slot, done) = reply();
    aggregator.invoke_dispose(done).unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(()));

    let (slot, done) = reply();
    aggregator
        .invoke_update(blue_tree(ISize::new(120, 80)), done)
        .unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(UpdateResult::Error));
    thread.shutdown();
}

#[test]
fn host_imports_and_deletes_surfaces() {
    let mut thread = start();
    let surface = host_surface(&mut thread, 64, 64);
    let aggregator = host_aggregator(&mut thread, &surface);
    let mut raster = RasterSurface::new(8, 8).unwrap();
    raster.canvas().clear(Color::WHITE);
    let image = raster.snapshot();

    let (slot, done) = reply();
    aggregator.invoke_import_gpu_surface(image, done).unwrap();
    let id = wait(&mut thread, &slot).unwrap();
    assert!(id > 0);

    let (slot, done) = reply();
    aggregator.invoke_delete_imported_gpu_surface(id, done).unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(true));

    let (slot, done) = reply();
    aggregator.invoke_delete_imported_gpu_semaphore(id, done).unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(false));
    thread.shutdown();
}

#[test]
fn window_changes_emit_configure() {
    let mut thread = start();
    let surface = host_surface(&mut thread, 64, 64);
    let configs: Arc<Mutex<Vec<WindowState>>> = Arc::default();
    {
        let configs = Arc::clone(&configs);
        surface
            .remote_handle()
            .connect(Surface::SIGNAL_CONFIGURE, false, move |info| {
                configs.lock().push(info.get::<WindowState>(0).clone());
            });
    }

    let calls = [
        (Surface::OP_SET_TITLE, RemoteArgs::new().with("strata".to_owned())),
        (Surface::OP_SET_MIN_SIZE, RemoteArgs::new().with(320_u32).with(200_u32)),
        (Surface::OP_SET_FULLSCREEN, RemoteArgs::new().with(true)),
    ];
    for (opcode, args) in calls {
        let (slot, done) = reply::<Result<(), RemoteError>>();
        RemoteHandle::call(&surface, opcode, args, done).unwrap();
        assert_eq!(wait(&mut thread, &slot), Ok(()));
    }
    dispatch_until(&mut thread, || configs.lock().len() == 3);

    let expected = WindowState {
        title: "strata".to_owned(),
        min_size: Some(ISize::new(320, 200)),
        fullscreen: true,
        ..WindowState::default()
    };
    assert_eq!(configs.lock().last(), Some(&expected));
    let task_surface = Arc::clone(&surface);
    assert_eq!(on_present(&mut thread, move || task_surface.window_state()), expected);
    thread.shutdown();
}

#[test]
fn closed_surface_refuses_work() {
    let mut thread = start();
    let surface = host_surface(&mut thread, 64, 64);

    let (slot, done) = reply::<Result<(), RemoteError>>();
    RemoteHandle::call(&surface, Surface::OP_RESIZE, RemoteArgs::new().with(10_u32), done)
        .unwrap();
    let err = wait(&mut thread, &slot).unwrap_err();
    assert_eq!(err.status, RemoteCallStatus::ArgsInvalid);

    let (slot, done) = reply();
    surface.invoke_close(done).unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(()));

    let (slot, done) = reply();
    surface.invoke_request_next_frame(done).unwrap();
    assert_eq!(wait(&mut thread, &slot), Ok(false));

    let (slot, done) = reply();
    surface.invoke_create_content_aggregator(done).unwrap();
    let err = wait(&mut thread, &slot).unwrap_err();
    assert_eq!(err.status, RemoteCallStatus::OpFailed);
    thread.shutdown();
}
