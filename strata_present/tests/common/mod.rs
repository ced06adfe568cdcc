// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Helpers shared by the integration tests.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use core::any::Any;
use core::time::Duration;
use std::path::PathBuf;
use std::time::Instant;

use strata_present::{PresentOptions, PresentThread};

/// Upper bound for anything a test waits on.
pub const DEADLINE: Duration = Duration::from_secs(10);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn start() -> PresentThread {
    start_with(PresentOptions::default())
}

pub fn start_with(options: PresentOptions) -> PresentThread {
    init_logger();
    PresentThread::start(options).unwrap()
}

/// Runs `work` on the present thread and dispatches host messages until its
/// result comes back.
pub fn on_present<R: Any + Send>(
    thread: &mut PresentThread,
    work: impl FnOnce() -> R + Send + 'static,
) -> R {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread
        .submit_task(
            work,
            move |value| {
                let _ = tx.send(value);
            },
            |err| panic!("present task failed: {err}"),
        )
        .unwrap();
    let start = Instant::now();
    loop {
        thread.wait_and_dispatch(Duration::from_millis(20));
        if let Ok(value) = rx.try_recv() {
            return value;
        }
        assert!(start.elapsed() < DEADLINE, "present task did not complete");
    }
}

/// Dispatches host messages until `done` holds.
pub fn dispatch_until(thread: &mut PresentThread, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        thread.wait_and_dispatch(Duration::from_millis(20));
        assert!(start.elapsed() < DEADLINE, "condition not reached");
    }
}

/// A fresh directory under the system temporary directory.
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("strata-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
