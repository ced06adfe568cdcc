// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! State shared by the host and the present thread.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crate::gpu_guard::GpuObjectCollector;
use crate::queue::MessageQueue;
use crate::task_runner::TaskRunner;
use crate::transfer_profiler::TransferProfiler;

/// The two queues of a present thread and the bookkeeping both sides reach.
///
/// Every remote object holds the link of the thread it lives on. Obtain one
/// from [`PresentThread::link`](crate::PresentThread::link) on the host or
/// [`LocalContext::link`](crate::LocalContext::link) on the present thread.
pub struct ThreadLink {
    present_queue: MessageQueue,
    host_queue: MessageQueue,
    collector: GpuObjectCollector,
    profiler: Option<TransferProfiler>,
    dangling: Arc<AtomicUsize>,
    task_runner: OnceLock<Weak<TaskRunner>>,
}

impl fmt::Debug for ThreadLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLink")
            .field(self.present_queue.name(), &self.present_queue.enqueued_count())
            .field(self.host_queue.name(), &self.host_queue.enqueued_count())
            .field("collector", &self.collector)
            .field("profiling", &self.profiler.is_some())
            .field("dangling", &self.dangling.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ThreadLink {
    pub(crate) fn new(profiler: Option<TransferProfiler>) -> Arc<Self> {
        Arc::new(Self {
            present_queue: MessageQueue::new("present"),
            host_queue: MessageQueue::new("host"),
            collector: GpuObjectCollector::new(),
            profiler,
            dangling: Arc::new(AtomicUsize::new(0)),
            task_runner: OnceLock::new(),
        })
    }

    pub(crate) fn present_queue(&self) -> &MessageQueue {
        &self.present_queue
    }

    pub(crate) fn host_queue(&self) -> &MessageQueue {
        &self.host_queue
    }

    /// Live GPU object guards of this thread pair.
    #[must_use]
    pub fn collector(&self) -> &GpuObjectCollector {
        &self.collector
    }

    pub(crate) fn profiler(&self) -> Option<&TransferProfiler> {
        self.profiler.as_ref()
    }

    pub(crate) fn dangling_counter(&self) -> &Arc<AtomicUsize> {
        &self.dangling
    }

    /// Callbacks dropped without running so far.
    #[must_use]
    pub fn dangling_callbacks(&self) -> usize {
        self.dangling.load(Ordering::Relaxed)
    }

    pub(crate) fn set_task_runner(&self, runner: &Arc<TaskRunner>) {
        if self.task_runner.set(Arc::downgrade(runner)).is_err() {
            log::warn!("Task runner of the present thread was already installed");
        }
    }

    /// The built-in task runner, while the present thread is alive.
    pub(crate) fn task_runner(&self) -> Option<Arc<TaskRunner>> {
        self.task_runner.get().and_then(Weak::upgrade)
    }

    /// Returns `true` once the present thread stopped accepting messages.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.present_queue.is_closed()
    }
}
