// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Built-in remote object running plain closures on the present thread.

use core::fmt;
use std::sync::{Arc, LazyLock, Weak};

use crate::error::PresentError;
use crate::link::ThreadLink;
use crate::remote_call::{OpCode, RemoteArgs, RemoteCallback, RemoteResult, remote_ok};
use crate::remote_handle::{DispatchTable, RemoteHandle, RemoteObject};

/// A closure evaluated on the present thread.
pub type Task = Box<dyn FnOnce() -> RemoteResult + Send>;

/// Something that can run a release on the present thread.
pub trait ReleaseQueue: Send + Sync {
    /// Queues `release`. Returns `false` if it could not be queued; the
    /// closure has then been dropped on the calling thread.
    fn post_release(&self, release: Box<dyn FnOnce() + Send>) -> bool;
}

static DISPATCH: LazyLock<DispatchTable> = LazyLock::new(|| {
    DispatchTable::new::<TaskRunner>().with(TaskRunner::OP_RUN, 1, |_: &TaskRunner, args| {
        let task: Task = args.take(0);
        task()
    })
});

/// Runs submitted tasks in order on the present thread.
pub struct TaskRunner {
    handle: RemoteHandle,
    this: Weak<Self>,
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl RemoteObject for TaskRunner {
    fn remote_handle(&self) -> &RemoteHandle {
        &self.handle
    }
}

impl TaskRunner {
    /// Evaluates the [`Task`] argument.
    pub const OP_RUN: OpCode = 1;

    pub(crate) fn new(link: &Arc<ThreadLink>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            handle: RemoteHandle::new(link, &DISPATCH),
            this: this.clone(),
        })
    }

    /// Queues `task`; `callback` receives its result on the host thread.
    pub fn submit(&self, task: Task, callback: Option<RemoteCallback>) -> Result<(), PresentError> {
        let Some(this) = self.this.upgrade() else {
            return Err(PresentError::QueueClosed);
        };
        RemoteHandle::invoke(&this, Self::OP_RUN, RemoteArgs::new().with(task), callback)
    }
}

impl ReleaseQueue for TaskRunner {
    fn post_release(&self, release: Box<dyn FnOnce() + Send>) -> bool {
        let task: Task = Box::new(move || {
            release();
            remote_ok(())
        });
        self.submit(task, None).is_ok()
    }
}
