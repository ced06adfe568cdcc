// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The present thread and the host side of its message bus.

use core::any::Any;
use core::fmt;
use core::time::Duration;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::display::Display;
use crate::error::PresentError;
use crate::link::ThreadLink;
use crate::local_context::LocalContext;
use crate::message::{Message, MessageMilestone, Payload};
use crate::options::PresentOptions;
use crate::queue::Envelope;
use crate::remote_call::{RemoteError, RemoteReturn, remote_ok};
use crate::remote_handle::RemoteHandle;
use crate::task_runner::{Task, TaskRunner};
use crate::transfer_profiler::TransferProfiler;

const THREAD_NAME: &str = "strata-present";

/// How often a blocked host checks whether the present thread died.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running present thread, owned by the host thread.
///
/// Responses and signals from the present thread are delivered when the host
/// dispatches its queue through [`dispatch_pending`](Self::dispatch_pending),
/// [`wait_and_dispatch`](Self::wait_and_dispatch) or
/// [`run_until_terminated`](Self::run_until_terminated).
///
/// # Shutdown
///
/// [`dispose`](Self::dispose) asks the present thread to stop. It invalidates
/// every live [`GpuObjectGuard`](crate::GpuObjectGuard), refuses further
/// messages, drops whatever was still queued and confirms termination; the
/// host finishes the join when it dispatches that confirmation. Dropping the
/// handle disposes and joins without running pending callbacks.
pub struct PresentThread {
    link: Arc<ThreadLink>,
    task_runner: Arc<TaskRunner>,
    thread: Option<JoinHandle<()>>,
    disposing: bool,
    terminated: bool,
}

impl fmt::Debug for PresentThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentThread")
            .field("link", &self.link)
            .field("disposing", &self.disposing)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl PresentThread {
    /// Spawns the present thread and waits until it accepts messages.
    pub fn start(options: PresentOptions) -> Result<Self, PresentError> {
        let profiler = options.profile_message_transfer.then(|| {
            let dir = options
                .transfer_profile_dir
                .clone()
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from("."));
            TransferProfiler::new(dir)
        });
        let link = ThreadLink::new(profiler);
        let options = Arc::new(options);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn({
                let link = Arc::clone(&link);
                move || {
                    let context = LocalContext::install(link, options);
                    if ready_tx.send(Arc::clone(context.task_runner())).is_err() {
                        LocalContext::uninstall();
                        return;
                    }
                    run_present_loop(context);
                }
            })
            .map_err(PresentError::Spawn)?;

        let Ok(task_runner) = ready_rx.recv() else {
            if thread.join().is_err() {
                log::error!("Present thread panicked during startup");
            }
            return Err(PresentError::Startup);
        };
        log::info!("Present thread started");
        Ok(Self {
            link,
            task_runner,
            thread: Some(thread),
            disposing: false,
            terminated: false,
        })
    }

    /// The queues remote objects of this thread talk through.
    #[must_use]
    pub fn link(&self) -> &Arc<ThreadLink> {
        &self.link
    }

    /// The built-in task runner.
    #[must_use]
    pub fn task_runner(&self) -> &Arc<TaskRunner> {
        &self.task_runner
    }

    /// Opens the display, the factory of surfaces.
    #[must_use]
    pub fn open_display(&self) -> Arc<Display> {
        Display::new(&self.link)
    }

    /// Returns `true` once the present thread confirmed termination and was
    /// joined.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Callbacks dropped without running because their call never came back.
    #[must_use]
    pub fn dangling_callbacks(&self) -> usize {
        self.link.dangling_callbacks()
    }

    /// Runs `work` on the present thread.
    ///
    /// `on_result` receives the value on the host thread. A panic in `work`
    /// reaches `on_error` as [`RemoteCallStatus::Caught`](crate::RemoteCallStatus::Caught)
    /// with the panic message.
    pub fn submit_task<R: Any + Send>(
        &self,
        work: impl FnOnce() -> R + Send + 'static,
        on_result: impl FnOnce(R) + Send + 'static,
        on_error: impl FnOnce(RemoteError) + Send + 'static,
    ) -> Result<(), PresentError> {
        let task: Task = Box::new(move || remote_ok(work()));
        self.task_runner.submit(
            task,
            Some(Box::new(move |ret: RemoteReturn| match ret.into_result::<R>() {
                Ok(value) => on_result(value),
                Err(err) => on_error(err),
            })),
        )
    }

    /// Blocks until the present thread processed everything queued before
    /// this call, or `timeout` elapsed. Returns `false` on timeout; the
    /// barrier still runs when its turn comes.
    pub fn wait_for_sync_barrier(&self, timeout: Duration) -> bool {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let task: Task = Box::new(move || {
            // The host may have stopped waiting.
            let _ = tx.send(());
            remote_ok(())
        });
        if self.task_runner.submit(task, None).is_err() {
            return false;
        }
        rx.recv_timeout(timeout).is_ok()
    }

    /// Delivers every response and signal already queued for the host.
    /// Returns the number of queue entries handled.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(envelope) = self.link.host_queue().try_pop() {
            self.handle_host_envelope(envelope);
            handled += 1;
        }
        handled
    }

    /// Waits up to `timeout` for a host queue entry, then delivers it and
    /// everything queued behind it.
    pub fn wait_and_dispatch(&mut self, timeout: Duration) -> usize {
        if self.link.host_queue().is_nonblocking() {
            return self.dispatch_pending();
        }
        let Some(envelope) = self.link.host_queue().pop_timeout(timeout) else {
            return 0;
        };
        self.handle_host_envelope(envelope);
        1 + self.dispatch_pending()
    }

    /// Asks the present thread to terminate. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposing || self.terminated {
            return;
        }
        self.disposing = true;
        if !self.link.present_queue().push_terminate() {
            log::warn!("Present queue closed before dispose");
        }
    }

    /// Dispatches host messages until the present thread has terminated.
    ///
    /// Without a prior [`dispose`](Self::dispose) this only returns once
    /// something else disposes the thread.
    pub fn run_until_terminated(&mut self) {
        while !self.terminated {
            match self.next_host_envelope() {
                Some(envelope) => self.handle_host_envelope(envelope),
                None => self.finish_termination(),
            }
        }
        self.dispatch_pending();
    }

    /// Blocks for the next host queue entry. Returns `None` if the present
    /// thread exited without confirming termination.
    fn next_host_envelope(&self) -> Option<Envelope> {
        loop {
            if let Some(envelope) = self.link.host_queue().pop_timeout(EXIT_POLL_INTERVAL) {
                return Some(envelope);
            }
            let exited = self.thread.as_ref().is_none_or(JoinHandle::is_finished);
            if exited && self.link.host_queue().len() == 0 {
                log::error!("Present thread exited without confirming termination");
                return None;
            }
        }
    }

    /// Disposes the thread and delivers everything it sends until it exits.
    pub fn shutdown(mut self) {
        self.dispose();
        self.run_until_terminated();
    }

    fn handle_host_envelope(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Message(message) => self.handle_host_message(message),
            Envelope::Terminate => self.finish_termination(),
        }
    }

    fn handle_host_message(&self, mut message: Message) {
        message.milestones.mark(MessageMilestone::HostReceived);
        if let Some(profiler) = self.link.profiler() {
            profiler.record(&message);
        }
        match message.payload {
            Payload::RemoteCall(call) => call.complete(message.milestones),
            Payload::Signal(signal) => {
                signal
                    .slots
                    .do_emit_signal(signal.code, &signal.info, false);
            }
        }
    }

    fn finish_termination(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Present thread panicked");
        }
        self.link.host_queue().set_nonblocking(true);
        self.terminated = true;
        self.disposing = false;
        log::info!("Present thread terminated");

        if let Some(profiler) = self.link.profiler()
            && let Err(err) = profiler.write()
        {
            log::error!("Failed to write the transfer profile: {err}");
        }
        let dangling = self.link.dangling_callbacks();
        if dangling > 0 {
            log::warn!("{dangling} remote call callbacks were dropped without running");
        }
    }
}

impl Drop for PresentThread {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        self.dispose();
        while !self.terminated {
            match self.next_host_envelope() {
                Some(Envelope::Message(message)) => drop(message),
                Some(Envelope::Terminate) | None => self.finish_termination(),
            }
        }
    }
}

/// Event loop of the present thread.
fn run_present_loop(context: Rc<LocalContext>) {
    let link = Arc::clone(context.link());
    while let Some(envelope) = link.present_queue().pop_blocking() {
        match envelope {
            Envelope::Message(message) => handle_present_message(&link, message),
            Envelope::Terminate => break,
        }
        context.run_idle();
    }

    let collected = link.collector().collect();
    link.present_queue().close();
    context.run_idle();
    let mut dropped = 0_usize;
    while let Some(envelope) = link.present_queue().try_pop() {
        if let Envelope::Message(message) = envelope {
            drop(message);
            dropped += 1;
        }
    }
    context.run_idle();
    context.release_vulkan_context();
    log::debug!("Present thread exiting: {collected} GPU objects collected, {dropped} messages dropped");

    drop(context);
    drop(LocalContext::uninstall());
    if !link.host_queue().push_terminate() {
        log::error!("Host queue closed before termination was confirmed");
    }
}

fn handle_present_message(link: &ThreadLink, mut message: Message) {
    message.milestones.mark(MessageMilestone::ClientReceived);
    match &mut message.payload {
        Payload::RemoteCall(call) => {
            RemoteHandle::do_remote_call(call);
            message.milestones.mark(MessageMilestone::ClientProcessed);
            message.milestones.mark(MessageMilestone::ClientFeedback);
            if link.host_queue().push_response(message).is_err() {
                log::warn!("Host queue closed, dropping a remote call response");
            }
        }
        Payload::Signal(signal) => {
            log::warn!("Ignored signal {} sent to the present thread", signal.code);
        }
    }
}
