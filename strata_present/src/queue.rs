// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inbound message queue of one thread.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::message::{Message, MessageMilestone};

/// An entry of a thread queue.
#[derive(Debug)]
pub(crate) enum Envelope {
    Message(Message),
    /// Asks the receiving loop to shut down.
    Terminate,
}

/// Unbounded FIFO feeding one thread's event loop.
///
/// Enqueueing wakes a receiver blocked in [`pop_blocking`](Self::pop_blocking)
/// or [`pop_timeout`](Self::pop_timeout). Once closed, pushes are refused and
/// handed back to the caller.
#[derive(Debug)]
pub(crate) struct MessageQueue {
    name: &'static str,
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
    closed: AtomicBool,
    nonblocking: AtomicBool,
    enqueued_count: AtomicU64,
}

impl MessageQueue {
    pub(crate) fn new(name: &'static str) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            name,
            sender,
            receiver,
            closed: AtomicBool::new(false),
            nonblocking: AtomicBool::new(false),
            enqueued_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Stamps [`MessageMilestone::HostEnqueued`] and enqueues `message`.
    pub(crate) fn push(&self, mut message: Message) -> Result<(), Message> {
        message.milestones.mark(MessageMilestone::HostEnqueued);
        match self.push_envelope(Envelope::Message(message)) {
            Ok(()) => Ok(()),
            Err(Envelope::Message(message)) => Err(message),
            Err(Envelope::Terminate) => Ok(()),
        }
    }

    /// Enqueues a message without stamping it.
    pub(crate) fn push_response(&self, message: Message) -> Result<(), Message> {
        match self.push_envelope(Envelope::Message(message)) {
            Ok(()) => Ok(()),
            Err(Envelope::Message(message)) => Err(message),
            Err(Envelope::Terminate) => Ok(()),
        }
    }

    pub(crate) fn push_terminate(&self) -> bool {
        self.push_envelope(Envelope::Terminate).is_ok()
    }

    fn push_envelope(&self, envelope: Envelope) -> Result<(), Envelope> {
        if self.closed.load(Ordering::Acquire) {
            return Err(envelope);
        }
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
        // The queue owns a receiver, so the channel never disconnects.
        self.sender.send(envelope).map_err(|err| err.into_inner())
    }

    pub(crate) fn try_pop(&self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }

    pub(crate) fn pop_blocking(&self) -> Option<Envelope> {
        self.receiver.recv().ok()
    }

    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Envelope> {
        match self.receiver.recv_timeout(timeout) {
            Ok(envelope) => Some(envelope),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Refuses further pushes. Entries already queued stay poppable.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// In nonblocking mode the owning loop returns once the queue is empty
    /// instead of waiting for more entries.
    pub(crate) fn set_nonblocking(&self, nonblocking: bool) {
        self.nonblocking.store(nonblocking, Ordering::Release);
    }

    pub(crate) fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn enqueued_count(&self) -> u64 {
        self.enqueued_count.load(Ordering::Relaxed)
    }
}
