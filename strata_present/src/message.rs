// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Messages exchanged between the host and present threads.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use strata_core::time::{HostTime, now};

use crate::error::contract_violation;
use crate::remote_call::RemoteCall;
use crate::remote_handle::{SignalCode, SlotRegistry};

/// A point on a message's round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageMilestone {
    /// The sender built the message.
    HostConstruction,
    /// The sender pushed the message onto the receiving queue.
    HostEnqueued,
    /// The present thread took the message off its queue.
    ClientReceived,
    /// The present thread finished processing the message.
    ClientProcessed,
    /// The present thread pushed the response onto the host queue.
    ClientFeedback,
    /// The host thread took the message or response off its queue.
    HostReceived,
}

impl MessageMilestone {
    /// Number of milestones.
    pub const COUNT: usize = 6;

    /// All milestones in round-trip order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::HostConstruction,
        Self::HostEnqueued,
        Self::ClientReceived,
        Self::ClientProcessed,
        Self::ClientFeedback,
        Self::HostReceived,
    ];

    /// Stable name used in transfer profiles.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostConstruction => "host-construction",
            Self::HostEnqueued => "host-enqueued",
            Self::ClientReceived => "client-received",
            Self::ClientProcessed => "client-processed",
            Self::ClientFeedback => "client-feedback",
            Self::HostReceived => "host-received",
        }
    }
}

/// Timestamps of the milestones a message has passed.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Milestones([HostTime; MessageMilestone::COUNT]);

impl fmt::Debug for Milestones {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                MessageMilestone::ALL
                    .iter()
                    .filter_map(|m| self.get(*m).map(|t| (m.as_str(), t.ticks()))),
            )
            .finish()
    }
}

impl Milestones {
    /// Stamps `milestone` with the current time.
    pub fn mark(&mut self, milestone: MessageMilestone) {
        self.0[milestone as usize] = now();
    }

    /// Timestamp of `milestone`, if it was reached.
    #[must_use]
    pub fn get(&self, milestone: MessageMilestone) -> Option<HostTime> {
        let time = self.0[milestone as usize];
        (!time.is_zero()).then_some(time)
    }

    /// Returns `true` if the reached milestones are non-decreasing in
    /// round-trip order.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        let reached: Vec<HostTime> = MessageMilestone::ALL
            .iter()
            .filter_map(|m| self.get(*m))
            .collect();
        reached.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

/// Arguments of an emitted signal, shared by every slot it reaches.
#[derive(Default)]
pub struct SignalInfo {
    args: Vec<Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for SignalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalInfo")
            .field("args", &self.args.len())
            .finish()
    }
}

impl SignalInfo {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.args.push(Box::new(value));
        self
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `index`, if present and of type `T`.
    #[must_use]
    pub fn try_get<T: Any>(&self, index: usize) -> Option<&T> {
        self.args.get(index)?.downcast_ref()
    }

    /// Argument `index`.
    ///
    /// A missing argument or a type mismatch is a contract violation between
    /// the emitter and the slot and aborts the process.
    #[must_use]
    pub fn get<T: Any>(&self, index: usize) -> &T {
        match self.try_get(index) {
            Some(value) => value,
            None => contract_violation(format_args!(
                "signal argument {index} is not a {}",
                core::any::type_name::<T>()
            )),
        }
    }
}

/// Where a message comes from or goes to, for profiling.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Endpoint {
    pub(crate) type_name: &'static str,
    pub(crate) address: usize,
}

pub(crate) struct SignalMessage {
    pub(crate) code: SignalCode,
    pub(crate) info: Arc<SignalInfo>,
    pub(crate) slots: Arc<SlotRegistry>,
}

pub(crate) enum Payload {
    RemoteCall(Box<RemoteCall>),
    Signal(SignalMessage),
}

/// A unit of work on a thread queue.
pub(crate) struct Message {
    pub(crate) payload: Payload,
    pub(crate) endpoint: Endpoint,
    pub(crate) milestones: Milestones,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.payload {
            Payload::RemoteCall(_) => "remote-call",
            Payload::Signal(_) => "signal",
        };
        f.debug_struct("Message")
            .field("kind", &kind)
            .field("endpoint", &self.endpoint)
            .field("milestones", &self.milestones)
            .finish()
    }
}

impl Message {
    pub(crate) fn new(payload: Payload, endpoint: Endpoint) -> Self {
        let mut milestones = Milestones::default();
        milestones.mark(MessageMilestone::HostConstruction);
        Self {
            payload,
            endpoint,
            milestones,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreached_milestones_are_none() {
        let mut milestones = Milestones::default();
        milestones.mark(MessageMilestone::HostConstruction);
        assert!(milestones.get(MessageMilestone::HostConstruction).is_some());
        assert!(milestones.get(MessageMilestone::ClientReceived).is_none());
    }

    #[test]
    fn marking_in_order_is_monotonic() {
        let mut milestones = Milestones::default();
        for milestone in MessageMilestone::ALL {
            milestones.mark(milestone);
        }
        assert!(milestones.is_monotonic(), "{milestones:?}");
    }

    #[test]
    fn out_of_order_marks_are_detected() {
        let mut milestones = Milestones::default();
        milestones.0[MessageMilestone::HostEnqueued as usize] = HostTime(10);
        milestones.0[MessageMilestone::HostReceived as usize] = HostTime(5);
        assert!(!milestones.is_monotonic(), "received before enqueued");
    }

    #[test]
    fn signal_args_downcast_by_index() {
        let info = SignalInfo::new().with(7_u64).with("seven");
        assert_eq!(info.len(), 2);
        assert_eq!(*info.get::<u64>(0), 7);
        assert_eq!(info.try_get::<u64>(1), None, "wrong type");
        assert_eq!(info.try_get::<&str>(1), Some(&"seven"));
        assert_eq!(info.try_get::<u64>(2), None, "out of range");
    }
}
