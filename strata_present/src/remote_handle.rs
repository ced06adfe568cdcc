// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Objects living on the present thread and driven from the host.
//!
//! A remote object embeds a [`RemoteHandle`] and describes its operations in
//! a static [`DispatchTable`]. The host calls [`RemoteHandle::invoke`],
//! which queues a call to the present thread; the matching trampoline runs
//! there and its result travels back to the host callback.
//!
//! Signals flow the other way. [`RemoteHandle::emit`] runs on the present
//! thread and delivers to two kinds of slots:
//!
//! - host slots, through a signal message on the host queue;
//! - thread-local slots, on the present thread from the next idle pass, so
//!   an emission inside a trampoline never re-enters slot code.
//!
//! Delivery snapshots the matching callbacks under the registry lock and
//! invokes them after releasing it, so slots may connect or disconnect
//! freely from inside a callback.

use core::any::{Any, type_name};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PresentError, contract_violation};
use crate::link::ThreadLink;
use crate::local_context::LocalContext;
use crate::message::{Endpoint, Message, Payload, SignalInfo, SignalMessage};
use crate::remote_call::{
    OpCode, RemoteArgs, RemoteCall, RemoteCallStatus, RemoteCallback, RemoteError, RemoteResult,
    RemoteReturn,
};

/// Signal selector within a remote object.
pub type SignalCode = u32;

/// Identifies a connected slot.
pub type SlotId = u64;

/// An object whose operations run on the present thread.
pub trait RemoteObject: Any + Send + Sync {
    /// The embedded handle.
    fn remote_handle(&self) -> &RemoteHandle;
}

type Trampoline = Box<dyn Fn(&dyn RemoteObject, &mut RemoteArgs) -> RemoteResult + Send + Sync>;

struct Operation {
    argc: usize,
    trampoline: Trampoline,
}

/// Operations of one remote object type, indexed by opcode.
pub struct DispatchTable {
    type_name: &'static str,
    operations: Vec<Option<Operation>>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcodes: Vec<usize> = (0..self.operations.len())
            .filter(|&i| self.operations[i].is_some())
            .collect();
        f.debug_struct("DispatchTable")
            .field("type_name", &self.type_name)
            .field("opcodes", &opcodes)
            .finish()
    }
}

impl DispatchTable {
    /// Creates an empty table for objects of type `T`.
    #[must_use]
    pub fn new<T: RemoteObject>() -> Self {
        Self {
            type_name: short_type_name::<T>(),
            operations: Vec::new(),
        }
    }

    /// Registers the operation for `opcode`, taking `argc` arguments.
    ///
    /// The slot pool grows to the next power of two that fits `opcode`.
    #[must_use]
    pub fn with<T: RemoteObject>(
        mut self,
        opcode: OpCode,
        argc: usize,
        operation: impl Fn(&T, &mut RemoteArgs) -> RemoteResult + Send + Sync + 'static,
    ) -> Self {
        let index = opcode as usize;
        if index >= self.operations.len() {
            let len = (index + 1).next_power_of_two();
            self.operations.resize_with(len, || None);
        }
        let trampoline: Trampoline = Box::new(move |receiver, args| {
            let receiver: &dyn Any = receiver;
            match receiver.downcast_ref::<T>() {
                Some(receiver) => operation(receiver, args),
                None => contract_violation(format_args!(
                    "dispatch table of {} used with another receiver type",
                    type_name::<T>()
                )),
            }
        });
        self.operations[index] = Some(Operation { argc, trampoline });
        self
    }

    /// Name of the object type the table belongs to.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Size of the slot pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.operations.len()
    }

    /// Runs the operation for `call.opcode` and records the outcome.
    fn dispatch(&self, receiver: &dyn RemoteObject, call: &mut RemoteCall) {
        let Some(Some(operation)) = self.operations.get(call.opcode as usize) else {
            log::warn!(
                "Invalid opcode {} for {}",
                call.opcode,
                self.type_name
            );
            call.status = RemoteCallStatus::OpCodeInvalid;
            return;
        };
        if call.args.len() != operation.argc {
            log::warn!(
                "{} opcode {} expects {} arguments, got {}",
                self.type_name,
                call.opcode,
                operation.argc,
                call.args.len()
            );
            call.status = RemoteCallStatus::ArgsInvalid;
            return;
        }
        let args = &mut call.args;
        match catch_unwind(AssertUnwindSafe(|| (operation.trampoline)(receiver, args))) {
            Ok(Ok(value)) => {
                call.status = RemoteCallStatus::OpSuccess;
                call.value = Some(value);
            }
            Ok(Err(message)) => {
                call.status = RemoteCallStatus::OpFailed;
                call.message = Some(message);
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                log::error!(
                    "{} opcode {} panicked: {message}",
                    self.type_name,
                    call.opcode
                );
                call.status = RemoteCallStatus::Caught;
                call.message = Some(message);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

fn short_type_name<T>() -> &'static str {
    let name = type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

type SlotCallback = Arc<dyn Fn(&SignalInfo) + Send + Sync>;

struct Slot {
    id: SlotId,
    code: SignalCode,
    thread_local: bool,
    callback: SlotCallback,
}

/// Connected slots of one remote object.
pub(crate) struct SlotRegistry {
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
    /// Emissions waiting for the next idle pass on the present thread.
    local_pending: Mutex<Vec<(SignalCode, Arc<SignalInfo>)>>,
}

impl fmt::Debug for SlotRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("slots", &self.slots.lock().len())
            .field("local_pending", &self.local_pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl SlotRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            local_pending: Mutex::new(Vec::new()),
        }
    }

    fn connect(&self, code: SignalCode, thread_local: bool, callback: SlotCallback) -> SlotId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().push(Slot {
            id,
            code,
            thread_local,
            callback,
        });
        id
    }

    fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        slots.len() != before
    }

    fn has_local_slots(&self) -> bool {
        self.slots.lock().iter().any(|slot| slot.thread_local)
    }

    fn snapshot(&self, code: SignalCode, thread_local: bool) -> Vec<SlotCallback> {
        self.slots
            .lock()
            .iter()
            .filter(|slot| slot.code == code && slot.thread_local == thread_local)
            .map(|slot| Arc::clone(&slot.callback))
            .collect()
    }

    /// Invokes the slots of one locality connected to `code`.
    pub(crate) fn do_emit_signal(&self, code: SignalCode, info: &SignalInfo, thread_local: bool) {
        for callback in self.snapshot(code, thread_local) {
            callback(info);
        }
    }

    fn drain_local(&self) {
        let pending = core::mem::take(&mut *self.local_pending.lock());
        for (code, info) in pending {
            self.do_emit_signal(code, &info, true);
        }
    }
}

/// Per-object state shared with the message bus.
pub struct RemoteHandle {
    link: Arc<ThreadLink>,
    table: &'static DispatchTable,
    slots: Arc<SlotRegistry>,
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("type_name", &self.table.type_name)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

impl RemoteHandle {
    /// Creates a handle bound to the threads of `link`.
    #[must_use]
    pub fn new(link: &Arc<ThreadLink>, table: &'static DispatchTable) -> Self {
        Self {
            link: Arc::clone(link),
            table,
            slots: Arc::new(SlotRegistry::new()),
        }
    }

    /// Name of the owning object's type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.table.type_name
    }

    /// The threads this handle talks to.
    #[must_use]
    pub fn link(&self) -> &Arc<ThreadLink> {
        &self.link
    }

    /// Queues `opcode` with `args` for `this` on the present thread.
    ///
    /// `callback` runs on the host thread once the result comes back. Fails
    /// if the present thread no longer accepts messages; the callback is then
    /// dropped without running.
    pub fn invoke<T: RemoteObject>(
        this: &Arc<T>,
        opcode: OpCode,
        args: RemoteArgs,
        callback: Option<RemoteCallback>,
    ) -> Result<(), PresentError> {
        let handle = this.remote_handle();
        let endpoint = Endpoint {
            type_name: handle.type_name(),
            address: Arc::as_ptr(this).addr(),
        };
        let receiver: Arc<dyn RemoteObject> = this.clone();
        let call = RemoteCall::new(
            opcode,
            receiver,
            args,
            callback,
            Arc::clone(handle.link.dangling_counter()),
        );
        let message = Message::new(Payload::RemoteCall(Box::new(call)), endpoint);
        handle.link.present_queue().push(message).map_err(|message| {
            log::warn!(
                "Dropped {} opcode {opcode}: the present thread is not running",
                endpoint.type_name
            );
            drop(message);
            PresentError::QueueClosed
        })
    }

    /// Like [`invoke`](Self::invoke), handing `on_done` the typed result.
    pub fn call<T: RemoteObject, R: Any>(
        this: &Arc<T>,
        opcode: OpCode,
        args: RemoteArgs,
        on_done: impl FnOnce(Result<R, RemoteError>) + Send + 'static,
    ) -> Result<(), PresentError> {
        let callback: RemoteCallback =
            Box::new(move |ret: RemoteReturn| on_done(ret.into_result::<R>()));
        Self::invoke(this, opcode, args, Some(callback))
    }

    /// Runs a queued call on the present thread.
    pub(crate) fn do_remote_call(call: &mut RemoteCall) {
        let Some(receiver) = call.receiver.take() else {
            contract_violation(format_args!("remote call without a receiver"));
        };
        receiver.remote_handle().table.dispatch(&*receiver, call);
    }

    /// Connects `callback` to `code`.
    ///
    /// Thread-local slots run on the present thread; the others on the host
    /// thread.
    pub fn connect(
        &self,
        code: SignalCode,
        thread_local: bool,
        callback: impl Fn(&SignalInfo) + Send + Sync + 'static,
    ) -> SlotId {
        self.slots.connect(code, thread_local, Arc::new(callback))
    }

    /// Removes a slot. Returns `false` if no slot has that id.
    pub fn disconnect(&self, id: SlotId) -> bool {
        self.slots.disconnect(id)
    }

    /// Emits `code` with `info`. Must be called on the present thread.
    pub fn emit(&self, code: SignalCode, info: SignalInfo) {
        let Some(context) = LocalContext::current() else {
            contract_violation(format_args!(
                "{} emitted signal {code} outside the present thread",
                self.type_name()
            ));
        };
        let info = Arc::new(info);
        let endpoint = Endpoint {
            type_name: self.type_name(),
            address: Arc::as_ptr(&self.slots).addr(),
        };
        let message = Message::new(
            Payload::Signal(SignalMessage {
                code,
                info: Arc::clone(&info),
                slots: Arc::clone(&self.slots),
            }),
            endpoint,
        );
        if self.link.host_queue().push(message).is_err() {
            log::debug!("Host queue closed, signal {code} not delivered to host slots");
        }

        if self.slots.has_local_slots() {
            let schedule = {
                let mut pending = self.slots.local_pending.lock();
                pending.push((code, info));
                pending.len() == 1
            };
            if schedule {
                let slots = Arc::clone(&self.slots);
                context.post_idle(move || slots.drain_local());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Probe {
        handle: RemoteHandle,
    }

    impl RemoteObject for Probe {
        fn remote_handle(&self) -> &RemoteHandle {
            &self.handle
        }
    }

    #[test]
    fn dispatch_pool_grows_to_power_of_two() {
        let table = DispatchTable::new::<Probe>()
            .with(1, 0, |_: &Probe, _| crate::remote_ok(()))
            .with(5, 1, |_: &Probe, _| crate::remote_ok(()));
        assert_eq!(table.capacity(), 8, "opcode 5 needs 6 slots");
        assert_eq!(table.type_name(), "Probe");
    }

    #[test]
    fn snapshot_filters_code_and_locality() {
        let registry = SlotRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = |by: u64| {
            let hits = Arc::clone(&hits);
            Arc::new(move |_: &SignalInfo| {
                hits.fetch_add(by, Ordering::Relaxed);
            }) as SlotCallback
        };
        registry.connect(1, false, counter(1));
        registry.connect(1, true, counter(10));
        registry.connect(2, false, counter(100));

        registry.do_emit_signal(1, &SignalInfo::new(), false);
        assert_eq!(hits.load(Ordering::Relaxed), 1, "only the host slot of code 1");
        registry.do_emit_signal(1, &SignalInfo::new(), true);
        assert_eq!(hits.load(Ordering::Relaxed), 11);
        assert!(registry.has_local_slots());
    }

    #[test]
    fn disconnect_removes_exactly_one_slot() {
        let registry = SlotRegistry::new();
        let a = registry.connect(1, false, Arc::new(|_: &SignalInfo| {}));
        let b = registry.connect(1, false, Arc::new(|_: &SignalInfo| {}));
        assert_ne!(a, b);
        assert!(registry.disconnect(a));
        assert!(!registry.disconnect(a), "already removed");
        assert_eq!(registry.snapshot(1, false).len(), 1);
    }

    #[test]
    fn slot_may_disconnect_itself_during_delivery() {
        let registry = Arc::new(SlotRegistry::new());
        let hits = Arc::new(AtomicU64::new(0));
        let id = Arc::new(AtomicU64::new(0));
        let slot = {
            let registry = Arc::downgrade(&registry);
            let hits = Arc::clone(&hits);
            let id = Arc::clone(&id);
            Arc::new(move |_: &SignalInfo| {
                hits.fetch_add(1, Ordering::Relaxed);
                if let Some(registry) = registry.upgrade() {
                    registry.disconnect(id.load(Ordering::Relaxed));
                }
            })
        };
        id.store(registry.connect(3, false, slot), Ordering::Relaxed);

        registry.do_emit_signal(3, &SignalInfo::new(), false);
        registry.do_emit_signal(3, &SignalInfo::new(), false);
        assert_eq!(hits.load(Ordering::Relaxed), 1, "second emission finds no slot");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*payload), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "unknown panic payload");
    }
}
