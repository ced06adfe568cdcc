// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single host-to-present invocation and its result.

use core::any::{Any, type_name};
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::contract_violation;
use crate::message::Milestones;
use crate::remote_handle::RemoteObject;

/// Operation selector within a remote object's dispatch table.
pub type OpCode = u32;

/// A boxed return value.
pub type RemoteValue = Box<dyn Any + Send>;

/// What a trampoline produces: a value, or a failure message reported as
/// [`RemoteCallStatus::OpFailed`].
pub type RemoteResult = Result<RemoteValue, String>;

/// Host-side completion of a remote call.
pub type RemoteCallback = Box<dyn FnOnce(RemoteReturn) + Send>;

/// Outcome of a remote call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteCallStatus {
    /// Not processed yet.
    Pending,
    /// No operation is registered for the opcode.
    OpCodeInvalid,
    /// The argument count does not match the operation.
    ArgsInvalid,
    /// The operation panicked.
    Caught,
    /// The operation returned a value.
    OpSuccess,
    /// The operation reported a failure.
    OpFailed,
}

/// Wraps a value as a [`RemoteResult`].
pub fn remote_ok<T: Any + Send>(value: T) -> RemoteResult {
    Ok(Box::new(value))
}

/// Arguments of a remote call, consumed by the trampoline.
#[derive(Default)]
pub struct RemoteArgs {
    values: Vec<Option<Box<dyn Any + Send>>>,
}

impl fmt::Debug for RemoteArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteArgs")
            .field("len", &self.values.len())
            .finish()
    }
}

impl RemoteArgs {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with<T: Any + Send>(mut self, value: T) -> Self {
        self.values.push(Some(Box::new(value)));
        self
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Moves argument `index` out.
    ///
    /// Taking an argument twice or with the wrong type is a contract
    /// violation and aborts the process.
    pub fn take<T: Any>(&mut self, index: usize) -> T {
        let Some(value) = self.values.get_mut(index).and_then(Option::take) else {
            contract_violation(format_args!("remote call argument {index} is missing"));
        };
        match value.downcast::<T>() {
            Ok(value) => *value,
            Err(_) => contract_violation(format_args!(
                "remote call argument {index} is not a {}",
                type_name::<T>()
            )),
        }
    }
}

/// Failure of a remote call as seen by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteError {
    /// Final status, never [`RemoteCallStatus::OpSuccess`].
    pub status: RemoteCallStatus,
    /// Panic or failure message, when there is one.
    pub message: Option<String>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote call failed ({:?})", self.status)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl core::error::Error for RemoteError {}

/// The result of a remote call delivered to the host callback.
pub struct RemoteReturn {
    status: RemoteCallStatus,
    value: Option<RemoteValue>,
    message: Option<String>,
    milestones: Milestones,
}

impl fmt::Debug for RemoteReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteReturn")
            .field("status", &self.status)
            .field("has_value", &self.value.is_some())
            .field("message", &self.message)
            .field("milestones", &self.milestones)
            .finish()
    }
}

impl RemoteReturn {
    /// Final status.
    #[must_use]
    pub fn status(&self) -> RemoteCallStatus {
        self.status
    }

    /// Panic or failure message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Round-trip timestamps of the call.
    #[must_use]
    pub fn milestones(&self) -> &Milestones {
        &self.milestones
    }

    /// Takes the return value.
    ///
    /// A successful call whose value is not a `T` is a contract violation
    /// and aborts the process.
    pub fn into_result<T: Any>(self) -> Result<T, RemoteError> {
        if self.status != RemoteCallStatus::OpSuccess {
            return Err(RemoteError {
                status: self.status,
                message: self.message,
            });
        }
        match self.value.map(|value| value.downcast::<T>()) {
            Some(Ok(value)) => Ok(*value),
            _ => contract_violation(format_args!(
                "remote call returned something other than a {}",
                type_name::<T>()
            )),
        }
    }
}

/// A pending invocation of an operation on a remote object.
pub(crate) struct RemoteCall {
    pub(crate) opcode: OpCode,
    /// Released on the present thread once the call is processed.
    pub(crate) receiver: Option<Arc<dyn RemoteObject>>,
    pub(crate) args: RemoteArgs,
    pub(crate) status: RemoteCallStatus,
    pub(crate) value: Option<RemoteValue>,
    pub(crate) message: Option<String>,
    pub(crate) callback: Option<RemoteCallback>,
    dangling: Arc<AtomicUsize>,
}

impl RemoteCall {
    pub(crate) fn new(
        opcode: OpCode,
        receiver: Arc<dyn RemoteObject>,
        args: RemoteArgs,
        callback: Option<RemoteCallback>,
        dangling: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            opcode,
            receiver: Some(receiver),
            args,
            status: RemoteCallStatus::Pending,
            value: None,
            message: None,
            callback,
            dangling,
        }
    }

    /// Fires the host callback, if any.
    pub(crate) fn complete(mut self, milestones: Milestones) {
        if let Some(callback) = self.callback.take() {
            callback(RemoteReturn {
                status: self.status,
                value: self.value.take(),
                message: self.message.take(),
                milestones,
            });
        }
    }
}

impl Drop for RemoteCall {
    fn drop(&mut self) {
        if self.callback.is_some() {
            self.dangling.fetch_add(1, Ordering::Relaxed);
        }
    }
}
