//! Correlation of outbound requests with their responses.
//!
//! Every request the module sends registers a waiter keyed by its request id.
//! The read loop resolves or fails the waiter when the matching response
//! arrives; teardown fails whatever is left. Each waiter completes at most
//! once because completing it removes it from the table.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{ModuleError, Result};
use crate::protocol::ErrorCode;
use crate::value::Value;

#[derive(Debug)]
struct Waiter {
    tx: oneshot::Sender<Result<Value>>,
    /// Function named by a call request, reported back on `unknownFunction`.
    function: Option<String>,
}

impl Waiter {
    fn complete(self, outcome: Result<Value>) {
        // The caller may have dropped its handle; that is not an error.
        let _ = self.tx.send(outcome);
    }
}

#[derive(Debug, Default)]
struct Table {
    waiters: HashMap<String, Waiter>,
    /// Set by `fail_all`; later registrations are refused.
    closed: bool,
}

/// Table of requests awaiting a response.
#[derive(Debug, Default)]
pub struct PendingRequests {
    table: Mutex<Table>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a waiter for `request_id`.
    ///
    /// # Errors
    ///
    /// `DuplicateRequestId` if a waiter for this id is still pending, or
    /// `ConnectionClosed` once the table has been failed.
    pub fn register(&self, request_id: &str) -> Result<ResponseHandle> {
        self.insert(request_id, None)
    }

    /// [`register`](Self::register) for a call to `function`.
    ///
    /// If the host answers `unknownFunction`, the waiter fails with
    /// `UnknownFunction(function)`.
    pub fn register_call(&self, request_id: &str, function: &str) -> Result<ResponseHandle> {
        self.insert(request_id, Some(function.to_string()))
    }

    fn insert(&self, request_id: &str, function: Option<String>) -> Result<ResponseHandle> {
        let mut table = self.table.lock().expect("pending table mutex poisoned");
        if table.closed {
            return Err(ModuleError::ConnectionClosed);
        }
        if table.waiters.contains_key(request_id) {
            return Err(ModuleError::DuplicateRequestId(request_id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        table
            .waiters
            .insert(request_id.to_string(), Waiter { tx, function });
        Ok(ResponseHandle {
            request_id: request_id.to_string(),
            rx,
        })
    }

    /// Complete the waiter for `request_id` with `value`.
    ///
    /// Returns false if nothing was waiting for this id, which is normal for
    /// responses addressed to other modules.
    pub fn resolve(&self, request_id: &str, value: Value) -> bool {
        match self.take(request_id) {
            Some(waiter) => {
                waiter.complete(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Fail the waiter for `request_id` with the translated error code.
    pub fn fail(&self, request_id: &str, code: ErrorCode) -> bool {
        let Some(waiter) = self.take(request_id) else {
            return false;
        };
        let error = match (code, &waiter.function) {
            (ErrorCode::UnknownFunction, Some(function)) => ModuleError::UnknownFunction(function.clone()),
            (code, _) => ModuleError::from_code(code),
        };
        waiter.complete(Err(error));
        true
    }

    /// Fail every pending waiter with `reason` and refuse new ones.
    ///
    /// Returns the number of waiters failed.
    pub fn fail_all(&self, reason: &ModuleError) -> usize {
        let drained: Vec<Waiter> = {
            let mut table = self.table.lock().expect("pending table mutex poisoned");
            table.closed = true;
            table.waiters.drain().map(|(_, waiter)| waiter).collect()
        };
        let count = drained.len();
        for waiter in drained {
            waiter.complete(Err(reason.clone()));
        }
        count
    }

    /// Drop the waiter for `request_id` without completing it.
    ///
    /// Used when the request could not be sent.
    pub fn remove(&self, request_id: &str) -> bool {
        self.table
            .lock()
            .expect("pending table mutex poisoned")
            .waiters
            .remove(request_id)
            .is_some()
    }

    /// Number of pending waiters.
    pub fn len(&self) -> usize {
        self.table.lock().expect("pending table mutex poisoned").waiters.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, request_id: &str) -> Option<Waiter> {
        let waiter = self
            .table
            .lock()
            .expect("pending table mutex poisoned")
            .waiters
            .remove(request_id);
        if waiter.is_none() {
            log::trace!("[Juno] No pending request for {request_id}");
        }
        waiter
    }
}

/// Resolves to the response of one outbound request.
///
/// Dropping the handle abandons the result; the request itself is not
/// cancelled. Wrap in `tokio::time::timeout` to bound the wait.
#[derive(Debug)]
#[must_use = "a response handle does nothing unless awaited"]
pub struct ResponseHandle {
    request_id: String,
    rx: oneshot::Receiver<Result<Value>>,
}

impl ResponseHandle {
    /// Request id this handle is waiting on.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Future for ResponseHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ModuleError::ConnectionClosed)))
    }
}
