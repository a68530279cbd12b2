//! Request/response correlation.
//!
//! Parks a oneshot slot per correlation id so transports that separate
//! the request path from the response path (the HTTP rpc handler, the
//! server's own outbound requests) can await the matching reply.
//! Exactly one of complete, fail, cancel, or timeout resolves a pending
//! entry; later attempts are a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use werkbank_core::{CancelSignal, ExecutionError};

use crate::error::CorrelationError;

type Slot<T> = oneshot::Sender<Result<T, ExecutionError>>;
type PendingMap<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

/// Maps in-flight correlation ids to their pending reply slots.
pub struct Correlator<T> {
    pending: PendingMap<T>,
}

impl<T> Correlator<T> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Park a request under `id` until a reply, a timeout, or a
    /// cancellation resolves it.
    ///
    /// Fails fast with [`CorrelationError::DuplicateId`] when the id is
    /// already in flight; the existing entry is never overwritten.
    pub fn register(
        &self,
        id: impl Into<String>,
        timeout: Duration,
        cancel: CancelSignal,
    ) -> Result<PendingRequest<T>, CorrelationError> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.contains_key(&id) {
                return Err(CorrelationError::DuplicateId(id));
            }
            pending.insert(id.clone(), tx);
        }
        Ok(PendingRequest {
            id,
            rx,
            deadline: Instant::now() + timeout,
            timeout,
            cancel,
            pending: Arc::clone(&self.pending),
            resolved: false,
        })
    }

    /// Resolve a pending request with a value. Returns false when the
    /// id is unknown or already resolved.
    pub fn try_complete(&self, id: &str, value: T) -> bool {
        match self.take(id) {
            Some(slot) => slot.send(Ok(value)).is_ok(),
            None => false,
        }
    }

    /// Resolve a pending request with an error. Returns false when the
    /// id is unknown or already resolved.
    pub fn try_fail(&self, id: &str, error: ExecutionError) -> bool {
        match self.take(id) {
            Some(slot) => slot.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Resolve a pending request with a cancellation error.
    pub fn cancel(&self, id: &str) -> bool {
        self.try_fail(
            id,
            ExecutionError::cancelled(format!("request '{id}' was cancelled")),
        )
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Resolve every outstanding request with a cancellation error.
    /// Called from transport shutdown so no waiter hangs forever.
    /// Returns how many entries were failed.
    pub fn drain(&self) -> usize {
        let slots: Vec<(String, Slot<T>)> = self.pending.lock().unwrap().drain().collect();
        let count = slots.len();
        for (id, slot) in slots {
            let _ = slot.send(Err(ExecutionError::cancelled(format!(
                "request '{id}' abandoned at shutdown"
            ))));
        }
        count
    }

    fn take(&self, id: &str) -> Option<Slot<T>> {
        self.pending.lock().unwrap().remove(id)
    }
}

impl<T> Clone for Correlator<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for Correlator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A parked request waiting for its correlated reply.
///
/// Dropping it without waiting removes the entry, so abandoned waits
/// never leak map slots.
#[derive(Debug)]
pub struct PendingRequest<T> {
    id: String,
    rx: oneshot::Receiver<Result<T, ExecutionError>>,
    deadline: Instant,
    timeout: Duration,
    cancel: CancelSignal,
    pending: PendingMap<T>,
    resolved: bool,
}

impl<T> PendingRequest<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply: the value or failure pushed by the resolver,
    /// a timeout at the deadline, or a cancellation. Whichever fires
    /// first wins and the entry is gone afterwards.
    pub async fn wait(mut self) -> Result<T, ExecutionError> {
        let result = tokio::select! {
            received = &mut self.rx => match received {
                Ok(outcome) => outcome,
                // Slot dropped without a send (correlator gone).
                Err(_) => Err(ExecutionError::cancelled(format!(
                    "request '{}' abandoned", self.id
                ))),
            },
            _ = tokio::time::sleep_until(self.deadline) => {
                // The reply may have raced the deadline: poll the slot
                // once more before declaring a timeout.
                self.remove_entry();
                match self.rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ExecutionError::timeout(format!(
                        "request '{}' timed out after {:?}", self.id, self.timeout
                    ))),
                }
            }
            _ = self.cancel.cancelled() => {
                self.remove_entry();
                Err(ExecutionError::cancelled(format!(
                    "request '{}' was cancelled", self.id
                )))
            }
        };
        self.resolved = true;
        result
    }

    fn remove_entry(&self) {
        self.pending.lock().unwrap().remove(&self.id);
    }
}

impl<T> Drop for PendingRequest<T> {
    fn drop(&mut self) {
        // Resolvers remove the entry before sending, so only an
        // unresolved wait still owns one. The guard keeps a late drop
        // from evicting a re-registered id.
        if !self.resolved {
            self.remove_entry();
        }
    }
}
