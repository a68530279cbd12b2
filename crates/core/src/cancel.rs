//! Cooperative cancellation signalling.
//!
//! A [`CancelHandle`]/[`CancelSignal`] pair wraps a `tokio::sync::watch`
//! channel. The handle side fires at most once; the signal side is
//! cheaply cloneable and can be polled or awaited. Dropping the handle
//! without cancelling means the signal never fires.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected cancellation pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx, hold: None })
}

/// Triggering side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Fire the signal. Safe to call more than once.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observing side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    // Keeps the sender alive for signals created via `never()`.
    hold: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    /// A signal that never fires, for callers without a cancel source.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            hold: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires. Pends forever if the handle was
    /// dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_fires_signal() {
        let (handle, mut signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_observed_by_clones() {
        let (handle, signal) = cancel_pair();
        let mut cloned = signal.clone();
        handle.cancel();
        cloned.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_handle_never_fires() {
        let (handle, mut signal) = cancel_pair();
        drop(handle);
        let waited =
            tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(waited.is_err());
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal_pends() {
        let mut signal = CancelSignal::never();
        let waited =
            tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
