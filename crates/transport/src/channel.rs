//! In-process transport backed by channel pairs.
//!
//! Wires a server loop to a test harness (or an embedding process)
//! without touching a socket.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use werkbank_core::TransportMessage;

use crate::error::TransportError;
use crate::Transport;

/// In-memory transport backed by mpsc channels.
pub struct ChannelTransport {
    rx: Mutex<mpsc::Receiver<TransportMessage>>,
    tx: mpsc::Sender<TransportMessage>,
    closed: AtomicBool,
    disconnect_tx: watch::Sender<bool>,
    disconnect_rx: watch::Receiver<bool>,
}

impl ChannelTransport {
    /// Create a pair of connected transports.
    ///
    /// Messages written on one half are read by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::channel(32);
        let (tx_b, rx_a) = mpsc::channel(32);
        (Self::half(tx_a, rx_a), Self::half(tx_b, rx_b))
    }

    fn half(tx: mpsc::Sender<TransportMessage>, rx: mpsc::Receiver<TransportMessage>) -> Self {
        let (disconnect_tx, disconnect_rx) = watch::channel(false);
        Self {
            rx: Mutex::new(rx),
            tx,
            closed: AtomicBool::new(false),
            disconnect_tx,
            disconnect_rx,
        }
    }

    fn mark_disconnected(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.disconnect_tx.send(true);
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.mark_disconnected();
        Ok(())
    }

    async fn read_message(&self) -> Result<Option<TransportMessage>, TransportError> {
        let mut disconnect = self.disconnect_rx.clone();
        if *disconnect.borrow() {
            return Ok(None);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            message = rx.recv() => {
                if message.is_none() {
                    // Far half dropped its sender
                    self.mark_disconnected();
                }
                Ok(message)
            }
            _ = disconnect.changed() => Ok(None),
        }
    }

    async fn write_message(&self, message: TransportMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnect_rx.clone()
    }
}
