//! Stdio transport binding.
//!
//! Newline-delimited JSON frames over stdin/stdout, for running the
//! server as a child process of its client. Each message is a single
//! JSON object terminated by a newline character.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{watch, Mutex};

use werkbank_core::TransportMessage;

use crate::error::TransportError;
use crate::Transport;

/// Stdio-based transport using newline-delimited JSON.
///
/// Reads from stdin, writes to stdout. EOF on stdin means the client
/// hung up: the disconnect watch flips once and `read_message` settles
/// on `Ok(None)`.
pub struct StdioTransport {
    reader: Mutex<BufReader<tokio::io::Stdin>>,
    writer: Mutex<tokio::io::Stdout>,
    closed: AtomicBool,
    disconnect_tx: watch::Sender<bool>,
    disconnect_rx: watch::Receiver<bool>,
}

impl StdioTransport {
    /// Create a new stdio transport.
    pub fn new() -> Self {
        let (disconnect_tx, disconnect_rx) = watch::channel(false);
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
            writer: Mutex::new(tokio::io::stdout()),
            closed: AtomicBool::new(false),
            disconnect_tx,
            disconnect_rx,
        }
    }

    /// Flip the disconnect watch exactly once.
    fn mark_disconnected(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.disconnect_tx.send(true);
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<(), TransportError> {
        // stdin/stdout are already open, nothing to bind
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
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            let bytes_read = tokio::select! {
                read = reader.read_line(&mut line) => read?,
                _ = disconnect.changed() => return Ok(None),
            };
            if bytes_read == 0 {
                // EOF
                self.mark_disconnected();
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Skip empty lines, try again
                continue;
            }
            return Ok(Some(TransportMessage::new(trimmed)));
        }
    }

    async fn write_message(&self, message: TransportMessage) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(message.payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnect_rx.clone()
    }
}
