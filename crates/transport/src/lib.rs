//! Wire bindings connecting the tool server to its clients.
//!
//! One `Transport` trait, three bindings: newline-delimited JSON over
//! stdio, HTTP request/response with correlated replies, and a
//! persistent WebSocket duplex multiplexed by connection id. A channel
//! pair backs in-process wiring and tests.

pub mod channel;
pub mod connections;
pub mod correlator;
pub mod error;
pub mod http;
pub mod stdio;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::watch;

use werkbank_core::TransportMessage;

pub use channel::ChannelTransport;
pub use connections::ConnectionTable;
pub use correlator::{Correlator, PendingRequest};
pub use error::{CorrelationError, TransportError};
pub use http::HttpTransport;
pub use stdio::StdioTransport;
pub use ws::WsTransport;

/// Trait for server message transport.
///
/// Implementations handle the wire format over different channels
/// (stdio, HTTP, WebSocket). All methods take `&self`: a single
/// `Arc<dyn Transport>` is pumped by the server loop while handler
/// tasks write replies concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bind listeners and begin accepting traffic.
    async fn start(&self) -> Result<(), TransportError>;

    /// Shut the binding down: fail parked requests, close connections,
    /// release the listener. Calling it again is a no-op.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Read the next inbound message.
    /// Returns `None` when the transport is closed.
    async fn read_message(&self) -> Result<Option<TransportMessage>, TransportError>;

    /// Deliver an outbound message, routed by its connection or
    /// correlation id.
    async fn write_message(&self, message: TransportMessage) -> Result<(), TransportError>;

    /// Whether the binding currently accepts traffic.
    fn is_connected(&self) -> bool;

    /// Watch flag that flips to `true` exactly once on shutdown or
    /// peer disconnect.
    fn disconnected(&self) -> watch::Receiver<bool>;
}
