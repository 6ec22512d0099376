//! Client session handle: the send side of a proxied connection.
//!
//! The aggregation core never touches sockets. A [`ClientSession`] is the
//! capability it holds instead: finished response packets go onto an
//! unbounded outbound queue that the connection's writer task drains.
//! Shared ownership (`Arc`) keeps the session alive for the final send
//! even after the connection record has dropped its own reference.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use coral_protocol::ReplyEncoder;
use tokio::sync::mpsc;

use crate::error::ProxyError;

/// Send capability for one proxied client connection.
pub struct ClientSession {
    outbound: mpsc::UnboundedSender<Bytes>,
    /// Per-session reusable encoder for synthesized replies, so merges
    /// don't allocate a fresh buffer per response.
    encoder: Mutex<ReplyEncoder>,
}

impl ClientSession {
    /// Creates a session and the receiver its writer task drains.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            outbound: tx,
            encoder: Mutex::new(ReplyEncoder::new()),
        });
        (session, rx)
    }

    /// Queues one finished response packet for the client. Never blocks.
    pub fn send_packet(&self, packet: Bytes) -> Result<(), ProxyError> {
        self.outbound
            .send(packet)
            .map_err(|_| ProxyError::SessionClosed)
    }

    /// Borrows the session's reusable encoder.
    ///
    /// The caller should `begin`, write fields, and `finish` within one
    /// guard scope; the built packet is independent of the encoder.
    pub fn encoder(&self) -> MutexGuard<'_, ReplyEncoder> {
        self.encoder.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("closed", &self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}
