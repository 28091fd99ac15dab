//! Transport Abstraction
//!
//! The session layer is transport-agnostic: it hands encoded frames to a
//! [`Transport`] and receives inbound bytes and disconnect notifications
//! from whatever owns the sockets. The in-process channel transport backs
//! tests and the demo binary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier of one client connection.
pub type ConnectionId = Uuid;

/// Events a transport emits toward its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An encoded packet frame queued for a connection.
    Frame {
        /// Destination connection.
        conn: ConnectionId,
        /// Encoded packet bytes, id header included.
        bytes: Vec<u8>,
        /// Acknowledgement id when delivery confirmation was requested.
        ack: Option<u32>,
        /// Whether the frame bypasses batching.
        immediate: bool,
    },
    /// The transport-level connection was torn down.
    Closed {
        /// The closed connection.
        conn: ConnectionId,
        /// Reason forwarded to the transport, empty for silent closes.
        reason: String,
    },
}

/// Outbound half of a client connection.
pub trait Transport: Send + Sync {
    /// Queue an encoded frame. Returns the acknowledgement id when one was
    /// requested and the transport supports delivery confirmation.
    fn send(&self, conn: ConnectionId, bytes: Vec<u8>, need_ack: bool, immediate: bool)
        -> Option<u32>;

    /// Tear down the connection.
    fn close(&self, conn: ConnectionId, reason: &str);
}

/// In-process transport delivering frames over an unbounded channel.
pub struct ChannelTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    next_ack: AtomicU32,
}

impl ChannelTransport {
    /// Create a transport and the receiving end of its event stream.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events,
                next_ack: AtomicU32::new(1),
            }),
            rx,
        )
    }
}

impl Transport for ChannelTransport {
    fn send(
        &self,
        conn: ConnectionId,
        bytes: Vec<u8>,
        need_ack: bool,
        immediate: bool,
    ) -> Option<u32> {
        let ack = need_ack.then(|| self.next_ack.fetch_add(1, Ordering::Relaxed));
        let _ = self.events.send(TransportEvent::Frame {
            conn,
            bytes,
            ack,
            immediate,
        });
        ack
    }

    fn close(&self, conn: ConnectionId, reason: &str) {
        let _ = self.events.send(TransportEvent::Closed {
            conn,
            reason: reason.to_string(),
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
