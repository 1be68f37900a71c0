//! `WebSocket` client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use gqlws_core::{CloseFrame, ConnectionId, Packet, ProtocolVariant};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Item queued for the socket writer task.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// A protocol packet, sent as one text frame.
    Packet(Packet),
    /// A server keep-alive packet; the writer follows it with a transport ping.
    KeepAlive(Packet),
    /// Close frame. The writer stops after sending it.
    Close(CloseFrame),
}

/// Represents a connected `WebSocket` client.
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Sub-protocol negotiated during the upgrade.
    variant: ProtocolVariant,
    /// Send channel to the client's `WebSocket` write task.
    tx: mpsc::Sender<Outbound>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether any inbound traffic arrived since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last inbound frame was received.
    last_activity: Mutex<Instant>,
    /// Set once a close frame has been queued.
    closing: AtomicBool,
    /// Packets that could not be queued because the writer is gone.
    dropped_packets: AtomicU64,
}

impl Connection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, variant: ProtocolVariant, tx: mpsc::Sender<Outbound>) -> Self {
        let now = Instant::now();
        Self {
            id,
            variant,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_activity: Mutex::new(now),
            closing: AtomicBool::new(false),
            dropped_packets: AtomicU64::new(0),
        }
    }

    /// Negotiated sub-protocol.
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Queue a packet for the client, waiting for room in the queue.
    ///
    /// Returns `false` once the writer is gone or a close has been queued.
    pub async fn send(&self, packet: Packet) -> bool {
        self.enqueue(Outbound::Packet(packet)).await
    }

    /// Queue the negotiated keep-alive packet.
    pub async fn send_keep_alive(&self) -> bool {
        self.enqueue(Outbound::KeepAlive(self.variant.keep_alive())).await
    }

    /// Queue a close frame. Only the first call has any effect.
    pub async fn close(&self, frame: CloseFrame) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.tx.send(Outbound::Close(frame)).await.is_ok()
    }

    /// Whether a close frame has been queued.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    async fn enqueue(&self, item: Outbound) -> bool {
        if self.is_closing() || self.tx.send(item).await.is_err() {
            let _ = self.dropped_packets.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Total packets dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_packets.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_activity.lock() = Instant::now();
    }

    /// Duration since the last inbound frame (or connection establishment).
    pub fn last_activity_elapsed(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
