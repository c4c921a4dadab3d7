//! Channel multiplexer contract.
//!
//! The transport does not interpret channel traffic. It delivers whole
//! cleartext packets upward through a [`ChannelMux`] and drains the mux's
//! outbound queue from the transmit worker. The mux decides semantics:
//! sessions, ptys, forwarding, X11 payloads all live above this trait.
//!
//! Outbound data flows by *yielding*: [`ChannelMux::flush_outgoing`]
//! returns the next frame to transmit rather than calling back into the
//! transport. That keeps ownership acyclic - the session owns transport
//! and mux, and neither owns the other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One pass of the transmit worker over the mux's outbound queue.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A cleartext payload to frame and transmit.
    Frame(Vec<u8>),
    /// Nothing queued right now; the worker sleeps briefly and retries.
    Idle,
    /// The channel is permanently done; the transmit worker exits.
    Closed,
}

/// Upstream consumer of transport packets.
///
/// Implementations must be callable from the receive and transmit workers
/// concurrently and must not block.
pub trait ChannelMux: Send + Sync {
    /// Delivers one whole cleartext packet (length prefix and pad-length
    /// byte included) bearing a connection-protocol command.
    fn handle_received(&self, packet: &[u8]);

    /// Yields the next queued outbound payload, if any.
    fn flush_outgoing(&self) -> FlushOutcome;

    /// Signals a fatal transport error upward.
    ///
    /// Called by a worker when the connection drops or packet
    /// authentication fails. Must be idempotent.
    fn disconnect(&self);
}

/// Mux that drops inbound traffic and never transmits.
///
/// Useful for transports driven entirely through
/// [`wait_for_packet`](crate::ssh::Transport::wait_for_packet), such as a
/// key-exchange-only probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMux;

impl ChannelMux for NullMux {
    fn handle_received(&self, _packet: &[u8]) {}

    fn flush_outgoing(&self) -> FlushOutcome {
        FlushOutcome::Idle
    }

    fn disconnect(&self) {}
}

/// Queue-backed mux.
///
/// Collects delivered packets and feeds the transmit worker from a FIFO
/// the application pushes into. This is enough to drive a single channel;
/// a real multiplexer would dispatch on channel ids.
#[derive(Debug, Default)]
pub struct QueueMux {
    received: Mutex<Vec<Vec<u8>>>,
    outgoing: Mutex<VecDeque<Vec<u8>>>,
    disconnected: AtomicBool,
}

impl QueueMux {
    /// Creates an empty mux.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a cleartext payload for the transmit worker.
    pub fn push_outgoing(&self, payload: Vec<u8>) {
        let mut outgoing = match self.outgoing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        outgoing.push_back(payload);
    }

    /// Removes and returns all packets delivered so far, oldest first.
    pub fn drain_received(&self) -> Vec<Vec<u8>> {
        let mut received = match self.received.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *received)
    }

    /// Returns whether the transport reported a fatal error.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }
}

impl ChannelMux for QueueMux {
    fn handle_received(&self, packet: &[u8]) {
        let mut received = match self.received.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        received.push(packet.to_vec());
    }

    fn flush_outgoing(&self) -> FlushOutcome {
        if self.disconnected.load(Ordering::Relaxed) {
            return FlushOutcome::Closed;
        }
        let mut outgoing = match self.outgoing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match outgoing.pop_front() {
            Some(payload) => FlushOutcome::Frame(payload),
            None => FlushOutcome::Idle,
        }
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_mux_is_inert() {
        let mux = NullMux;
        mux.handle_received(&[1, 2, 3]);
        assert_eq!(mux.flush_outgoing(), FlushOutcome::Idle);
        mux.disconnect();
    }

    #[test]
    fn test_queue_mux_outgoing_fifo() {
        let mux = QueueMux::new();
        mux.push_outgoing(vec![1]);
        mux.push_outgoing(vec![2]);

        assert_eq!(mux.flush_outgoing(), FlushOutcome::Frame(vec![1]));
        assert_eq!(mux.flush_outgoing(), FlushOutcome::Frame(vec![2]));
        assert_eq!(mux.flush_outgoing(), FlushOutcome::Idle);
    }

    #[test]
    fn test_queue_mux_received_order() {
        let mux = QueueMux::new();
        mux.handle_received(&[0, 0, 0, 1, 4, 94]);
        mux.handle_received(&[0, 0, 0, 2, 4, 95]);

        let received = mux.drain_received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0][5], 94);
        assert_eq!(received[1][5], 95);
        assert!(mux.drain_received().is_empty());
    }

    #[test]
    fn test_queue_mux_disconnect_closes_flush() {
        let mux = QueueMux::new();
        mux.push_outgoing(vec![1]);
        mux.disconnect();

        assert!(mux.is_disconnected());
        assert_eq!(mux.flush_outgoing(), FlushOutcome::Closed);

        // Idempotent.
        mux.disconnect();
        assert!(mux.is_disconnected());
    }
}
