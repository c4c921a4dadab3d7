//! SSH transport facade (RFC 4253).
//!
//! This module owns the byte pipe: it establishes the connection, frames
//! and protects every packet, and shuttles packets between the socket and
//! the layers above on two dedicated workers.
//!
//! # Lifecycle
//!
//! ```text
//! NEW --establish--> CONNECTED --start--> RUNNING --disconnect/fatal--> TERMINATED
//! ```
//!
//! Transitions are one-way and TERMINATED is absorbing. Between
//! `establish` and `start` the connection is held unsplit and the raw
//! send/receive calls are available for version-line bringup; `start`
//! splits the stream and hands the read half to the receive worker and
//! the write half to the outbound path.
//!
//! # Workers
//!
//! - The **receive worker** loops: frame, decrypt, verify, then either
//!   queue the packet for [`wait_for_packet`](Transport::wait_for_packet)
//!   callers or hand it to the channel multiplexer (connection-protocol
//!   commands, 80 and above). Any framing or socket error is fatal: the
//!   worker reports it, clears the running flag, signals the mux, and
//!   exits.
//! - The **transmit worker** drains the multiplexer's outbound queue
//!   through [`send_packet`](Transport::send_packet) semantics, sleeping
//!   one poll tick between unproductive passes.
//!
//! Clearing the running flag wakes both workers within one poll tick;
//! [`disconnect`](Transport::disconnect) additionally joins them and
//! drops both halves of the socket.
//!
//! # Example
//!
//! ```rust,no_run
//! use skiff_proto::ssh::channel::NullMux;
//! use skiff_proto::ssh::crypto::PlainCrypto;
//! use skiff_proto::ssh::session::SessionContext;
//! use skiff_proto::ssh::transport::Transport;
//! use skiff_platform::MemoryLog;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Arc::new(SessionContext::new(
//!     Arc::new(PlainCrypto),
//!     Arc::new(NullMux),
//!     Arc::new(MemoryLog::new()),
//!     Duration::from_secs(10),
//! ));
//!
//! let transport = Transport::new(ctx);
//! transport.establish("127.0.0.1", 22).await?;
//! transport.start().await?;
//!
//! let (command, packet) = transport
//!     .wait_for_packet(0, Duration::from_millis(100))
//!     .await;
//! if packet.is_empty() {
//!     println!("no packet within the deadline (command {} echoed)", command);
//! }
//!
//! transport.disconnect().await;
//! # Ok(())
//! # }
//! ```

use crate::ssh::buffer::SecretBuffer;
use crate::ssh::channel::FlushOutcome;
use crate::ssh::error::{Error, Result};
use crate::ssh::framer::{Framer, MAX_PACKET_LEN};
use crate::ssh::message::FIRST_CONNECTION_MESSAGE;
use crate::ssh::session::SessionContext;
use crate::ssh::socket::{self, StreamReader, StreamWriter, POLL_TICK};
use crate::ssh::x11;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Transport lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, no socket yet.
    New,
    /// Socket connected; raw bringup I/O available, workers not running.
    Connected,
    /// Workers running; packet I/O available.
    Running,
    /// Torn down. Absorbing.
    Terminated,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// FIFO of whole cleartext packets, receive worker to facade.
struct Inbound {
    queue: Mutex<VecDeque<SecretBuffer>>,
    notify: Notify,
}

impl Inbound {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn push(&self, packet: SecretBuffer) {
        lock_or_recover(&self.queue).push_back(packet);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<SecretBuffer> {
        lock_or_recover(&self.queue).pop_front()
    }
}

/// Write half plus the transmit sequence counter it advances.
struct Outbound {
    writer: StreamWriter,
    tx_seq: u32,
}

impl Outbound {
    /// Frames, protects, and transmits one cleartext payload.
    ///
    /// The transmit sequence number advances only after the whole wire
    /// image is on the socket; a short send leaves it unchanged.
    async fn send_packet(
        &mut self,
        payload: &[u8],
        ctx: &SessionContext,
        running: &AtomicBool,
    ) -> Result<()> {
        if payload.len() >= MAX_PACKET_LEN {
            return Err(Error::PacketTooLarge(payload.len() as u32));
        }

        let crypto = ctx.crypto();
        let block = (crypto.encrypt_block_size() as usize).max(8);
        let framed = frame_payload(payload, block);

        let mut wire = SecretBuffer::with_capacity(framed.len() + crypto.mac_out_len() as usize);
        if crypto.is_initialized() {
            let (ciphertext, mac) = crypto.encrypt_packet(framed.as_slice(), self.tx_seq)?;
            wire.put_bytes(&ciphertext);
            wire.put_bytes(&mac);
        } else {
            wire.put_bytes(framed.as_slice());
        }

        self.writer
            .send_all(wire.as_slice(), ctx.timeout(), running)
            .await?;
        self.tx_seq = self.tx_seq.wrapping_add(1);
        Ok(())
    }
}

/// Pad length for a payload under the given cipher block size.
///
/// Keeps `(4 + 1 + payload_len + pad) % block == 0` while holding the
/// result inside `[8, 8 + block)`.
fn pad_len(payload_len: usize, block: usize) -> usize {
    let mut pad = 3 + block - ((payload_len + 8) % block);
    if pad < 8 {
        pad += block;
    }
    pad
}

/// Assembles the cleartext frame: length prefix, pad-length byte,
/// payload, zero padding.
fn frame_payload(payload: &[u8], block: usize) -> SecretBuffer {
    let pad = pad_len(payload.len(), block);
    let packet_len = (1 + payload.len() + pad) as u32;

    let mut framed = SecretBuffer::with_capacity(4 + packet_len as usize);
    framed.put_u32(packet_len);
    framed.put_u8(pad as u8);
    framed.put_bytes(payload);
    framed.put_bytes(&vec![0u8; pad]);
    framed
}

/// The transport facade.
///
/// One instance per byte pipe: the main connection gets one, and each
/// forwarded X11 connection gets its own with an independent lifetime.
/// All methods take `&self`; the facade is shared between the session
/// layer and the workers it spawns.
pub struct Transport {
    ctx: Arc<SessionContext>,
    running: Arc<AtomicBool>,
    phase: Mutex<Phase>,
    pending: Mutex<Option<(StreamReader, StreamWriter)>>,
    inbound: Arc<Inbound>,
    outbound: Arc<tokio::sync::Mutex<Option<Outbound>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("phase", &self.phase())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Transport {
    /// Creates a transport bound to a session context.
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            running: Arc::new(AtomicBool::new(true)),
            phase: Mutex::new(Phase::New),
            pending: Mutex::new(None),
            inbound: Arc::new(Inbound::new()),
            outbound: Arc::new(tokio::sync::Mutex::new(None)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *lock_or_recover(&self.phase)
    }

    /// Returns whether the running flag is still set.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn expect_phase(&self, want: Phase) -> Result<()> {
        if self.phase() == want {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    fn set_phase(&self, next: Phase) {
        *lock_or_recover(&self.phase) = next;
    }

    /// Resolves `host` and connects the main byte pipe.
    ///
    /// On success the transport is CONNECTED and the socket is
    /// nonblocking (tokio registers it with the reactor on creation).
    ///
    /// # Errors
    ///
    /// [`Error::Dns`] and [`Error::Connect`] per their triggers; either
    /// is also pushed to the log sink.
    pub async fn establish(&self, host: &str, port: u16) -> Result<()> {
        self.expect_phase(Phase::New)?;

        let stream = match socket::connect_tcp(host, port, self.ctx.timeout()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.ctx.push_log(e.to_string());
                warn!(host, port, error = %e, "establish failed");
                return Err(e);
            }
        };

        info!(host, port, "transport connected");
        *lock_or_recover(&self.pending) = Some(stream.into_split());
        self.set_phase(Phase::Connected);
        Ok(())
    }

    /// Connects to the local X display named by `$DISPLAY`.
    ///
    /// The counterpart of [`establish`](Transport::establish) for a
    /// subsidiary X11 forwarding pipe.
    pub async fn establish_x11(&self) -> Result<()> {
        self.expect_phase(Phase::New)?;

        let display_name = x11::local_display()?;
        let stream = match x11::connect_display(&display_name, self.ctx.timeout()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.ctx.push_log(e.to_string());
                warn!(display = %display_name, error = %e, "X11 establish failed");
                return Err(e);
            }
        };

        info!(display = %display_name, "X11 transport connected");
        *lock_or_recover(&self.pending) = Some(stream.into_split());
        self.set_phase(Phase::Connected);
        Ok(())
    }

    /// Spawns the receive and transmit workers.
    ///
    /// After this the raw bringup calls are gone and all traffic flows
    /// through [`send_packet`](Transport::send_packet) and the inbound
    /// queue.
    pub async fn start(&self) -> Result<()> {
        self.expect_phase(Phase::Connected)?;
        let (reader, writer) = lock_or_recover(&self.pending)
            .take()
            .ok_or(Error::Closed)?;

        let framer = Framer::new(reader);
        *self.outbound.lock().await = Some(Outbound { writer, tx_seq: 0 });

        let rx = tokio::spawn(rx_worker(
            framer,
            Arc::clone(&self.ctx),
            Arc::clone(&self.running),
            Arc::clone(&self.inbound),
        ));
        let tx = tokio::spawn(tx_worker(
            Arc::clone(&self.outbound),
            Arc::clone(&self.ctx),
            Arc::clone(&self.running),
        ));

        lock_or_recover(&self.workers).extend([rx, tx]);
        self.set_phase(Phase::Running);
        Ok(())
    }

    /// Frames, protects, and transmits one cleartext payload.
    ///
    /// # Errors
    ///
    /// * [`Error::PacketTooLarge`] - payload cannot fit a legal packet
    /// * [`Error::EncryptFail`] - crypto provider rejected the frame
    /// * [`Error::Dropped`] / [`Error::Timeout`] - socket failed mid-send;
    ///   the transmit sequence number is left unchanged
    /// * [`Error::Closed`] - transport is not RUNNING
    pub async fn send_packet(&self, payload: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(Error::Closed);
        }

        let mut guard = self.outbound.lock().await;
        let outbound = guard.as_mut().ok_or(Error::Closed)?;
        match outbound
            .send_packet(payload, &self.ctx, &self.running)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.ctx.push_log(e.to_string());
                warn!(error = %e, "send_packet failed");
                Err(e)
            }
        }
    }

    /// Waits for the next queued packet.
    ///
    /// Returns `(command, packet)`:
    ///
    /// - Nothing arrived before `timeout` (or the transport stopped):
    ///   the packet is empty and `expected` is echoed back - this is how
    ///   callers detect a timeout.
    /// - Head of the queue matches `expected` (or `expected` is 0,
    ///   meaning any): that packet with its command byte.
    /// - Head carries some other command: that packet with command 0;
    ///   the caller decides what to do with it.
    pub async fn wait_for_packet(&self, expected: u8, timeout: Duration) -> (u8, SecretBuffer) {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(packet) = self.inbound.pop() {
                let command = packet.command().unwrap_or(0);
                if expected == 0 || command == expected {
                    return (command, packet);
                }
                return (0, packet);
            }

            if !self.is_running() || Instant::now() >= deadline {
                return (expected, SecretBuffer::new());
            }
            let _ = tokio::time::timeout(POLL_TICK, self.inbound.notify.notified()).await;
        }
    }

    /// Receives raw bytes, bypassing packet framing.
    ///
    /// Only valid in CONNECTED, before [`start`](Transport::start): the
    /// version-line exchange happens before binary packets do. Returns an
    /// empty buffer if nothing arrived inside the session timeout.
    pub async fn receive_raw(&self) -> Result<SecretBuffer> {
        self.expect_phase(Phase::Connected)?;
        let (reader, writer) = lock_or_recover(&self.pending)
            .take()
            .ok_or(Error::Closed)?;

        let mut buf = SecretBuffer::new();
        let result = reader
            .recv(&mut buf, self.ctx.timeout(), &self.running)
            .await;
        *lock_or_recover(&self.pending) = Some((reader, writer));

        result?;
        Ok(buf)
    }

    /// Sends raw bytes, bypassing packet framing.
    ///
    /// Only valid in CONNECTED, before [`start`](Transport::start).
    pub async fn send_raw(&self, data: &[u8]) -> Result<()> {
        self.expect_phase(Phase::Connected)?;
        let (reader, writer) = lock_or_recover(&self.pending)
            .take()
            .ok_or(Error::Closed)?;

        let result = writer
            .send_all(data, self.ctx.timeout(), &self.running)
            .await;
        *lock_or_recover(&self.pending) = Some((reader, writer));
        result
    }

    /// Tears the transport down.
    ///
    /// Clears the running flag (workers exit within one poll tick), wakes
    /// any `wait_for_packet` caller, joins both workers, and drops both
    /// halves of the socket. Idempotent: a second call finds nothing left
    /// to do.
    pub async fn disconnect(&self) {
        if self.running.swap(false, Ordering::Relaxed) {
            debug!("transport disconnecting");
        }
        self.inbound.notify.notify_waiters();

        let workers: Vec<JoinHandle<()>> = lock_or_recover(&self.workers).drain(..).collect();
        for handle in workers {
            let _ = handle.await;
        }

        self.outbound.lock().await.take();
        lock_or_recover(&self.pending).take();
        self.set_phase(Phase::Terminated);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Workers hold their own Arcs; clearing the flag is enough for
        // them to exit within one poll tick.
        self.running.store(false, Ordering::Relaxed);
        self.inbound.notify.notify_waiters();
    }
}

/// Receive worker: frame, verify, dispatch, repeat.
async fn rx_worker(
    mut framer: Framer,
    ctx: Arc<SessionContext>,
    running: Arc<AtomicBool>,
    inbound: Arc<Inbound>,
) {
    debug!("rx worker started");
    while running.load(Ordering::Relaxed) {
        match framer.next_packet(&ctx, &running).await {
            Ok(packet) => {
                let command = packet.command().unwrap_or(0);
                if command >= FIRST_CONNECTION_MESSAGE {
                    ctx.channel().handle_received(packet.as_slice());
                } else {
                    inbound.push(packet);
                }
            }
            Err(Error::Closed) => break,
            Err(e) => {
                ctx.push_log(e.to_string());
                warn!(error = %e, rx_seq = framer.rx_seq(), "rx worker fatal error");
                running.store(false, Ordering::Relaxed);
                inbound.notify.notify_waiters();
                ctx.channel().disconnect();
                break;
            }
        }
    }
    debug!("rx worker exited");
}

/// Transmit worker: drain the mux's outbound queue, one frame per pass.
async fn tx_worker(
    outbound: Arc<tokio::sync::Mutex<Option<Outbound>>>,
    ctx: Arc<SessionContext>,
    running: Arc<AtomicBool>,
) {
    debug!("tx worker started");
    while running.load(Ordering::Relaxed) {
        match ctx.channel().flush_outgoing() {
            FlushOutcome::Frame(payload) => {
                let mut guard = outbound.lock().await;
                let Some(out) = guard.as_mut() else { break };
                if let Err(e) = out.send_packet(&payload, &ctx, &running).await {
                    drop(guard);
                    ctx.push_log(e.to_string());
                    warn!(error = %e, "tx worker fatal error");
                    running.store(false, Ordering::Relaxed);
                    ctx.channel().disconnect();
                    break;
                }
            }
            FlushOutcome::Idle => tokio::time::sleep(POLL_TICK).await,
            FlushOutcome::Closed => break,
        }
    }
    debug!("tx worker exited");
}
