//! Client-side SSH transport layer (RFC 4253).
//!
//! This module sits directly above the socket and below the SSH
//! connection layer. It owns the byte pipe: framing the binary packet
//! protocol, applying and verifying the negotiated cipher and MAC on
//! every packet, and shuttling whole packets between the socket and the
//! layers above on dedicated receive and transmit workers.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! 1. **Socket primitives** ([`socket`]) - connect, readiness polling,
//!    raw receive/send over TCP and AF_UNIX
//! 2. **Packet buffer** ([`buffer`]) - zeroizing byte buffer with the
//!    transport's wire codec
//! 3. **Framer** ([`framer`]) - exactly one whole packet per call,
//!    decryption interleaved with framing
//! 4. **Crypto contract** ([`crypto`]) - the per-packet provider the
//!    key-exchange layer installs, plus the AES-CBC/HMAC suite
//! 5. **Channel contract** ([`channel`]) - delivery and outbound-drain
//!    interface to the multiplexer above
//! 6. **Facade** ([`transport`]) - lifecycle, `send_packet`,
//!    `wait_for_packet`, and the two workers
//! 7. **X11 connector** ([`x11`]) - the subsidiary local pipe used by
//!    X11 forwarding
//!
//! The key-exchange and authentication state machines are *consumers* of
//! this module, not part of it: they drive the facade and install a
//! [`CryptoProvider`] once keys exist.
//!
//! # Security Considerations
//!
//! - **Input validation**: declared packet lengths are bounded (16384
//!   bytes) before any further read
//! - **Constant-time operations**: MAC trailers are compared with
//!   constant-time equality
//! - **Memory safety**: buffers holding cleartext are zeroized on
//!   release; no `unsafe` anywhere
//! - **Failure containment**: a MAC mismatch or connection drop tears
//!   down both workers and signals the layer above exactly once
//!
//! # References
//!
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol

pub mod buffer;
pub mod channel;
pub mod crypto;
pub mod error;
pub mod framer;
pub mod message;
pub mod session;
pub mod socket;
pub mod transport;
pub mod x11;

// Re-export main types
pub use buffer::SecretBuffer;
pub use channel::{ChannelMux, FlushOutcome, NullMux, QueueMux};
pub use crypto::{CbcSuite, CipherAlgorithm, CryptoProvider, MacAlgorithm, PlainCrypto};
pub use error::{Error, Result};
pub use framer::{Framer, MAX_PACKET_LEN};
pub use message::{MessageType, FIRST_CONNECTION_MESSAGE};
pub use session::SessionContext;
pub use socket::{Stream, StreamReader, StreamWriter};
pub use transport::{Phase, Transport};
pub use x11::{parse_display, DisplayAddr};
