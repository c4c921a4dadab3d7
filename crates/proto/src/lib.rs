//! Protocol implementations for the Skiff SSH stack.
//!
//! This crate provides the client-side SSH transport layer: the subsystem
//! between the socket and the SSH connection layer that frames the binary
//! packet protocol, applies the negotiated cipher and MAC per packet, and
//! runs the receive/transmit workers.
//!
//! # Features
//!
//! - `ssh` (default) - the SSH transport layer
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh::buffer::SecretBuffer;
//!
//! // Assemble a wire frame by hand
//! let mut frame = SecretBuffer::new();
//! frame.put_u32(12);
//! frame.put_u8(10);
//! frame.put_bytes(&[0x05]);
//! assert_eq!(frame.packet_len(), Some(12));
//! assert_eq!(frame.command(), Some(0x05));
//! ```
//!
//! # Security
//!
//! - Per-packet cryptography uses vetted RustCrypto implementations
//! - MAC comparison is constant-time (`subtle`)
//! - Buffers that held cleartext or key material are zeroized on release
//! - No `unsafe` code
//!
//! # References
//!
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
