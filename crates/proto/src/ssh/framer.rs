//! Inbound packet framing.
//!
//! SSH hides the packet boundary inside the ciphertext: the length prefix
//! is encrypted along with everything else, so framing and decryption are
//! interleaved. The framer reads until it holds one cipher block, decrypts
//! exactly that block to expose the length, reads until the declared
//! packet (and its MAC trailer) is complete, decrypts the remainder, and
//! verifies the MAC over the cleartext with the receive sequence number as
//! associated data.
//!
//! Each call to [`Framer::next_packet`] yields exactly one whole cleartext
//! packet - length prefix and pad-length byte included - or a fatal error.
//! Bytes that arrive early stay in the staging buffer for the next call;
//! nothing is re-decrypted and nothing is dropped except the explicit
//! splice of a completed packet.

use crate::ssh::buffer::SecretBuffer;
use crate::ssh::error::{Error, Result};
use crate::ssh::session::SessionContext;
use crate::ssh::socket::StreamReader;
use std::sync::atomic::AtomicBool;
use subtle::ConstantTimeEq;

/// Maximum accepted value of the declared packet length.
///
/// A peer declaring more than this is treated as a protocol violation
/// before any further byte is read.
pub const MAX_PACKET_LEN: usize = 16384;

/// Assembles whole packets from the read half of the socket.
pub struct Framer {
    reader: StreamReader,
    staging: SecretBuffer,
    rx_seq: u32,
}

impl std::fmt::Debug for Framer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("staged", &self.staging.len())
            .field("rx_seq", &self.rx_seq)
            .finish()
    }
}

impl Framer {
    /// Creates a framer owning the read half of the connection.
    pub fn new(reader: StreamReader) -> Self {
        Self {
            reader,
            staging: SecretBuffer::new(),
            rx_seq: 0,
        }
    }

    /// Returns the receive sequence number: packets verified so far,
    /// modulo 2^32.
    pub fn rx_seq(&self) -> u32 {
        self.rx_seq
    }

    /// Returns the next whole cleartext packet.
    ///
    /// Blocks (in readiness-poll ticks bounded by the session timeout and
    /// the running flag) until a complete packet is buffered. The receive
    /// sequence number advances only when a packet is returned.
    ///
    /// # Errors
    ///
    /// * [`Error::PacketTooLarge`] - declared length above [`MAX_PACKET_LEN`]
    /// * [`Error::MalformedPacket`] - declared length below 1, a body that
    ///   is not block-aligned, or a pad-length byte out of range
    /// * [`Error::MacMismatch`] - MAC trailer failed verification
    /// * [`Error::Dropped`] - peer closed or reset the connection
    /// * [`Error::Closed`] - running flag cleared while waiting
    pub async fn next_packet(
        &mut self,
        ctx: &SessionContext,
        running: &AtomicBool,
    ) -> Result<SecretBuffer> {
        let crypto = ctx.crypto();
        let encrypted = crypto.is_initialized();
        let first_block = if encrypted {
            crypto.decrypt_block_size() as usize
        } else {
            4
        };

        self.fill(first_block, ctx, running).await?;

        // The first block is decrypted exactly once; the cleartext
        // accumulates here while the staging buffer keeps the wire bytes
        // for the final splice.
        let mut clear = SecretBuffer::with_capacity(first_block);
        if encrypted {
            let first = crypto
                .decrypt_packet(&self.staging.as_slice()[..first_block], first_block as u32)?;
            clear.put_bytes(&first);
        } else {
            clear.put_bytes(&self.staging.as_slice()[..first_block]);
        }

        let packet_len = clear.packet_len().unwrap_or(0);
        if packet_len < 1 {
            return Err(Error::MalformedPacket(format!(
                "declared length {}",
                packet_len
            )));
        }
        if packet_len as usize > MAX_PACKET_LEN {
            return Err(Error::PacketTooLarge(packet_len));
        }

        let body_len = packet_len as usize + 4;
        if encrypted && body_len % first_block != 0 {
            return Err(Error::MalformedPacket(format!(
                "body length {} is not a multiple of the cipher block size",
                body_len
            )));
        }

        let mac_len = if encrypted {
            crypto.mac_in_len() as usize
        } else {
            0
        };
        let need = body_len + mac_len;
        self.fill(need, ctx, running).await?;

        if body_len > first_block {
            if encrypted {
                let rest = crypto.decrypt_packet(
                    &self.staging.as_slice()[first_block..body_len],
                    first_block as u32,
                )?;
                clear.put_bytes(&rest);
            } else {
                clear.put_bytes(&self.staging.as_slice()[first_block..body_len]);
            }
        }

        let pad_len = clear.as_slice()[4] as u32;
        if pad_len < 4 || pad_len + 1 > packet_len {
            return Err(Error::MalformedPacket(format!(
                "pad length {} out of range for packet length {}",
                pad_len, packet_len
            )));
        }

        if mac_len > 0 {
            let expected = crypto.compute_mac(clear.as_slice(), self.rx_seq);
            let received = &self.staging.as_slice()[body_len..need];
            if expected.len() != mac_len || !bool::from(expected.ct_eq(received)) {
                return Err(Error::MacMismatch);
            }
        }

        self.staging.split_off_front(need);
        self.rx_seq = self.rx_seq.wrapping_add(1);
        Ok(clear)
    }

    /// Reads from the socket until at least `need` bytes are staged.
    async fn fill(
        &mut self,
        need: usize,
        ctx: &SessionContext,
        running: &AtomicBool,
    ) -> Result<()> {
        use std::sync::atomic::Ordering;

        while self.staging.len() < need {
            if !running.load(Ordering::Relaxed) {
                return Err(Error::Closed);
            }
            self.reader
                .recv(&mut self.staging, ctx.timeout(), running)
                .await?;
        }
        Ok(())
    }
}
