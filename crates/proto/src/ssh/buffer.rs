//! Zeroizing byte buffer for packet assembly and staging.
//!
//! Every buffer the transport touches transiently holds cleartext, and
//! during key exchange the cleartext includes key material. [`SecretBuffer`]
//! therefore zeroes its storage whenever bytes leave it: on drop, on
//! truncation, and when a consumed prefix is spliced off the front.
//!
//! The buffer doubles as the transport's wire codec: big-endian `u32`,
//! single bytes, and raw byte runs are appended in order, and the two
//! fields the transport itself interprets (the length prefix and the
//! command byte at offset 5) can be read without consuming.
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh::buffer::SecretBuffer;
//!
//! let mut buf = SecretBuffer::new();
//! buf.put_u32(12);
//! buf.put_u8(10);
//! buf.put_bytes(&[5]);
//! assert_eq!(buf.packet_len(), Some(12));
//! assert_eq!(buf.command(), Some(5));
//! ```

use zeroize::Zeroize;

/// Byte offset of the command byte: 4-byte length prefix + 1 pad-length byte.
const COMMAND_OFFSET: usize = 5;

/// Growable byte buffer that zeroes its storage on release.
///
/// Insertion order is significant; this is a queue of bytes. Reads via
/// [`packet_len`](SecretBuffer::packet_len) and
/// [`command`](SecretBuffer::command) do not consume.
#[derive(Default)]
pub struct SecretBuffer {
    data: Vec<u8>,
}

impl SecretBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Creates a buffer holding a copy of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    /// Returns the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Appends a big-endian 32-bit integer.
    pub fn put_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a single byte.
    pub fn put_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Appends a run of raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Reads the declared packet length: the big-endian `u32` at offset 0.
    ///
    /// Does not consume. Returns `None` if fewer than four bytes are
    /// buffered.
    pub fn packet_len(&self) -> Option<u32> {
        let prefix: [u8; 4] = self.data.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(prefix))
    }

    /// Reads the command byte: the first byte after the length prefix and
    /// pad-length byte.
    ///
    /// Does not consume. Returns `None` if the buffer is too short.
    pub fn command(&self) -> Option<u8> {
        self.data.get(COMMAND_OFFSET).copied()
    }

    /// Discards the first `n` bytes in place, zeroing them first.
    ///
    /// Discarding more bytes than are buffered empties the buffer.
    pub fn split_off_front(&mut self, n: usize) {
        let n = n.min(self.data.len());
        let rest = self.data[n..].to_vec();
        self.data.zeroize();
        self.data = rest;
    }

    /// Extends the buffer with `additional` zero bytes and returns the new
    /// tail for a reader to fill.
    ///
    /// Pair with [`truncate`](SecretBuffer::truncate) to drop the part the
    /// reader did not fill.
    pub fn grow(&mut self, additional: usize) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + additional, 0);
        &mut self.data[start..]
    }

    /// Shortens the buffer to `len` bytes, zeroing the removed tail.
    pub fn truncate(&mut self, len: usize) {
        if len < self.data.len() {
            self.data[len..].zeroize();
            self.data.truncate(len);
        }
    }
}

// Contents are routinely sensitive; never let Debug leak them.
impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_read_back() {
        let mut buf = SecretBuffer::new();
        buf.put_u32(0x0000_000c);
        buf.put_u8(0x0a);
        buf.put_bytes(&[0x05, 0xaa, 0xbb]);

        assert_eq!(buf.len(), 8);
        assert_eq!(buf.packet_len(), Some(12));
        assert_eq!(buf.command(), Some(0x05));
        assert_eq!(buf.as_slice(), &[0, 0, 0, 0x0c, 0x0a, 0x05, 0xaa, 0xbb]);
    }

    #[test]
    fn test_packet_len_requires_four_bytes() {
        let mut buf = SecretBuffer::new();
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(0);
        assert_eq!(buf.packet_len(), None);

        buf.put_u8(7);
        assert_eq!(buf.packet_len(), Some(7));
    }

    #[test]
    fn test_command_requires_six_bytes() {
        let mut buf = SecretBuffer::new();
        buf.put_u32(1);
        buf.put_u8(4);
        assert_eq!(buf.command(), None);

        buf.put_u8(20);
        assert_eq!(buf.command(), Some(20));
    }

    #[test]
    fn test_split_off_front() {
        let mut buf = SecretBuffer::from_slice(&[1, 2, 3, 4, 5, 6]);
        buf.split_off_front(4);
        assert_eq!(buf.as_slice(), &[5, 6]);

        buf.split_off_front(10);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_grow_and_truncate() {
        let mut buf = SecretBuffer::from_slice(&[1, 2]);
        let tail = buf.grow(4);
        assert_eq!(tail.len(), 4);
        tail[0] = 9;

        buf.truncate(3);
        assert_eq!(buf.as_slice(), &[1, 2, 9]);

        // Truncating longer than the buffer is a no-op.
        buf.truncate(100);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_debug_redacts_contents() {
        let buf = SecretBuffer::from_slice(b"secret key material");
        let rendered = format!("{:?}", buf);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("len"));
    }
}
