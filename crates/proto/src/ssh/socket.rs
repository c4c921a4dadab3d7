//! Socket I/O primitives.
//!
//! The transport reads and writes through tokio streams, which are
//! nonblocking from creation (every socket is registered with the runtime
//! reactor before it is returned). Readiness is polled in short ticks
//! bounded by the session timeout, with the shared running flag checked
//! between ticks so a disconnect wakes a blocked worker within one tick.
//!
//! A connected [`Stream`] is split once into a [`StreamReader`] and a
//! [`StreamWriter`]; after that the receive worker owns the read
//! direction and the transmit path owns the write direction, so the two
//! never contend for the descriptor.

use crate::ssh::buffer::SecretBuffer;
use crate::ssh::error::{Error, Result};
use crate::ssh::framer::MAX_PACKET_LEN;
#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::net::tcp;
use tokio::net::{lookup_host, TcpStream};
#[cfg(unix)]
use tokio::net::{unix, UnixStream};

/// Readiness poll granularity. Cancellation latency is bounded by this.
pub(crate) const POLL_TICK: Duration = Duration::from_millis(1);

/// A connected stream, not yet split into directions.
#[derive(Debug)]
pub enum Stream {
    /// TCP connection to the SSH server (or, off-POSIX, to a local X display).
    Tcp(TcpStream),
    /// AF_UNIX connection to a local X display.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Splits into an owned read half and an owned write half.
    pub fn into_split(self) -> (StreamReader, StreamWriter) {
        match self {
            Stream::Tcp(stream) => {
                let (read, write) = stream.into_split();
                (StreamReader::Tcp(read), StreamWriter::Tcp(write))
            }
            #[cfg(unix)]
            Stream::Unix(stream) => {
                let (read, write) = stream.into_split();
                (StreamReader::Unix(read), StreamWriter::Unix(write))
            }
        }
    }
}

/// Read direction of a split stream.
#[derive(Debug)]
pub enum StreamReader {
    /// TCP read half.
    Tcp(tcp::OwnedReadHalf),
    /// AF_UNIX read half.
    #[cfg(unix)]
    Unix(unix::OwnedReadHalf),
}

/// Write direction of a split stream.
#[derive(Debug)]
pub enum StreamWriter {
    /// TCP write half.
    Tcp(tcp::OwnedWriteHalf),
    /// AF_UNIX write half.
    #[cfg(unix)]
    Unix(unix::OwnedWriteHalf),
}

/// Resolves `host` and connects a TCP stream.
///
/// The first resolved address is used, as `gethostbyname` consumers
/// conventionally do.
///
/// # Errors
///
/// * [`Error::Dns`] - resolution failed or produced no addresses
/// * [`Error::Connect`] - connect refused, unreachable, or timed out
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<Stream> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| Error::Dns(format!("{}: {}", host, e)))?;
    let addr = addrs.next().ok_or_else(|| Error::Dns(host.to_string()))?;

    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Connect(format!("'{}:{}' timed out", host, port)))?
        .map_err(|e| Error::Connect(format!("'{}:{}': {}", host, port, e)))?;

    Ok(Stream::Tcp(stream))
}

/// Connects an AF_UNIX stream to `path`.
///
/// # Errors
///
/// Returns [`Error::Connect`] if the socket is missing or refuses.
#[cfg(unix)]
pub async fn connect_unix(path: &Path, timeout: Duration) -> Result<Stream> {
    let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
        .await
        .map_err(|_| Error::Connect(format!("'{}' timed out", path.display())))?
        .map_err(|e| Error::Connect(format!("'{}': {}", path.display(), e)))?;

    Ok(Stream::Unix(stream))
}

impl StreamReader {
    async fn readable(&self) -> std::io::Result<()> {
        match self {
            StreamReader::Tcp(half) => half.readable().await,
            #[cfg(unix)]
            StreamReader::Unix(half) => half.readable().await,
        }
    }

    fn try_read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            StreamReader::Tcp(half) => half.try_read(buf),
            #[cfg(unix)]
            StreamReader::Unix(half) => half.try_read(buf),
        }
    }

    /// Waits until the socket is readable.
    ///
    /// Polls in 1 ms ticks, re-checking `running` between ticks.
    /// Returns [`Error::Timeout`] at the deadline and [`Error::Closed`]
    /// once the flag clears.
    pub async fn wait_readable(&self, timeout: Duration, running: &AtomicBool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while running.load(Ordering::Relaxed) {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            match tokio::time::timeout(POLL_TICK, self.readable()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {} // tick elapsed; re-check flag and deadline
            }
        }
        Err(Error::Closed)
    }

    /// Appends whatever the socket has ready, up to one maximum-size
    /// packet, to `staging`.
    ///
    /// Returns the number of bytes appended; `Ok(0)` means the readiness
    /// window passed without data. A peer close or reset is
    /// [`Error::Dropped`].
    pub async fn recv(
        &self,
        staging: &mut SecretBuffer,
        timeout: Duration,
        running: &AtomicBool,
    ) -> Result<usize> {
        match self.wait_readable(timeout, running).await {
            Ok(()) => {}
            Err(Error::Timeout) => return Ok(0),
            Err(e) => return Err(e),
        }

        let start = staging.len();
        let tail = staging.grow(MAX_PACKET_LEN);
        match self.try_read(tail) {
            Ok(0) => {
                staging.truncate(start);
                Err(Error::Dropped)
            }
            Ok(n) => {
                staging.truncate(start + n);
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                staging.truncate(start);
                Ok(0)
            }
            Err(_) => {
                staging.truncate(start);
                Err(Error::Dropped)
            }
        }
    }
}

impl StreamWriter {
    async fn writable(&self) -> std::io::Result<()> {
        match self {
            StreamWriter::Tcp(half) => half.writable().await,
            #[cfg(unix)]
            StreamWriter::Unix(half) => half.writable().await,
        }
    }

    fn try_write(&self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            StreamWriter::Tcp(half) => half.try_write(buf),
            #[cfg(unix)]
            StreamWriter::Unix(half) => half.try_write(buf),
        }
    }

    /// Waits until the socket is writable.
    ///
    /// Same polling contract as
    /// [`StreamReader::wait_readable`](StreamReader::wait_readable).
    pub async fn wait_writable(&self, timeout: Duration, running: &AtomicBool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while running.load(Ordering::Relaxed) {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            match tokio::time::timeout(POLL_TICK, self.writable()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {}
            }
        }
        Err(Error::Closed)
    }

    /// Writes all of `data`, accumulating across partial writes.
    ///
    /// Unlike the read side, a readiness timeout here is a failure: the
    /// caller was mid-packet and the peer stopped draining.
    pub async fn send_all(
        &self,
        data: &[u8],
        timeout: Duration,
        running: &AtomicBool,
    ) -> Result<()> {
        let mut sent = 0;
        while sent < data.len() {
            if !running.load(Ordering::Relaxed) {
                return Err(Error::Closed);
            }
            self.wait_writable(timeout, running).await?;
            match self.try_write(&data[sent..]) {
                Ok(0) => return Err(Error::Dropped),
                Ok(n) => sent += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => return Err(Error::Dropped),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_tcp_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(stream, Stream::Tcp(_)));
    }

    #[tokio::test]
    async fn test_connect_tcp_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect_tcp("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }

    #[tokio::test]
    async fn test_connect_tcp_dns_failure() {
        let result =
            connect_tcp("no-such-host.invalid", 22, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Dns(_))));
    }

    #[tokio::test]
    async fn test_recv_appends_to_staging() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            peer.write_all(b"hello").await.unwrap();
            peer.write_all(b" world").await.unwrap();
            peer.flush().await.unwrap();
            // Hold the socket open until the client is done reading.
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        let (reader, _writer) = stream.into_split();

        let running = AtomicBool::new(true);
        let mut staging = SecretBuffer::new();
        while staging.len() < 11 {
            reader
                .recv(&mut staging, Duration::from_secs(1), &running)
                .await
                .unwrap();
        }
        assert_eq!(staging.as_slice(), b"hello world");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_reports_drop_on_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (peer, _) = listener.accept().await.unwrap();
            drop(peer);
        });

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        let (reader, _writer) = stream.into_split();

        let running = AtomicBool::new(true);
        let mut staging = SecretBuffer::new();
        let result = loop {
            match reader
                .recv(&mut staging, Duration::from_secs(1), &running)
                .await
            {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert_eq!(result, Error::Dropped);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_readable_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let _server = tokio::spawn(async move {
            let (_peer, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        let (reader, _writer) = stream.into_split();

        let running = AtomicBool::new(true);
        let started = Instant::now();
        let result = reader
            .wait_readable(Duration::from_millis(50), &running)
            .await;
        assert_eq!(result, Err(Error::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_cleared_flag_cancels_wait_within_ticks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let _server = tokio::spawn(async move {
            let (_peer, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        let (reader, _writer) = stream.into_split();

        let running = AtomicBool::new(false);
        let result = reader
            .wait_readable(Duration::from_secs(10), &running)
            .await;
        assert_eq!(result, Err(Error::Closed));
    }

    #[tokio::test]
    async fn test_send_all_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (peer, _) = listener.accept().await.unwrap();
            use tokio::io::AsyncReadExt;
            let mut peer = peer;
            let mut buf = vec![0u8; 9];
            peer.read_exact(&mut buf).await.unwrap();
            buf
        });

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        let (_reader, writer) = stream.into_split();

        let running = AtomicBool::new(true);
        writer
            .send_all(b"transport", Duration::from_secs(1), &running)
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), b"transport");
    }
}
