//! Local X11 display connector.
//!
//! X11 forwarding needs a second byte pipe: one from the client host to
//! its own X server. This module parses the display specification and
//! opens that pipe - over AF_UNIX on POSIX (`/tmp/.X11-unix/X<display>`),
//! over loopback TCP elsewhere (`127.0.0.1:6000 + display`).
//!
//! Only local displays are supported. A specification naming a remote
//! host is rejected; forwarding to a remote X server is a job for the
//! layer above.

use crate::ssh::error::{Error, Result};
use crate::ssh::socket::{self, Stream};
use std::time::Duration;

/// Directory holding AF_UNIX X display sockets on POSIX systems.
#[cfg(unix)]
const X11_UNIX_DIR: &str = "/tmp/.X11-unix";

/// Base TCP port for X displays; display N listens on 6000 + N.
#[cfg(not(unix))]
const X11_TCP_PORT_BASE: u16 = 6000;

/// A parsed display specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayAddr {
    /// Display number (the `1` in `:1.0`).
    pub display: u32,
    /// Screen number (the `0` in `:1.0`); defaults to 0 when omitted.
    pub screen: u32,
}

/// Parses a display specification of the form `[prefix]:<display>[.<screen>]`.
///
/// Accepted prefixes are empty, `unix`, and `localhost` - the spellings
/// of "this machine". Anything else names a remote X server and is
/// rejected.
///
/// # Example
///
/// ```rust
/// use skiff_proto::ssh::x11::parse_display;
///
/// let addr = parse_display("localhost:10.0").unwrap();
/// assert_eq!(addr.display, 10);
/// assert_eq!(addr.screen, 0);
/// ```
pub fn parse_display(display: &str) -> Result<DisplayAddr> {
    let colon = display
        .find(':')
        .ok_or_else(|| Error::Connect(format!("malformed display '{}'", display)))?;

    let prefix = &display[..colon];
    if !matches!(prefix, "" | "unix" | "localhost") {
        return Err(Error::Connect(format!(
            "remote X11 display '{}' is not supported",
            display
        )));
    }

    let rest = &display[colon + 1..];
    let (display_num, screen_num) = match rest.find('.') {
        Some(dot) => (&rest[..dot], &rest[dot + 1..]),
        None => (rest, "0"),
    };

    let display_num = display_num
        .parse::<u32>()
        .map_err(|_| Error::Connect(format!("malformed display '{}'", display)))?;
    let screen_num = screen_num
        .parse::<u32>()
        .map_err(|_| Error::Connect(format!("malformed display '{}'", display)))?;

    Ok(DisplayAddr {
        display: display_num,
        screen: screen_num,
    })
}

/// Reads the display specification from `$DISPLAY`.
///
/// This is the only environment variable the transport consults.
pub fn local_display() -> Result<String> {
    std::env::var("DISPLAY")
        .map_err(|_| Error::Connect("DISPLAY is not set".to_string()))
}

/// Connects to the local X display named by `display`.
#[cfg(unix)]
pub async fn connect_display(display: &str, timeout: Duration) -> Result<Stream> {
    let addr = parse_display(display)?;
    let path = std::path::PathBuf::from(format!("{}/X{}", X11_UNIX_DIR, addr.display));
    socket::connect_unix(&path, timeout).await
}

/// Connects to the local X display named by `display`.
#[cfg(not(unix))]
pub async fn connect_display(display: &str, timeout: Duration) -> Result<Stream> {
    let addr = parse_display(display)?;
    let port = X11_TCP_PORT_BASE + addr.display as u16;
    socket::connect_tcp("127.0.0.1", port, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_display() {
        assert_eq!(
            parse_display(":1.0").unwrap(),
            DisplayAddr {
                display: 1,
                screen: 0
            }
        );
    }

    #[test]
    fn test_parse_localhost_display() {
        assert_eq!(
            parse_display("localhost:10.0").unwrap(),
            DisplayAddr {
                display: 10,
                screen: 0
            }
        );
    }

    #[test]
    fn test_parse_unix_prefix() {
        assert_eq!(
            parse_display("unix:3.2").unwrap(),
            DisplayAddr {
                display: 3,
                screen: 2
            }
        );
    }

    #[test]
    fn test_parse_screen_defaults_to_zero() {
        assert_eq!(
            parse_display(":0").unwrap(),
            DisplayAddr {
                display: 0,
                screen: 0
            }
        );
    }

    #[test]
    fn test_parse_empty_numbers_rejected() {
        assert!(parse_display(":").is_err());
        assert!(parse_display(":.0").is_err());
        assert!(parse_display(":1.").is_err());
    }

    #[test]
    fn test_parse_remote_host_rejected() {
        let result = parse_display("workstation:0.0");
        match result {
            Err(Error::Connect(msg)) => assert!(msg.contains("not supported")),
            other => panic!("Expected Connect error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_colon_rejected() {
        assert!(parse_display("1.0").is_err());
        assert!(parse_display("").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_display_absent_socket() {
        // Display 4094 will not have a socket on any sane machine.
        let result = connect_display(":4094.0", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }
}
