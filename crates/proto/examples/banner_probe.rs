//! SSH Banner Probe Example
//!
//! This example demonstrates how to:
//! - Establish a transport to an SSH server
//! - Read the server's identification line over the raw bringup path
//! - Start the transport workers
//! - Wait (and time out) on the inbound packet queue
//!
//! Usage:
//!   cargo run --example banner_probe <host> [port]
//!
//! Example:
//!   cargo run --example banner_probe 127.0.0.1 22

use skiff_platform::MemoryLog;
use skiff_proto::ssh::channel::NullMux;
use skiff_proto::ssh::crypto::PlainCrypto;
use skiff_proto::ssh::session::SessionContext;
use skiff_proto::ssh::transport::Transport;
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("skiff_proto=debug")
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <host> [port]", args[0]);
        eprintln!("Example: {} 127.0.0.1 22", args[0]);
        std::process::exit(1);
    }

    let host = &args[1];
    let port: u16 = match args.get(2) {
        Some(p) => p.parse()?,
        None => 22,
    };

    let log = Arc::new(MemoryLog::new());
    let ctx = Arc::new(SessionContext::new(
        Arc::new(PlainCrypto),
        Arc::new(NullMux),
        log.clone(),
        Duration::from_secs(5),
    ));

    println!("Connecting to {}:{}...", host, port);

    // Step 1: Establish the byte pipe
    let transport = Transport::new(ctx);
    transport.establish(host, port).await?;
    println!("✓ Connected");

    // Step 2: Read the server's identification line (raw, pre-packet)
    let mut banner = Vec::new();
    while !banner.ends_with(b"\n") && banner.len() < 512 {
        let chunk = transport.receive_raw().await?;
        if chunk.is_empty() {
            break;
        }
        banner.extend_from_slice(chunk.as_slice());
    }
    println!(
        "  Server banner: {}",
        String::from_utf8_lossy(&banner).trim_end()
    );

    // Step 3: Hand the socket to the workers
    transport.start().await?;
    println!("✓ Workers started");

    // Step 4: Without a key exchange above us nothing meaningful will
    // arrive, so demonstrate the timeout contract instead.
    let (command, packet) = transport
        .wait_for_packet(0, Duration::from_millis(500))
        .await;
    if packet.is_empty() {
        println!("  No packet within 500ms (command {} echoed back)", command);
    } else {
        println!("  Received a packet with command {}", command);
    }

    transport.disconnect().await;
    println!("✓ Disconnected");

    for line in log.drain() {
        println!("  log: {}", line);
    }

    Ok(())
}
