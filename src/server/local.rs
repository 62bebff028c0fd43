//! Listening socket setup and LAN address discovery.

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};

/// Bind a non-blocking listener ready to hand to `axum_server`.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).with_context(|| {
        format!(
            "Failed to bind to {addr} - port already in use.\n\n\
             Is another lanshare instance running?\n\
             Or is another service using this port?"
        )
    })?;

    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;

    Ok(listener)
}

/// Best-effort local non-loopback IP, used to print a reachable URL.
/// Falls back to `127.0.0.1`.
pub fn local_ip() -> IpAddr {
    match detect_local_ip() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "local IP detection failed");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn detect_local_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind socket for IP detection")?;

    // No packet is sent; connecting only selects the outbound interface
    socket
        .connect("8.8.8.8:80")
        .context("Failed to connect socket for IP detection")?;

    let local_addr = socket.local_addr().context("Failed to get local address")?;

    Ok(local_addr.ip())
}

/// URL peers should open: the LAN address when bound to all interfaces.
pub fn share_url(bound: SocketAddr) -> String {
    let ip = if bound.ip().is_unspecified() {
        local_ip()
    } else {
        bound.ip()
    };
    format!("http://{}", SocketAddr::new(ip, bound.port()))
}
