//! Outbound socket builder
//!
//! Every outbound socket is bound to the route address before it is used, so
//! traffic leaves through the interface that owns that address.

use crate::error::Socks5Error;
use crate::socks::types::Destination;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream, UdpSocket};
use tracing::debug;

/// Connect to the first reachable candidate
///
/// Each candidate gets a fresh socket bound to `route_ip:0` and its own
/// `timeout`. Candidates are tried in order.
///
/// # Arguments
///
/// * `candidates` - Destinations to try
/// * `route_ip` - Local address the socket is bound to
/// * `timeout` - Per-candidate connect timeout
pub async fn connect_tcp(
    candidates: &[Destination],
    route_ip: Ipv4Addr,
    timeout: Duration,
) -> Result<(TcpStream, Destination), Socks5Error> {
    let mut last_error: Option<io::Error> = None;

    for dest in candidates {
        match connect_one(*dest, route_ip, timeout).await {
            Ok(stream) => {
                debug!("Connected to {} via {}", dest, route_ip);
                return Ok((stream, *dest));
            }
            Err(e) => {
                debug!("Connect to {} via {} failed: {}", dest, route_ip, e);
                last_error = Some(e);
            }
        }
    }

    Err(Socks5Error::ConnectFailed(match last_error {
        Some(e) => format!(
            "{} candidate(s) via {} failed, last error: {}",
            candidates.len(),
            route_ip,
            e
        ),
        None => "no candidates".to_string(),
    }))
}

async fn connect_one(
    dest: Destination,
    route_ip: Ipv4Addr,
    timeout: Duration,
) -> io::Result<TcpStream> {
    let socket = TcpSocket::new_v4()?;
    socket.bind(SocketAddr::new(route_ip.into(), 0))?;

    match tokio::time::timeout(timeout, socket.connect(dest.socket_addr())).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect timed out after {:?}", timeout),
        )),
    }
}

/// Bind a UDP socket to `ip` with an ephemeral port
pub fn bind_udp(ip: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(ip.into(), 0).into())?;
    UdpSocket::from_std(socket.into())
}
