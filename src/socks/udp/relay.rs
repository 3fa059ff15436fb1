//! UDP relay for SOCKS5 UDP ASSOCIATE sessions
//!
//! Moves datagrams between the client-facing relay socket and the outbound
//! socket for as long as the TCP control connection stays open.

use super::packet::{encode_datagram, UdpHeader};
use crate::config::SessionConfig;
use crate::socks::resolver::Resolver;
use crate::socks::types::WireAddress;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

/// Datagram counters of a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpRelayStats {
    /// Datagrams forwarded from the client to destinations
    pub to_remote: u64,
    /// Datagrams forwarded from destinations to the client
    pub to_client: u64,
    /// Datagrams dropped (bad header, fragment, unknown peer, send failure)
    pub dropped: u64,
}

enum Ready {
    Client(io::Result<(usize, SocketAddr)>),
    Remote(io::Result<(usize, SocketAddr)>),
    Control(io::Result<usize>),
}

/// UDP relay state for one association
pub struct UdpRelay {
    relay: UdpSocket,
    outbound: UdpSocket,
    resolver: Arc<dyn Resolver>,
    buffer_size: usize,
    poll_interval: Duration,
    client_peer: Option<SocketAddr>,
    last_header: Option<UdpHeader>,
    stats: UdpRelayStats,
}

impl UdpRelay {
    /// Create a relay
    ///
    /// # Arguments
    ///
    /// * `relay` - Socket the client sends its encapsulated datagrams to
    /// * `outbound` - Socket bound to the route address
    /// * `resolver` - DNS collaborator for domain destinations
    /// * `config` - Session configuration
    pub fn new(
        relay: UdpSocket,
        outbound: UdpSocket,
        resolver: Arc<dyn Resolver>,
        config: &SessionConfig,
    ) -> Self {
        UdpRelay {
            relay,
            outbound,
            resolver,
            buffer_size: config.udp_buffer_size,
            poll_interval: config.relay_poll_interval(),
            client_peer: None,
            last_header: None,
            stats: UdpRelayStats::default(),
        }
    }

    /// Client UDP endpoint learned from the latest client datagram
    pub fn client_peer(&self) -> Option<SocketAddr> {
        self.client_peer
    }

    /// Header of the latest client datagram
    pub fn last_header(&self) -> Option<&UdpHeader> {
        self.last_header.as_ref()
    }

    /// Run the relay until the control stream closes or a socket fails
    ///
    /// Bytes arriving on the control stream are discarded.
    pub async fn run<S>(&mut self, control: &mut S) -> UdpRelayStats
    where
        S: AsyncRead + Unpin,
    {
        let mut client_buf = vec![0u8; self.buffer_size];
        let mut remote_buf = vec![0u8; self.buffer_size];
        let mut control_buf = [0u8; 512];

        loop {
            let relay = &self.relay;
            let outbound = &self.outbound;
            let ready = tokio::time::timeout(self.poll_interval, async {
                tokio::select! {
                    result = relay.recv_from(&mut client_buf) => Ready::Client(result),
                    result = outbound.recv_from(&mut remote_buf) => Ready::Remote(result),
                    result = control.read(&mut control_buf) => Ready::Control(result),
                }
            })
            .await;

            match ready {
                Err(_) => {
                    trace!("UDP relay idle for {:?}", self.poll_interval);
                }

                Ok(Ready::Client(Ok((n, from)))) => {
                    self.forward_to_remote(&client_buf[..n], from).await;
                }
                Ok(Ready::Remote(Ok((n, from)))) => {
                    self.forward_to_client(&remote_buf[..n], from).await;
                }

                Ok(Ready::Control(Ok(0))) => {
                    debug!("Control connection closed, ending UDP association");
                    break;
                }
                Ok(Ready::Control(Ok(n))) => {
                    trace!("Discarding {} bytes on control connection", n);
                }

                Ok(Ready::Client(Err(e))) | Ok(Ready::Remote(Err(e))) => {
                    warn!("UDP relay socket error: {}", e);
                    break;
                }
                Ok(Ready::Control(Err(e))) => {
                    debug!("Control connection error: {}", e);
                    break;
                }
            }
        }

        self.stats
    }

    /// Strip the SOCKS5 header and send the payload to its destination
    async fn forward_to_remote(&mut self, datagram: &[u8], from: SocketAddr) {
        let (header, header_len) = match UdpHeader::decode(datagram) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Invalid SOCKS5 UDP packet from {}: {}", from, e);
                self.stats.dropped += 1;
                return;
            }
        };

        if header.is_fragmented() {
            warn!("Fragmented UDP packets not supported, dropping");
            self.stats.dropped += 1;
            return;
        }

        self.client_peer = Some(from);

        let target = match self.resolve(&header).await {
            Some(target) => target,
            None => {
                self.stats.dropped += 1;
                self.last_header = Some(header);
                return;
            }
        };

        let payload = &datagram[header_len..];
        match self.outbound.send_to(payload, target).await {
            Ok(_) => {
                trace!("UDP relay: sent {} bytes to {}", payload.len(), target);
                self.stats.to_remote += 1;
            }
            Err(e) => {
                warn!("UDP send to {} failed: {}", target, e);
                self.stats.dropped += 1;
            }
        }

        self.last_header = Some(header);
    }

    /// Prepend a SOCKS5 header and send the datagram to the client
    async fn forward_to_client(&mut self, payload: &[u8], from: SocketAddr) {
        let peer = match self.client_peer {
            Some(peer) => peer,
            None => {
                debug!("No client peer yet, dropping datagram from {}", from);
                self.stats.dropped += 1;
                return;
            }
        };

        let source = match from {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                debug!("Dropping datagram from IPv6 source {}", addr);
                self.stats.dropped += 1;
                return;
            }
        };

        let datagram = encode_datagram(&UdpHeader::from_source(source), payload);
        match self.relay.send_to(&datagram, peer).await {
            Ok(_) => {
                trace!("UDP relay: returned {} bytes from {} to {}", payload.len(), from, peer);
                self.stats.to_client += 1;
            }
            Err(e) => {
                warn!("UDP send to client {} failed: {}", peer, e);
                self.stats.dropped += 1;
            }
        }
    }

    async fn resolve(&self, header: &UdpHeader) -> Option<SocketAddr> {
        match &header.address {
            WireAddress::Ipv4(ip) => Some(SocketAddr::V4(SocketAddrV4::new(*ip, header.port))),
            WireAddress::Domain(name) => match self.resolver.resolve_name(name, 1).await {
                Ok(addrs) => match addrs.first() {
                    Some(ip) => Some(SocketAddr::V4(SocketAddrV4::new(*ip, header.port))),
                    None => {
                        warn!("UDP target {} has no IPv4 address", name);
                        None
                    }
                },
                Err(e) => {
                    warn!("Failed to resolve UDP target {}: {}", name, e);
                    None
                }
            },
            WireAddress::Ipv6(ip) => {
                debug!("Dropping datagram for IPv6 target {}", ip);
                None
            }
        }
    }
}
