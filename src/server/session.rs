//! Client session
//!
//! A session owns one accepted control connection for its whole life:
//! handshake first, then the relay loop that matches the outcome.

use crate::config::SessionConfig;
use crate::error::HandshakeStatus;
use crate::socks::handshake::{Handshake, HandshakeOutcome};
use crate::socks::resolver::Resolver;
use crate::socks::tcp_relay::relay_tcp;
use crate::socks::udp::UdpRelay;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info};

/// One client connection
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    route_ip: Ipv4Addr,
    config: Arc<SessionConfig>,
    resolver: Arc<dyn Resolver>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Session {
    /// Create a session for an accepted connection
    ///
    /// # Arguments
    ///
    /// * `stream` - The accepted control connection
    /// * `peer` - Client address
    /// * `route_ip` - Address outbound sockets are bound to
    /// * `config` - Session configuration
    /// * `resolver` - DNS collaborator
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        route_ip: Ipv4Addr,
        config: Arc<SessionConfig>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Session {
            stream,
            peer,
            route_ip,
            config,
            resolver,
            _permit: None,
        }
    }

    /// Hold `permit` until the session ends
    pub fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Run the session to completion
    ///
    /// Every socket the session owns is closed when this returns.
    pub async fn run(mut self) -> HandshakeStatus {
        let local_ip = self
            .stream
            .local_addr()
            .ok()
            .as_ref()
            .and_then(ipv4_of)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        let handshake = Handshake::new(
            self.route_ip,
            local_ip,
            self.resolver.clone(),
            self.config.clone(),
        );

        let outcome = match handshake.run(&mut self.stream).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Session {} handshake failed: {}", self.peer, e);
                return e.status();
            }
        };

        let status = outcome.status();

        match outcome {
            HandshakeOutcome::Connected { outbound, remote } => {
                info!("{} connected to {} via {}", self.peer, remote, self.route_ip);
                let stats = relay_tcp(
                    self.stream,
                    outbound,
                    self.config.tcp_chunk_size,
                    self.config.relay_poll_interval(),
                )
                .await;
                debug!(
                    "{} -> {} closed: {} bytes up, {} bytes down",
                    self.peer, remote, stats.client_to_remote, stats.remote_to_client
                );
            }

            HandshakeOutcome::UdpAssociated {
                relay,
                outbound,
                bound,
                pending,
            } => {
                info!(
                    "{} associated UDP relay {} via {}{}",
                    self.peer,
                    bound,
                    self.route_ip,
                    if pending { " (peer pending)" } else { "" }
                );
                let mut udp = UdpRelay::new(relay, outbound, self.resolver.clone(), &self.config);
                let stats = udp.run(&mut self.stream).await;
                debug!(
                    "{} UDP association closed: {} out, {} in, {} dropped",
                    self.peer, stats.to_remote, stats.to_client, stats.dropped
                );
            }
        }

        status
    }
}

/// IPv4 address of a socket address, if it has one
fn ipv4_of(addr: &SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}
