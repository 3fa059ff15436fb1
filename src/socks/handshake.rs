//! SOCKS5 handshake state machine
//!
//! Drives one control connection from greeting to the request reply and
//! hands back the sockets the relay loop needs.

use crate::config::SessionConfig;
use crate::error::{HandshakeStatus, Socks5Error, Socks5ReplyCode};
use crate::socks::auth::negotiate_method;
use crate::socks::command::{read_request, send_reply, Reply};
use crate::socks::consts::*;
use crate::socks::outbound::{bind_udp, connect_tcp};
use crate::socks::resolver::{resolve_destinations, Resolver};
use crate::socks::types::{Destination, RequestMessage, SocksCommand, WireAddress};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, trace};

/// Handshake progress, logged at trace level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for `VER NMETHODS METHODS`
    AwaitGreeting,
    /// Waiting for the request
    AwaitRequest,
    /// Resolving the destination
    Resolving,
    /// Opening outbound sockets
    Establishing,
    /// Reply sent
    Replied,
    /// Terminated with an error
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::AwaitGreeting => "await-greeting",
            HandshakeState::AwaitRequest => "await-request",
            HandshakeState::Resolving => "resolving",
            HandshakeState::Establishing => "establishing",
            HandshakeState::Replied => "replied",
            HandshakeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Sockets produced by a successful handshake
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// CONNECT succeeded
    Connected {
        /// Connection to the destination, bound to the route address
        outbound: TcpStream,
        /// Candidate that accepted the connection
        remote: Destination,
    },
    /// UDP ASSOCIATE succeeded
    UdpAssociated {
        /// Socket facing the client, on the control connection's local IP
        relay: UdpSocket,
        /// Socket facing destinations, bound to the route address
        outbound: UdpSocket,
        /// Endpoint reported to the client
        bound: SocketAddrV4,
        /// The client sent `0.0.0.0:0`; its UDP peer is learned later
        pending: bool,
    },
}

impl HandshakeOutcome {
    /// Terminal status of the handshake
    pub fn status(&self) -> HandshakeStatus {
        match self {
            HandshakeOutcome::UdpAssociated { pending: true, .. } => {
                HandshakeStatus::UdpAssociationPending
            }
            _ => HandshakeStatus::Ok,
        }
    }
}

/// Handshake context for one session
pub struct Handshake {
    route_ip: Ipv4Addr,
    local_ip: Ipv4Addr,
    resolver: Arc<dyn Resolver>,
    config: Arc<SessionConfig>,
}

impl Handshake {
    /// Create a handshake
    ///
    /// # Arguments
    ///
    /// * `route_ip` - Address outbound sockets are bound to
    /// * `local_ip` - Local address of the control connection
    /// * `resolver` - DNS collaborator
    /// * `config` - Session configuration
    pub fn new(
        route_ip: Ipv4Addr,
        local_ip: Ipv4Addr,
        resolver: Arc<dyn Resolver>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Handshake {
            route_ip,
            local_ip,
            resolver,
            config,
        }
    }

    /// Run the handshake on the control stream
    ///
    /// Failures that map to a reply code are answered before the error is
    /// returned; the caller only has to close the connection.
    pub async fn run<S>(&self, stream: &mut S) -> Result<HandshakeOutcome, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.enter(HandshakeState::AwaitGreeting);
        if let Err(e) = negotiate_method(stream, self.config.strict_method_negotiation).await {
            self.enter(HandshakeState::Failed);
            return Err(e);
        }

        self.enter(HandshakeState::AwaitRequest);
        let request = match read_request(stream).await {
            Ok(request) => request,
            Err(e) => return self.fail(stream, None, e).await,
        };

        match self.serve(stream, &request).await {
            Ok(outcome) => {
                self.enter(HandshakeState::Replied);
                Ok(outcome)
            }
            Err(e) => self.fail(stream, Some(&request), e).await,
        }
    }

    async fn serve<S>(
        &self,
        stream: &mut S,
        request: &RequestMessage,
    ) -> Result<HandshakeOutcome, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match request.command {
            SocksCommand::Connect => self.connect(stream, request).await,
            SocksCommand::UdpAssociate => self.udp_associate(stream, request).await,
            SocksCommand::Bind => Err(Socks5Error::CommandNotSupported(SOCKS5_CMD_TCP_BIND)),
        }
    }

    async fn connect<S>(
        &self,
        stream: &mut S,
        request: &RequestMessage,
    ) -> Result<HandshakeOutcome, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.enter(HandshakeState::Resolving);
        let candidates = resolve_destinations(
            &request.address,
            request.port,
            self.resolver.as_ref(),
            self.config.max_dns_candidates,
        )
        .await?;

        self.enter(HandshakeState::Establishing);
        let (outbound, remote) =
            connect_tcp(&candidates, self.route_ip, self.config.connect_timeout()).await?;

        send_reply(stream, &Reply::for_request(request, Socks5ReplyCode::Succeeded)).await?;

        Ok(HandshakeOutcome::Connected { outbound, remote })
    }

    async fn udp_associate<S>(
        &self,
        stream: &mut S,
        request: &RequestMessage,
    ) -> Result<HandshakeOutcome, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let WireAddress::Ipv6(_) = request.address {
            return Err(Socks5Error::AddressTypeNotSupported(SOCKS5_ADDR_TYPE_IPV6));
        }

        self.enter(HandshakeState::Establishing);
        let outbound = bind_udp(self.route_ip).map_err(|e| {
            Socks5Error::GeneralFailure(format!("bind UDP on {}: {}", self.route_ip, e))
        })?;
        let relay = bind_udp(self.local_ip).map_err(|e| {
            Socks5Error::GeneralFailure(format!("bind UDP on {}: {}", self.local_ip, e))
        })?;

        let bound = match relay.local_addr()? {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                return Err(Socks5Error::GeneralFailure(format!(
                    "relay socket bound to IPv6 {}",
                    addr
                )))
            }
        };

        send_reply(stream, &Reply::bound(Socks5ReplyCode::Succeeded, bound)).await?;

        debug!("UDP relay bound to {} for request {}", bound, request);

        Ok(HandshakeOutcome::UdpAssociated {
            relay,
            outbound,
            bound,
            pending: request.is_wildcard_destination(),
        })
    }

    async fn fail<S>(
        &self,
        stream: &mut S,
        request: Option<&RequestMessage>,
        err: Socks5Error,
    ) -> Result<HandshakeOutcome, Socks5Error>
    where
        S: AsyncWrite + Unpin,
    {
        self.enter(HandshakeState::Failed);

        if let Some(code) = err.reply_code() {
            let reply = match request {
                Some(request) => Reply::for_request(request, code),
                None => Reply::failure(code),
            };
            if let Err(e) = send_reply(stream, &reply).await {
                debug!("Failed to send {:?} reply: {}", code, e);
            }
        }

        Err(err)
    }

    fn enter(&self, state: HandshakeState) {
        trace!("Handshake state: {}", state);
    }
}
