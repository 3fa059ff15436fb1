//! SOCKS5 module for s5router
//!
//! This module implements the SOCKS5 protocol (RFC 1928) for the router:
//! wire codec, handshake, destination resolution, outbound sockets and the
//! TCP/UDP relay loops.

pub mod auth;
pub mod command;
pub mod consts;
pub mod handshake;
pub mod outbound;
pub mod resolver;
pub mod tcp_relay;
pub mod types;
pub mod udp;

pub use auth::{negotiate_method, MethodChoice};
pub use command::{read_request, send_reply, Reply};
pub use handshake::{Handshake, HandshakeOutcome, HandshakeState};
pub use resolver::{resolve_destinations, Resolver, SystemResolver};
pub use tcp_relay::{relay_tcp, RelayStats};
pub use types::{Destination, RequestMessage, SocksCommand, WireAddress};
pub use udp::{UdpHeader, UdpRelay, UdpRelayStats};
