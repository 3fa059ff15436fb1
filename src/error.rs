//! Error types for s5router
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Main error type for router startup and operation
#[derive(Error, Debug)]
pub enum RouterError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested listen address is not owned by any interface
    #[error("No network interface found with IPv4 address: {0}")]
    NoListenInterface(Ipv4Addr),

    /// The requested route address is not owned by any interface
    #[error("No network interface found for route address: {0}")]
    NoRouteInterface(Ipv4Addr),

    /// Wildcard route requested but no interface is both primary and running
    #[error("No primary running network interface available for routing")]
    NoPrimaryInterface,

    /// Every listening socket failed to bind or listen
    #[error("No listening socket could be opened on port {0}")]
    NoListeners(u16),

    /// `start()` called while the router is already serving
    #[error("Router is already running")]
    AlreadyRunning,
}

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Input ended before a complete structure could be decoded
    #[error("Truncated message: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required by the fields decoded so far
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Destination could not be resolved to any IPv4 address
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// No candidate destination accepted the connection
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// General SOCKS server failure
    #[error("General SOCKS server failure: {0}")]
    GeneralFailure(String),

    /// IO error on the client stream
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Socks5Error {
    /// Reply code to send back for this error.
    ///
    /// `None` means no request reply applies: the failure happened before a
    /// request was read, or the client stream itself is gone.
    pub fn reply_code(&self) -> Option<Socks5ReplyCode> {
        match self {
            Socks5Error::CommandNotSupported(_) => Some(Socks5ReplyCode::CommandNotSupported),
            Socks5Error::AddressTypeNotSupported(_) => {
                Some(Socks5ReplyCode::AddressTypeNotSupported)
            }
            Socks5Error::InvalidDomain(_)
            | Socks5Error::Resolution(_)
            | Socks5Error::ConnectFailed(_)
            | Socks5Error::GeneralFailure(_) => Some(Socks5ReplyCode::GeneralFailure),
            Socks5Error::UnsupportedVersion(_)
            | Socks5Error::NoAcceptableMethod
            | Socks5Error::Truncated { .. }
            | Socks5Error::Io(_) => None,
        }
    }

    /// Terminal handshake status for this error
    pub fn status(&self) -> HandshakeStatus {
        match self {
            Socks5Error::UnsupportedVersion(_) => HandshakeStatus::InvalidVersion,
            Socks5Error::NoAcceptableMethod => HandshakeStatus::UnsupportedAuthMethod,
            Socks5Error::Truncated { .. } | Socks5Error::Io(_) => HandshakeStatus::UnknownError,
            other => other
                .reply_code()
                .map(HandshakeStatus::from)
                .unwrap_or(HandshakeStatus::GeneralFailure),
        }
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            other => Err(Socks5Error::GeneralFailure(format!(
                "unknown reply code {other:#04x}"
            ))),
        }
    }
}

/// Outcome of one session's handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// Request served, relay may start
    Ok,
    /// UDP association established but the client's UDP peer is learned from
    /// its first datagram (request destination was `0.0.0.0:0`)
    UdpAssociationPending,
    /// Client stream failed or ended mid-handshake
    UnknownError,
    /// Greeting carried a version other than 5
    InvalidVersion,
    /// Client offered no acceptable method (strict negotiation only)
    UnsupportedAuthMethod,
    /// General failure (resolution, socket creation, connect)
    GeneralFailure,
    /// Connection not allowed by ruleset
    ConnectionNotAllowedByRuleset,
    /// Network unreachable
    NetworkUnreachable,
    /// Host unreachable
    HostUnreachable,
    /// Destination refused the connection
    ConnectionRefused,
    /// TTL expired
    TtlExpired,
    /// Command other than CONNECT / UDP ASSOCIATE
    UnsupportedCommand,
    /// IPv6 or unknown address type
    UnsupportedAddressType,
}

impl HandshakeStatus {
    /// Whether the session proceeds to a relay loop
    pub fn is_success(self) -> bool {
        matches!(
            self,
            HandshakeStatus::Ok | HandshakeStatus::UdpAssociationPending
        )
    }
}

impl From<Socks5ReplyCode> for HandshakeStatus {
    fn from(code: Socks5ReplyCode) -> Self {
        match code {
            Socks5ReplyCode::Succeeded => HandshakeStatus::Ok,
            Socks5ReplyCode::GeneralFailure => HandshakeStatus::GeneralFailure,
            Socks5ReplyCode::ConnectionNotAllowed => HandshakeStatus::ConnectionNotAllowedByRuleset,
            Socks5ReplyCode::NetworkUnreachable => HandshakeStatus::NetworkUnreachable,
            Socks5ReplyCode::HostUnreachable => HandshakeStatus::HostUnreachable,
            Socks5ReplyCode::ConnectionRefused => HandshakeStatus::ConnectionRefused,
            Socks5ReplyCode::TtlExpired => HandshakeStatus::TtlExpired,
            Socks5ReplyCode::CommandNotSupported => HandshakeStatus::UnsupportedCommand,
            Socks5ReplyCode::AddressTypeNotSupported => HandshakeStatus::UnsupportedAddressType,
        }
    }
}
