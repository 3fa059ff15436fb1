//! Router configuration types
//!
//! Defines the listen/route addresses and the per-session tuning knobs.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default SOCKS5 listen port
pub const DEFAULT_PORT: u16 = 7530;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_addr() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Router configuration
    #[serde(default)]
    pub router: RouterConfig,
}

/// Router configuration
///
/// `0.0.0.0` as listen address means "every address of every running
/// interface"; as route address it means "the primary interface".
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouterConfig {
    /// TCP port the listeners accept on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to listen on
    #[serde(default = "default_addr")]
    pub listen: Ipv4Addr,

    /// Local address outbound sockets are bound to
    #[serde(default = "default_addr")]
    pub route: Ipv4Addr,

    /// Session tuning
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            listen: default_addr(),
            route: default_addr(),
            session: SessionConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.session.validate()
    }
}

fn default_max_sessions() -> usize {
    1024
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_relay_poll_interval() -> u64 {
    10
}

fn default_tcp_chunk_size() -> usize {
    4096
}

fn default_udp_buffer_size() -> usize {
    65535
}

fn default_max_dns_candidates() -> usize {
    10
}

fn default_listen_backlog() -> i32 {
    4096
}

/// Per-session configuration, shared read-only by every session
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Maximum number of concurrently live sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Connect timeout per candidate, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Bounded wait of the relay loops, in seconds
    #[serde(default = "default_relay_poll_interval")]
    pub relay_poll_interval: u64,

    /// TCP relay read size
    #[serde(default = "default_tcp_chunk_size")]
    pub tcp_chunk_size: usize,

    /// UDP relay receive buffer size
    #[serde(default = "default_udp_buffer_size")]
    pub udp_buffer_size: usize,

    /// Cap on resolved candidates per request
    #[serde(default = "default_max_dns_candidates")]
    pub max_dns_candidates: usize,

    /// Terminate the handshake when the client offers no acceptable method
    #[serde(default)]
    pub strict_method_negotiation: bool,

    /// Listen backlog of each listening socket
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            connect_timeout: default_connect_timeout(),
            relay_poll_interval: default_relay_poll_interval(),
            tcp_chunk_size: default_tcp_chunk_size(),
            udp_buffer_size: default_udp_buffer_size(),
            max_dns_candidates: default_max_dns_candidates(),
            strict_method_negotiation: false,
            listen_backlog: default_listen_backlog(),
        }
    }
}

impl SessionConfig {
    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Relay poll interval as a duration
    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_secs(self.relay_poll_interval)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sessions == 0 {
            return Err("max_sessions must be greater than 0".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.relay_poll_interval == 0 {
            return Err("relay_poll_interval must be greater than 0".to_string());
        }
        if self.tcp_chunk_size == 0 {
            return Err("tcp_chunk_size must be greater than 0".to_string());
        }
        if self.udp_buffer_size == 0 {
            return Err("udp_buffer_size must be greater than 0".to_string());
        }
        if self.max_dns_candidates == 0 {
            return Err("max_dns_candidates must be greater than 0".to_string());
        }
        if self.listen_backlog <= 0 {
            return Err("listen_backlog must be greater than 0".to_string());
        }
        Ok(())
    }
}
