//! Destination resolution
//!
//! Turns a request address into the ordered list of IPv4 endpoints to try.
//! Name lookups go through the [`Resolver`] trait so sessions and tests can
//! plug in their own DNS.

use crate::error::Socks5Error;
use crate::socks::types::{Destination, WireAddress};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use tokio::net::lookup_host;
use tracing::debug;

/// Default cap on resolved candidates per request
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

/// DNS collaborator
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `name` to at most `max` IPv4 addresses, in resolver order
    async fn resolve_name(&self, name: &str, max: usize) -> io::Result<Vec<Ipv4Addr>>;
}

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve_name(&self, name: &str, max: usize) -> io::Result<Vec<Ipv4Addr>> {
        let mut addrs: Vec<Ipv4Addr> = Vec::new();
        for addr in lookup_host((name, 0)).await? {
            if let IpAddr::V4(ip) = addr.ip() {
                if !addrs.contains(&ip) {
                    addrs.push(ip);
                }
            }
            if addrs.len() >= max {
                break;
            }
        }
        Ok(addrs)
    }
}

/// Resolve a request address into candidate destinations
///
/// # Arguments
///
/// * `address` - The request address
/// * `port` - The request port, applied to every candidate
/// * `resolver` - DNS collaborator used for domain names
/// * `max` - Upper bound on the number of candidates
///
/// # Returns
///
/// At least one destination. IPv6 fails with `AddressTypeNotSupported`; a
/// lookup error or an empty answer fails with `Resolution`.
pub async fn resolve_destinations(
    address: &WireAddress,
    port: u16,
    resolver: &dyn Resolver,
    max: usize,
) -> Result<Vec<Destination>, Socks5Error> {
    match address {
        WireAddress::Ipv4(ip) => Ok(vec![Destination::new(*ip, port)]),

        WireAddress::Domain(name) => {
            let addrs = resolver
                .resolve_name(name, max)
                .await
                .map_err(|e| Socks5Error::Resolution(format!("{}: {}", name, e)))?;

            if addrs.is_empty() {
                return Err(Socks5Error::Resolution(format!(
                    "{}: no IPv4 address",
                    name
                )));
            }

            let destinations: Vec<Destination> = addrs
                .into_iter()
                .take(max)
                .map(|ip| Destination::new(ip, port))
                .collect();

            debug!("Resolved {} to {} candidate(s)", name, destinations.len());
            Ok(destinations)
        }

        WireAddress::Ipv6(_) => Err(Socks5Error::AddressTypeNotSupported(
            crate::socks::consts::SOCKS5_ADDR_TYPE_IPV6,
        )),
    }
}
