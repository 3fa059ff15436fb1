//! Portable enumeration for targets without `getifaddrs`
//!
//! Reports loopback plus a single interface owning the probed source
//! address.

use super::{probe_primary_address, NetworkInterface};
use std::io;
use std::net::Ipv4Addr;

pub(super) fn list_system_interfaces() -> io::Result<Vec<NetworkInterface>> {
    let mut loopback = NetworkInterface::new("loopback", true);
    loopback.addrs.push(Ipv4Addr::LOCALHOST);

    let mut interfaces = vec![loopback];
    if let Some(ip) = probe_primary_address() {
        let mut primary = NetworkInterface::new("primary", true);
        primary.addrs.push(ip);
        interfaces.push(primary);
    }

    Ok(interfaces)
}
