//! Network interface enumeration
//!
//! The router only needs each interface's IPv4 addresses and two flags:
//! whether it is running and whether it is the primary (default-route)
//! interface. Enumeration sits behind [`InterfaceProvider`] so address
//! selection can be exercised without touching the host.

#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod fallback;

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tracing::debug;

/// Public address the primary-interface probe "connects" to. A UDP connect
/// sends nothing; it only makes the kernel pick a source address.
const PROBE_TARGET: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 53);

/// A local network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name
    pub name: String,
    /// IPv4 addresses, in enumeration order
    pub addrs: Vec<Ipv4Addr>,
    /// Up and running
    pub is_running: bool,
    /// Carries the default route
    pub is_primary: bool,
}

impl NetworkInterface {
    /// Create an interface with no addresses
    pub fn new(name: impl Into<String>, is_running: bool) -> Self {
        NetworkInterface {
            name: name.into(),
            addrs: Vec::new(),
            is_running,
            is_primary: false,
        }
    }

    /// Whether every address is a loopback address
    pub fn is_loopback(&self) -> bool {
        !self.addrs.is_empty() && self.addrs.iter().all(|ip| ip.is_loopback())
    }
}

/// Interface enumeration collaborator
pub trait InterfaceProvider: Send + Sync {
    /// List the host's interfaces
    fn list_interfaces(&self) -> io::Result<Vec<NetworkInterface>>;
}

/// Interfaces of the running host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceProvider for SystemInterfaces {
    fn list_interfaces(&self) -> io::Result<Vec<NetworkInterface>> {
        #[cfg(unix)]
        let mut interfaces = unix::list_system_interfaces()?;
        #[cfg(not(unix))]
        let mut interfaces = fallback::list_system_interfaces()?;

        mark_primary(&mut interfaces, probe_primary_address());
        debug!("Enumerated {} interface(s)", interfaces.len());
        Ok(interfaces)
    }
}

/// Flag the primary interface
///
/// The interface owning `probe` wins; without a probe result the first
/// running, non-loopback interface with an address is used.
pub fn mark_primary(interfaces: &mut [NetworkInterface], probe: Option<Ipv4Addr>) {
    for iface in interfaces.iter_mut() {
        iface.is_primary = false;
    }

    let by_probe = probe.and_then(|ip| interfaces.iter().position(|i| i.addrs.contains(&ip)));
    let index = by_probe.or_else(|| {
        interfaces
            .iter()
            .position(|i| i.is_running && !i.addrs.is_empty() && !i.is_loopback())
    });

    if let Some(index) = index {
        interfaces[index].is_primary = true;
    }
}

/// Source address the kernel would use to reach a public host
pub(crate) fn probe_primary_address() -> Option<Ipv4Addr> {
    let probe = || -> io::Result<Option<Ipv4Addr>> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.connect(&SocketAddr::V4(PROBE_TARGET).into())?;
        Ok(socket
            .local_addr()?
            .as_socket_ipv4()
            .map(|addr| *addr.ip())
            .filter(|ip| !ip.is_unspecified()))
    };

    match probe() {
        Ok(ip) => ip,
        Err(e) => {
            debug!("Primary interface probe failed: {}", e);
            None
        }
    }
}

/// Find the interface owning `addr`
pub fn find_interface_by_address(
    interfaces: &[NetworkInterface],
    addr: Ipv4Addr,
) -> Option<&NetworkInterface> {
    interfaces.iter().find(|i| i.addrs.contains(&addr))
}

/// Find the first interface that is both primary and running and has an
/// address
pub fn find_primary_interface(interfaces: &[NetworkInterface]) -> Option<&NetworkInterface> {
    interfaces
        .iter()
        .find(|i| i.is_primary && i.is_running && !i.addrs.is_empty())
}
