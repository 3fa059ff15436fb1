//! `getifaddrs(3)` based enumeration

use super::NetworkInterface;
use std::ffi::CStr;
use std::io;
use std::net::Ipv4Addr;
use std::ptr;

/// Walk `getifaddrs` and group IPv4 addresses by interface name
pub(super) fn list_system_interfaces() -> io::Result<Vec<NetworkInterface>> {
    let mut head: *mut libc::ifaddrs = ptr::null_mut();

    let ret = unsafe { libc::getifaddrs(&mut head) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut interfaces: Vec<NetworkInterface> = Vec::new();
    let mut cursor = head;

    while !cursor.is_null() {
        // SAFETY: `cursor` is a node of the list returned by getifaddrs and
        // stays valid until freeifaddrs below.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_name.is_null() {
            continue;
        }
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        let flags = entry.ifa_flags as libc::c_int;
        let running = flags & libc::IFF_UP != 0 && flags & libc::IFF_RUNNING != 0;

        let index = match interfaces.iter().position(|i| i.name == name) {
            Some(index) => index,
            None => {
                interfaces.push(NetworkInterface::new(name, running));
                interfaces.len() - 1
            }
        };

        if let Some(ip) = unsafe { ipv4_of(entry.ifa_addr) } {
            if !interfaces[index].addrs.contains(&ip) {
                interfaces[index].addrs.push(ip);
            }
        }
    }

    unsafe { libc::freeifaddrs(head) };

    Ok(interfaces)
}

/// IPv4 address of a `sockaddr`, if it is one
///
/// # Safety
///
/// `sa` must be null or point to a valid `sockaddr` whose storage matches
/// its `sa_family`.
unsafe fn ipv4_of(sa: *const libc::sockaddr) -> Option<Ipv4Addr> {
    if sa.is_null() || (*sa).sa_family as libc::c_int != libc::AF_INET {
        return None;
    }
    let sin = &*(sa as *const libc::sockaddr_in);
    Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
}
