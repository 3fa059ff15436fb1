//! SOCKS5 type definitions
//!
//! Wire-level types shared by the handshake and the UDP relay. Every decode
//! function is bounds-checked against the length implied by the ATYP byte and
//! never reads past the input slice.

use super::consts::*;
use crate::error::Socks5Error;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection (refused)
    Bind,
    /// UDP ASSOCIATE - establish UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Some(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Address as it appears on the wire: `ATYP` followed by its payload.
///
/// The port is not part of this type; requests and UDP headers carry it
/// right after the address payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireAddress {
    /// `ATYP=1`, 4 byte payload
    Ipv4(Ipv4Addr),
    /// `ATYP=3`, length-prefixed name of at most 255 bytes
    Domain(String),
    /// `ATYP=4`, 16 byte payload (decoded, never served)
    Ipv6(Ipv6Addr),
}

impl WireAddress {
    /// Create a domain address, rejecting empty or over-long names
    pub fn domain(name: impl Into<String>) -> Result<Self, Socks5Error> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_DOMAIN_LEN {
            return Err(Socks5Error::InvalidDomain(name));
        }
        Ok(WireAddress::Domain(name))
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            WireAddress::Ipv4(_) => SOCKS5_ADDR_TYPE_IPV4,
            WireAddress::Domain(_) => SOCKS5_ADDR_TYPE_DOMAIN,
            WireAddress::Ipv6(_) => SOCKS5_ADDR_TYPE_IPV6,
        }
    }

    /// On-wire size: the type byte plus the payload
    pub fn wire_len(&self) -> usize {
        1 + match self {
            WireAddress::Ipv4(_) => IPV4_ADDR_LEN,
            WireAddress::Domain(name) => 1 + name.len().min(MAX_DOMAIN_LEN),
            WireAddress::Ipv6(_) => IPV6_ADDR_LEN,
        }
    }

    /// Whether this is the IPv4 wildcard `0.0.0.0`
    pub fn is_unspecified(&self) -> bool {
        matches!(self, WireAddress::Ipv4(ip) if ip.is_unspecified())
    }

    /// Decode an address from the start of `buf`.
    ///
    /// Returns the address and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Socks5Error> {
        let atyp = *buf.first().ok_or(Socks5Error::Truncated {
            needed: 1,
            available: 0,
        })?;

        match atyp {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let end = 1 + IPV4_ADDR_LEN;
                let payload = take(buf, 1, end)?;
                let octets: [u8; IPV4_ADDR_LEN] = [payload[0], payload[1], payload[2], payload[3]];
                Ok((WireAddress::Ipv4(Ipv4Addr::from(octets)), end))
            }

            SOCKS5_ADDR_TYPE_DOMAIN => {
                let len = take(buf, 1, 2)?[0] as usize;
                if len == 0 {
                    return Err(Socks5Error::InvalidDomain(String::new()));
                }
                let end = 2 + len;
                let name = take(buf, 2, end)?;
                let name = String::from_utf8(name.to_vec()).map_err(|e| {
                    Socks5Error::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
                })?;
                Ok((WireAddress::Domain(name), end))
            }

            SOCKS5_ADDR_TYPE_IPV6 => {
                let end = 1 + IPV6_ADDR_LEN;
                let payload = take(buf, 1, end)?;
                let mut octets = [0u8; IPV6_ADDR_LEN];
                octets.copy_from_slice(payload);
                Ok((WireAddress::Ipv6(Ipv6Addr::from(octets)), end))
            }

            other => Err(Socks5Error::AddressTypeNotSupported(other)),
        }
    }

    /// Append the encoded address to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.addr_type());
        match self {
            WireAddress::Ipv4(ip) => dst.put_slice(&ip.octets()),
            WireAddress::Domain(name) => {
                let name = &name.as_bytes()[..name.len().min(MAX_DOMAIN_LEN)];
                dst.put_u8(name.len() as u8);
                dst.put_slice(name);
            }
            WireAddress::Ipv6(ip) => dst.put_slice(&ip.octets()),
        }
    }
}

impl fmt::Display for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireAddress::Ipv4(ip) => write!(f, "{}", ip),
            WireAddress::Domain(name) => write!(f, "{}", name),
            WireAddress::Ipv6(ip) => write!(f, "[{}]", ip),
        }
    }
}

impl From<Ipv4Addr> for WireAddress {
    fn from(ip: Ipv4Addr) -> Self {
        WireAddress::Ipv4(ip)
    }
}

impl Default for WireAddress {
    fn default() -> Self {
        WireAddress::Ipv4(Ipv4Addr::UNSPECIFIED)
    }
}

/// `buf[start..end]`, or `Truncated` when `buf` is shorter than `end`
fn take(buf: &[u8], start: usize, end: usize) -> Result<&[u8], Socks5Error> {
    buf.get(start..end).ok_or(Socks5Error::Truncated {
        needed: end,
        available: buf.len(),
    })
}

/// Read a big-endian port at `offset`
pub(crate) fn decode_port(buf: &[u8], offset: usize) -> Result<u16, Socks5Error> {
    let bytes = take(buf, offset, offset + PORT_LEN)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// A SOCKS5 request
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    /// Version byte as sent by the client
    pub version: u8,
    /// Requested command
    pub command: SocksCommand,
    /// Reserved byte as sent by the client
    pub reserved: u8,
    /// Destination address
    pub address: WireAddress,
    /// Destination port
    pub port: u16,
}

impl RequestMessage {
    /// Create a version 5 request
    pub fn new(command: SocksCommand, address: WireAddress, port: u16) -> Self {
        RequestMessage {
            version: SOCKS5_VERSION,
            command,
            reserved: SOCKS5_RESERVED,
            address,
            port,
        }
    }

    /// Total encoded size
    pub fn wire_len(&self) -> usize {
        REQUEST_PREFIX_LEN + self.address.wire_len() + PORT_LEN
    }

    /// Whether the destination is the `0.0.0.0:0` "not yet known" marker
    pub fn is_wildcard_destination(&self) -> bool {
        self.address.is_unspecified() && self.port == 0
    }

    /// Decode a complete request from `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, Socks5Error> {
        let prefix = take(buf, 0, REQUEST_PREFIX_LEN)?;
        let (version, cmd_byte, reserved) = (prefix[0], prefix[1], prefix[2]);

        let (address, addr_len) = WireAddress::decode(&buf[REQUEST_PREFIX_LEN..])?;
        let port = decode_port(buf, REQUEST_PREFIX_LEN + addr_len)?;

        let command =
            SocksCommand::from_byte(cmd_byte).ok_or(Socks5Error::CommandNotSupported(cmd_byte))?;

        Ok(RequestMessage {
            version,
            command,
            reserved,
            address,
            port,
        })
    }

    /// Encode the request
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u8(self.version);
        buf.put_u8(self.command.to_byte());
        buf.put_u8(self.reserved);
        self.address.encode(&mut buf);
        buf.put_u16(self.port);
        buf.freeze()
    }
}

impl fmt::Display for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.command, self.address, self.port)
    }
}

/// A resolved IPv4 endpoint to try for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Destination address
    pub addr: Ipv4Addr,
    /// Destination port
    pub port: u16,
}

impl Destination {
    /// Create a destination
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Destination { addr, port }
    }

    /// As a socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.addr, self.port))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks_command_from_byte() {
        assert_eq!(SocksCommand::from_byte(1), Some(SocksCommand::Connect));
        assert_eq!(SocksCommand::from_byte(2), Some(SocksCommand::Bind));
        assert_eq!(SocksCommand::from_byte(3), Some(SocksCommand::UdpAssociate));
        assert_eq!(SocksCommand::from_byte(4), None);
    }

    #[test]
    fn test_socks_command_display() {
        assert_eq!(format!("{}", SocksCommand::Connect), "CONNECT");
        assert_eq!(format!("{}", SocksCommand::UdpAssociate), "UDP ASSOCIATE");
    }

    #[test]
    fn test_wire_address_round_trip() {
        let encodings: Vec<Vec<u8>> = vec![
            vec![SOCKS5_ADDR_TYPE_IPV4, 192, 168, 1, 1],
            {
                let mut v = vec![SOCKS5_ADDR_TYPE_DOMAIN, 11];
                v.extend_from_slice(b"example.com");
                v
            },
            {
                let mut v = vec![SOCKS5_ADDR_TYPE_DOMAIN, 255];
                v.extend(std::iter::repeat(b'a').take(255));
                v
            },
            {
                let mut v = vec![SOCKS5_ADDR_TYPE_IPV6];
                v.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
                v
            },
        ];

        for bytes in encodings {
            let (addr, consumed) = WireAddress::decode(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(addr.wire_len(), bytes.len());
            let mut encoded = BytesMut::new();
            addr.encode(&mut encoded);
            assert_eq!(&encoded[..], &bytes[..]);
        }
    }

    #[test]
    fn test_wire_address_decode_truncated() {
        let full = {
            let mut v = vec![SOCKS5_ADDR_TYPE_DOMAIN, 4];
            v.extend_from_slice(b"test");
            v
        };
        for len in 0..full.len() {
            let result = WireAddress::decode(&full[..len]);
            assert!(
                matches!(result, Err(Socks5Error::Truncated { .. })),
                "prefix of {} bytes should be truncated",
                len
            );
        }

        let ipv4 = [SOCKS5_ADDR_TYPE_IPV4, 10, 0, 0];
        assert!(matches!(
            WireAddress::decode(&ipv4),
            Err(Socks5Error::Truncated {
                needed: 5,
                available: 4
            })
        ));

        let ipv6 = [SOCKS5_ADDR_TYPE_IPV6, 0, 0];
        assert!(matches!(
            WireAddress::decode(&ipv6),
            Err(Socks5Error::Truncated { needed: 17, .. })
        ));
    }

    #[test]
    fn test_wire_address_decode_unknown_type() {
        let result = WireAddress::decode(&[0x09, 1, 2, 3, 4]);
        assert!(matches!(
            result,
            Err(Socks5Error::AddressTypeNotSupported(0x09))
        ));
    }

    #[test]
    fn test_wire_address_decode_empty_domain() {
        let result = WireAddress::decode(&[SOCKS5_ADDR_TYPE_DOMAIN, 0, 0, 80]);
        assert!(matches!(result, Err(Socks5Error::InvalidDomain(_))));
    }

    #[test]
    fn test_wire_address_domain_constructor() {
        assert!(WireAddress::domain("example.com").is_ok());
        assert!(WireAddress::domain("").is_err());
        assert!(WireAddress::domain("a".repeat(256)).is_err());
    }

    #[test]
    fn test_wire_address_is_unspecified() {
        assert!(WireAddress::Ipv4(Ipv4Addr::UNSPECIFIED).is_unspecified());
        assert!(!WireAddress::Ipv4(Ipv4Addr::LOCALHOST).is_unspecified());
        assert!(!WireAddress::Domain("0.0.0.0".into()).is_unspecified());
    }

    #[test]
    fn test_request_message_round_trip() {
        let cases = vec![
            (
                SocksCommand::Connect,
                WireAddress::Ipv4(Ipv4Addr::new(93, 184, 216, 34)),
                80,
            ),
            (
                SocksCommand::Bind,
                WireAddress::domain("example.org").unwrap(),
                21,
            ),
            (
                SocksCommand::UdpAssociate,
                WireAddress::Ipv4(Ipv4Addr::UNSPECIFIED),
                0,
            ),
        ];

        for (command, address, port) in cases {
            let request = RequestMessage::new(command, address.clone(), port);
            let encoded = request.encode();
            assert_eq!(encoded.len(), request.wire_len());

            let decoded = RequestMessage::decode(&encoded).unwrap();
            assert_eq!(decoded.command, command);
            assert_eq!(decoded.address, address);
            assert_eq!(decoded.port, port);
        }
    }

    #[test]
    fn test_request_message_port_follows_address() {
        let bytes = [
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            3,
            b'a',
            b'.',
            b'b',
            0x1F,
            0x90,
        ];
        let request = RequestMessage::decode(&bytes).unwrap();
        assert_eq!(request.address, WireAddress::Domain("a.b".into()));
        assert_eq!(request.port, 8080);
    }

    #[test]
    fn test_request_message_decode_truncated_port() {
        let bytes = [
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            127,
            0,
            0,
            1,
            0x00,
        ];
        assert!(matches!(
            RequestMessage::decode(&bytes),
            Err(Socks5Error::Truncated {
                needed: 10,
                available: 9
            })
        ));
    }

    #[test]
    fn test_request_message_unknown_command() {
        let bytes = [
            SOCKS5_VERSION,
            0x09,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            127,
            0,
            0,
            1,
            0,
            80,
        ];
        assert!(matches!(
            RequestMessage::decode(&bytes),
            Err(Socks5Error::CommandNotSupported(0x09))
        ));
    }

    #[test]
    fn test_request_wildcard_destination() {
        let request = RequestMessage::new(
            SocksCommand::UdpAssociate,
            WireAddress::Ipv4(Ipv4Addr::UNSPECIFIED),
            0,
        );
        assert!(request.is_wildcard_destination());

        let request = RequestMessage::new(
            SocksCommand::UdpAssociate,
            WireAddress::Ipv4(Ipv4Addr::UNSPECIFIED),
            5353,
        );
        assert!(!request.is_wildcard_destination());
    }

    #[test]
    fn test_destination_display() {
        let dest = Destination::new(Ipv4Addr::new(1, 2, 3, 4), 53);
        assert_eq!(format!("{}", dest), "1.2.3.4:53");
        assert_eq!(dest.socket_addr(), "1.2.3.4:53".parse().unwrap());
    }
}
