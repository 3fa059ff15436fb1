//! UDP packet encoding/decoding for SOCKS5
//!
//! Handles the encapsulation header carried by every relayed datagram.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::{decode_port, WireAddress};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddrV4;

/// SOCKS5 UDP header
///
/// # UDP Request/Response Format
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    /// Fragment number (0 for standalone datagrams)
    pub frag: u8,
    /// Destination (client to relay) or source (relay to client)
    pub address: WireAddress,
    /// Destination or source port
    pub port: u16,
}

impl UdpHeader {
    /// Create an unfragmented header
    pub fn new(address: WireAddress, port: u16) -> Self {
        UdpHeader {
            frag: 0,
            address,
            port,
        }
    }

    /// Header for a datagram coming back from `source`
    pub fn from_source(source: SocketAddrV4) -> Self {
        UdpHeader::new(WireAddress::Ipv4(*source.ip()), source.port())
    }

    /// Check if this is a fragmented datagram
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }

    /// Total encoded size
    pub fn wire_len(&self) -> usize {
        UDP_HEADER_PREFIX_LEN + self.address.wire_len() + PORT_LEN
    }

    /// Decode the header at the start of `buf`
    ///
    /// Returns the header and its length; the payload is `buf[len..]`.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Socks5Error> {
        if buf.len() < UDP_HEADER_PREFIX_LEN {
            return Err(Socks5Error::Truncated {
                needed: UDP_HEADER_PREFIX_LEN,
                available: buf.len(),
            });
        }
        let frag = buf[2];

        let (address, addr_len) = WireAddress::decode(&buf[UDP_HEADER_PREFIX_LEN..])?;
        let port_offset = UDP_HEADER_PREFIX_LEN + addr_len;
        let port = decode_port(buf, port_offset)?;

        Ok((UdpHeader { frag, address, port }, port_offset + PORT_LEN))
    }

    /// Append the encoded header to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(0);
        dst.put_u8(self.frag);
        self.address.encode(dst);
        dst.put_u16(self.port);
    }
}

/// Build a complete datagram: header followed by payload
pub fn encode_datagram(header: &UdpHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(header.wire_len() + payload.len());
    header.encode(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}
