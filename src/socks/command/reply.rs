//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use crate::error::{Socks5Error, Socks5ReplyCode};
use crate::socks::consts::*;
use crate::socks::types::{decode_port, RequestMessage, WireAddress};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddrV4;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A SOCKS5 reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply status
    pub code: Socks5ReplyCode,
    /// Address field
    pub address: WireAddress,
    /// Port field
    pub port: u16,
}

impl Reply {
    /// Create a reply
    pub fn new(code: Socks5ReplyCode, address: WireAddress, port: u16) -> Self {
        Reply {
            code,
            address,
            port,
        }
    }

    /// Reply echoing the request's address and port
    pub fn for_request(request: &RequestMessage, code: Socks5ReplyCode) -> Self {
        Reply::new(code, request.address.clone(), request.port)
    }

    /// Reply carrying a bound endpoint
    pub fn bound(code: Socks5ReplyCode, addr: SocketAddrV4) -> Self {
        Reply::new(code, WireAddress::Ipv4(*addr.ip()), addr.port())
    }

    /// Reply with an all-zero IPv4 address, for requests that could not be
    /// decoded
    pub fn failure(code: Socks5ReplyCode) -> Self {
        Reply::new(code, WireAddress::default(), 0)
    }

    /// Total encoded size
    pub fn wire_len(&self) -> usize {
        REQUEST_PREFIX_LEN + self.address.wire_len() + PORT_LEN
    }

    /// Encode the reply
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u8(SOCKS5_VERSION);
        buf.put_u8(self.code.into());
        buf.put_u8(SOCKS5_RESERVED);
        self.address.encode(&mut buf);
        buf.put_u16(self.port);
        buf.freeze()
    }

    /// Decode a reply, as a client would
    pub fn decode(buf: &[u8]) -> Result<Self, Socks5Error> {
        if buf.len() < REQUEST_PREFIX_LEN {
            return Err(Socks5Error::Truncated {
                needed: REQUEST_PREFIX_LEN,
                available: buf.len(),
            });
        }
        let code = Socks5ReplyCode::try_from(buf[1])?;
        let (address, addr_len) = WireAddress::decode(&buf[REQUEST_PREFIX_LEN..])?;
        let port = decode_port(buf, REQUEST_PREFIX_LEN + addr_len)?;
        Ok(Reply::new(code, address, port))
    }
}

/// Write a reply to the stream and flush it
pub async fn send_reply<S>(stream: &mut S, reply: &Reply) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&reply.encode()).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::types::SocksCommand;
    use std::net::Ipv4Addr;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn test_reply_failure_is_zero_ipv4() {
        let reply = Reply::failure(Socks5ReplyCode::AddressTypeNotSupported);
        assert_eq!(
            reply.encode().as_ref(),
            &[
                SOCKS5_VERSION,
                SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
                SOCKS5_RESERVED,
                SOCKS5_ADDR_TYPE_IPV4,
                0,
                0,
                0,
                0,
                0,
                0
            ]
        );
    }

    #[test]
    fn test_reply_echoes_request() {
        let request = RequestMessage::new(
            SocksCommand::Connect,
            WireAddress::domain("example.com").unwrap(),
            443,
        );
        let reply = Reply::for_request(&request, Socks5ReplyCode::Succeeded);
        let encoded = reply.encode();

        assert_eq!(encoded.len(), request.wire_len());
        assert_eq!(encoded[1], SOCKS5_REPLY_SUCCEEDED);
        assert_eq!(&encoded[3..], &request.encode()[3..]);
    }

    #[test]
    fn test_reply_bound() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 40000);
        let reply = Reply::bound(Socks5ReplyCode::Succeeded, addr);
        let encoded = reply.encode();

        assert_eq!(&encoded[4..8], &[10, 0, 0, 5]);
        assert_eq!(u16::from_be_bytes([encoded[8], encoded[9]]), 40000);
    }

    #[test]
    fn test_reply_decode() {
        let reply = Reply::new(
            Socks5ReplyCode::ConnectionRefused,
            WireAddress::Ipv4(Ipv4Addr::new(1, 2, 3, 4)),
            80,
        );
        let decoded = Reply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded, reply);

        assert!(Reply::decode(&[5, 0]).is_err());
        assert!(Reply::decode(&[5, 0x42, 0, 1, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[tokio::test]
    async fn test_send_reply() {
        let (mut client, mut server) = duplex(64);
        let reply = Reply::failure(Socks5ReplyCode::GeneralFailure);
        send_reply(&mut server, &reply).await.unwrap();

        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[1], SOCKS5_REPLY_GENERAL_FAILURE);
    }
}
