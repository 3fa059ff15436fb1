//! SOCKS5 request reader
//!
//! Reads exactly one request off the control stream and hands the bytes to
//! the codec.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::RequestMessage;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Read a SOCKS5 request from the stream
///
/// The fixed `VER CMD RSV ATYP` header is read first; the ATYP byte decides
/// how many address bytes follow. An unknown ATYP fails before anything else
/// is read. An unknown command is reported only after the whole request has
/// been consumed.
///
/// # Arguments
///
/// * `stream` - The stream to read from
pub async fn read_request<S>(stream: &mut S) -> Result<RequestMessage, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; REQUEST_PREFIX_LEN + 1];
    stream.read_exact(&mut buf).await?;

    let addr_type = buf[REQUEST_PREFIX_LEN];
    let addr_len = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => IPV4_ADDR_LEN,
        SOCKS5_ADDR_TYPE_IPV6 => IPV6_ADDR_LEN,
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = stream.read_u8().await?;
            buf.push(len);
            len as usize
        }
        other => return Err(Socks5Error::AddressTypeNotSupported(other)),
    };

    let start = buf.len();
    buf.resize(start + addr_len + PORT_LEN, 0);
    stream.read_exact(&mut buf[start..]).await?;

    let request = RequestMessage::decode(&buf)?;
    debug!("Parsed SOCKS5 request: {}", request);

    Ok(request)
}
