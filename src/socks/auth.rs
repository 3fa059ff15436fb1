//! SOCKS5 method negotiation
//!
//! Only the "no authentication" method is served. The greeting is
//! `VER NMETHODS METHODS...`, answered with `VER METHOD`.

use super::consts::*;
use crate::error::Socks5Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Method selected for a greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodChoice {
    /// Client offered "no authentication"
    NoAuth,
    /// Client offered nothing usable; `0xFF` was sent
    NotAcceptable,
}

impl MethodChoice {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            MethodChoice::NoAuth => SOCKS5_AUTH_METHOD_NONE,
            MethodChoice::NotAcceptable => SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE,
        }
    }
}

/// Pick a method from the client's offer
pub fn select_method(methods: &[u8]) -> MethodChoice {
    if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        MethodChoice::NoAuth
    } else {
        MethodChoice::NotAcceptable
    }
}

/// Read the greeting and answer it
///
/// A version other than 5 is answered with `{5, 0xFF}` and fails with
/// [`Socks5Error::UnsupportedVersion`]. When no acceptable method is offered
/// the `0xFF` selection is still sent; with `strict` the negotiation then
/// fails, otherwise the caller may continue to the request phase.
///
/// # Arguments
///
/// * `stream` - The client control stream
/// * `strict` - Fail when the client offers no acceptable method
pub async fn negotiate_method<S>(stream: &mut S, strict: bool) -> Result<MethodChoice, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = stream.read_u8().await?;
    if version != SOCKS5_VERSION {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        return Err(Socks5Error::UnsupportedVersion(version));
    }

    let num_methods = stream.read_u8().await? as usize;
    let mut methods = vec![0u8; num_methods];
    stream.read_exact(&mut methods).await?;

    let choice = select_method(&methods);
    stream.write_all(&[SOCKS5_VERSION, choice.to_byte()]).await?;
    stream.flush().await?;

    debug!("Offered methods {:?}, selected {:?}", methods, choice);

    if choice == MethodChoice::NotAcceptable {
        if strict {
            return Err(Socks5Error::NoAcceptableMethod);
        }
        warn!("Client offered no acceptable method, continuing to request phase");
    }

    Ok(choice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_select_method() {
        assert_eq!(
            select_method(&[SOCKS5_AUTH_METHOD_PASSWORD, 0x00]),
            MethodChoice::NoAuth
        );
        assert_eq!(
            select_method(&[SOCKS5_AUTH_METHOD_PASSWORD]),
            MethodChoice::NotAcceptable
        );
        assert_eq!(select_method(&[]), MethodChoice::NotAcceptable);
    }

    #[tokio::test]
    async fn test_negotiate_no_auth() {
        let (mut client, mut server) = duplex(64);
        client
            .write_all(&[5, 2, SOCKS5_AUTH_METHOD_PASSWORD, 0x00])
            .await
            .unwrap();

        let choice = negotiate_method(&mut server, false).await.unwrap();
        assert_eq!(choice, MethodChoice::NoAuth);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [5, 0x00]);
    }

    #[tokio::test]
    async fn test_negotiate_bad_version() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[4, 1, 0x00]).await.unwrap();

        let result = negotiate_method(&mut server, false).await;
        assert!(matches!(result, Err(Socks5Error::UnsupportedVersion(4))));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [5, 0xFF]);
    }

    #[tokio::test]
    async fn test_negotiate_not_acceptable_lenient() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[5, 1, SOCKS5_AUTH_METHOD_PASSWORD]).await.unwrap();

        let choice = negotiate_method(&mut server, false).await.unwrap();
        assert_eq!(choice, MethodChoice::NotAcceptable);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [5, 0xFF]);
    }

    #[tokio::test]
    async fn test_negotiate_not_acceptable_strict() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[5, 1, SOCKS5_AUTH_METHOD_PASSWORD]).await.unwrap();

        let result = negotiate_method(&mut server, true).await;
        assert!(matches!(result, Err(Socks5Error::NoAcceptableMethod)));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [5, 0xFF]);
    }

    #[tokio::test]
    async fn test_negotiate_eof() {
        let (client, mut server) = duplex(64);
        drop(client);

        let result = negotiate_method(&mut server, false).await;
        assert!(matches!(result, Err(Socks5Error::Io(_))));
    }
}
