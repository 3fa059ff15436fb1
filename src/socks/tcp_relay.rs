//! TCP relay for SOCKS5 CONNECT sessions
//!
//! Copies bytes between the client and the destination until either side
//! closes or fails.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Byte counters of a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes forwarded from the client to the destination
    pub client_to_remote: u64,
    /// Bytes forwarded from the destination to the client
    pub remote_to_client: u64,
}

enum Ready {
    Client(io::Result<usize>),
    Remote(io::Result<usize>),
}

/// Relay data bidirectionally between two streams
///
/// Waits on both streams with a bounded `poll_interval`; an idle interval
/// simply waits again. Each read takes at most `chunk_size` bytes and exactly
/// those bytes are written to the other side. EOF or an error on either
/// stream ends the relay. The write half of each stream is then shut down
/// and both streams are dropped, which closes them in both directions.
///
/// # Arguments
///
/// * `client` - The client control stream
/// * `remote` - The destination stream
/// * `chunk_size` - Maximum bytes per read
/// * `poll_interval` - Bounded wait per iteration
pub async fn relay_tcp<A, B>(
    mut client: A,
    mut remote: B,
    chunk_size: usize,
    poll_interval: Duration,
) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let mut stats = RelayStats::default();
    let mut client_buf = vec![0u8; chunk_size];
    let mut remote_buf = vec![0u8; chunk_size];

    loop {
        let ready = tokio::time::timeout(poll_interval, async {
            tokio::select! {
                result = client.read(&mut client_buf) => Ready::Client(result),
                result = remote.read(&mut remote_buf) => Ready::Remote(result),
            }
        })
        .await;

        match ready {
            Err(_) => {
                trace!("TCP relay idle for {:?}", poll_interval);
                continue;
            }

            Ok(Ready::Client(Ok(0))) => {
                debug!("Client closed the connection");
                break;
            }
            Ok(Ready::Client(Ok(n))) => {
                if let Err(e) = remote.write_all(&client_buf[..n]).await {
                    debug!("Write to destination failed: {}", e);
                    break;
                }
                stats.client_to_remote += n as u64;
            }
            Ok(Ready::Client(Err(e))) => {
                debug!("Read from client failed: {}", e);
                break;
            }

            Ok(Ready::Remote(Ok(0))) => {
                debug!("Destination closed the connection");
                break;
            }
            Ok(Ready::Remote(Ok(n))) => {
                if let Err(e) = client.write_all(&remote_buf[..n]).await {
                    debug!("Write to client failed: {}", e);
                    break;
                }
                stats.remote_to_client += n as u64;
            }
            Ok(Ready::Remote(Err(e))) => {
                debug!("Read from destination failed: {}", e);
                break;
            }
        }
    }

    let _ = client.shutdown().await;
    let _ = remote.shutdown().await;
    drop(client);
    drop(remote);

    stats
}
