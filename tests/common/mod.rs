//! Test utilities and mocks for s5router
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use s5router::iface::{InterfaceProvider, NetworkInterface};
use s5router::socks::consts::*;
use s5router::socks::Resolver;
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Create a connected TCP stream pair for testing
pub async fn create_tcp_stream_pair() -> (TcpStream, TcpStream) {
    let (listener, addr) = create_test_listener().await;

    let connect_fut = TcpStream::connect(addr);
    let accept_fut = listener.accept();

    let (client_stream, accepted) = tokio::join!(connect_fut, accept_fut);
    let (server_stream, _) = accepted.unwrap();

    (client_stream.unwrap(), server_stream)
}

/// Spawn a TCP echo server and return its address
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

/// Listeners on 127.0.0.2 and 127.0.0.1 sharing one port
pub async fn create_shared_port_listeners() -> (TcpListener, TcpListener, u16) {
    loop {
        let first = TcpListener::bind("127.0.0.2:0").await.unwrap();
        let port = first.local_addr().unwrap().port();
        if let Ok(second) = TcpListener::bind(("127.0.0.1", port)).await {
            return (first, second, port);
        }
    }
}

/// Accept one connection and greet it with `tag`
pub fn spawn_tagged_acceptor(listener: TcpListener, tag: &'static [u8]) {
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(tag).await;
        }
    });
}

/// A port on 127.0.0.1 that nothing listens on
pub async fn closed_port() -> u16 {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr.port()
}

/// Resolver answering from a fixed table
#[derive(Default)]
pub struct MockResolver {
    entries: HashMap<String, Vec<Ipv4Addr>>,
}

impl MockResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name
    pub fn with(mut self, name: &str, addrs: &[Ipv4Addr]) -> Self {
        self.entries.insert(name.to_string(), addrs.to_vec());
        self
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve_name(&self, name: &str, max: usize) -> io::Result<Vec<Ipv4Addr>> {
        match self.entries.get(name) {
            Some(addrs) => Ok(addrs.iter().take(max).copied().collect()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "unknown host")),
        }
    }
}

/// Interface provider returning a fixed list
pub struct MockInterfaces(pub Vec<NetworkInterface>);

impl MockInterfaces {
    /// A host with loopback addresses only; `primary` marks 127.0.0.1's
    /// interface as primary
    pub fn loopback(addrs: &[Ipv4Addr], primary: bool) -> Self {
        let mut lo = NetworkInterface::new("lo", true);
        lo.addrs = addrs.to_vec();
        lo.is_primary = primary;
        MockInterfaces(vec![lo])
    }
}

impl InterfaceProvider for MockInterfaces {
    fn list_interfaces(&self) -> io::Result<Vec<NetworkInterface>> {
        Ok(self.0.clone())
    }
}

/// Greeting offering only "no authentication"
pub fn greeting() -> Vec<u8> {
    vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
}

/// Request with an IPv4 destination
pub fn ipv4_request(cmd: u8, ip: Ipv4Addr, port: u16) -> Vec<u8> {
    let mut request = vec![SOCKS5_VERSION, cmd, SOCKS5_RESERVED, SOCKS5_ADDR_TYPE_IPV4];
    request.extend_from_slice(&ip.octets());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Request with a domain destination
pub fn domain_request(cmd: u8, name: &str, port: u16) -> Vec<u8> {
    let mut request = vec![
        SOCKS5_VERSION,
        cmd,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_DOMAIN,
        name.len() as u8,
    ];
    request.extend_from_slice(name.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Send the greeting and check the method selection
pub async fn negotiate(stream: &mut TcpStream) {
    stream.write_all(&greeting()).await.unwrap();
    let mut selection = [0u8; 2];
    stream.read_exact(&mut selection).await.unwrap();
    assert_eq!(selection, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);
}

/// Read a reply with an IPv4 address; returns (code, address, port)
pub async fn read_ipv4_reply(stream: &mut TcpStream) -> (u8, Ipv4Addr, u16) {
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], SOCKS5_VERSION);
    assert_eq!(reply[3], SOCKS5_ADDR_TYPE_IPV4);
    (
        reply[1],
        Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]),
        u16::from_be_bytes([reply[8], reply[9]]),
    )
}

/// Read a reply of any address type
pub async fn read_reply(stream: &mut TcpStream) -> s5router::socks::Reply {
    let mut buf = vec![0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();

    let rest = match buf[3] {
        SOCKS5_ADDR_TYPE_IPV4 => IPV4_ADDR_LEN + PORT_LEN,
        SOCKS5_ADDR_TYPE_IPV6 => IPV6_ADDR_LEN + PORT_LEN,
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = stream.read_u8().await.unwrap();
            buf.push(len);
            len as usize + PORT_LEN
        }
        other => panic!("unexpected address type {}", other),
    };

    let start = buf.len();
    buf.resize(start + rest, 0);
    stream.read_exact(&mut buf[start..]).await.unwrap();

    s5router::socks::Reply::decode(&buf).unwrap()
}
