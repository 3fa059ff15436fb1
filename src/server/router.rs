//! Listener/router
//!
//! Picks the listen and route addresses, opens the listeners and runs the
//! accept loop. Each accepted connection becomes an independent session
//! task; stopping the router only stops accepting.

use super::listener::open_listener;
use super::session::Session;
use crate::config::{RouterConfig, SessionConfig};
use crate::error::RouterError;
use crate::iface::{
    find_interface_by_address, find_primary_interface, InterfaceProvider, NetworkInterface,
    SystemInterfaces,
};
use crate::socks::resolver::{Resolver, SystemResolver};
use futures::future::select_all;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Bounded wait of the accept loop; `stop()` is observed within this interval
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Addresses to listen on
///
/// The wildcard yields every address of every running interface, in
/// enumeration order and without duplicates. A specific address must belong
/// to some interface.
pub fn select_listen_addrs(
    listen: Ipv4Addr,
    interfaces: &[NetworkInterface],
) -> Result<Vec<Ipv4Addr>, RouterError> {
    if listen.is_unspecified() {
        let mut addrs: Vec<Ipv4Addr> = Vec::new();
        for ip in interfaces
            .iter()
            .filter(|i| i.is_running)
            .flat_map(|i| i.addrs.iter())
        {
            if !addrs.contains(ip) {
                addrs.push(*ip);
            }
        }
        return Ok(addrs);
    }

    match find_interface_by_address(interfaces, listen) {
        Some(_) => Ok(vec![listen]),
        None => Err(RouterError::NoListenInterface(listen)),
    }
}

/// Address outbound sockets are bound to
///
/// The wildcard picks the first address of the primary running interface.
/// A specific address must belong to some interface.
pub fn select_route_addr(
    route: Ipv4Addr,
    interfaces: &[NetworkInterface],
) -> Result<Ipv4Addr, RouterError> {
    if route.is_unspecified() {
        return find_primary_interface(interfaces)
            .and_then(|i| i.addrs.first().copied())
            .ok_or(RouterError::NoPrimaryInterface);
    }

    match find_interface_by_address(interfaces, route) {
        Some(_) => Ok(route),
        None => Err(RouterError::NoRouteInterface(route)),
    }
}

/// Remote control for a router
#[derive(Debug, Clone)]
pub struct RouterHandle {
    running: Arc<AtomicBool>,
}

impl RouterHandle {
    /// Stop accepting new connections; live sessions are left alone
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping router");
        }
    }

    /// Whether the accept loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// SOCKS5 router
pub struct Router {
    config: RouterConfig,
    interfaces: Arc<dyn InterfaceProvider>,
    resolver: Arc<dyn Resolver>,
    running: Arc<AtomicBool>,
}

impl Router {
    /// Create a router with explicit collaborators
    pub fn new(
        config: RouterConfig,
        interfaces: Arc<dyn InterfaceProvider>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Router {
            config,
            interfaces,
            resolver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a router using the host's interfaces and DNS
    pub fn with_system(config: RouterConfig) -> Self {
        Router::new(config, Arc::new(SystemInterfaces), Arc::new(SystemResolver))
    }

    /// Get a handle that can stop the router
    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            running: self.running.clone(),
        }
    }

    /// Select addresses and open the listeners
    ///
    /// The route address is resolved before any listener is opened. Listeners
    /// that fail to bind are logged and skipped; if none succeed the call
    /// fails.
    pub fn bind(&self) -> Result<BoundRouter, RouterError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RouterError::AlreadyRunning);
        }

        match self.open() {
            Ok(bound) => Ok(bound),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> Result<(), RouterError> {
        self.bind()?.serve().await
    }

    fn open(&self) -> Result<BoundRouter, RouterError> {
        self.config
            .validate()
            .map_err(RouterError::Config)?;

        let interfaces = self.interfaces.list_interfaces()?;
        let route_ip = select_route_addr(self.config.route, &interfaces)?;
        let listen_addrs = select_listen_addrs(self.config.listen, &interfaces)?;

        let port = self.config.port;
        let backlog = self.config.session.listen_backlog;
        let mut listeners = Vec::with_capacity(listen_addrs.len());

        for ip in listen_addrs {
            match open_listener(ip, port, backlog) {
                Ok(listener) => {
                    let local = listener.local_addr()?;
                    info!("Listening connection on {}", local);
                    listeners.push(listener);
                }
                Err(e) => warn!("Failed to listen on {}:{}: {}", ip, port, e),
            }
        }

        if listeners.is_empty() {
            return Err(RouterError::NoListeners(port));
        }

        info!("Routing traffic to -> {}", route_ip);

        let session = Arc::new(self.config.session.clone());
        Ok(BoundRouter {
            listeners,
            route_ip,
            sessions: Arc::new(Semaphore::new(
                session.max_sessions.min(Semaphore::MAX_PERMITS),
            )),
            session,
            resolver: self.resolver.clone(),
            running: self.running.clone(),
        })
    }
}

/// A router whose listeners are open
pub struct BoundRouter {
    listeners: Vec<TcpListener>,
    route_ip: Ipv4Addr,
    session: Arc<SessionConfig>,
    sessions: Arc<Semaphore>,
    resolver: Arc<dyn Resolver>,
    running: Arc<AtomicBool>,
}

impl BoundRouter {
    /// Addresses the listeners are bound to
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Selected route address
    pub fn route_addr(&self) -> Ipv4Addr {
        self.route_ip
    }

    /// Get a handle that can stop the router
    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            running: self.running.clone(),
        }
    }

    /// Run the accept loop until stopped or a listener fails
    ///
    /// Listeners are closed on return; sessions keep running.
    pub async fn serve(self) -> Result<(), RouterError> {
        let result = self.accept_loop().await;
        self.running.store(false, Ordering::SeqCst);
        info!("Router stopped accepting connections");
        result
    }

    async fn accept_loop(&self) -> Result<(), RouterError> {
        while self.running.load(Ordering::SeqCst) {
            let permit = match tokio::time::timeout(
                ACCEPT_POLL_INTERVAL,
                self.sessions.clone().acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Ok(()),
                Err(_) => {
                    debug!("Session limit reached, waiting for a free slot");
                    continue;
                }
            };

            let accepts = self.listeners.iter().map(|l| Box::pin(l.accept()));
            let (result, index, _) =
                match tokio::time::timeout(ACCEPT_POLL_INTERVAL, select_all(accepts)).await {
                    Ok(ready) => ready,
                    Err(_) => continue,
                };

            match result {
                Ok((stream, peer)) => {
                    debug!("Accepted {} on listener {}", peer, index);
                    let session = Session::new(
                        stream,
                        peer,
                        self.route_ip,
                        self.session.clone(),
                        self.resolver.clone(),
                    )
                    .with_permit(permit);

                    tokio::spawn(async move {
                        let status = session.run().await;
                        if status.is_success() {
                            debug!("Session {} finished: {:?}", peer, status);
                        } else {
                            debug!("Session {} rejected: {:?}", peer, status);
                        }
                    });
                }
                Err(e) if is_transient(&e) => {
                    warn!("Transient accept error: {}", e);
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }
}

impl Drop for BoundRouter {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) || matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addrs: &[[u8; 4]], running: bool, primary: bool) -> NetworkInterface {
        let mut i = NetworkInterface::new(name, running);
        i.addrs = addrs.iter().map(|a| Ipv4Addr::from(*a)).collect();
        i.is_primary = primary;
        i
    }

    fn host() -> Vec<NetworkInterface> {
        vec![
            iface("lo", &[[127, 0, 0, 1]], true, false),
            iface("eth0", &[[10, 0, 0, 2], [10, 0, 0, 3]], true, true),
            iface("eth1", &[[172, 16, 0, 2]], false, false),
        ]
    }

    #[test]
    fn test_select_listen_wildcard() {
        let addrs = select_listen_addrs(Ipv4Addr::UNSPECIFIED, &host()).unwrap();
        assert_eq!(
            addrs,
            vec![
                Ipv4Addr::new(127, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 3),
            ]
        );
    }

    #[test]
    fn test_select_listen_specific() {
        let addrs = select_listen_addrs(Ipv4Addr::new(10, 0, 0, 3), &host()).unwrap();
        assert_eq!(addrs, vec![Ipv4Addr::new(10, 0, 0, 3)]);

        let err = select_listen_addrs(Ipv4Addr::new(10, 9, 9, 9), &host()).unwrap_err();
        assert!(matches!(err, RouterError::NoListenInterface(_)));
    }

    #[test]
    fn test_select_route_wildcard() {
        let route = select_route_addr(Ipv4Addr::UNSPECIFIED, &host()).unwrap();
        assert_eq!(route, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_select_route_wildcard_needs_running_primary() {
        let ifaces = vec![
            iface("lo", &[[127, 0, 0, 1]], true, false),
            iface("eth0", &[[10, 0, 0, 2]], false, true),
        ];
        let err = select_route_addr(Ipv4Addr::UNSPECIFIED, &ifaces).unwrap_err();
        assert!(matches!(err, RouterError::NoPrimaryInterface));
    }

    #[test]
    fn test_select_route_specific() {
        assert_eq!(
            select_route_addr(Ipv4Addr::new(172, 16, 0, 2), &host()).unwrap(),
            Ipv4Addr::new(172, 16, 0, 2)
        );
        let err = select_route_addr(Ipv4Addr::new(192, 168, 0, 1), &host()).unwrap_err();
        assert!(matches!(err, RouterError::NoRouteInterface(_)));
    }

    #[test]
    fn test_router_handle_stop() {
        let handle = RouterHandle {
            running: Arc::new(AtomicBool::new(true)),
        };
        assert!(handle.is_running());
        handle.stop();
        assert!(!handle.is_running());
        handle.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_is_transient() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
