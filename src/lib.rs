//! # s5router - SOCKS5 proxy with interface routing
//!
//! s5router accepts SOCKS5 clients and forwards their traffic through sockets
//! bound to a chosen local "route" address, so outbound connections leave
//! through the interface that owns that address.
//!
//! ## Features
//!
//! - **CONNECT**: TCP relay with per-candidate connect fallback for names
//!   that resolve to several addresses
//! - **UDP ASSOCIATE**: UDP relay with SOCKS5 header encapsulation
//! - **Interface Selection**: Listen on every running interface or on one
//!   address; route through the primary interface or a given address
//! - **Bounded Sessions**: A cap on concurrently live sessions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use s5router::config::RouterConfig;
//! use s5router::server::Router;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let router = Router::with_system(RouterConfig::default());
//!     let handle = router.handle();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         handle.stop();
//!     });
//!
//!     router.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Listener -> Session (handshake, relay) -> route_addr -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod iface;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config, RouterConfig, SessionConfig};
pub use error::{HandshakeStatus, RouterError, Socks5Error, Socks5ReplyCode};
pub use server::{Router, RouterHandle};

/// Version of the s5router library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "s5router");
    }
}
