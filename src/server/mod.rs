//! Router server
//!
//! Listening sockets, the accept loop and per-connection sessions.

mod listener;
mod router;
mod session;

pub use listener::open_listener;
pub use router::{
    select_listen_addrs, select_route_addr, BoundRouter, Router, RouterHandle,
    ACCEPT_POLL_INTERVAL,
};
pub use session::Session;
