//! SOCKS5 command handling
//!
//! Request reading and reply construction.

mod parser;
mod reply;

pub use parser::read_request;
pub use reply::{send_reply, Reply};
