//! UDP ASSOCIATE support
//!
//! Header codec and the relay loop that runs for the lifetime of an
//! association.

mod packet;
mod relay;

pub use packet::{encode_datagram, UdpHeader};
pub use relay::{UdpRelay, UdpRelayStats};
