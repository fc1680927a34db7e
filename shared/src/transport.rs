//! Transport seam between the synchronization cores and the socket
//! layer.
//!
//! The cores never touch sockets directly: the host sees stable peer
//! ids and a send/broadcast/disconnect surface, the client a single
//! send. Concrete UDP implementations live in the host and client
//! crates; tests substitute in-memory recorders.

use crate::error::NetError;
use crate::protocol::WireMessage;
use std::fmt;

/// Stable identifier for one peer connection, assigned by the host
/// transport for the lifetime of that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Host-side transport multiplexing N peer connections.
///
/// Sends are fire-and-forget; a send to a peer that has vanished is a
/// [`NetError::TransportSend`], which the core logs and drops without
/// disturbing the tick loop.
pub trait HostTransport {
    fn send(&mut self, peer: PeerId, message: &WireMessage) -> Result<(), NetError>;

    fn broadcast(&mut self, message: &WireMessage);

    /// Terminates one peer's connection. Further sends to it become
    /// logged no-ops.
    fn disconnect(&mut self, peer: PeerId);
}

/// Client-side transport carrying one connection to the host.
pub trait ClientTransport {
    fn send(&mut self, message: &WireMessage) -> Result<(), NetError>;
}
