//! Client side of the entity synchronization protocol.
//!
//! [`client`] holds the transport-agnostic mirror core: snapshot
//! reconciliation, RPC replay, and input forwarding. [`net`] is the UDP
//! plumbing plus a headless terminal front end.

pub mod client;
pub mod net;
