//! # Host Library
//!
//! Authoritative side of the synchronization protocol. The host owns
//! every gameplay entity, assigns entity and player ids, ingests key
//! events from peers, and broadcasts a full-state snapshot every tick.
//!
//! Module layout:
//!
//! - [`host`]: `NetworkingHost`, the synchronous core for peer
//!   lifecycle, capacity enforcement, snapshot broadcast, and RPC
//!   dispatch.
//! - [`player`]: player slots and session-owned id allocators.
//! - [`net`]: the UDP transport, covering peer multiplexing, timeout
//!   handling, and the tokio event loop delivering transport callbacks
//!   between ticks.

pub mod host;
pub mod net;
pub mod player;
