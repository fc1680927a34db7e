//! Shared foundation of the host-authoritative synchronization
//! protocol.
//!
//! The host runs the definitive simulation and broadcasts full-state
//! snapshots every tick; clients mirror that state and forward raw key
//! events back upstream. Everything both sides must agree on lives in
//! this crate:
//!
//! - `protocol`: the JSON wire messages with contractual field names
//! - `entity` / `prefab`: the networked entity model and the type
//!   registry that drives polymorphic instantiation from a type tag
//! - `networking`: the live id -> entity table with generic
//!   instantiate/deregister operations
//! - `input`: per-player key state with single-fire pressed edges
//! - `delegate`: the multi-subscriber callback primitive used for
//!   lifecycle notifications
//! - `transport`: the seam the socket layers implement
//! - `error`: the error taxonomy
//! - `game`: the demo prefab set registered by both binaries

pub mod delegate;
pub mod entity;
pub mod error;
pub mod game;
pub mod input;
pub mod networking;
pub mod prefab;
pub mod protocol;
pub mod transport;

pub use delegate::Delegate;
pub use entity::{Component, EntityId, NetworkedEntity};
pub use error::NetError;
pub use input::PlayerInput;
pub use networking::Networking;
pub use prefab::{EntityDirectory, Prefab, PrefabRegistry};
pub use protocol::{EntityRecord, RpcCall, SnapshotData, WireMessage};
pub use transport::{ClientTransport, HostTransport, PeerId};
