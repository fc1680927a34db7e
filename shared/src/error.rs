//! Error taxonomy shared by the host and client cores.

use crate::entity::EntityId;
use thiserror::Error;

/// Every failure the synchronization core can report.
///
/// Variants split into two classes: protocol invariant violations
/// (`UnknownPrefab`, `MissingComponent`, `UnknownRpcMethod`,
/// `InvalidRpcArgs`, a fatal `DanglingReference`) which mean host and
/// client builds are out of sync and must surface loudly, and ordinary
/// network-timing conditions (`StaleSnapshot`, `TransportSend`, an RPC
/// `DanglingReference`) which callers absorb silently.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("no prefab registered for type '{0}'")]
    UnknownPrefab(String),

    #[error("entity '{0}' is not in the live table")]
    DanglingReference(EntityId),

    #[error("entity '{entity}' has no component '{component}'")]
    MissingComponent { entity: EntityId, component: String },

    #[error("component '{component}' has no RPC method '{method}'")]
    UnknownRpcMethod { component: String, method: String },

    #[error("bad arguments for RPC method '{component}.{method}'")]
    InvalidRpcArgs { component: String, method: String },

    #[error("player slots are full")]
    CapacityExceeded,

    #[error("snapshot clock {clock} is not past high-water mark {high_water}")]
    StaleSnapshot { clock: u64, high_water: u64 },

    #[error("transport send failed: {0}")]
    TransportSend(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
