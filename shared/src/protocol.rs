//! Wire protocol between host and peers.
//!
//! Every message is a JSON object `{"type": ..., "data": ...}`; the
//! field names below are contractual and must not drift between host
//! and client builds. `Join` and `Leave` are transport handshake
//! framing rather than part of the synchronization contract, carried on
//! the same codec.

use crate::entity::EntityId;
use crate::error::NetError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WireMessage {
    /// Transport handshake: a peer asks to join the session.
    Join,
    /// Transport handshake: a peer leaves voluntarily.
    Leave,

    /// Host -> peer, on accept: the player id assigned to this peer.
    Identity { id: u32 },
    /// Host -> peer, on capacity rejection. The connection is closed
    /// immediately afterwards.
    TooManyPlayers,
    /// Host -> all peers, every tick: full state of every live entity.
    Snapshot(SnapshotData),
    /// Host -> all peers: a one-off method invocation to replay.
    Rpc(RpcCall),

    /// Peer -> host key events, forwarded verbatim.
    #[serde(rename_all = "camelCase")]
    KeyDown { key_code: u32 },
    #[serde(rename_all = "camelCase")]
    KeyUp { key_code: u32 },
}

/// Full-state broadcast with a monotonically increasing clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub objects: Vec<EntityRecord>,
    pub clock: u64,
}

/// One serialized entity inside a snapshot. `state` is prefab-specific
/// and opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: Value,
}

/// Fire-and-forget method invocation on a networked entity's component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCall {
    pub object_id: EntityId,
    pub component_name: String,
    pub method_name: String,
    pub args: Vec<Value>,
}

pub fn encode(message: &WireMessage) -> Result<Vec<u8>, NetError> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode(bytes: &[u8]) -> Result<WireMessage, NetError> {
    Ok(serde_json::from_slice(bytes)?)
}
