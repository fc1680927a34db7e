//! The mirroring side of the synchronization protocol.
//!
//! `NetworkingClient` reconstructs a shadow copy of the host's entity
//! set from the snapshot stream, replays RPCs on it, and forwards local
//! key events upstream. It never predicts: host authority is absolute.

use log::{debug, info, warn};
use shared::entity::EntityId;
use shared::error::NetError;
use shared::networking::Networking;
use shared::prefab::PrefabRegistry;
use shared::protocol::{RpcCall, SnapshotData, WireMessage};
use shared::transport::ClientTransport;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Connected,
    /// The host rejected us (room full). User-visible.
    Error,
    /// Transport disconnect. Input forwarding is neutralized.
    Closed,
}

pub struct NetworkingClient {
    base: Networking,
    transport: Box<dyn ClientTransport>,
    state: ClientState,
    player_id: Option<u32>,
    /// Highest snapshot clock accepted so far; 0 before the first
    /// accepted snapshot (host clocks start at 1).
    high_water: u64,
}

impl NetworkingClient {
    pub fn new(registry: PrefabRegistry, transport: Box<dyn ClientTransport>) -> Self {
        Self {
            base: Networking::new(registry),
            transport,
            state: ClientState::Connecting,
            player_id: None,
            high_water: 0,
        }
    }

    pub fn base(&self) -> &Networking {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Networking {
        &mut self.base
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    /// Asks the host to admit us.
    pub fn connect(&mut self) -> Result<(), NetError> {
        self.transport.send(&WireMessage::Join)
    }

    /// Entry point for every message the transport delivers.
    ///
    /// Timing conditions (stale snapshots, vanished RPC targets) are
    /// absorbed here; an `Err` from this method means a protocol
    /// invariant between host and client is broken.
    ///
    /// Snapshots and RPCs are applied while `Connecting` too, since UDP
    /// may deliver a broadcast ahead of our `identity`. After the
    /// session ends nothing is applied.
    pub fn on_message(&mut self, message: WireMessage) -> Result<(), NetError> {
        if matches!(self.state, ClientState::Error | ClientState::Closed) {
            debug!("session is over, ignoring {:?}", message);
            return Ok(());
        }
        match message {
            WireMessage::Identity { id } => {
                info!("connected as player {}", id);
                self.player_id = Some(id);
                self.state = ClientState::Connected;
                Ok(())
            }
            WireMessage::TooManyPlayers => {
                warn!("host rejected us: room is full");
                self.state = ClientState::Error;
                Ok(())
            }
            WireMessage::Snapshot(snapshot) => match self.apply_snapshot(snapshot) {
                // Expected under network reordering, not an error.
                Err(NetError::StaleSnapshot { .. }) => Ok(()),
                other => other,
            },
            WireMessage::Rpc(call) => self.apply_rpc(call),
            other => {
                warn!("unexpected message: {:?}", other);
                Ok(())
            }
        }
    }

    /// Called when the transport loses the connection. Input callbacks
    /// become silent no-ops from here on.
    pub fn on_disconnected(&mut self) {
        if self.state != ClientState::Error {
            self.state = ClientState::Closed;
        }
        info!("connection closed");
    }

    /// Reconciles the local entity set against a snapshot.
    ///
    /// All new entities are instantiated under their supplied ids
    /// before any state is applied, so a record can reference another
    /// record created in the same snapshot regardless of array order.
    /// Ids the snapshot no longer mentions are destroyed afterwards.
    pub fn apply_snapshot(&mut self, snapshot: SnapshotData) -> Result<(), NetError> {
        if snapshot.clock <= self.high_water {
            return Err(NetError::StaleSnapshot {
                clock: snapshot.clock,
                high_water: self.high_water,
            });
        }

        let mut unseen: HashSet<EntityId> = self.base.ids().into_iter().collect();

        for record in &snapshot.objects {
            if !self.base.contains(&record.id) {
                self.base
                    .instantiate_with_id(&record.kind, record.id.clone())?;
            }
        }

        let directory = self.base.directory();
        for record in &snapshot.objects {
            self.base
                .apply_state(&record.id, &record.state, &directory)?;
            unseen.remove(&record.id);
        }

        for id in unseen {
            self.base.deregister(&id);
        }

        self.high_water = snapshot.clock;
        debug!(
            "applied snapshot clock={} ({} objects)",
            snapshot.clock,
            snapshot.objects.len()
        );
        Ok(())
    }

    /// Replays a host-invoked method on the local mirror.
    ///
    /// A missing entity is a destruction race and is ignored; a missing
    /// component means the prefab registries diverged and is fatal.
    pub fn apply_rpc(&mut self, call: RpcCall) -> Result<(), NetError> {
        let Some(entity) = self.base.entity_mut(&call.object_id) else {
            debug!("rpc target '{}' is gone, ignoring", call.object_id);
            return Ok(());
        };
        let component = entity
            .component_by_tag_mut(&call.component_name)
            .ok_or_else(|| NetError::MissingComponent {
                entity: call.object_id.clone(),
                component: call.component_name.clone(),
            })?;
        component.handle_rpc(&call.method_name, &call.args)
    }

    /// Forwards a local key press upstream. Pure forwarding, no local
    /// prediction.
    pub fn key_down(&mut self, code: u32) {
        self.forward(WireMessage::KeyDown { key_code: code });
    }

    pub fn key_up(&mut self, code: u32) {
        self.forward(WireMessage::KeyUp { key_code: code });
    }

    fn forward(&mut self, message: WireMessage) {
        match self.state {
            ClientState::Connecting | ClientState::Connected => {
                if let Err(e) = self.transport.send(&message) {
                    warn!("dropped input send: {}", e);
                }
            }
            // Neutralized after close/rejection: no sends, no panics.
            ClientState::Error | ClientState::Closed => {}
        }
    }
}
