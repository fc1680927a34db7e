//! The authoritative side of the synchronization protocol.
//!
//! `NetworkingHost` owns the live entity table (through the shared
//! base), one player slot per connected peer, the snapshot clock, and
//! the RPC dispatcher. The transport delivers peer lifecycle and
//! message events between ticks; gameplay code mutates entities and
//! reads player input, then the end-of-tick `tick()` call broadcasts
//! the world and clears pressed edges.

use crate::player::{EntityIdAllocator, NetworkingPlayer, PlayerIdAllocator};
use log::{info, warn};
use serde_json::Value;
use shared::delegate::Delegate;
use shared::entity::EntityId;
use shared::error::NetError;
use shared::networking::Networking;
use shared::prefab::PrefabRegistry;
use shared::protocol::{RpcCall, SnapshotData, WireMessage};
use shared::transport::{HostTransport, PeerId};
use std::collections::HashMap;

pub struct NetworkingHost {
    base: Networking,
    transport: Box<dyn HostTransport>,
    players: HashMap<u32, NetworkingPlayer>,
    peers: HashMap<PeerId, u32>,
    max_players: usize,
    clock: u64,
    player_ids: PlayerIdAllocator,
    entity_ids: EntityIdAllocator,
    /// Fired with the new player's id after a slot is allocated.
    pub player_added: Delegate<u32>,
    /// Fired with the departed player's id so gameplay can clean up
    /// entities that player owned.
    pub player_removed: Delegate<u32>,
}

impl NetworkingHost {
    pub fn new(
        registry: PrefabRegistry,
        transport: Box<dyn HostTransport>,
        max_players: usize,
    ) -> Self {
        Self {
            base: Networking::new(registry),
            transport,
            players: HashMap::new(),
            peers: HashMap::new(),
            max_players,
            clock: 0,
            player_ids: PlayerIdAllocator::new(),
            entity_ids: EntityIdAllocator::new(),
            player_added: Delegate::new(),
            player_removed: Delegate::new(),
        }
    }

    pub fn base(&self) -> &Networking {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Networking {
        &mut self.base
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn player(&self, id: u32) -> Option<&NetworkingPlayer> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: u32) -> Option<&mut NetworkingPlayer> {
        self.players.get_mut(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_ids(&self) -> Vec<u32> {
        self.players.keys().copied().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Allocates the optional host-side player. Its input shares the
    /// local reading path instead of arriving as wire messages.
    pub fn add_local_player(&mut self) -> u32 {
        let id = self.player_ids.allocate();
        self.players.insert(id, NetworkingPlayer::new(id, true));
        info!("added local player {}", id);
        self.player_added.emit(&id);
        id
    }

    /// Handles a freshly-connected peer.
    ///
    /// The capacity check runs before any other connection bookkeeping:
    /// a peer arriving with all slots taken is told `tooManyPlayers`
    /// and dropped without ever being allocated a player id.
    pub fn on_peer_connected(&mut self, peer: PeerId) {
        if self.players.len() >= self.max_players {
            info!("rejecting {}: player slots are full", peer);
            if let Err(e) = self.transport.send(peer, &WireMessage::TooManyPlayers) {
                warn!("failed to send rejection to {}: {}", peer, e);
            }
            self.transport.disconnect(peer);
            return;
        }

        let id = self.player_ids.allocate();
        self.players.insert(id, NetworkingPlayer::new(id, false));
        self.peers.insert(peer, id);
        info!("{} connected as player {}", peer, id);

        if let Err(e) = self.transport.send(peer, &WireMessage::Identity { id }) {
            warn!("failed to send identity to {}: {}", peer, e);
        }
        self.player_added.emit(&id);
    }

    /// Routes a message from a connected peer into that peer's player
    /// input state.
    pub fn on_peer_message(&mut self, peer: PeerId, message: WireMessage) {
        let Some(&player_id) = self.peers.get(&peer) else {
            warn!("message from unknown {}", peer);
            return;
        };
        match message {
            WireMessage::KeyDown { key_code } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    player.input.key_down(key_code);
                }
            }
            WireMessage::KeyUp { key_code } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    player.input.key_up(key_code);
                }
            }
            other => {
                warn!("unexpected message from player {}: {:?}", player_id, other);
            }
        }
    }

    /// Handles a peer close or error: the player slot is removed and
    /// observers are notified so gameplay can despawn owned entities.
    pub fn on_peer_disconnected(&mut self, peer: PeerId) {
        let Some(player_id) = self.peers.remove(&peer) else {
            return;
        };
        self.players.remove(&player_id);
        info!("{} disconnected, removed player {}", peer, player_id);
        self.player_removed.emit(&player_id);
    }

    /// Creates a networked entity with a host-generated id.
    pub fn instantiate(&mut self, kind: &str) -> Result<EntityId, NetError> {
        let id = self.entity_ids.allocate();
        self.base.instantiate_with_id(kind, id.clone())?;
        Ok(id)
    }

    /// Destroys an entity, releasing its id from the live table.
    /// Idempotent, so teardown paths may call it unconditionally.
    pub fn destroy(&mut self, id: &EntityId) -> bool {
        self.base.deregister(id)
    }

    /// End-of-tick processing: serializes every live entity, broadcasts
    /// the snapshot under a freshly incremented clock, then clears
    /// pressed edges for all players.
    ///
    /// Gameplay code must have finished observing this tick's pressed
    /// flags before calling this; the deferred clear is what makes a
    /// single press visible to exactly one simulation step.
    pub fn tick(&mut self) -> Result<(), NetError> {
        let objects = self.base.serialize_all()?;
        self.clock += 1;

        // Clock values stay strictly increasing across the session even
        // while nobody is listening.
        if !self.peers.is_empty() {
            self.transport.broadcast(&WireMessage::Snapshot(SnapshotData {
                objects,
                clock: self.clock,
            }));
        }

        for player in self.players.values_mut() {
            player.input.clear_pressed();
        }
        Ok(())
    }

    /// Executes a remotely invokable component method locally, then
    /// broadcasts it as an RPC for clients to replay on their mirrors.
    ///
    /// Local execution completes before the broadcast, so any
    /// serializable state the method mutates is also reflected in the
    /// next snapshot; clients tolerate receiving both.
    pub fn invoke(
        &mut self,
        id: &EntityId,
        component: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<(), NetError> {
        let entity = self
            .base
            .entity_mut(id)
            .ok_or_else(|| NetError::DanglingReference(id.clone()))?;
        let target = entity
            .component_by_tag_mut(component)
            .ok_or_else(|| NetError::MissingComponent {
                entity: id.clone(),
                component: component.to_string(),
            })?;
        target.handle_rpc(method, &args)?;

        self.transport.broadcast(&WireMessage::Rpc(RpcCall {
            object_id: id.clone(),
            component_name: component.to_string(),
            method_name: method.to_string(),
            args,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::game::{self, AvatarComponent, KEY_LEFT};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every transport call so tests can assert on ordering.
    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        To(PeerId, String),
        All(String),
        Dropped(PeerId),
    }

    #[derive(Default)]
    struct RecordingTransport {
        log: Rc<RefCell<Vec<Sent>>>,
    }

    fn tag_of(message: &WireMessage) -> String {
        let json = serde_json::to_value(message).unwrap();
        json["type"].as_str().unwrap().to_string()
    }

    impl HostTransport for RecordingTransport {
        fn send(&mut self, peer: PeerId, message: &WireMessage) -> Result<(), NetError> {
            self.log.borrow_mut().push(Sent::To(peer, tag_of(message)));
            Ok(())
        }

        fn broadcast(&mut self, message: &WireMessage) {
            self.log.borrow_mut().push(Sent::All(tag_of(message)));
        }

        fn disconnect(&mut self, peer: PeerId) {
            self.log.borrow_mut().push(Sent::Dropped(peer));
        }
    }

    fn test_host(max_players: usize) -> (NetworkingHost, Rc<RefCell<Vec<Sent>>>) {
        let mut registry = PrefabRegistry::new();
        game::register_prefabs(&mut registry);
        let transport = RecordingTransport::default();
        let log = Rc::clone(&transport.log);
        (
            NetworkingHost::new(registry, Box::new(transport), max_players),
            log,
        )
    }

    #[test]
    fn test_peer_connect_allocates_player_and_sends_identity() {
        let (mut host, log) = test_host(4);
        host.on_peer_connected(PeerId(1));

        assert_eq!(host.player_count(), 1);
        assert_eq!(host.peer_count(), 1);
        assert_eq!(
            *log.borrow(),
            vec![Sent::To(PeerId(1), "identity".to_string())]
        );
    }

    #[test]
    fn test_capacity_rejection_allocates_nothing() {
        let (mut host, log) = test_host(2);
        host.on_peer_connected(PeerId(1));
        host.on_peer_connected(PeerId(2));
        log.borrow_mut().clear();

        host.on_peer_connected(PeerId(3));

        assert_eq!(host.player_count(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                Sent::To(PeerId(3), "tooManyPlayers".to_string()),
                Sent::Dropped(PeerId(3)),
            ]
        );

        // Existing players are unaffected and the next id was not
        // burned on the rejected peer.
        host.on_peer_disconnected(PeerId(1));
        host.on_peer_connected(PeerId(4));
        let ids = host.player_ids();
        assert!(ids.contains(&2));
        assert!(ids.contains(&3));
    }

    #[test]
    fn test_disconnect_removes_player_and_notifies() {
        let (mut host, _log) = test_host(4);
        let removed = Rc::new(RefCell::new(Vec::new()));
        let removed_handle = Rc::clone(&removed);
        host.player_removed
            .subscribe(move |id| removed_handle.borrow_mut().push(*id));

        host.on_peer_connected(PeerId(1));
        host.on_peer_disconnected(PeerId(1));

        assert_eq!(host.player_count(), 0);
        assert_eq!(*removed.borrow(), vec![1]);

        // A second disconnect for the same peer is a no-op.
        host.on_peer_disconnected(PeerId(1));
        assert_eq!(*removed.borrow(), vec![1]);
    }

    #[test]
    fn test_key_events_route_to_owning_player() {
        let (mut host, _log) = test_host(4);
        host.on_peer_connected(PeerId(1));
        host.on_peer_connected(PeerId(2));

        host.on_peer_message(PeerId(1), WireMessage::KeyDown { key_code: KEY_LEFT });

        assert!(host.player(1).unwrap().input.is_key_down(KEY_LEFT));
        assert!(!host.player(2).unwrap().input.is_key_down(KEY_LEFT));

        host.on_peer_message(PeerId(1), WireMessage::KeyUp { key_code: KEY_LEFT });
        assert!(!host.player(1).unwrap().input.is_key_down(KEY_LEFT));
    }

    #[test]
    fn test_pressed_edges_survive_until_end_of_tick() {
        let (mut host, _log) = test_host(4);
        host.on_peer_connected(PeerId(1));

        // Two key-downs in the same tick window: one edge.
        host.on_peer_message(PeerId(1), WireMessage::KeyDown { key_code: KEY_LEFT });
        host.on_peer_message(PeerId(1), WireMessage::KeyDown { key_code: KEY_LEFT });
        assert!(host.player(1).unwrap().input.is_key_pressed(KEY_LEFT));

        host.tick().unwrap();
        assert!(!host.player(1).unwrap().input.is_key_pressed(KEY_LEFT));
        // Held state persists across the clear.
        assert!(host.player(1).unwrap().input.is_key_down(KEY_LEFT));
    }

    #[test]
    fn test_tick_broadcasts_snapshot_with_increasing_clock() {
        let (mut host, log) = test_host(4);
        host.on_peer_connected(PeerId(1));
        host.instantiate("world").unwrap();
        log.borrow_mut().clear();

        host.tick().unwrap();
        host.tick().unwrap();

        assert_eq!(host.clock(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                Sent::All("snapshot".to_string()),
                Sent::All("snapshot".to_string()),
            ]
        );
    }

    #[test]
    fn test_tick_without_peers_still_advances_clock() {
        let (mut host, log) = test_host(4);
        host.tick().unwrap();
        assert_eq!(host.clock(), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_invoke_executes_locally_then_broadcasts() {
        let (mut host, log) = test_host(4);
        host.on_peer_connected(PeerId(1));
        let id = host.instantiate("player").unwrap();
        log.borrow_mut().clear();

        host.invoke(&id, "avatar", "teleport", vec![json!(9.0), json!(8.0)])
            .unwrap();

        let avatar = host
            .base()
            .entity(&id)
            .unwrap()
            .component::<AvatarComponent>()
            .unwrap();
        assert_eq!(avatar.x, 9.0);
        assert_eq!(avatar.y, 8.0);
        assert_eq!(*log.borrow(), vec![Sent::All("rpc".to_string())]);
    }

    #[test]
    fn test_invoke_failure_broadcasts_nothing() {
        let (mut host, log) = test_host(4);
        host.on_peer_connected(PeerId(1));
        let id = host.instantiate("player").unwrap();
        log.borrow_mut().clear();

        let missing = host.invoke(&EntityId::from("nope"), "avatar", "teleport", vec![]);
        assert!(matches!(missing, Err(NetError::DanglingReference(_))));

        let bad_method = host.invoke(&id, "avatar", "explode", vec![]);
        assert!(matches!(bad_method, Err(NetError::UnknownRpcMethod { .. })));

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_local_player_shares_tick_clear() {
        let (mut host, _log) = test_host(4);
        let local = host.add_local_player();

        host.player_mut(local).unwrap().input.key_down(KEY_LEFT);
        assert!(host.player(local).unwrap().input.is_key_pressed(KEY_LEFT));

        host.tick().unwrap();
        assert!(!host.player(local).unwrap().input.is_key_pressed(KEY_LEFT));
    }

    #[test]
    fn test_instantiate_unknown_prefab_propagates() {
        let (mut host, _log) = test_host(4);
        let result = host.instantiate("ghost");
        assert!(matches!(result, Err(NetError::UnknownPrefab(_))));
    }

    #[test]
    fn test_destroy_releases_id_before_next_snapshot() {
        let (mut host, _log) = test_host(4);
        let id = host.instantiate("world").unwrap();
        assert!(host.destroy(&id));
        assert!(!host.destroy(&id));

        let records = host.base().serialize_all().unwrap();
        assert!(records.is_empty());
    }
}
