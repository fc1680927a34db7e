//! Shared networking base: the live id -> entity table and generic
//! instantiate/deregister operations used by both host and client.

use crate::delegate::Delegate;
use crate::entity::{EntityId, NetworkedEntity};
use crate::error::NetError;
use crate::prefab::{EntityDirectory, PrefabRegistry};
use crate::protocol::EntityRecord;
use log::{info, warn};
use serde_json::Value;
use std::collections::HashMap;

/// Owns the prefab registry and the table of live networked entities.
///
/// The live table's key set is always exactly the set of ids that are
/// valid targets for deserialize and RPC calls. The surrounding engine
/// observes entity lifecycle through the `entity_added` /
/// `entity_removed` delegates (its addEntity/destroyEntity seam).
pub struct Networking {
    registry: PrefabRegistry,
    entities: HashMap<EntityId, NetworkedEntity>,
    pub entity_added: Delegate<EntityId>,
    pub entity_removed: Delegate<EntityId>,
}

impl Networking {
    pub fn new(registry: PrefabRegistry) -> Self {
        Self {
            registry,
            entities: HashMap::new(),
            entity_added: Delegate::new(),
            entity_removed: Delegate::new(),
        }
    }

    pub fn registry(&self) -> &PrefabRegistry {
        &self.registry
    }

    /// Constructs an entity of the given prefab type under the supplied
    /// id and registers it in the live table.
    ///
    /// The host generates fresh ids before calling this; the client
    /// passes ids named by incoming snapshots.
    pub fn instantiate_with_id(&mut self, kind: &str, id: EntityId) -> Result<(), NetError> {
        let prefab = self
            .registry
            .get(kind)
            .ok_or_else(|| NetError::UnknownPrefab(kind.to_string()))?;
        let components = prefab.create_components();

        let entity = NetworkedEntity::new(id.clone(), kind, components);
        if self.entities.insert(id.clone(), entity).is_some() {
            warn!("entity '{}' instantiated twice, replacing", id);
        }
        info!("registered entity '{}' ({})", id, kind);
        self.entity_added.emit(&id);
        Ok(())
    }

    /// Removes an entity from the live table.
    ///
    /// Idempotent: a second call for the same id returns false and
    /// fires nothing, so teardown hooks may call it unconditionally.
    pub fn deregister(&mut self, id: &EntityId) -> bool {
        match self.entities.remove(id) {
            Some(entity) => {
                info!("deregistered entity '{}' ({})", id, entity.kind());
                self.entity_removed.emit(id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&NetworkedEntity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: &EntityId) -> Option<&mut NetworkedEntity> {
        self.entities.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkedEntity> {
        self.entities.values()
    }

    /// Captures an id -> type view of the live table for cross-entity
    /// reference resolution during deserialization.
    pub fn directory(&self) -> EntityDirectory {
        self.entities
            .iter()
            .map(|(id, entity)| (id.clone(), entity.kind().to_string()))
            .collect()
    }

    /// Serializes every live entity through its prefab. Used by the
    /// host's per-tick broadcast; a failure here is a programming error
    /// in a prefab and propagates.
    pub fn serialize_all(&self) -> Result<Vec<EntityRecord>, NetError> {
        let mut records = Vec::with_capacity(self.entities.len());
        for entity in self.entities.values() {
            let prefab = self
                .registry
                .get(entity.kind())
                .ok_or_else(|| NetError::UnknownPrefab(entity.kind().to_string()))?;
            records.push(EntityRecord {
                id: entity.id().clone(),
                kind: entity.kind().to_string(),
                state: prefab.serialize(entity)?,
            });
        }
        Ok(records)
    }

    /// Applies serialized state to an already-registered entity through
    /// its prefab's deserialize.
    pub fn apply_state(
        &mut self,
        id: &EntityId,
        state: &Value,
        directory: &EntityDirectory,
    ) -> Result<(), NetError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| NetError::DanglingReference(id.clone()))?;
        let prefab = self
            .registry
            .get(entity.kind())
            .ok_or_else(|| NetError::UnknownPrefab(entity.kind().to_string()))?;
        prefab.deserialize(entity, state, directory)
    }
}
