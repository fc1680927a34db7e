//! Prefab registry: named factories with serialize/deserialize
//! descriptors for each entity type.

use crate::entity::{Component, EntityId, NetworkedEntity};
use crate::error::NetError;
use log::warn;
use serde_json::Value;
use std::collections::HashMap;

/// Static descriptor for one entity type.
///
/// `create_components` is invoked identically on host and client so the
/// component sets match; `serialize`/`deserialize` must round-trip
/// every field gameplay depends on, including cross-entity id
/// references resolved through the [`EntityDirectory`].
pub trait Prefab {
    fn type_name(&self) -> &'static str;

    /// Produces the component set for a fresh instance.
    fn create_components(&self) -> Vec<Box<dyn Component>>;

    fn serialize(&self, entity: &NetworkedEntity) -> Result<Value, NetError>;

    fn deserialize(
        &self,
        entity: &mut NetworkedEntity,
        state: &Value,
        directory: &EntityDirectory,
    ) -> Result<(), NetError>;
}

/// An id -> type view of the live table, captured after the
/// instantiation phase of snapshot reconciliation.
///
/// Entities reference each other across the serialization boundary only
/// by id through this directory, never by owning pointers; a prefab's
/// `deserialize` resolves a reference by checking membership here. The
/// host guarantees referenced entities appear in the same or an earlier
/// snapshot, so a miss is a fatal protocol violation.
#[derive(Debug, Default, Clone)]
pub struct EntityDirectory {
    entries: HashMap<EntityId, String>,
}

impl EntityDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn kind_of(&self, id: &EntityId) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// Validates a cross-entity reference.
    pub fn resolve(&self, id: &EntityId) -> Result<(), NetError> {
        if self.entries.contains_key(id) {
            Ok(())
        } else {
            Err(NetError::DanglingReference(id.clone()))
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(EntityId, String)> for EntityDirectory {
    fn from_iter<I: IntoIterator<Item = (EntityId, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Mapping from type name to prefab descriptor. Static configuration,
/// populated once at startup and identical on host and client.
#[derive(Default)]
pub struct PrefabRegistry {
    prefabs: HashMap<&'static str, Box<dyn Prefab>>,
}

impl PrefabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a prefab under its type name. A duplicate name
    /// replaces the earlier entry.
    pub fn register(&mut self, prefab: Box<dyn Prefab>) {
        let name = prefab.type_name();
        if self.prefabs.insert(name, prefab).is_some() {
            warn!("prefab '{}' registered twice, keeping the newer entry", name);
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn Prefab> {
        self.prefabs.get(type_name).map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.prefabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefabs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPrefab;

    impl Prefab for NullPrefab {
        fn type_name(&self) -> &'static str {
            "null"
        }

        fn create_components(&self) -> Vec<Box<dyn Component>> {
            Vec::new()
        }

        fn serialize(&self, _entity: &NetworkedEntity) -> Result<Value, NetError> {
            Ok(Value::Null)
        }

        fn deserialize(
            &self,
            _entity: &mut NetworkedEntity,
            _state: &Value,
            _directory: &EntityDirectory,
        ) -> Result<(), NetError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PrefabRegistry::new();
        assert!(registry.is_empty());

        registry.register(Box::new(NullPrefab));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("null").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let mut registry = PrefabRegistry::new();
        registry.register(Box::new(NullPrefab));
        registry.register(Box::new(NullPrefab));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_directory_resolution() {
        let directory: EntityDirectory =
            [(EntityId::from("w1"), "world".to_string())].into_iter().collect();

        assert!(directory.contains(&EntityId::from("w1")));
        assert_eq!(directory.kind_of(&EntityId::from("w1")), Some("world"));
        assert!(directory.resolve(&EntityId::from("w1")).is_ok());

        let missing = directory.resolve(&EntityId::from("w2"));
        assert!(matches!(missing, Err(NetError::DanglingReference(_))));
    }
}
