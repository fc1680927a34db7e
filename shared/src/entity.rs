//! Networked entity model: stable ids, typed components, and the
//! RPC dispatch seam.

use crate::error::NetError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;

/// Globally unique entity identifier, stable for the entity's lifetime.
///
/// The host generates fresh ids at creation time; clients only ever see
/// ids supplied by incoming snapshots and treat them as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A typed capability attached to a networked entity.
///
/// Each component kind carries a stable wire tag (`kind`) that both
/// sides agree on at registration time; RPC messages name components by
/// this tag rather than by any language-reflected type name. Remotely
/// invokable methods are dispatched through `handle_rpc` by name.
pub trait Component: Any {
    /// Stable wire tag for this component kind.
    fn kind(&self) -> &'static str;

    /// Executes a remotely invokable method.
    ///
    /// An unknown method or bad arguments mean the host and client
    /// builds disagree; both are loud errors rather than silent drops.
    fn handle_rpc(&mut self, method: &str, args: &[Value]) -> Result<(), NetError>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A live simulation object tracked by the synchronization core.
///
/// The component set is fixed at creation by the entity's prefab and
/// opaque to the core; the prefab type is immutable after creation.
pub struct NetworkedEntity {
    id: EntityId,
    kind: String,
    components: Vec<Box<dyn Component>>,
}

impl NetworkedEntity {
    pub fn new(id: EntityId, kind: impl Into<String>, components: Vec<Box<dyn Component>>) -> Self {
        Self {
            id,
            kind: kind.into(),
            components,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Prefab type name this entity was instantiated from.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Looks up a component by its wire tag.
    pub fn component_by_tag(&self, tag: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|c| c.kind() == tag)
            .map(|c| c.as_ref())
    }

    pub fn component_by_tag_mut(&mut self, tag: &str) -> Option<&mut dyn Component> {
        self.components
            .iter_mut()
            .find(|c| c.kind() == tag)
            .map(|c| c.as_mut())
    }

    /// Typed component access.
    pub fn component<T: Component>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|c| c.as_any_mut().downcast_mut::<T>())
    }
}

impl fmt::Debug for NetworkedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.components.iter().map(|c| c.kind()).collect();
        f.debug_struct("NetworkedEntity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("components", &tags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: i64,
    }

    impl Component for Counter {
        fn kind(&self) -> &'static str {
            "counter"
        }

        fn handle_rpc(&mut self, method: &str, args: &[Value]) -> Result<(), NetError> {
            match method {
                "add" => {
                    let amount = args
                        .first()
                        .and_then(Value::as_i64)
                        .ok_or_else(|| NetError::InvalidRpcArgs {
                            component: "counter".to_string(),
                            method: method.to_string(),
                        })?;
                    self.value += amount;
                    Ok(())
                }
                _ => Err(NetError::UnknownRpcMethod {
                    component: "counter".to_string(),
                    method: method.to_string(),
                }),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn test_entity() -> NetworkedEntity {
        NetworkedEntity::new(
            EntityId::from("e1"),
            "test",
            vec![Box::new(Counter { value: 0 })],
        )
    }

    #[test]
    fn test_component_lookup_by_tag() {
        let entity = test_entity();
        assert!(entity.component_by_tag("counter").is_some());
        assert!(entity.component_by_tag("missing").is_none());
    }

    #[test]
    fn test_typed_component_access() {
        let mut entity = test_entity();
        entity.component_mut::<Counter>().unwrap().value = 7;
        assert_eq!(entity.component::<Counter>().unwrap().value, 7);
    }

    #[test]
    fn test_rpc_dispatch_by_name() {
        let mut entity = test_entity();
        let target = entity.component_by_tag_mut("counter").unwrap();
        target
            .handle_rpc("add", &[Value::from(3)])
            .expect("known method with valid args");
        assert_eq!(entity.component::<Counter>().unwrap().value, 3);
    }

    #[test]
    fn test_rpc_unknown_method_is_loud() {
        let mut entity = test_entity();
        let target = entity.component_by_tag_mut("counter").unwrap();
        let result = target.handle_rpc("frobnicate", &[]);
        assert!(matches!(result, Err(NetError::UnknownRpcMethod { .. })));
    }

    #[test]
    fn test_rpc_bad_args_is_loud() {
        let mut entity = test_entity();
        let target = entity.component_by_tag_mut("counter").unwrap();
        let result = target.handle_rpc("add", &[Value::from("three")]);
        assert!(matches!(result, Err(NetError::InvalidRpcArgs { .. })));
    }

    #[test]
    fn test_entity_id_display_and_serde() {
        let id = EntityId::from("p1");
        assert_eq!(id.to_string(), "p1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"p1\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
