//! Demo gameplay layer: the prefabs both binaries register.
//!
//! Gameplay rules are not part of the synchronization core; this module
//! exists so the host and client binaries have a concrete payload and
//! so tests can exercise cross-entity references and RPC dispatch
//! against real prefabs. The `world`/`player` pair demonstrates an id
//! reference crossing the serialization boundary.

use crate::entity::{Component, EntityId, NetworkedEntity};
use crate::error::NetError;
use crate::input::PlayerInput;
use crate::prefab::{EntityDirectory, Prefab, PrefabRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

pub const KEY_LEFT: u32 = 37;
pub const KEY_UP: u32 = 38;
pub const KEY_RIGHT: u32 = 39;
pub const KEY_DOWN: u32 = 40;

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
/// Distance an avatar moves per tick per held direction key.
pub const MOVE_SPEED: f32 = 4.0;

/// Registers the demo prefab set. Must run identically on host and
/// client so the registries match.
pub fn register_prefabs(registry: &mut PrefabRegistry) {
    registry.register(Box::new(WorldPrefab));
    registry.register(Box::new(AvatarPrefab));
}

pub struct WorldComponent {
    pub width: f32,
    pub height: f32,
}

#[derive(Serialize, Deserialize)]
struct WorldState {
    width: f32,
    height: f32,
}

impl Component for WorldComponent {
    fn kind(&self) -> &'static str {
        "world"
    }

    fn handle_rpc(&mut self, method: &str, _args: &[Value]) -> Result<(), NetError> {
        Err(NetError::UnknownRpcMethod {
            component: "world".to_string(),
            method: method.to_string(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct WorldPrefab;

impl Prefab for WorldPrefab {
    fn type_name(&self) -> &'static str {
        "world"
    }

    fn create_components(&self) -> Vec<Box<dyn Component>> {
        vec![Box::new(WorldComponent {
            width: WORLD_WIDTH,
            height: WORLD_HEIGHT,
        })]
    }

    fn serialize(&self, entity: &NetworkedEntity) -> Result<Value, NetError> {
        let world = require_component::<WorldComponent>(entity, "world")?;
        Ok(serde_json::to_value(WorldState {
            width: world.width,
            height: world.height,
        })?)
    }

    fn deserialize(
        &self,
        entity: &mut NetworkedEntity,
        state: &Value,
        _directory: &EntityDirectory,
    ) -> Result<(), NetError> {
        let parsed: WorldState = serde_json::from_value(state.clone())?;
        let id = entity.id().clone();
        let world = require_component_mut::<WorldComponent>(entity, id, "world")?;
        world.width = parsed.width;
        world.height = parsed.height;
        Ok(())
    }
}

/// A player's avatar. `world` references the world entity by id; the
/// reference is carried through snapshots and resolved against the
/// entity directory on the receiving side.
pub struct AvatarComponent {
    pub x: f32,
    pub y: f32,
    pub owner: u32,
    pub world: Option<EntityId>,
}

#[derive(Serialize, Deserialize)]
struct AvatarState {
    x: f32,
    y: f32,
    owner: u32,
    world: Option<EntityId>,
}

impl Component for AvatarComponent {
    fn kind(&self) -> &'static str {
        "avatar"
    }

    fn handle_rpc(&mut self, method: &str, args: &[Value]) -> Result<(), NetError> {
        match method {
            "teleport" => {
                let (x, y) = two_floats("avatar", method, args)?;
                self.x = x;
                self.y = y;
                Ok(())
            }
            "nudge" => {
                let (dx, dy) = two_floats("avatar", method, args)?;
                self.x += dx;
                self.y += dy;
                Ok(())
            }
            _ => Err(NetError::UnknownRpcMethod {
                component: "avatar".to_string(),
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

pub struct AvatarPrefab;

impl Prefab for AvatarPrefab {
    fn type_name(&self) -> &'static str {
        "player"
    }

    fn create_components(&self) -> Vec<Box<dyn Component>> {
        vec![Box::new(AvatarComponent {
            x: 0.0,
            y: 0.0,
            owner: 0,
            world: None,
        })]
    }

    fn serialize(&self, entity: &NetworkedEntity) -> Result<Value, NetError> {
        let avatar = require_component::<AvatarComponent>(entity, "avatar")?;
        Ok(serde_json::to_value(AvatarState {
            x: avatar.x,
            y: avatar.y,
            owner: avatar.owner,
            world: avatar.world.clone(),
        })?)
    }

    fn deserialize(
        &self,
        entity: &mut NetworkedEntity,
        state: &Value,
        directory: &EntityDirectory,
    ) -> Result<(), NetError> {
        let parsed: AvatarState = serde_json::from_value(state.clone())?;
        if let Some(world) = &parsed.world {
            directory.resolve(world)?;
        }
        let id = entity.id().clone();
        let avatar = require_component_mut::<AvatarComponent>(entity, id, "avatar")?;
        avatar.x = parsed.x;
        avatar.y = parsed.y;
        avatar.owner = parsed.owner;
        avatar.world = parsed.world;
        Ok(())
    }
}

/// Applies one tick of held-key movement, clamped to the world bounds.
pub fn apply_movement(avatar: &mut AvatarComponent, input: &PlayerInput, bounds: (f32, f32)) {
    let mut dx = 0.0;
    let mut dy = 0.0;
    if input.is_key_down(KEY_LEFT) {
        dx -= MOVE_SPEED;
    }
    if input.is_key_down(KEY_RIGHT) {
        dx += MOVE_SPEED;
    }
    if input.is_key_down(KEY_UP) {
        dy -= MOVE_SPEED;
    }
    if input.is_key_down(KEY_DOWN) {
        dy += MOVE_SPEED;
    }

    avatar.x = (avatar.x + dx).clamp(0.0, bounds.0);
    avatar.y = (avatar.y + dy).clamp(0.0, bounds.1);
}

fn require_component<'a, T: Component>(
    entity: &'a NetworkedEntity,
    tag: &str,
) -> Result<&'a T, NetError> {
    entity.component::<T>().ok_or_else(|| NetError::MissingComponent {
        entity: entity.id().clone(),
        component: tag.to_string(),
    })
}

fn require_component_mut<'a, T: Component>(
    entity: &'a mut NetworkedEntity,
    id: EntityId,
    tag: &str,
) -> Result<&'a mut T, NetError> {
    entity.component_mut::<T>().ok_or(NetError::MissingComponent {
        entity: id,
        component: tag.to_string(),
    })
}

fn two_floats(component: &str, method: &str, args: &[Value]) -> Result<(f32, f32), NetError> {
    let invalid = || NetError::InvalidRpcArgs {
        component: component.to_string(),
        method: method.to_string(),
    };
    if args.len() != 2 {
        return Err(invalid());
    }
    let a = args[0].as_f64().ok_or_else(invalid)? as f32;
    let b = args[1].as_f64().ok_or_else(invalid)? as f32;
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    fn avatar_entity(id: &str) -> NetworkedEntity {
        NetworkedEntity::new(
            EntityId::from(id),
            "player",
            AvatarPrefab.create_components(),
        )
    }

    #[test]
    fn test_avatar_round_trip_preserves_world_reference() {
        let mut source = avatar_entity("p1");
        {
            let avatar = source.component_mut::<AvatarComponent>().unwrap();
            avatar.x = 12.0;
            avatar.y = 34.0;
            avatar.owner = 2;
            avatar.world = Some(EntityId::from("w1"));
        }

        let state = AvatarPrefab.serialize(&source).unwrap();

        let directory: EntityDirectory =
            [(EntityId::from("w1"), "world".to_string())].into_iter().collect();
        let mut target = avatar_entity("p1");
        AvatarPrefab
            .deserialize(&mut target, &state, &directory)
            .unwrap();

        let avatar = target.component::<AvatarComponent>().unwrap();
        assert_approx_eq!(avatar.x, 12.0, 0.0001);
        assert_approx_eq!(avatar.y, 34.0, 0.0001);
        assert_eq!(avatar.owner, 2);
        assert_eq!(avatar.world, Some(EntityId::from("w1")));
    }

    #[test]
    fn test_avatar_deserialize_with_dangling_world_is_fatal() {
        let mut source = avatar_entity("p1");
        source.component_mut::<AvatarComponent>().unwrap().world =
            Some(EntityId::from("w-gone"));
        let state = AvatarPrefab.serialize(&source).unwrap();

        let mut target = avatar_entity("p1");
        let result = AvatarPrefab.deserialize(&mut target, &state, &EntityDirectory::empty());
        assert!(matches!(result, Err(NetError::DanglingReference(_))));
    }

    #[test]
    fn test_teleport_rpc_is_absolute() {
        let mut entity = avatar_entity("p1");
        let avatar = entity.component_by_tag_mut("avatar").unwrap();
        avatar
            .handle_rpc("teleport", &[json!(100.0), json!(50.0)])
            .unwrap();
        avatar
            .handle_rpc("teleport", &[json!(100.0), json!(50.0)])
            .unwrap();

        let avatar = entity.component::<AvatarComponent>().unwrap();
        assert_approx_eq!(avatar.x, 100.0, 0.0001);
        assert_approx_eq!(avatar.y, 50.0, 0.0001);
    }

    #[test]
    fn test_nudge_rpc_is_relative() {
        let mut entity = avatar_entity("p1");
        let avatar = entity.component_by_tag_mut("avatar").unwrap();
        avatar.handle_rpc("nudge", &[json!(5.0), json!(0.0)]).unwrap();
        avatar.handle_rpc("nudge", &[json!(5.0), json!(0.0)]).unwrap();

        let avatar = entity.component::<AvatarComponent>().unwrap();
        assert_approx_eq!(avatar.x, 10.0, 0.0001);
    }

    #[test]
    fn test_rpc_arity_is_checked() {
        let mut entity = avatar_entity("p1");
        let avatar = entity.component_by_tag_mut("avatar").unwrap();
        let result = avatar.handle_rpc("teleport", &[json!(1.0)]);
        assert!(matches!(result, Err(NetError::InvalidRpcArgs { .. })));
    }

    #[test]
    fn test_movement_clamps_to_bounds() {
        let mut avatar = AvatarComponent {
            x: 1.0,
            y: 0.0,
            owner: 1,
            world: None,
        };
        let mut input = PlayerInput::new();
        input.key_down(KEY_LEFT);
        input.key_down(KEY_UP);

        apply_movement(&mut avatar, &input, (WORLD_WIDTH, WORLD_HEIGHT));
        assert_approx_eq!(avatar.x, 0.0, 0.0001);
        assert_approx_eq!(avatar.y, 0.0, 0.0001);
    }

    #[test]
    fn test_world_round_trip() {
        let mut source = NetworkedEntity::new(
            EntityId::from("w1"),
            "world",
            WorldPrefab.create_components(),
        );
        source.component_mut::<WorldComponent>().unwrap().width = 1024.0;

        let state = WorldPrefab.serialize(&source).unwrap();
        let mut target = NetworkedEntity::new(
            EntityId::from("w1"),
            "world",
            WorldPrefab.create_components(),
        );
        WorldPrefab
            .deserialize(&mut target, &state, &EntityDirectory::empty())
            .unwrap();

        assert_approx_eq!(
            target.component::<WorldComponent>().unwrap().width,
            1024.0,
            0.0001
        );
    }
}
