//! Host-side player slots and session-scoped id allocation.

use shared::entity::EntityId;
use shared::input::PlayerInput;

/// One participant slot on the host: exactly one per connected peer,
/// plus at most one local player whose input the host process writes
/// directly instead of receiving over the wire.
#[derive(Debug)]
pub struct NetworkingPlayer {
    pub id: u32,
    pub local: bool,
    pub input: PlayerInput,
}

impl NetworkingPlayer {
    pub fn new(id: u32, local: bool) -> Self {
        Self {
            id,
            local,
            input: PlayerInput::new(),
        }
    }
}

/// Monotonic player id source owned by the host session.
///
/// Values are unique for the session lifetime and never reused, even
/// after the player disconnects.
#[derive(Debug)]
pub struct PlayerIdAllocator {
    next: u32,
}

impl PlayerIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for PlayerIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic entity id source owned by the host session.
#[derive(Debug)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId::new(format!("e{}", self.next));
        self.next += 1;
        id
    }
}

impl Default for EntityIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
