//! Per-player key state with single-fire pressed edges.

use std::collections::HashSet;

/// Tracks which keys a player currently holds and which were freshly
/// pressed this tick.
///
/// A `pressed` flag fires once per physical press: repeated key-down
/// messages while the key is held do not re-trigger the edge, and the
/// flag survives until the host's explicit end-of-tick clear so that
/// gameplay code observes a press exactly once regardless of when the
/// message arrived within the tick.
#[derive(Debug, Default, Clone)]
pub struct PlayerInput {
    down: HashSet<u32>,
    pressed: HashSet<u32>,
}

impl PlayerInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a key as held. Only a transition from released to held
    /// sets the pressed edge.
    pub fn key_down(&mut self, code: u32) {
        if self.down.insert(code) {
            self.pressed.insert(code);
        }
    }

    /// Marks a key as released. No pressed-edge implication.
    pub fn key_up(&mut self, code: u32) {
        self.down.remove(&code);
    }

    pub fn is_key_down(&self, code: u32) -> bool {
        self.down.contains(&code)
    }

    pub fn is_key_pressed(&self, code: u32) -> bool {
        self.pressed.contains(&code)
    }

    /// The per-tick clear, run by the host after gameplay code has
    /// observed this tick's edges.
    pub fn clear_pressed(&mut self) {
        self.pressed.clear();
    }
}
