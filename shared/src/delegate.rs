//! Typed multi-subscriber callback list.
//!
//! Higher layers use delegates to publish join/leave and entity
//! lifecycle notifications without coupling to their observers.
//! Single-threaded by design: subscribers run on the tick-loop thread.

/// An ordered list of callbacks invoked in subscription order.
pub struct Delegate<T> {
    subscribers: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Delegate<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&T) + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Invokes every subscriber with the event.
    pub fn emit(&mut self, event: &T) {
        for subscriber in &mut self.subscribers {
            subscriber(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl<T> Default for Delegate<T> {
    fn default() -> Self {
        Self::new()
    }
}
