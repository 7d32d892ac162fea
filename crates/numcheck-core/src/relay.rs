use crate::domain::Relay;

/// Round-robin cursor over a fixed relay list.
///
/// Rotation needs `&mut self`: the run loop that owns the ring is its only caller.
#[derive(Clone, Debug, Default)]
pub struct RelayRing {
    relays: Vec<Relay>,
    cursor: usize,
}

impl RelayRing {
    pub fn new(relays: Vec<Relay>) -> Self {
        Self { relays, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Next relay in rotation, or `None` (connect directly) when the list is empty.
    pub fn next_relay(&mut self) -> Option<Relay> {
        if self.relays.is_empty() {
            return None;
        }
        let relay = self.relays[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.relays.len();
        Some(relay)
    }
}
