//! Bounded most-recent-first threat history.

use super::events::ThreatEvent;
use std::collections::VecDeque;

/// Number of threats retained when no capacity is configured.
pub const DEFAULT_THREAT_CAPACITY: usize = 100;

/// Fixed-capacity list with the newest event at the front.
///
/// Pushing past capacity silently evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct ThreatBuffer {
    events: VecDeque<ThreatEvent>,
    capacity: usize,
}

impl Default for ThreatBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_THREAT_CAPACITY)
    }
}

impl ThreatBuffer {
    /// Create a buffer holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend an event. Returns the evicted event, if any.
    pub fn push(&mut self, event: ThreatEvent) -> Option<ThreatEvent> {
        self.events.push_front(event);
        if self.events.len() > self.capacity {
            self.events.pop_back()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The most recently pushed event.
    pub fn latest(&self) -> Option<&ThreatEvent> {
        self.events.front()
    }

    /// Iterate most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &ThreatEvent> {
        self.events.iter()
    }

    /// Copy of the first `limit` events, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<ThreatEvent> {
        self.events.iter().take(limit).cloned().collect()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.id == id)
    }

    pub fn to_vec(&self) -> Vec<ThreatEvent> {
        self.events.iter().cloned().collect()
    }
}
