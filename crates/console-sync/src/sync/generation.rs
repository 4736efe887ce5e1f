//! Generation: per-key request tags used to drop stale responses.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Issued when a request starts; only the newest ticket per key may land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub key: String,
    pub generation: Generation,
}

#[derive(Debug, Default)]
pub struct GenerationTracker {
    counter: AtomicU64,
    latest: DashMap<String, Generation>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a new request for `key`, superseding any earlier one.
    pub fn begin(&self, key: &str) -> Ticket {
        let generation = Generation(self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.latest.insert(key.to_string(), generation);
        Ticket {
            key: key.to_string(),
            generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest
            .get(&ticket.key)
            .is_some_and(|latest| *latest == ticket.generation)
    }

    pub fn latest(&self, key: &str) -> Option<Generation> {
        self.latest.get(key).map(|g| *g)
    }

    /// Make every outstanding ticket for `key` stale.
    pub fn invalidate(&self, key: &str) {
        self.latest.remove(key);
    }

    pub fn clear(&self) {
        self.latest.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_supersedes() {
        let tracker = GenerationTracker::new();
        let first = tracker.begin("containers");
        let second = tracker.begin("containers");
        assert!(second.generation > first.generation);
        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));
    }

    #[test]
    fn keys_are_independent() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("containers");
        let b = tracker.begin("networks");
        assert!(tracker.is_current(&a));
        assert!(tracker.is_current(&b));
    }

    #[test]
    fn invalidate_and_clear() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("containers");
        let b = tracker.begin("networks");
        tracker.invalidate("containers");
        assert!(!tracker.is_current(&a));
        assert!(tracker.is_current(&b));
        tracker.clear();
        assert!(!tracker.is_current(&b));
        assert_eq!(tracker.latest("networks"), None);
    }
}
