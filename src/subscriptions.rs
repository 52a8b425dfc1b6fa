//! Subscription registry.
//!
//! Tracks the destinations the client wants broadcasts from, independent of
//! connection state: entries persist across disconnects and are replayed in
//! insertion order after every successful (re)connect, so the set the server
//! sees always converges back to exactly what the caller asked for.

use std::sync::Mutex;

/// Ordered, deduplicated set of subscribed destinations.
///
/// Mutated from the client handle and read by the connection runtime; a
/// plain std mutex suffices since no lock is ever held across an await.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    destinations: Mutex<Vec<String>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination. Returns `false` if it was already present
    /// (idempotent add — the insertion order of the first add is kept).
    pub fn add(&self, destination: &str) -> bool {
        let mut destinations = self.destinations.lock().expect("registry lock poisoned");
        if destinations.iter().any(|d| d == destination) {
            return false;
        }
        destinations.push(destination.to_string());
        true
    }

    /// Remove a destination. Returns `false` if it was not present.
    pub fn remove(&self, destination: &str) -> bool {
        let mut destinations = self.destinations.lock().expect("registry lock poisoned");
        let before = destinations.len();
        destinations.retain(|d| d != destination);
        destinations.len() != before
    }

    /// Whether a destination is currently registered.
    #[must_use]
    pub fn contains(&self, destination: &str) -> bool {
        self.destinations
            .lock()
            .expect("registry lock poisoned")
            .iter()
            .any(|d| d == destination)
    }

    /// Snapshot of all destinations in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.destinations
            .lock()
            .expect("registry lock poisoned")
            .clone()
    }

    /// Number of registered destinations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.destinations.lock().expect("registry lock poisoned").len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.add("/topic/community"));
        assert!(!registry.add("/topic/community"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        registry.add("/topic/community");
        assert!(registry.remove("/topic/community"));
        assert!(!registry.remove("/topic/community"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let registry = SubscriptionRegistry::new();
        registry.add("/topic/community");
        registry.add("/user/queue/alerts");
        registry.add("/topic/weather");
        // Re-adding an existing destination must not reorder it.
        registry.add("/topic/community");
        assert_eq!(
            registry.snapshot(),
            vec!["/topic/community", "/user/queue/alerts", "/topic/weather"]
        );
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let registry = SubscriptionRegistry::new();
        registry.add("a");
        registry.add("b");
        registry.add("c");
        registry.remove("b");
        assert_eq!(registry.snapshot(), vec!["a", "c"]);
        assert!(!registry.contains("b"));
    }
}
