//! Core CRDT traits and register/set primitives for distributed state sync.

use super::clock::HybridTimestamp;

/// A Conflict-free Replicated Data Type.
///
/// Merge must be commutative, associative, and idempotent so that replicas
/// converge regardless of delivery order.
pub trait Crdt: Sized {
    /// Merge another instance into this one.
    fn merge(&mut self, other: &Self);

    /// `true` if merging `other` into `self` would not change `self`.
    fn dominates(&self, other: &Self) -> bool;
}

/// A type that can produce and apply incremental deltas, for cheaper
/// network transfer than shipping full state on every sync.
pub trait StateDelta: Crdt {
    /// The delta type for incremental updates.
    type Delta: Clone + serde::Serialize + for<'de> serde::Deserialize<'de>;

    /// Generate a delta representing changes since a given timestamp.
    fn delta_since(&self, since: HybridTimestamp) -> Option<Self::Delta>;

    /// Apply a delta to this instance.
    fn apply_delta(&mut self, delta: &Self::Delta);
}

/// A value with an associated timestamp for Last-Writer-Wins semantics.
pub trait Mergeable: Clone {
    /// Get the timestamp of this value.
    fn timestamp(&self) -> HybridTimestamp;

    /// Merge with another value, returning the winner.
    #[must_use]
    fn merge_with(&self, other: &Self) -> Self {
        if other.timestamp() > self.timestamp() {
            other.clone()
        } else {
            self.clone()
        }
    }
}

/// A Last-Writer-Wins register.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LwwRegister<T> {
    value: T,
    timestamp: HybridTimestamp,
}

impl<T: Clone> LwwRegister<T> {
    /// Create a new LWW register with the given value and timestamp.
    pub fn new(value: T, timestamp: HybridTimestamp) -> Self {
        Self { value, timestamp }
    }

    /// Get the current value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Get the timestamp.
    pub fn timestamp(&self) -> HybridTimestamp {
        self.timestamp
    }

    /// Update the value if the new timestamp is greater.
    pub fn update(&mut self, value: T, timestamp: HybridTimestamp) {
        if timestamp > self.timestamp {
            self.value = value;
            self.timestamp = timestamp;
        }
    }
}

impl<T: Clone> Mergeable for LwwRegister<T> {
    fn timestamp(&self) -> HybridTimestamp {
        self.timestamp
    }
}

impl<T: Clone> Crdt for LwwRegister<T> {
    fn merge(&mut self, other: &Self) {
        if other.timestamp > self.timestamp {
            self.value = other.value.clone();
            self.timestamp = other.timestamp;
        }
    }

    fn dominates(&self, other: &Self) -> bool {
        self.timestamp >= other.timestamp
    }
}

/// An Add-Wins Set (AWSet): concurrent add/remove of the same element
/// resolves to present.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AwSet<T>
where
    T: Clone + Eq + std::hash::Hash,
{
    elements: std::collections::HashMap<T, HybridTimestamp>,
    tombstones: std::collections::HashMap<T, HybridTimestamp>,
}

impl<T> Default for AwSet<T>
where
    T: Clone + Eq + std::hash::Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AwSet<T>
where
    T: Clone + Eq + std::hash::Hash,
{
    /// Create an empty `AwSet`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: std::collections::HashMap::new(),
            tombstones: std::collections::HashMap::new(),
        }
    }

    /// Add an element with the given timestamp.
    pub fn add(&mut self, element: T, timestamp: HybridTimestamp) {
        let tombstone_ts = self.tombstones.get(&element).copied();
        if tombstone_ts.map_or(true, |ts| timestamp >= ts) {
            self.elements.insert(element, timestamp);
        }
    }

    /// Remove an element with the given timestamp.
    pub fn remove(&mut self, element: &T, timestamp: HybridTimestamp) {
        if let Some(&add_ts) = self.elements.get(element) {
            if timestamp > add_ts {
                self.elements.remove(element);
                self.tombstones.insert(element.clone(), timestamp);
            }
        }
    }

    /// Check if an element is present.
    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains_key(element)
    }

    /// Iterate over present elements.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.keys()
    }

    /// Number of present elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// `true` if no elements are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T> Crdt for AwSet<T>
where
    T: Clone + Eq + std::hash::Hash,
{
    fn merge(&mut self, other: &Self) {
        for (elem, &other_ts) in &other.elements {
            match self.elements.get(elem) {
                Some(&self_ts) if self_ts >= other_ts => {}
                _ => {
                    let our_tomb = self.tombstones.get(elem).copied();
                    if our_tomb.map_or(true, |ts| other_ts >= ts) {
                        self.elements.insert(elem.clone(), other_ts);
                    }
                }
            }
        }

        for (elem, &other_ts) in &other.tombstones {
            match self.tombstones.get(elem) {
                Some(&self_ts) if self_ts >= other_ts => {}
                _ => {
                    self.tombstones.insert(elem.clone(), other_ts);
                    if let Some(&add_ts) = self.elements.get(elem) {
                        if other_ts > add_ts {
                            self.elements.remove(elem);
                        }
                    }
                }
            }
        }
    }

    fn dominates(&self, other: &Self) -> bool {
        for (elem, &other_ts) in &other.elements {
            match self.elements.get(elem) {
                Some(&self_ts) if self_ts >= other_ts => {}
                _ => return false,
            }
        }
        for (elem, &other_ts) in &other.tombstones {
            match self.tombstones.get(elem) {
                Some(&self_ts) if self_ts >= other_ts => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ServerId;

    #[test]
    fn test_lww_register_update_and_merge() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let ts1 = HybridTimestamp::new(100, 0, &server1);
        let ts2 = HybridTimestamp::new(200, 0, &server2);

        let mut reg1 = LwwRegister::new("old", ts1);
        let reg2 = LwwRegister::new("new", ts2);

        reg1.merge(&reg2);
        assert_eq!(*reg1.value(), "new");
    }

    #[test]
    fn test_lww_register_dominates() {
        let server = ServerId::new("001");
        let ts1 = HybridTimestamp::new(100, 0, &server);
        let ts2 = HybridTimestamp::new(200, 0, &server);

        let reg1 = LwwRegister::new("value", ts1);
        let reg2 = LwwRegister::new("value", ts2);

        assert!(reg2.dominates(&reg1));
        assert!(!reg1.dominates(&reg2));
        assert!(reg1.dominates(&reg1));
    }

    #[test]
    fn test_awset_add_wins_on_concurrent_remove() {
        let server1 = ServerId::new("001");
        let ts = HybridTimestamp::new(100, 0, &server1);

        let mut set: AwSet<String> = AwSet::new();
        set.add("user".to_string(), ts);
        set.remove(&"user".to_string(), ts);

        assert!(set.contains(&"user".to_string()));
    }

    #[test]
    fn test_awset_merge_concurrent_adds() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let ts1 = HybridTimestamp::new(100, 0, &server1);
        let ts2 = HybridTimestamp::new(100, 0, &server2);

        let mut set1: AwSet<String> = AwSet::new();
        set1.add("item1".to_string(), ts1);

        let mut set2: AwSet<String> = AwSet::new();
        set2.add("item2".to_string(), ts2);

        set1.merge(&set2);

        assert!(set1.contains(&"item1".to_string()));
        assert!(set1.contains(&"item2".to_string()));
    }

    #[test]
    fn test_awset_dominates() {
        let server = ServerId::new("001");
        let ts1 = HybridTimestamp::new(100, 0, &server);
        let ts2 = HybridTimestamp::new(200, 0, &server);

        let mut set1: AwSet<String> = AwSet::new();
        set1.add("item".to_string(), ts1);

        let mut set2: AwSet<String> = AwSet::new();
        set2.add("item".to_string(), ts2);

        assert!(set2.dominates(&set1));
        assert!(!set1.dominates(&set2));
    }
}
