//! Vector clocks and hybrid timestamps for causal ordering.
//!
//! - `ServerId`: unique identifier for a server in the cluster (its SID).
//! - `HybridTimestamp`: wall clock + logical counter + server tie-break.
//! - `VectorClock`: tracks causal dependencies across servers.

use std::cmp::Ordering;
use std::collections::HashMap;

/// A unique identifier for a server in the cluster.
///
/// Uses the server's SID (3 characters) for compact representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ServerId(String);

impl ServerId {
    /// Create a new server ID from a SID string.
    pub fn new(sid: impl Into<String>) -> Self {
        Self(sid.into())
    }

    /// Get the inner SID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialOrd for ServerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// A hybrid logical timestamp for causal ordering.
///
/// Combines wall-clock milliseconds, a logical counter for same-millisecond
/// events, and a server-id tie-break, giving a total order across the
/// cluster without requiring synchronized clocks.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HybridTimestamp {
    /// Wall clock time in milliseconds since Unix epoch.
    pub millis: i64,
    /// Logical counter for events within the same millisecond.
    pub counter: u32,
    /// Server ID for tie-breaking (stored as hash for compactness).
    server_hash: u64,
}

impl HybridTimestamp {
    /// Create a new timestamp.
    #[must_use]
    pub fn new(millis: i64, counter: u32, server: &ServerId) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        server.hash(&mut hasher);
        Self {
            millis,
            counter,
            server_hash: hasher.finish(),
        }
    }

    /// Create a timestamp for the current time.
    #[must_use]
    pub fn now(server: &ServerId) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self::new(millis, 0, server)
    }

    /// Increment the logical counter, keeping the same wall-clock value.
    #[must_use]
    pub fn increment(&self) -> Self {
        Self {
            millis: self.millis,
            counter: self.counter.saturating_add(1),
            server_hash: self.server_hash,
        }
    }

    /// Produce a timestamp causally after both `self` and `other`.
    #[must_use]
    pub fn update(&self, other: &Self) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let max_millis = self.millis.max(other.millis).max(now);

        let counter = if max_millis == self.millis && max_millis == other.millis {
            self.counter.max(other.counter).saturating_add(1)
        } else if max_millis == self.millis {
            self.counter.saturating_add(1)
        } else if max_millis == other.millis {
            other.counter.saturating_add(1)
        } else {
            0
        };

        Self {
            millis: max_millis,
            counter,
            server_hash: self.server_hash,
        }
    }
}

impl PartialOrd for HybridTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HybridTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis
            .cmp(&other.millis)
            .then(self.counter.cmp(&other.counter))
            .then(self.server_hash.cmp(&other.server_hash))
    }
}

/// A vector clock for tracking causal dependencies across servers.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VectorClock {
    entries: HashMap<String, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current counter for a server.
    #[must_use]
    pub fn get(&self, server: &ServerId) -> u64 {
        self.entries.get(server.as_str()).copied().unwrap_or(0)
    }

    /// Increment the counter for a server.
    pub fn increment(&mut self, server: &ServerId) {
        let entry = self.entries.entry(server.as_str().to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    /// Update to include all events from another clock.
    pub fn merge(&mut self, other: &Self) {
        for (server, &counter) in &other.entries {
            let entry = self.entries.entry(server.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Compare causal order. `None` means the clocks are concurrent.
    #[must_use]
    pub fn partial_cmp_causal(&self, other: &Self) -> Option<Ordering> {
        let mut self_greater = false;
        let mut other_greater = false;

        let all_servers: std::collections::HashSet<_> =
            self.entries.keys().chain(other.entries.keys()).collect();

        for server in all_servers {
            let self_val = self.entries.get(server).copied().unwrap_or(0);
            let other_val = other.entries.get(server).copied().unwrap_or(0);

            if self_val > other_val {
                self_greater = true;
            } else if other_val > self_val {
                other_greater = true;
            }
        }

        match (self_greater, other_greater) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (true, true) => None,
        }
    }

    /// Check if this clock happened-before another.
    #[must_use]
    pub fn happened_before(&self, other: &Self) -> bool {
        matches!(self.partial_cmp_causal(other), Some(Ordering::Less))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_ordering() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");
        assert!(server1 < server2);
        assert_eq!(server1, ServerId::new("001"));
    }

    #[test]
    fn test_hybrid_timestamp_ordering() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let ts1 = HybridTimestamp::new(100, 0, &server1);
        let ts2 = HybridTimestamp::new(100, 1, &server1);
        let ts3 = HybridTimestamp::new(200, 0, &server2);

        assert!(ts1 < ts2);
        assert!(ts2 < ts3);
    }

    #[test]
    fn test_hybrid_timestamp_server_hash_tiebreaker() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let ts1 = HybridTimestamp::new(100, 0, &server1);
        let ts2 = HybridTimestamp::new(100, 0, &server2);

        assert!(ts1 != ts2);
        assert!(ts1 < ts2 || ts2 < ts1);
    }

    #[test]
    fn test_hybrid_timestamp_update_takes_max() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let ts1 = HybridTimestamp::new(100, 5, &server1);
        let ts2 = HybridTimestamp::new(200, 3, &server2);

        let updated = ts1.update(&ts2);
        assert!(updated >= ts1);
        assert!(updated >= ts2);
    }

    #[test]
    fn test_vector_clock_merge_and_causality() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let mut vc1 = VectorClock::new();
        vc1.increment(&server1);
        vc1.increment(&server1);

        let mut vc2 = VectorClock::new();
        vc2.increment(&server1);
        vc2.increment(&server2);

        assert!(vc1.partial_cmp_causal(&vc2).is_none());

        let mut vc3 = vc1.clone();
        vc3.merge(&vc2);
        assert!(vc1.happened_before(&vc3));
        assert!(vc2.happened_before(&vc3));
    }
}
