//! Named privilege sets, grounded on `original_source/ircd/privilege.c` and
//! `include/privilege.h`.
//!
//! A [`PrivilegeSet`] is a sorted, deduplicated list of privilege strings
//! (`"oper:kline"`, `"auspex:cmodes"`, ...) that supports `O(log n)`
//! membership tests. [`PrivilegeRegistry`] is the lookup-by-name table that
//! replaces the C global `privilegeset_list`, and keeps
//! [`crate::config::OperBlock::privset`] working as the name oper blocks
//! reference.
//!
//! Rehash uses a copy-on-write shadow: [`PrivilegeRegistry::prepare_rehash`]
//! snapshots every non-`"default"` set so config reload can repopulate the
//! live sets from scratch while [`privilegeset_diff`] still has the old
//! membership to diff against; [`PrivilegeRegistry::cleanup_rehash`] then
//! drops the shadows and removes any set nobody redeclared.
//!
//! Unlike the C implementation (which reuses static buffers across calls),
//! `privilegeset_diff` here returns freshly allocated, owned data every call.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// A named, sorted set of privilege strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeSet {
    name: String,
    privs: Vec<String>,
}

impl PrivilegeSet {
    pub fn new(name: impl Into<String>, privs: impl IntoIterator<Item = String>) -> Self {
        let mut privs: Vec<String> = privs.into_iter().collect();
        privs.sort_unstable();
        privs.dedup();
        Self {
            name: name.into(),
            privs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn privs(&self) -> &[String] {
        &self.privs
    }

    /// Binary-search membership test over the sorted privilege list.
    pub fn in_set(&self, priv_name: &str) -> bool {
        self.privs.binary_search_by(|p| p.as_str().cmp(priv_name)).is_ok()
    }

    /// Add another set's privileges into this one (inheritance), as
    /// `privilegeset_extend`'s `privilegeset_add_privilegeset` does.
    fn add_privilegeset(&mut self, parent: &PrivilegeSet) {
        self.privs.extend(parent.privs.iter().cloned());
        self.privs.sort_unstable();
        self.privs.dedup();
    }
}

/// Result of comparing two [`PrivilegeSet`]s: privileges only in the new
/// set, only in the old set, and present (unchanged) in both. Disjoint by
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

/// The "privilege diff law": a linear two-pointer merge over the two
/// sorted, deduplicated privilege lists. `O(n + m)`, produces disjoint
/// `added`/`removed`/`unchanged` sets.
pub fn privilegeset_diff(old: &PrivilegeSet, new: &PrivilegeSet) -> PrivilegeDiff {
    let (a, b) = (&old.privs, &new.privs);
    let mut diff = PrivilegeDiff {
        added: Vec::new(),
        removed: Vec::new(),
        unchanged: Vec::with_capacity(a.len().min(b.len())),
    };

    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                diff.removed.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                diff.added.push(b[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                diff.unchanged.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    diff.removed.extend(a[i..].iter().cloned());
    diff.added.extend(b[j..].iter().cloned());
    diff
}

struct RegistryEntry {
    live: Arc<PrivilegeSet>,
    /// Snapshot taken at `prepare_rehash`, consumed by `cleanup_rehash`.
    shadow: Option<Arc<PrivilegeSet>>,
    /// Marked true by `prepare_rehash`; cleared when the set is
    /// redeclared (`set_new`/`extend`) during the rehash that follows.
    illegal: bool,
}

/// Name-keyed table of [`PrivilegeSet`]s, replacing the C global
/// `privilegeset_list`.
pub struct PrivilegeRegistry {
    sets: RwLock<HashMap<String, RegistryEntry>>,
}

impl Default for PrivilegeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivilegeRegistry {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Look up or (re)create a named set with exactly these privileges.
    /// If called while the set is mid-rehash (illegal + shaded), the
    /// existing shadow is preserved so a diff can still be computed once
    /// rehash finishes.
    pub fn set_new(&self, name: &str, privs: impl IntoIterator<Item = String>) -> Arc<PrivilegeSet> {
        let set = Arc::new(PrivilegeSet::new(name, privs));
        let mut sets = self.sets.write();
        let shadow = sets.get(name).and_then(|e| e.shadow.clone());
        sets.insert(
            name.to_string(),
            RegistryEntry {
                live: set.clone(),
                shadow,
                illegal: false,
            },
        );
        set
    }

    /// Create a set that inherits every privilege of `parent_name` plus its
    /// own (`privilegeset_extend`). Returns `None` if the parent doesn't
    /// exist (or is currently illegal/pending-removal).
    pub fn extend(
        &self,
        parent_name: &str,
        name: &str,
        privs: impl IntoIterator<Item = String>,
    ) -> Option<Arc<PrivilegeSet>> {
        let parent = self.get(parent_name)?;
        let mut set = PrivilegeSet::new(name, privs);
        set.add_privilegeset(&parent);
        let set = Arc::new(set);

        let mut sets = self.sets.write();
        let shadow = sets.get(name).and_then(|e| e.shadow.clone());
        sets.insert(
            name.to_string(),
            RegistryEntry {
                live: set.clone(),
                shadow,
                illegal: false,
            },
        );
        Some(set)
    }

    /// Look up a set by name. Returns `None` if absent or marked illegal
    /// (pending removal after a rehash that didn't redeclare it).
    pub fn get(&self, name: &str) -> Option<Arc<PrivilegeSet>> {
        let sets = self.sets.read();
        sets.get(name)
            .filter(|entry| !entry.illegal)
            .map(|entry| entry.live.clone())
    }

    /// Mark every set except `"default"` illegal and shade it (snapshot its
    /// current membership) ahead of a config reload. Sets not redeclared
    /// by the time `cleanup_rehash` runs are dropped.
    pub fn prepare_rehash(&self) {
        let mut sets = self.sets.write();
        for (name, entry) in sets.iter_mut() {
            if name == "default" {
                continue;
            }
            entry.shadow = Some(entry.live.clone());
            entry.illegal = true;
        }
    }

    /// Diff a set's live membership against the shadow taken at
    /// `prepare_rehash`. Call this after the config reload repopulates sets
    /// but before `cleanup_rehash` discards the shadows.
    pub fn diff_against_shadow(&self, name: &str) -> Option<PrivilegeDiff> {
        let sets = self.sets.read();
        let entry = sets.get(name)?;
        let shadow = entry.shadow.as_ref()?;
        Some(privilegeset_diff(shadow, &entry.live))
    }

    /// Drop every shadow and remove any set still marked illegal (nobody
    /// redeclared it during the rehash that just finished).
    pub fn cleanup_rehash(&self) {
        let mut sets = self.sets.write();
        sets.retain(|name, entry| name == "default" || !entry.illegal);
        for entry in sets.values_mut() {
            entry.shadow = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, privs: &[&str]) -> PrivilegeSet {
        PrivilegeSet::new(name, privs.iter().map(|s| s.to_string()))
    }

    #[test]
    fn in_set_is_case_sensitive_exact_match() {
        let s = set("default", &["oper:kline", "oper:testline"]);
        assert!(s.in_set("oper:kline"));
        assert!(!s.in_set("oper:KLINE"));
        assert!(!s.in_set("oper:xline"));
    }

    #[test]
    fn diff_law_partitions_added_removed_unchanged() {
        let old = set("default", &["oper:kline", "oper:message", "oper:testline"]);
        let new = set("default", &["oper:kline", "oper:shedding"]);

        let diff = privilegeset_diff(&old, &new);
        assert_eq!(diff.added, vec!["oper:shedding".to_string()]);
        assert_eq!(
            diff.removed,
            vec!["oper:message".to_string(), "oper:testline".to_string()]
        );
        assert_eq!(diff.unchanged, vec!["oper:kline".to_string()]);
    }

    #[test]
    fn diff_law_disjoint_and_order_independent_of_insertion() {
        // privs are stored sorted regardless of construction order, so the
        // diff is deterministic no matter what order they were declared in.
        let old = set("a", &["z", "a", "m"]);
        let new = set("a", &["m", "z", "q"]);

        let diff = privilegeset_diff(&old, &new);
        assert_eq!(diff.added, vec!["q".to_string()]);
        assert_eq!(diff.removed, vec!["a".to_string()]);
        assert_eq!(diff.unchanged, vec!["m".to_string(), "z".to_string()]);
    }

    #[test]
    fn extend_inherits_parent_privileges() {
        let registry = PrivilegeRegistry::new();
        registry.set_new("default", ["oper:kline".to_string(), "oper:testline".to_string()]);
        let admin = registry
            .extend("default", "admin", ["oper:die".to_string()])
            .unwrap();

        assert!(admin.in_set("oper:kline"));
        assert!(admin.in_set("oper:testline"));
        assert!(admin.in_set("oper:die"));
    }

    #[test]
    fn extend_fails_for_missing_parent() {
        let registry = PrivilegeRegistry::new();
        assert!(registry.extend("nonexistent", "x", []).is_none());
    }

    #[test]
    fn rehash_shadow_then_diff_then_cleanup() {
        let registry = PrivilegeRegistry::new();
        registry.set_new("oper", ["oper:kline".to_string(), "oper:message".to_string()]);

        registry.prepare_rehash();
        assert!(registry.get("oper").is_none(), "illegal until redeclared");

        registry.set_new("oper", ["oper:kline".to_string(), "oper:shedding".to_string()]);
        assert!(registry.get("oper").is_some(), "redeclaring clears illegal");

        let diff = registry.diff_against_shadow("oper").unwrap();
        assert_eq!(diff.added, vec!["oper:shedding".to_string()]);
        assert_eq!(diff.removed, vec!["oper:message".to_string()]);
        assert_eq!(diff.unchanged, vec!["oper:kline".to_string()]);

        registry.cleanup_rehash();
        assert!(registry.get("oper").is_some());
        assert!(registry.diff_against_shadow("oper").is_none());
    }

    #[test]
    fn rehash_drops_sets_nobody_redeclared() {
        let registry = PrivilegeRegistry::new();
        registry.set_new("stale", ["oper:kline".to_string()]);

        registry.prepare_rehash();
        registry.cleanup_rehash();

        assert!(registry.get("stale").is_none());
    }

    #[test]
    fn default_set_survives_rehash_without_shading() {
        let registry = PrivilegeRegistry::new();
        registry.set_new("default", ["oper:kline".to_string()]);

        registry.prepare_rehash();
        assert!(registry.get("default").is_some());
        registry.cleanup_rehash();
        assert!(registry.get("default").is_some());
    }
}
