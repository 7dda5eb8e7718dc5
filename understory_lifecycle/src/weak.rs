// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Side tables keyed by node identity that never keep a node alive.
//!
//! A [`WeakRegistry`] associates a value with a node key. The registry does
//! not extend the node's lifetime: every read takes a [`Liveness`] provider,
//! and entries whose owner has been removed from the tree read as absent.
//! Storage for dead owners is reclaimed by [`WeakRegistry::compact`] (or
//! lazily by [`WeakRegistry::size`]).
//!
//! With generational keys a recycled slot gets a new key, so an entry that
//! outlives its owner can never be observed through the recycled node.

use alloc::collections::BTreeMap;
use alloc::collections::btree_map::Entry;
use core::fmt::{self, Debug};

use crate::types::Liveness;

/// Map from node key to value with explicit liveness checks on every read.
#[derive(Clone)]
pub struct WeakRegistry<K, V> {
    entries: BTreeMap<K, V>,
}

impl<K, V> Default for WeakRegistry<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K, V> Debug for WeakRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("stored", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// A stored entry observed without a liveness check.
///
/// The value is only reachable through [`WeakEntry::get`], which takes a
/// liveness provider.
#[derive(Debug)]
pub struct WeakEntry<'a, K, V> {
    owner: &'a K,
    value: &'a V,
}

impl<'a, K, V> WeakEntry<'a, K, V> {
    /// The owner key.
    pub fn owner(&self) -> &'a K {
        self.owner
    }

    /// The value, if the owner is still alive.
    pub fn get<L: Liveness<K> + ?Sized>(&self, live: &L) -> Option<&'a V> {
        live.is_alive(self.owner).then_some(self.value)
    }
}

impl<K: Ord + Copy, V> WeakRegistry<K, V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `value` with `owner`, returning the value it replaced.
    pub fn add(&mut self, owner: K, value: V) -> Option<V> {
        self.entries.insert(owner, value)
    }

    /// True if `owner` is alive and has an entry.
    pub fn has<L: Liveness<K> + ?Sized>(&self, live: &L, owner: &K) -> bool {
        self.get(live, owner).is_some()
    }

    /// Entry for `owner`, if `owner` is alive.
    pub fn get<L: Liveness<K> + ?Sized>(&self, live: &L, owner: &K) -> Option<&V> {
        if !live.is_alive(owner) {
            return None;
        }
        self.entries.get(owner)
    }

    /// Mutable entry for `owner`, if `owner` is alive.
    pub fn get_mut<L: Liveness<K> + ?Sized>(&mut self, live: &L, owner: &K) -> Option<&mut V> {
        if !live.is_alive(owner) {
            return None;
        }
        self.entries.get_mut(owner)
    }

    /// Entry for `owner`, inserting `make()` if absent.
    ///
    /// The caller vouches for liveness; this is used when the owner was just
    /// handed in by the host.
    pub fn get_or_insert_with(&mut self, owner: K, make: impl FnOnce() -> V) -> &mut V {
        match self.entries.entry(owner) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(make()),
        }
    }

    /// Remove and return the entry for `owner`, live or not.
    pub fn delete(&mut self, owner: &K) -> Option<V> {
        self.entries.remove(owner)
    }

    /// Stored entry for `owner` without checking liveness.
    pub fn entry(&self, owner: &K) -> Option<WeakEntry<'_, K, V>> {
        self.entries
            .get_key_value(owner)
            .map(|(owner, value)| WeakEntry { owner, value })
    }

    /// Iterate entries whose owners are alive, in key order.
    pub fn iter<'a, L: Liveness<K> + ?Sized>(
        &'a self,
        live: &'a L,
    ) -> impl Iterator<Item = (K, &'a V)> + 'a {
        self.entries
            .iter()
            .filter(move |(owner, _)| live.is_alive(owner))
            .map(|(owner, value)| (*owner, value))
    }

    /// Number of live entries. Dead entries are dropped first.
    pub fn size<L: Liveness<K> + ?Sized>(&mut self, live: &L) -> usize {
        self.compact(live);
        self.entries.len()
    }

    /// Drop entries whose owners are dead. Returns how many were dropped.
    pub fn compact<L: Liveness<K> + ?Sized>(&mut self, live: &L) -> usize {
        let before = self.entries.len();
        self.entries.retain(|owner, _| live.is_alive(owner));
        before - self.entries.len()
    }

    /// Number of stored entries, including ones whose owners may be dead.
    pub fn stored_len(&self) -> usize {
        self.entries.len()
    }

    /// Keep only entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        self.entries.retain(|owner, value| keep(owner, value));
    }

    pub(crate) fn raw_get(&self, owner: &K) -> Option<&V> {
        self.entries.get(owner)
    }

    pub(crate) fn raw_get_mut(&mut self, owner: &K) -> Option<&mut V> {
        self.entries.get_mut(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlwaysAlive;
    use crate::types::test_tree::TestTree;
    use alloc::vec::Vec;

    #[test]
    fn dead_owner_reads_as_absent() {
        let mut tree = TestTree::new();
        let mut reg = WeakRegistry::new();
        assert_eq!(reg.add(1_u32, "one"), None);
        assert_eq!(reg.add(2, "two"), None);
        assert_eq!(reg.add(2, "deux"), Some("two"));

        assert!(reg.has(&tree, &1));
        tree.kill(1);
        assert!(!reg.has(&tree, &1));
        assert_eq!(reg.get(&tree, &1), None);
        assert_eq!(reg.get(&tree, &2), Some(&"deux"));

        // Still stored until compaction.
        assert_eq!(reg.stored_len(), 2);
        let entry = reg.entry(&1).unwrap();
        assert_eq!(*entry.owner(), 1);
        assert_eq!(entry.get(&tree), None);
        assert_eq!(entry.get(&AlwaysAlive), Some(&"one"));
    }

    #[test]
    fn size_compacts_dead_entries() {
        let mut tree = TestTree::new();
        let mut reg = WeakRegistry::new();
        for n in 0..5_u32 {
            reg.add(n, n * 10);
        }
        tree.kill(1);
        tree.kill(3);
        let live: Vec<_> = reg.iter(&tree).map(|(k, v)| (k, *v)).collect();
        assert_eq!(live, [(0, 0), (2, 20), (4, 40)]);
        assert_eq!(reg.size(&tree), 3);
        assert_eq!(reg.stored_len(), 3);
        assert_eq!(reg.compact(&tree), 0);
    }

    #[test]
    fn get_or_insert_then_mutate() {
        let tree = TestTree::new();
        let mut reg: WeakRegistry<u32, Vec<u32>> = WeakRegistry::new();
        reg.get_or_insert_with(7, Vec::new).push(1);
        reg.get_or_insert_with(7, Vec::new).push(2);
        reg.get_mut(&tree, &7).unwrap().push(3);
        assert_eq!(reg.get(&tree, &7).map(Vec::as_slice), Some(&[1, 2, 3][..]));
        assert_eq!(reg.delete(&7), Some(alloc::vec![1, 2, 3]));
        assert!(!reg.has(&tree, &7));
    }
}
