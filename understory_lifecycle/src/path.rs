// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composed propagation paths with per-node retargeting.
//!
//! The path runs from the target outward to the outermost root. When the
//! walk reaches an encapsulated root and the event is composed, it continues
//! at that root's host. Nodes past a boundary see the event retargeted to the
//! host, so encapsulated internals never leak outward.

use alloc::vec::Vec;

use crate::types::TreeLookup;

/// The ordered list of nodes an event visits, target first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedPath<K> {
    nodes: Vec<K>,
    targets: Vec<K>,
}

impl<K: Copy + Eq> ComposedPath<K> {
    /// Build the path for `target`.
    ///
    /// With `composed` false the walk stops at the first root reached.
    /// The tree must have acyclic ancestry.
    pub fn compute<T: TreeLookup<K> + ?Sized>(tree: &T, target: K, composed: bool) -> Self {
        let mut nodes = Vec::new();
        let mut targets = Vec::new();
        let mut seen_as = target;
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            nodes.push(node);
            targets.push(seen_as);
            cursor = match tree.parent_of(&node) {
                Some(parent) => Some(parent),
                None if composed => tree.host_of(&node).inspect(|&host| seen_as = host),
                None => None,
            };
        }
        Self { nodes, targets }
    }

    /// Nodes in dispatch order for the bubble phase.
    pub fn nodes(&self) -> &[K] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the path is empty. A computed path always holds its target.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Target as observed by listeners on the node at `index`.
    pub fn target_at(&self, index: usize) -> Option<K> {
        self.targets.get(index).copied()
    }

    /// Iterate `(node, retargeted target)` pairs, target first.
    pub fn iter(&self) -> impl Iterator<Item = (K, K)> + '_ {
        self.nodes.iter().copied().zip(self.targets.iter().copied())
    }

    /// Consume into the node list.
    pub fn into_nodes(self) -> Vec<K> {
        self.nodes
    }
}
