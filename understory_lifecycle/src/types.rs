// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree capability consumed from the host: parents, children, hosts, and liveness.
//!
//! ## Overview
//!
//! The lifecycle core never owns nodes. It holds node keys `K` (typically
//! generational ids) and asks the host tree about them through these traits.
//! Every key held across a callback boundary is checked with [`Liveness`]
//! before use, which is what makes those keys weak references.
//!
//! Blanket impls cover `&T`, `Rc<T>`, and `RefCell<T>`, so a host can share a
//! single `Rc<RefCell<Tree>>` with the runtime. Each query takes a short
//! borrow; do not call into the runtime while holding the tree mutably.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

/// Look up the parent of a node.
///
/// Encapsulated roots report `None` here; their host is reached through
/// [`TreeLookup::host_of`].
pub trait ParentLookup<K> {
    /// Returns the parent of `node`, or `None` if `node` is a root.
    fn parent_of(&self, node: &K) -> Option<K>;
}

/// Explicit liveness check for node keys.
pub trait Liveness<K> {
    /// Returns true while `node` is still owned by the tree.
    fn is_alive(&self, node: &K) -> bool;
}

/// The full tree capability used by dispatch and lifecycle scheduling.
pub trait TreeLookup<K>: ParentLookup<K> + Liveness<K> {
    /// Children of `node` in document order. Hosts list their encapsulated root first.
    fn children_of(&self, node: &K) -> Vec<K>;
    /// Host element of an encapsulated root, or `None` for any other node.
    fn host_of(&self, root: &K) -> Option<K>;
}

/// A no‑op parent provider: every node is a root.
///
/// All calls to [`ParentLookup::parent_of`] return `None`.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoParent;

impl<K> ParentLookup<K> for NoParent {
    #[inline]
    fn parent_of(&self, _node: &K) -> Option<K> {
        None
    }
}

/// A liveness provider that treats every key as live.
#[derive(Copy, Clone, Debug, Default)]
pub struct AlwaysAlive;

impl<K> Liveness<K> for AlwaysAlive {
    #[inline]
    fn is_alive(&self, _node: &K) -> bool {
        true
    }
}

impl<K, T: ParentLookup<K> + ?Sized> ParentLookup<K> for &T {
    fn parent_of(&self, node: &K) -> Option<K> {
        (**self).parent_of(node)
    }
}

impl<K, T: Liveness<K> + ?Sized> Liveness<K> for &T {
    fn is_alive(&self, node: &K) -> bool {
        (**self).is_alive(node)
    }
}

impl<K, T: TreeLookup<K> + ?Sized> TreeLookup<K> for &T {
    fn children_of(&self, node: &K) -> Vec<K> {
        (**self).children_of(node)
    }

    fn host_of(&self, root: &K) -> Option<K> {
        (**self).host_of(root)
    }
}

impl<K, T: ParentLookup<K> + ?Sized> ParentLookup<K> for Rc<T> {
    fn parent_of(&self, node: &K) -> Option<K> {
        (**self).parent_of(node)
    }
}

impl<K, T: Liveness<K> + ?Sized> Liveness<K> for Rc<T> {
    fn is_alive(&self, node: &K) -> bool {
        (**self).is_alive(node)
    }
}

impl<K, T: TreeLookup<K> + ?Sized> TreeLookup<K> for Rc<T> {
    fn children_of(&self, node: &K) -> Vec<K> {
        (**self).children_of(node)
    }

    fn host_of(&self, root: &K) -> Option<K> {
        (**self).host_of(root)
    }
}

impl<K, T: ParentLookup<K>> ParentLookup<K> for RefCell<T> {
    fn parent_of(&self, node: &K) -> Option<K> {
        self.borrow().parent_of(node)
    }
}

impl<K, T: Liveness<K>> Liveness<K> for RefCell<T> {
    fn is_alive(&self, node: &K) -> bool {
        self.borrow().is_alive(node)
    }
}

impl<K, T: TreeLookup<K>> TreeLookup<K> for RefCell<T> {
    fn children_of(&self, node: &K) -> Vec<K> {
        self.borrow().children_of(node)
    }

    fn host_of(&self, root: &K) -> Option<K> {
        self.borrow().host_of(root)
    }
}

#[cfg(test)]
pub(crate) mod test_tree {
    //! A map-backed tree used by unit tests across the crate.

    use alloc::collections::{BTreeMap, BTreeSet};
    use alloc::vec::Vec;

    use super::{Liveness, ParentLookup, TreeLookup};

    #[derive(Clone, Debug, Default)]
    pub(crate) struct TestTree {
        parents: BTreeMap<u32, u32>,
        hosts: BTreeMap<u32, u32>,
        dead: BTreeSet<u32>,
    }

    impl TestTree {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Chain `nodes` so each is the parent of the next.
        pub(crate) fn chain(mut self, nodes: &[u32]) -> Self {
            for pair in nodes.windows(2) {
                self.parents.insert(pair[1], pair[0]);
            }
            self
        }

        /// Make `root` an encapsulated root hosted by `host`.
        pub(crate) fn shadow(mut self, host: u32, root: u32) -> Self {
            self.hosts.insert(root, host);
            self
        }

        pub(crate) fn kill(&mut self, node: u32) {
            self.dead.insert(node);
        }
    }

    impl ParentLookup<u32> for TestTree {
        fn parent_of(&self, node: &u32) -> Option<u32> {
            self.parents.get(node).copied()
        }
    }

    impl Liveness<u32> for TestTree {
        fn is_alive(&self, node: &u32) -> bool {
            !self.dead.contains(node)
        }
    }

    impl TreeLookup<u32> for TestTree {
        fn children_of(&self, node: &u32) -> Vec<u32> {
            let shadow = self
                .hosts
                .iter()
                .filter(|(_, host)| *host == node)
                .map(|(root, _)| *root);
            let light = self
                .parents
                .iter()
                .filter(|(_, parent)| *parent == node)
                .map(|(child, _)| *child);
            shadow.chain(light).collect()
        }

        fn host_of(&self, root: &u32) -> Option<u32> {
            self.hosts.get(root).copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_tree::TestTree;
    use super::*;
    use alloc::vec;

    #[test]
    fn blanket_impls_forward_through_shared_handles() {
        let tree = Rc::new(RefCell::new(TestTree::new().chain(&[1, 2, 3])));
        let shared: Rc<dyn TreeLookup<u32>> = tree.clone();
        assert_eq!(shared.parent_of(&3), Some(2));
        assert_eq!(shared.children_of(&1), vec![2]);
        assert!(shared.is_alive(&2));

        tree.borrow_mut().kill(2);
        assert!(!shared.is_alive(&2), "liveness reads the current tree");
    }

    #[test]
    fn null_providers() {
        assert_eq!(ParentLookup::<u32>::parent_of(&NoParent, &7), None);
        assert!(Liveness::<u32>::is_alive(&AlwaysAlive, &7));
    }
}
