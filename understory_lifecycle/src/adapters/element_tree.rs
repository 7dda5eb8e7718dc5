// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree capability for [`understory_element_tree::ElementTree`].
//!
//! Shadow roots have no parent; [`TreeLookup::host_of`] links them to their
//! host, so composed events cross into the light tree. A host lists its
//! shadow root before its light children.
//!
//! Share the tree with a runtime as `Rc<RefCell<ElementTree>>`:
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use understory_element_tree::{ElementData, ElementTree};
//! use understory_lifecycle::runtime::Runtime;
//!
//! let tree = Rc::new(RefCell::new(ElementTree::new()));
//! let root = tree.borrow_mut().insert(None, ElementData::element("html"));
//! let runtime = Runtime::new(tree.clone());
//! assert!(!runtime.engine().is_dispatching());
//! # let _ = root;
//! ```

use alloc::vec::Vec;

use understory_element_tree::{ElementTree, NodeId};

use crate::types::{Liveness, ParentLookup, TreeLookup};

impl ParentLookup<NodeId> for ElementTree {
    fn parent_of(&self, node: &NodeId) -> Option<NodeId> {
        self.parent(*node)
    }
}

impl Liveness<NodeId> for ElementTree {
    fn is_alive(&self, node: &NodeId) -> bool {
        ElementTree::is_alive(self, *node)
    }
}

impl TreeLookup<NodeId> for ElementTree {
    fn children_of(&self, node: &NodeId) -> Vec<NodeId> {
        self.shadow_root(*node)
            .into_iter()
            .chain(self.children(*node).iter().copied())
            .collect()
    }

    fn host_of(&self, root: &NodeId) -> Option<NodeId> {
        self.host(*root)
    }
}
