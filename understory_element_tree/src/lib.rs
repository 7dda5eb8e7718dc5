// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_element_tree --heading-base-level=0

//! Understory Element Tree: a small generational element tree with shadow roots.
//!
//! This crate is the reference host for `understory_lifecycle`.
//! It owns every node; other crates refer to nodes through [`NodeId`] handles and ask the tree whether they are still live.
//!
//! - Represents a light tree of elements with tag names, attributes, and [`NodeFlags`].
//! - Supports encapsulated subtrees: [`ElementTree::attach_shadow`] creates a shadow root whose [`host`](ElementTree::host) is the element it hangs off.
//! - Hands out generational [`NodeId`]s that go stale on removal and never alias a later node.
//!
//! ## Not a DOM
//!
//! There is no parsing, no slot assignment, no mutation observers, and no styling.
//! Upstream code drives construction and calls the lifecycle hooks; this crate only stores structure.
//!
//! ## API overview
//!
//! - [`ElementTree`]: container managing node slots and generations.
//! - [`ElementData`]: payload for new nodes (kind, tag, flags).
//! - [`NodeKind`]: element or shadow root.
//! - [`NodeFlags`]: custom-element state.
//! - [`NodeId`]: generational handle of a node.
//!
//! Key operations:
//! - [`ElementTree::insert`] → [`NodeId`]
//! - [`ElementTree::attach_shadow`] / [`ElementTree::host`] / [`ElementTree::shadow_root`]
//! - [`ElementTree::remove`] and [`ElementTree::reparent`]
//! - [`ElementTree::descendants`] and [`ElementTree::path_to_root`]
//!
//! ### Minimal usage
//!
//! ```
//! use understory_element_tree::{ElementData, ElementTree};
//!
//! let mut tree = ElementTree::new();
//! let body = tree.insert(None, ElementData::element("body"));
//! let card = tree.insert(Some(body), ElementData::custom("x-card"));
//! let shadow = tree.attach_shadow(card).unwrap();
//! let title = tree.insert(Some(shadow), ElementData::element("h1"));
//!
//! assert_eq!(tree.host(shadow), Some(card));
//! assert_eq!(tree.path_to_root(title), vec![shadow, title]);
//!
//! tree.remove(card);
//! assert!(!tree.is_alive(title));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod tree;
mod types;

pub use tree::ElementTree;
pub use types::{ElementData, NodeFlags, NodeId, NodeKind};
