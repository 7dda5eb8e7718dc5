// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the element tree: node identifiers, flags, and node payloads.

use alloc::string::String;

/// Identifier for a node in the tree.
///
/// This is a small, copyable handle that stays stable across updates but becomes
/// invalid when the underlying slot is reused.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On insert, a fresh slot is allocated with generation `1`.
/// - On remove, the slot is freed; any existing `NodeId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `NodeId`.
///
/// ### Liveness
///
/// Use [`ElementTree::is_alive`](crate::ElementTree::is_alive) to check whether a `NodeId` still refers to a live node.
/// Stale `NodeId`s never alias a different live node because the generation must match.
/// This is what lets other crates hold a `NodeId` as a weak reference.
///
/// ### Ordering
///
/// `NodeId` orders by slot, then generation. The order carries no document
/// meaning; it exists so ids can key ordered maps.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Generation of the slot this id was issued for.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

bitflags::bitflags! {
    /// Node flags tracking custom-element state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Node was created for a custom element name and may carry lifecycle callbacks.
        const CUSTOM  = 0b0000_0001;
        /// Node's definition has run (constructed or upgraded).
        const DEFINED = 0b0000_0010;
    }
}

/// Structural role of a node.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum NodeKind {
    /// Ordinary element in a light tree.
    #[default]
    Element,
    /// Root of an encapsulated subtree, owned by a host element.
    ShadowRoot,
}

/// Payload supplied when inserting a node.
#[derive(Clone, Debug, Default)]
pub struct ElementData {
    /// Structural role.
    pub kind: NodeKind,
    /// Tag name; empty for shadow roots.
    pub tag: String,
    /// Custom-element flags.
    pub flags: NodeFlags,
}

impl ElementData {
    /// A plain element.
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Element,
            tag: tag.into(),
            flags: NodeFlags::empty(),
        }
    }

    /// An element created for a custom element name.
    pub fn custom(tag: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Element,
            tag: tag.into(),
            flags: NodeFlags::CUSTOM,
        }
    }

    pub(crate) fn shadow_root() -> Self {
        Self {
            kind: NodeKind::ShadowRoot,
            tag: String::new(),
            flags: NodeFlags::empty(),
        }
    }
}
