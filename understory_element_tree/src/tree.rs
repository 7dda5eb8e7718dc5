// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: structure, shadow roots, attributes, queries.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::types::{ElementData, NodeFlags, NodeId, NodeKind};

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level element tree.
#[derive(Clone)]
pub struct ElementTree {
    nodes: Vec<Option<Node>>, // slots
    generations: Vec<u32>,    // last generation per slot (persists across frees)
    pub(crate) free_list: Vec<usize>,
}

impl core::fmt::Debug for ElementTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("ElementTree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &free)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    tag: String,
    flags: NodeFlags,
    attributes: BTreeMap<String, String>,
    // Set on hosts.
    shadow_root: Option<NodeId>,
    // Set on shadow roots.
    host: Option<NodeId>,
}

impl Node {
    fn new(generation: u32, data: ElementData) -> Self {
        Self {
            generation,
            parent: None,
            children: Vec::new(),
            kind: data.kind,
            tag: data.tag,
            flags: data.flags,
            attributes: BTreeMap::new(),
            shadow_root: None,
            host: None,
        }
    }
}

impl ElementTree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Insert a new node as the last child of `parent` (or as a root if `None`).
    ///
    /// A stale `parent` leaves the new node detached as a root.
    pub fn insert(&mut self, parent: Option<NodeId>, data: ElementData) -> NodeId {
        let id = self.alloc(data);
        if let Some(p) = parent
            && self.is_alive(p)
        {
            self.link_parent(id, p);
        }
        id
    }

    /// Attach an encapsulated root to `host`.
    ///
    /// Returns `None` if `host` is stale, is itself a shadow root, or already has one.
    pub fn attach_shadow(&mut self, host: NodeId) -> Option<NodeId> {
        let h = self.node_opt(host)?;
        if h.kind == NodeKind::ShadowRoot || h.shadow_root.is_some() {
            return None;
        }
        let root = self.alloc(ElementData::shadow_root());
        self.node_mut(root).host = Some(host);
        self.node_mut(host).shadow_root = Some(root);
        Some(root)
    }

    /// Remove a node together with its subtree and any shadow roots beneath it.
    pub fn remove(&mut self, id: NodeId) {
        if !self.is_alive(id) {
            return;
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
        }
        if let Some(host) = self.node(id).host
            && let Some(h) = self.node_opt_mut(host)
        {
            h.shadow_root = None;
        }
        let mut stack = alloc::vec![id];
        while let Some(cur) = stack.pop() {
            let Some(node) = self.nodes[cur.idx()].take() else {
                continue;
            };
            stack.extend(node.children.iter().copied());
            stack.extend(node.shadow_root);
            self.free_list.push(cur.idx());
        }
    }

    /// Reparent `id` under `new_parent` (or detach it as a root if `None`).
    ///
    /// Returns `false` without changing anything if either id is stale, if `id`
    /// is a shadow root, or if `new_parent` lies inside the subtree of `id`.
    pub fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> bool {
        let Some(node) = self.node_opt(id) else {
            return false;
        };
        if node.kind == NodeKind::ShadowRoot {
            return false;
        }
        if let Some(p) = new_parent
            && (!self.is_alive(p) || self.is_inclusive_ancestor(id, p))
        {
            return false;
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
        }
        if let Some(p) = new_parent {
            self.link_parent(id, p);
        }
        true
    }

    /// Returns true if `id` refers to a live node.
    ///
    /// A `NodeId` is considered live if its slot exists and its generation matches
    /// the current generation stored in that slot.
    /// See [`NodeId`] docs for the generational semantics.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node_opt(id).is_some()
    }

    /// Number of live nodes, shadow roots included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Returns true if the tree holds no live nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Light-tree parent. Shadow roots have none; see [`ElementTree::host`].
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node_opt(id)?.parent
    }

    /// Light-tree children in document order. Empty for stale ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node_opt(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// The shadow root attached to `host`, if any.
    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.node_opt(host)?.shadow_root
    }

    /// The host of a shadow root. `None` for ordinary elements.
    pub fn host(&self, root: NodeId) -> Option<NodeId> {
        self.node_opt(root)?.host
    }

    /// Structural role of a node.
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node_opt(id).map(|n| n.kind)
    }

    /// Tag name of a node.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node_opt(id).map(|n| n.tag.as_str())
    }

    /// Custom-element flags of a node.
    pub fn flags(&self, id: NodeId) -> Option<NodeFlags> {
        self.node_opt(id).map(|n| n.flags)
    }

    /// Update node flags.
    pub fn set_flags(&mut self, id: NodeId, flags: NodeFlags) {
        if let Some(n) = self.node_opt_mut(id) {
            n.flags = flags;
        }
    }

    /// Read an attribute.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node_opt(id)?.attributes.get(name).map(String::as_str)
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.node_opt_mut(id)?
            .attributes
            .insert(name.into(), value.into())
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.node_opt_mut(id)?.attributes.remove(name)
    }

    /// Path from the light-tree root to `id` (inclusive). Empty for stale ids.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = Some(id).filter(|&id| self.is_alive(id));
        while let Some(n) = cur {
            out.push(n);
            cur = self.node(n).parent;
        }
        out.reverse();
        out
    }

    /// Light-tree descendants of `id` in document (pre-)order, `id` first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.is_alive(id) {
            return out;
        }
        let mut stack = alloc::vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.node(cur).children.iter().rev().copied());
        }
        out
    }

    // --- internals ---

    fn alloc(&mut self, data: ElementData) -> NodeId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, data));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(Node::new(generation, data)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        NodeId::new(idx, generation)
    }

    /// Access a node; panics if `id` is stale.
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.node_opt(id).expect("dangling NodeId")
    }

    /// Access a node mutably; panics if `id` is stale.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.node_opt_mut(id).expect("dangling NodeId")
    }

    fn node_opt(&self, id: NodeId) -> Option<&Node> {
        self.nodes
            .get(id.idx())?
            .as_ref()
            .filter(|n| n.generation == id.1)
    }

    fn node_opt_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    // True if `ancestor` is `node` or one of its light-tree or host ancestors.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            let n = self.node(n);
            cur = n.parent.or(n.host);
        }
        false
    }

    fn link_parent(&mut self, id: NodeId, parent: NodeId) {
        let parent_node = self.node_mut(parent);
        parent_node.children.push(id);
        self.node_mut(id).parent = Some(parent);
    }

    fn unlink_parent(&mut self, id: NodeId, parent: NodeId) {
        let p = self.node_mut(parent);
        p.children.retain(|c| *c != id);
        self.node_mut(id).parent = None;
    }
}
