// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Construction frames: a stack of open frames plus the tree they form.
//!
//! ## Overview
//!
//! Each construction operation pushes a frame and pops it when done. Frames
//! pushed while another frame is open become its children, so a complete
//! top-level operation yields a [`FrameTree`]. Each frame has:
//!
//! - a single ready slot holding at most one node waiting for its ready callback,
//! - a child-ready queue of nodes awaiting their post-order callback.
//!
//! ## Branches
//!
//! Frames of kind [`FrameKind::Branch`] stand for templates whose content is
//! not yet live. Their subtree is deferred: readies released inside it are
//! held on the branch root, and the subtree is skipped when the enclosing
//! tree flushes. A deferred branch that is still pending when its tree
//! flushes is detached and kept until it is resumed or discarded.
//!
//! ## Flush order
//!
//! [`FrameTree::flush_plan`] walks frames in post-order with an explicit
//! worklist, so deep trees do not recurse.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::ProtocolViolation;

/// Identifier of a frame. Ids increase monotonically and are never reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    /// Raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// What kind of construction a frame represents.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrameKind {
    /// Constructing a single custom node.
    Construct,
    /// Upgrading an existing node to its defined behavior.
    Upgrade,
    /// Parsing markup into nodes.
    Parse,
    /// Cloning a subtree.
    Clone,
    /// Applying a markup fragment.
    Markup,
    /// Building template content that is not yet live.
    Branch,
}

impl FrameKind {
    /// True for [`FrameKind::Branch`].
    pub const fn is_branch(self) -> bool {
        matches!(self, Self::Branch)
    }
}

/// A single frame.
#[derive(Clone, Debug)]
pub struct Frame<K> {
    id: FrameId,
    kind: FrameKind,
    parent: Option<FrameId>,
    children: Vec<FrameId>,
    ready: Option<K>,
    child_readies: Vec<K>,
    deferred: bool,
    held_readies: Vec<K>,
}

impl<K> Frame<K> {
    fn new(id: FrameId, kind: FrameKind, parent: Option<FrameId>) -> Self {
        Self {
            id,
            kind,
            parent,
            children: Vec::new(),
            ready: None,
            child_readies: Vec::new(),
            deferred: kind.is_branch(),
            held_readies: Vec::new(),
        }
    }

    /// Frame id.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Frame kind.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Parent frame, if any.
    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    /// Child frames in push order.
    pub fn children(&self) -> &[FrameId] {
        &self.children
    }

    /// Node waiting in the ready slot.
    pub fn ready(&self) -> Option<&K> {
        self.ready.as_ref()
    }

    /// Nodes queued for child-ready.
    pub fn child_readies(&self) -> &[K] {
        &self.child_readies
    }

    /// True for a branch whose work is still deferred.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Readies held by a deferred branch.
    pub fn held_readies(&self) -> &[K] {
        &self.held_readies
    }
}

/// Where a ready candidate went.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotOutcome {
    /// Stored in the frame's ready slot.
    Placed,
    /// The slot already holds a node.
    Occupied,
    /// The frame is not part of the current tree.
    Missing,
}

/// Frames produced by one top-level construction.
#[derive(Clone, Debug)]
pub struct FrameTree<K> {
    root: FrameId,
    frames: BTreeMap<FrameId, Frame<K>>,
}

/// Work produced by flushing a finished [`FrameTree`].
#[derive(Clone, Debug)]
pub struct FlushPlan<K> {
    /// Child-ready callbacks to run, in post-order.
    pub child_readies: Vec<K>,
    /// Deferred branches split off for later resumption.
    pub detached: Vec<FrameTree<K>>,
}

impl<K> FrameTree<K> {
    fn new(root: Frame<K>) -> Self {
        let id = root.id;
        let mut frames = BTreeMap::new();
        frames.insert(id, root);
        Self { root: id, frames }
    }

    /// Root frame id.
    pub fn root(&self) -> FrameId {
        self.root
    }

    /// Look up a frame.
    pub fn frame(&self, id: FrameId) -> Option<&Frame<K>> {
        self.frames.get(&id)
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the tree has no frames. Never true for a tree built by a stack.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames with an occupied ready slot.
    pub fn pending_ready(&self) -> usize {
        self.frames.values().filter(|f| f.ready.is_some()).count()
    }

    /// Nearest deferred branch at or above `id`.
    fn holding_branch(&self, id: FrameId) -> Option<FrameId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let frame = self.frames.get(&current)?;
            if frame.deferred {
                return Some(current);
            }
            cursor = frame.parent;
        }
        None
    }

    /// Clear the deferral on branch `id`.
    ///
    /// Returns the readies to fire now. If `id` still sits inside another
    /// deferred branch they are handed to it instead and nothing is returned.
    fn undefer(&mut self, id: FrameId) -> Result<Vec<K>, ProtocolViolation> {
        let Some(frame) = self.frames.get_mut(&id) else {
            return Err(ProtocolViolation::UnknownFrame(id));
        };
        if !frame.kind.is_branch() {
            return Err(ProtocolViolation::NotABranch(id));
        }
        if !frame.deferred {
            return Ok(Vec::new());
        }
        frame.deferred = false;
        let readies = core::mem::take(&mut frame.held_readies);
        if let Some(outer) = self.holding_branch(id)
            && let Some(outer) = self.frames.get_mut(&outer)
        {
            outer.held_readies.extend(readies);
            return Ok(Vec::new());
        }
        Ok(readies)
    }

    /// Split off and drop the branch `id` with everything below it.
    fn drop_branch(&mut self, id: FrameId) -> Result<(), ProtocolViolation> {
        match self.frames.get(&id) {
            None => Err(ProtocolViolation::UnknownFrame(id)),
            Some(frame) if !frame.kind.is_branch() => Err(ProtocolViolation::NotABranch(id)),
            Some(_) => {
                self.split_off(id);
                Ok(())
            }
        }
    }

    /// Remove the subtree rooted at `id` into its own tree.
    fn split_off(&mut self, id: FrameId) -> Self {
        let parent = self.frames.get(&id).and_then(|f| f.parent);
        if let Some(parent) = parent.and_then(|p| self.frames.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        let mut frames = BTreeMap::new();
        let mut work = vec![id];
        while let Some(next) = work.pop() {
            if let Some(frame) = self.frames.remove(&next) {
                work.extend(frame.children.iter().copied());
                frames.insert(next, frame);
            }
        }
        if let Some(root) = frames.get_mut(&id) {
            root.parent = None;
        }
        Self { root: id, frames }
    }

    /// Collect child-ready work in post-order and split off deferred branches.
    pub fn flush_plan(mut self) -> FlushPlan<K>
    where
        K: Copy,
    {
        if self.frames.get(&self.root).is_some_and(|f| f.deferred) {
            return FlushPlan {
                child_readies: Vec::new(),
                detached: vec![self],
            };
        }
        let mut child_readies = Vec::new();
        let mut deferred = Vec::new();
        let mut work = vec![(self.root, false)];
        while let Some((id, expanded)) = work.pop() {
            let Some(frame) = self.frames.get(&id) else {
                continue;
            };
            if expanded {
                child_readies.extend(frame.child_readies.iter().copied());
                continue;
            }
            work.push((id, true));
            for &child in frame.children.iter().rev() {
                if self.frames.get(&child).is_some_and(|c| c.deferred) {
                    deferred.push(child);
                } else {
                    work.push((child, false));
                }
            }
        }
        let detached = deferred.into_iter().map(|id| self.split_off(id)).collect();
        FlushPlan {
            child_readies,
            detached,
        }
    }
}

/// Readies released by resuming a branch, plus a tree to flush if the branch
/// was resumed with no frame open.
#[derive(Clone, Debug)]
pub struct Resumed<K> {
    /// Ready callbacks to run now, in the order they were held.
    pub readies: Vec<K>,
    /// A finished tree whose child-ready work should run now.
    pub flush: Option<FrameTree<K>>,
}

/// The stack of open frames.
#[derive(Clone, Debug)]
pub struct FrameStack<K> {
    next_id: u64,
    stack: Vec<FrameId>,
    tree: Option<FrameTree<K>>,
    detached: BTreeMap<FrameId, FrameTree<K>>,
}

impl<K> Default for FrameStack<K> {
    fn default() -> Self {
        Self {
            next_id: 0,
            stack: Vec::new(),
            tree: None,
            detached: BTreeMap::new(),
        }
    }
}

impl<K: Copy> FrameStack<K> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame; it becomes a child of the current frame, if any.
    pub fn push(&mut self, kind: FrameKind) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        let parent = self.current();
        let frame = Frame::new(id, kind, parent);
        match (parent, self.tree.as_mut()) {
            (Some(parent), Some(tree)) => {
                if let Some(p) = tree.frames.get_mut(&parent) {
                    p.children.push(id);
                }
                tree.frames.insert(id, frame);
            }
            _ => self.tree = Some(FrameTree::new(frame)),
        }
        self.stack.push(id);
        id
    }

    /// Pop `id`, which must be the current frame.
    ///
    /// Returns the finished tree when the outermost frame is popped.
    pub fn pop(&mut self, id: FrameId) -> Result<Option<FrameTree<K>>, ProtocolViolation> {
        let current = self.current();
        if current != Some(id) {
            return Err(ProtocolViolation::PopNotCurrent { found: id, current });
        }
        self.stack.pop();
        if self.stack.is_empty() {
            Ok(self.tree.take())
        } else {
            Ok(None)
        }
    }

    /// Current (top) frame.
    pub fn current(&self) -> Option<FrameId> {
        self.stack.last().copied()
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True if `id` is open.
    pub fn is_open(&self, id: FrameId) -> bool {
        self.stack.contains(&id)
    }

    /// Look up a frame in the current tree or among detached branches.
    pub fn frame(&self, id: FrameId) -> Option<&Frame<K>> {
        self.tree
            .as_ref()
            .and_then(|t| t.frame(id))
            .or_else(|| self.detached.values().find_map(|t| t.frame(id)))
    }

    /// Frames with an occupied ready slot in the current tree.
    pub fn pending_ready(&self) -> usize {
        self.tree.as_ref().map_or(0, FrameTree::pending_ready)
    }

    /// Number of detached branches awaiting resumption.
    pub fn detached_len(&self) -> usize {
        self.detached.len()
    }

    /// Take the node in `id`'s ready slot.
    pub fn take_ready(&mut self, id: FrameId) -> Option<K> {
        self.frame_mut(id)?.ready.take()
    }

    /// Store `node` in `id`'s ready slot if it is empty.
    pub fn try_set_ready(&mut self, id: FrameId, node: K) -> SlotOutcome {
        match self.frame_mut(id) {
            None => SlotOutcome::Missing,
            Some(frame) if frame.ready.is_some() => SlotOutcome::Occupied,
            Some(frame) => {
                frame.ready = Some(node);
                SlotOutcome::Placed
            }
        }
    }

    /// Queue `node` for child-ready on `id`. Returns false if `id` is unknown.
    pub fn queue_child_ready(&mut self, id: FrameId, node: K) -> bool {
        match self.frame_mut(id) {
            Some(frame) => {
                frame.child_readies.push(node);
                true
            }
            None => false,
        }
    }

    /// If `id` sits inside a deferred branch, hold `node` there and return the branch.
    pub fn hold_if_deferred(&mut self, id: FrameId, node: K) -> Option<FrameId> {
        let tree = self.tree.as_mut()?;
        let branch = tree.holding_branch(id)?;
        tree.frames.get_mut(&branch)?.held_readies.push(node);
        Some(branch)
    }

    /// Keep deferred branches split off by a flush.
    pub fn store_detached(&mut self, trees: impl IntoIterator<Item = FrameTree<K>>) {
        for tree in trees {
            self.detached.insert(tree.root, tree);
        }
    }

    /// Resume the deferred branch `id`.
    ///
    /// A detached branch resumed while a frame is open is grafted under the
    /// current frame and flushes with it. Resuming an already resumed branch
    /// is a no-op.
    pub fn resume(&mut self, id: FrameId) -> Result<Resumed<K>, ProtocolViolation> {
        if self.is_open(id) {
            return Err(ProtocolViolation::BranchStillOpen(id));
        }
        if let Some(tree) = self.tree.as_mut()
            && tree.frames.contains_key(&id)
        {
            return Ok(Resumed {
                readies: tree.undefer(id)?,
                flush: None,
            });
        }
        // Nested inside a detached branch: its work moves up to that branch.
        if let Some(outer) = self.detached_holding(id) {
            return Ok(Resumed {
                readies: outer.undefer(id)?,
                flush: None,
            });
        }

        let Some(mut branch) = self.detached.remove(&id) else {
            return Err(ProtocolViolation::UnknownFrame(id));
        };
        let Some(root) = branch.frames.get_mut(&id) else {
            return Err(ProtocolViolation::UnknownFrame(id));
        };
        root.deferred = false;
        let readies = core::mem::take(&mut root.held_readies);
        match (self.current(), self.tree.as_mut()) {
            (Some(parent), Some(tree)) => {
                root.parent = Some(parent);
                if let Some(p) = tree.frames.get_mut(&parent) {
                    p.children.push(id);
                }
                tree.frames.append(&mut branch.frames);
                Ok(Resumed {
                    readies,
                    flush: None,
                })
            }
            _ => Ok(Resumed {
                readies,
                flush: Some(branch),
            }),
        }
    }

    /// Drop a deferred branch without running its work.
    pub fn discard(&mut self, id: FrameId) -> Result<(), ProtocolViolation> {
        if self.is_open(id) {
            return Err(ProtocolViolation::BranchStillOpen(id));
        }
        if self.detached.remove(&id).is_some() {
            return Ok(());
        }
        if let Some(tree) = self.tree.as_mut()
            && tree.frames.contains_key(&id)
        {
            return tree.drop_branch(id);
        }
        match self.detached_holding(id) {
            Some(outer) => outer.drop_branch(id),
            None => Err(ProtocolViolation::UnknownFrame(id)),
        }
    }

    /// The detached tree containing the non-root frame `id`.
    fn detached_holding(&mut self, id: FrameId) -> Option<&mut FrameTree<K>> {
        self.detached
            .values_mut()
            .find(|tree| tree.root != id && tree.frames.contains_key(&id))
    }

    fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame<K>> {
        self.tree.as_mut()?.frames.get_mut(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_nest() {
        let mut stack = FrameStack::<u32>::new();
        let a = stack.push(FrameKind::Parse);
        let b = stack.push(FrameKind::Construct);
        assert!(a < b);
        assert_eq!(stack.current(), Some(b));
        assert_eq!(stack.frame(b).unwrap().parent(), Some(a));
        assert_eq!(stack.frame(a).unwrap().children(), [b]);
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn pop_must_match_top() {
        let mut stack = FrameStack::<u32>::new();
        let a = stack.push(FrameKind::Parse);
        let b = stack.push(FrameKind::Construct);
        assert_eq!(
            stack.pop(a).unwrap_err(),
            ProtocolViolation::PopNotCurrent {
                found: a,
                current: Some(b)
            }
        );
        assert!(stack.pop(b).unwrap().is_none());
        let tree = stack.pop(a).unwrap().unwrap();
        assert_eq!(tree.root(), a);
        assert_eq!(tree.len(), 2);
        assert!(stack.pop(a).is_err());

        // A new operation starts a fresh tree with a fresh id.
        let c = stack.push(FrameKind::Construct);
        assert!(c > b);
    }

    #[test]
    fn ready_slot_holds_one_node() {
        let mut stack = FrameStack::<u32>::new();
        let a = stack.push(FrameKind::Construct);
        assert_eq!(stack.try_set_ready(a, 1), SlotOutcome::Placed);
        assert_eq!(stack.try_set_ready(a, 2), SlotOutcome::Occupied);
        assert_eq!(stack.pending_ready(), 1);
        assert_eq!(stack.take_ready(a), Some(1));
        assert_eq!(stack.try_set_ready(FrameId(99), 2), SlotOutcome::Missing);
    }

    #[test]
    fn flush_plan_is_post_order() {
        let mut stack = FrameStack::<u32>::new();
        let root = stack.push(FrameKind::Parse);
        stack.queue_child_ready(root, 1);
        let a = stack.push(FrameKind::Construct);
        stack.queue_child_ready(a, 2);
        let a1 = stack.push(FrameKind::Construct);
        stack.queue_child_ready(a1, 3);
        stack.pop(a1).unwrap();
        stack.pop(a).unwrap();
        let b = stack.push(FrameKind::Construct);
        stack.queue_child_ready(b, 4);
        stack.pop(b).unwrap();
        let plan = stack.pop(root).unwrap().unwrap().flush_plan();
        assert_eq!(plan.child_readies, [3, 2, 4, 1]);
        assert!(plan.detached.is_empty());
    }

    #[test]
    fn deferred_branch_is_detached_from_flush() {
        let mut stack = FrameStack::<u32>::new();
        let root = stack.push(FrameKind::Parse);
        stack.queue_child_ready(root, 1);
        let branch = stack.push(FrameKind::Branch);
        stack.queue_child_ready(branch, 2);
        let inner = stack.push(FrameKind::Construct);
        stack.queue_child_ready(inner, 3);
        assert_eq!(stack.hold_if_deferred(inner, 30), Some(branch));
        assert_eq!(stack.hold_if_deferred(root, 10), None);
        stack.pop(inner).unwrap();
        stack.pop(branch).unwrap();
        let plan = stack.pop(root).unwrap().unwrap().flush_plan();
        assert_eq!(plan.child_readies, [1]);
        assert_eq!(plan.detached.len(), 1);
        let detached = &plan.detached[0];
        assert_eq!(detached.root(), branch);
        assert_eq!(detached.frame(branch).unwrap().held_readies(), [30]);

        stack.store_detached(plan.detached);
        assert_eq!(stack.detached_len(), 1);
        let resumed = stack.resume(branch).unwrap();
        assert_eq!(resumed.readies, [30]);
        let plan = resumed.flush.unwrap().flush_plan();
        assert_eq!(plan.child_readies, [3, 2]);
        assert_eq!(stack.detached_len(), 0);
        assert_eq!(
            stack.resume(branch).unwrap_err(),
            ProtocolViolation::UnknownFrame(branch)
        );
    }

    #[test]
    fn branch_resumed_before_flush_joins_parent_tree() {
        let mut stack = FrameStack::<u32>::new();
        let root = stack.push(FrameKind::Parse);
        let branch = stack.push(FrameKind::Branch);
        assert_eq!(
            stack.resume(branch).unwrap_err(),
            ProtocolViolation::BranchStillOpen(branch)
        );
        stack.queue_child_ready(branch, 2);
        stack.pop(branch).unwrap();
        assert_eq!(stack.resume(root).unwrap_err(), ProtocolViolation::BranchStillOpen(root));
        assert!(stack.resume(branch).unwrap().readies.is_empty());
        let plan = stack.pop(root).unwrap().unwrap().flush_plan();
        assert_eq!(plan.child_readies, [2]);
    }

    #[test]
    fn detached_branch_resumed_inside_frame_is_grafted() {
        let mut stack = FrameStack::<u32>::new();
        let branch = stack.push(FrameKind::Branch);
        stack.queue_child_ready(branch, 7);
        let plan = stack.pop(branch).unwrap().unwrap().flush_plan();
        assert!(plan.child_readies.is_empty());
        stack.store_detached(plan.detached);

        let op = stack.push(FrameKind::Clone);
        let resumed = stack.resume(branch).unwrap();
        assert!(resumed.flush.is_none());
        assert_eq!(stack.frame(op).unwrap().children(), [branch]);
        let plan = stack.pop(op).unwrap().unwrap().flush_plan();
        assert_eq!(plan.child_readies, [7]);
    }

    #[test]
    fn discard_drops_branch_work() {
        let mut stack = FrameStack::<u32>::new();
        let root = stack.push(FrameKind::Parse);
        let branch = stack.push(FrameKind::Branch);
        stack.queue_child_ready(branch, 2);
        stack.pop(branch).unwrap();
        assert_eq!(stack.discard(root), Err(ProtocolViolation::BranchStillOpen(root)));
        assert_eq!(stack.discard(branch), Ok(()));
        let plan = stack.pop(root).unwrap().unwrap().flush_plan();
        assert!(plan.child_readies.is_empty() && plan.detached.is_empty());
        assert_eq!(stack.discard(branch), Err(ProtocolViolation::UnknownFrame(branch)));
    }

    fn detached_nested_branches() -> (FrameStack<u32>, FrameId, FrameId) {
        let mut stack = FrameStack::<u32>::new();
        let outer = stack.push(FrameKind::Branch);
        stack.queue_child_ready(outer, 1);
        let inner = stack.push(FrameKind::Branch);
        stack.queue_child_ready(inner, 2);
        assert_eq!(stack.hold_if_deferred(inner, 20), Some(inner));
        stack.pop(inner).unwrap();
        let plan = stack.pop(outer).unwrap().unwrap().flush_plan();
        assert!(plan.child_readies.is_empty());
        stack.store_detached(plan.detached);
        assert_eq!(stack.detached_len(), 1);
        (stack, outer, inner)
    }

    #[test]
    fn branch_nested_in_detached_branch_resumes_into_it() {
        let (mut stack, outer, inner) = detached_nested_branches();
        let resumed = stack.resume(inner).unwrap();
        assert!(resumed.readies.is_empty() && resumed.flush.is_none());
        assert!(!stack.frame(inner).unwrap().is_deferred());
        assert_eq!(stack.frame(outer).unwrap().held_readies(), [20]);
        assert_eq!(stack.detached_len(), 1);

        let resumed = stack.resume(outer).unwrap();
        assert_eq!(resumed.readies, [20]);
        let plan = resumed.flush.unwrap().flush_plan();
        assert_eq!(plan.child_readies, [2, 1]);
        assert!(plan.detached.is_empty());
        assert_eq!(stack.detached_len(), 0);
    }

    #[test]
    fn branch_nested_in_detached_branch_can_be_discarded() {
        let (mut stack, outer, inner) = detached_nested_branches();
        assert_eq!(stack.discard(inner), Ok(()));
        assert!(stack.frame(inner).is_none());
        assert!(stack.frame(outer).unwrap().children().is_empty());
        assert_eq!(stack.discard(inner), Err(ProtocolViolation::UnknownFrame(inner)));

        let resumed = stack.resume(outer).unwrap();
        assert!(resumed.readies.is_empty());
        assert_eq!(resumed.flush.unwrap().flush_plan().child_readies, [1]);
    }
}
