// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ready scheduling: when nodes' ready and child-ready callbacks run.
//!
//! ## Rules
//!
//! - A node reported ready while a frame is open takes that frame's ready
//!   slot. Whatever node held the slot is fired first.
//! - Popping a frame fires whatever is left in its slot.
//! - Child-ready callbacks queue on the frame that was current when the node
//!   was reported, and run in post-order once the outermost frame is popped.
//! - Work released inside a deferred branch waits until the branch resumes.
//! - With no frame open, a reported node fires immediately.
//! - Each callback fires at most once per node, and never for a dead node.
//!
//! Callbacks run with no internal borrow held; they may push and pop frames,
//! report more nodes, or define lifecycles.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt::{self, Debug};

use tracing::{debug, error, trace, warn};

use crate::error::{CallbackError, CallbackFailure, CallbackOrigin, ErrorChannel, ProtocolViolation};
use crate::frame::{FrameId, FrameKind, FrameStack, FrameTree, SlotOutcome};
use crate::types::TreeLookup;
use crate::weak::WeakRegistry;

/// Signature of ready and child-ready callbacks.
pub type LifecycleFn<K> = dyn Fn(&ReadyScheduler<K>, K) -> Result<(), CallbackError>;

/// A shared lifecycle callback.
pub struct LifecycleCallback<K>(Rc<LifecycleFn<K>>);

impl<K> LifecycleCallback<K> {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&ReadyScheduler<K>, K) -> Result<(), CallbackError> + 'static) -> Self {
        Self(Rc::new(f))
    }
}

impl<K> Clone for LifecycleCallback<K> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<K> Debug for LifecycleCallback<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LifecycleCallback")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Callbacks a node type defines.
pub struct LifecycleCallbacks<K> {
    /// Runs once when the node is ready.
    pub ready: Option<LifecycleCallback<K>>,
    /// Runs once when the node's construction subtree has completed.
    pub child_ready: Option<LifecycleCallback<K>>,
}

impl<K> Default for LifecycleCallbacks<K> {
    fn default() -> Self {
        Self {
            ready: None,
            child_ready: None,
        }
    }
}

impl<K> Clone for LifecycleCallbacks<K> {
    fn clone(&self) -> Self {
        Self {
            ready: self.ready.clone(),
            child_ready: self.child_ready.clone(),
        }
    }
}

impl<K> Debug for LifecycleCallbacks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCallbacks")
            .field("ready", &self.ready.is_some())
            .field("child_ready", &self.child_ready.is_some())
            .finish()
    }
}

impl<K> LifecycleCallbacks<K> {
    /// No callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ready callback.
    #[must_use]
    pub fn on_ready(
        mut self,
        f: impl Fn(&ReadyScheduler<K>, K) -> Result<(), CallbackError> + 'static,
    ) -> Self {
        self.ready = Some(LifecycleCallback::new(f));
        self
    }

    /// Set the child-ready callback.
    #[must_use]
    pub fn on_child_ready(
        mut self,
        f: impl Fn(&ReadyScheduler<K>, K) -> Result<(), CallbackError> + 'static,
    ) -> Self {
        self.child_ready = Some(LifecycleCallback::new(f));
        self
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Slot {
    Idle,
    Queued,
    Fired,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Which {
    Ready,
    ChildReady,
}

struct NodeLifecycle<K> {
    callbacks: LifecycleCallbacks<K>,
    ready: Slot,
    child_ready: Slot,
}

impl<K> NodeLifecycle<K> {
    fn slot_mut(&mut self, which: Which) -> (&mut Slot, Option<&LifecycleCallback<K>>) {
        match which {
            Which::Ready => (&mut self.ready, self.callbacks.ready.as_ref()),
            Which::ChildReady => (&mut self.child_ready, self.callbacks.child_ready.as_ref()),
        }
    }
}

/// Scheduler configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum number of simultaneously open frames.
    pub max_frame_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_frame_depth: 512,
        }
    }
}

/// Owns the frame stack and per-node lifecycle state.
pub struct ReadyScheduler<K> {
    tree: Rc<dyn TreeLookup<K>>,
    frames: RefCell<FrameStack<K>>,
    nodes: RefCell<WeakRegistry<K, NodeLifecycle<K>>>,
    errors: Rc<ErrorChannel<K>>,
    config: SchedulerConfig,
}

impl<K: Debug> Debug for ReadyScheduler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyScheduler")
            .field("frames", &self.frames)
            .field("nodes", &self.nodes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: Copy + Ord + Debug + 'static> ReadyScheduler<K> {
    /// Create a scheduler with default configuration.
    pub fn new(tree: Rc<dyn TreeLookup<K>>, errors: Rc<ErrorChannel<K>>) -> Self {
        Self::with_config(tree, errors, SchedulerConfig::default())
    }

    /// Create a scheduler with `config`.
    pub fn with_config(
        tree: Rc<dyn TreeLookup<K>>,
        errors: Rc<ErrorChannel<K>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            tree,
            frames: RefCell::new(FrameStack::new()),
            nodes: RefCell::new(WeakRegistry::new()),
            errors,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Channel receiving callback failures.
    pub fn errors(&self) -> &Rc<ErrorChannel<K>> {
        &self.errors
    }

    /// Define lifecycle callbacks for `node`.
    ///
    /// Redefining keeps which callbacks already fired. Returns true if `node`
    /// had no definition.
    pub fn define(&self, node: K, callbacks: LifecycleCallbacks<K>) -> bool {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(existing) = nodes.get_mut(&*self.tree, &node) {
            existing.callbacks = callbacks;
            return false;
        }
        nodes.add(
            node,
            NodeLifecycle {
                callbacks,
                ready: Slot::Idle,
                child_ready: Slot::Idle,
            },
        );
        true
    }

    /// Remove `node`'s definition. Pending work for it is skipped.
    pub fn undefine(&self, node: K) -> bool {
        self.nodes.borrow_mut().delete(&node).is_some()
    }

    /// True if `node` is alive and defined.
    pub fn is_defined(&self, node: K) -> bool {
        self.nodes.borrow().has(&*self.tree, &node)
    }

    /// Drop lifecycle state for dead nodes.
    pub fn compact(&self) -> usize {
        self.nodes.borrow_mut().compact(&*self.tree)
    }

    /// Current frame.
    pub fn current_frame(&self) -> Option<FrameId> {
        self.frames.borrow().current()
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.borrow().depth()
    }

    /// Frames in the current operation with an occupied ready slot.
    pub fn pending_ready(&self) -> usize {
        self.frames.borrow().pending_ready()
    }

    /// Deferred branches awaiting resume or discard.
    pub fn detached_branches(&self) -> usize {
        self.frames.borrow().detached_len()
    }

    /// Push a construction frame.
    pub fn push_frame(&self, kind: FrameKind) -> Result<FrameId, ProtocolViolation> {
        let mut frames = self.frames.borrow_mut();
        let limit = self.config.max_frame_depth;
        if frames.depth() >= limit {
            return Err(ProtocolViolation::FrameDepthExceeded { limit });
        }
        let id = frames.push(kind);
        trace!(?id, ?kind, depth = frames.depth(), "frame pushed");
        Ok(id)
    }

    /// Pop `id`, which must be the current frame.
    ///
    /// Fires the frame's pending ready, then, if this was the outermost
    /// frame, runs queued child-ready callbacks in post-order.
    pub fn pop_frame(&self, id: FrameId) -> Result<(), ProtocolViolation> {
        let current = self.current_frame();
        if current != Some(id) {
            return Err(ProtocolViolation::PopNotCurrent { found: id, current });
        }
        self.flush_ready_slot(id);
        let finished = self.frames.borrow_mut().pop(id)?;
        trace!(?id, "frame popped");
        if let Some(tree) = finished {
            self.flush_tree(tree);
        }
        Ok(())
    }

    /// Push a frame and return a guard that pops it on drop.
    pub fn enter(&self, kind: FrameKind) -> Result<FrameGuard<'_, K>, ProtocolViolation> {
        let id = self.push_frame(kind)?;
        Ok(FrameGuard {
            scheduler: self,
            id,
            armed: true,
        })
    }

    /// Run `f` inside a frame of `kind`.
    ///
    /// Frames `f` leaves open above this one are popped first.
    pub fn construct<R>(
        &self,
        kind: FrameKind,
        f: impl FnOnce(&Self, FrameId) -> R,
    ) -> Result<R, ProtocolViolation> {
        let guard = self.enter(kind)?;
        let out = f(self, guard.id());
        guard.finish()?;
        Ok(out)
    }

    /// Pop frames until `id` has been popped.
    pub fn unwind_to(&self, id: FrameId) -> Result<(), ProtocolViolation> {
        if !self.frames.borrow().is_open(id) {
            return Err(ProtocolViolation::UnknownFrame(id));
        }
        loop {
            let top = self.current_frame();
            match top {
                Some(top) if top == id => return self.pop_frame(id),
                Some(top) => {
                    warn!(?top, until = ?id, "popping frame left open");
                    self.pop_frame(top)?;
                }
                None => return Err(ProtocolViolation::UnknownFrame(id)),
            }
        }
    }

    /// Report that `node` has been constructed and may become ready.
    pub fn node_ready_candidate(&self, node: K) {
        let (ready, child_ready) = {
            let mut nodes = self.nodes.borrow_mut();
            let Some(entry) = nodes.get_mut(&*self.tree, &node) else {
                trace!(?node, "ready candidate without lifecycle");
                return;
            };
            let ready = entry.callbacks.ready.is_some() && entry.ready == Slot::Idle;
            if ready {
                entry.ready = Slot::Queued;
            }
            let child_ready =
                entry.callbacks.child_ready.is_some() && entry.child_ready == Slot::Idle;
            if child_ready {
                entry.child_ready = Slot::Queued;
            }
            (ready, child_ready)
        };

        let Some(frame) = self.current_frame() else {
            if ready {
                self.fire(node, Which::Ready);
            }
            if child_ready {
                self.fire(node, Which::ChildReady);
            }
            return;
        };

        if child_ready {
            self.frames.borrow_mut().queue_child_ready(frame, node);
        }
        if !ready {
            return;
        }
        loop {
            let outcome = self.frames.borrow_mut().try_set_ready(frame, node);
            match outcome {
                SlotOutcome::Placed => return,
                SlotOutcome::Occupied => self.flush_ready_slot(frame),
                SlotOutcome::Missing => {
                    self.fire(node, Which::Ready);
                    return;
                }
            }
        }
    }

    /// Resume a deferred branch, releasing its held work.
    pub fn resume_branch(&self, id: FrameId) -> Result<(), ProtocolViolation> {
        let resumed = self.frames.borrow_mut().resume(id)?;
        debug!(?id, held = resumed.readies.len(), "branch resumed");
        for node in resumed.readies {
            self.fire(node, Which::Ready);
        }
        if let Some(tree) = resumed.flush {
            self.flush_tree(tree);
        }
        Ok(())
    }

    /// Drop a deferred branch and its held work.
    pub fn discard_branch(&self, id: FrameId) -> Result<(), ProtocolViolation> {
        self.frames.borrow_mut().discard(id)?;
        debug!(?id, "branch discarded");
        Ok(())
    }

    /// Empty `frame`'s ready slot, firing or holding whatever it held.
    fn flush_ready_slot(&self, frame: FrameId) {
        loop {
            let node = self.frames.borrow_mut().take_ready(frame);
            let Some(node) = node else {
                return;
            };
            let held = self.frames.borrow_mut().hold_if_deferred(frame, node);
            match held {
                Some(branch) => trace!(?node, ?branch, "ready held by deferred branch"),
                None => self.fire(node, Which::Ready),
            }
        }
    }

    fn flush_tree(&self, tree: FrameTree<K>) {
        let root = tree.root();
        let plan = tree.flush_plan();
        debug!(
            ?root,
            child_readies = plan.child_readies.len(),
            detached = plan.detached.len(),
            "construction finished"
        );
        self.frames.borrow_mut().store_detached(plan.detached);
        for node in plan.child_readies {
            self.fire(node, Which::ChildReady);
        }
    }

    fn fire(&self, node: K, which: Which) {
        let callback = {
            let mut nodes = self.nodes.borrow_mut();
            let Some(entry) = nodes.get_mut(&*self.tree, &node) else {
                trace!(?node, ?which, "skipping callback for dead or undefined node");
                return;
            };
            let (slot, callback) = entry.slot_mut(which);
            if *slot == Slot::Fired {
                return;
            }
            *slot = Slot::Fired;
            callback.cloned()
        };
        let Some(callback) = callback else {
            return;
        };
        if let Err(error) = (callback.0)(self, node) {
            let origin = match which {
                Which::Ready => CallbackOrigin::Ready { node },
                Which::ChildReady => CallbackOrigin::ChildReady { node },
            };
            self.errors.report(CallbackFailure { origin, error });
        }
    }
}

/// Pops its frame (and anything left open above it) when dropped.
pub struct FrameGuard<'a, K: Copy + Ord + Debug + 'static> {
    scheduler: &'a ReadyScheduler<K>,
    id: FrameId,
    armed: bool,
}

impl<K: Copy + Ord + Debug + 'static> Debug for FrameGuard<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGuard")
            .field("id", &self.id)
            .field("armed", &self.armed)
            .finish()
    }
}

impl<K: Copy + Ord + Debug + 'static> FrameGuard<'_, K> {
    /// The guarded frame.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Pop the frame now and report the result.
    pub fn finish(mut self) -> Result<(), ProtocolViolation> {
        self.armed = false;
        self.scheduler.unwind_to(self.id)
    }
}

impl<K: Copy + Ord + Debug + 'static> Drop for FrameGuard<'_, K> {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.scheduler.unwind_to(self.id)
        {
            error!(id = ?self.id, %err, "frame guard failed to pop");
        }
    }
}
