// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime facade over dispatch and ready scheduling.
//!
//! A [`Runtime`] shares one tree handle and one [`ErrorChannel`] between a
//! [`DispatchEngine`] and a [`ReadyScheduler`], and adds a continuation queue
//! for work that must run once construction and dispatch have unwound.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec;
use core::cell::RefCell;
use core::fmt::{self, Debug};

use tracing::{debug, trace};

use crate::dispatch::{DispatchConfig, DispatchEngine};
use crate::error::{CallbackError, CallbackFailure, CallbackOrigin, ErrorChannel, ProtocolViolation};
use crate::event::Event;
use crate::frame::{FrameId, FrameKind};
use crate::listener::{AddOutcome, Listener, ListenerOptions, RemoveOutcome};
use crate::ready::{LifecycleCallbacks, ReadyScheduler, SchedulerConfig};
use crate::types::TreeLookup;

/// Runtime configuration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeConfig {
    /// Dispatch settings.
    pub dispatch: DispatchConfig,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
}

/// Work deferred until no frame is open and no dispatch is running.
pub type Continuation<K> = Box<dyn FnOnce(&Runtime<K>) -> Result<(), CallbackError>>;

/// Listener registry, dispatch, construction frames, and ready scheduling over one tree.
pub struct Runtime<K> {
    tree: Rc<dyn TreeLookup<K>>,
    engine: DispatchEngine<K>,
    scheduler: ReadyScheduler<K>,
    errors: Rc<ErrorChannel<K>>,
    continuations: RefCell<VecDeque<Continuation<K>>>,
}

impl<K: Debug> Debug for Runtime<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("engine", &self.engine)
            .field("scheduler", &self.scheduler)
            .field("errors", &self.errors)
            .field("continuations", &self.continuations.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<K: Copy + Ord + Debug + 'static> Runtime<K> {
    /// Create a runtime with default configuration.
    pub fn new(tree: Rc<dyn TreeLookup<K>>) -> Self {
        Self::with_config(tree, RuntimeConfig::default())
    }

    /// Create a runtime with `config`.
    pub fn with_config(tree: Rc<dyn TreeLookup<K>>, config: RuntimeConfig) -> Self {
        let errors = Rc::new(ErrorChannel::new());
        Self {
            engine: DispatchEngine::with_config(tree.clone(), errors.clone(), config.dispatch),
            scheduler: ReadyScheduler::with_config(tree.clone(), errors.clone(), config.scheduler),
            tree,
            errors,
            continuations: RefCell::new(VecDeque::new()),
        }
    }

    /// The dispatch engine.
    pub fn engine(&self) -> &DispatchEngine<K> {
        &self.engine
    }

    /// The ready scheduler.
    pub fn scheduler(&self) -> &ReadyScheduler<K> {
        &self.scheduler
    }

    /// Channel receiving every isolated callback failure.
    pub fn errors(&self) -> &ErrorChannel<K> {
        &self.errors
    }

    /// Register a listener on `target` for `kind`.
    pub fn register_listener(
        &self,
        target: K,
        kind: &str,
        listener: Listener<K>,
        options: ListenerOptions,
    ) -> AddOutcome {
        self.engine.add_listener(target, kind, listener, options)
    }

    /// Unregister a listener.
    pub fn unregister_listener(
        &self,
        target: K,
        kind: &str,
        listener: &Listener<K>,
    ) -> RemoveOutcome {
        self.engine.remove_listener(target, kind, listener)
    }

    /// Dispatch `event` at `target`. See [`DispatchEngine::dispatch`].
    pub fn dispatch(&self, event: &mut Event<K>, target: K) -> Result<bool, ProtocolViolation> {
        self.engine.dispatch(event, target)
    }

    /// Define ready and child-ready callbacks for `node`.
    pub fn define_lifecycle(&self, node: K, callbacks: LifecycleCallbacks<K>) -> bool {
        self.scheduler.define(node, callbacks)
    }

    /// A construction operation starts.
    pub fn on_construct_start(&self, kind: FrameKind) -> Result<FrameId, ProtocolViolation> {
        self.scheduler.push_frame(kind)
    }

    /// The construction operation `frame` ends.
    pub fn on_construct_end(&self, frame: FrameId) -> Result<(), ProtocolViolation> {
        self.scheduler.pop_frame(frame)
    }

    /// `node` finished construction and may become ready.
    pub fn on_node_ready_candidate(&self, node: K) {
        self.scheduler.node_ready_candidate(node);
    }

    /// Drop listeners and lifecycle state for `node` and its whole subtree,
    /// including encapsulated roots. Returns how many nodes were visited.
    pub fn forget(&self, node: K) -> usize {
        let mut visited = 0;
        let mut work = vec![node];
        while let Some(next) = work.pop() {
            visited += 1;
            self.engine.forget_target(next);
            self.scheduler.undefine(next);
            work.extend(self.tree.children_of(&next));
        }
        trace!(?node, visited, "forgot subtree");
        visited
    }

    /// Reclaim storage held for dead nodes. Refused during dispatch.
    pub fn compact(&self) -> Result<usize, ProtocolViolation> {
        let listeners = self.engine.compact()?;
        let lifecycles = self.scheduler.compact();
        debug!(listeners, lifecycles, "compacted");
        Ok(listeners + lifecycles)
    }

    /// Queue work to run from [`Runtime::run_continuations`].
    pub fn queue_continuation(
        &self,
        f: impl FnOnce(&Self) -> Result<(), CallbackError> + 'static,
    ) {
        self.continuations.borrow_mut().push_back(Box::new(f));
    }

    /// Number of queued continuations.
    pub fn pending_continuations(&self) -> usize {
        self.continuations.borrow().len()
    }

    /// Run queued continuations in FIFO order, including ones queued while running.
    ///
    /// Refused while a frame is open or a dispatch is running; a continuation
    /// that leaves a frame open stops the run with the same error.
    pub fn run_continuations(&self) -> Result<usize, ProtocolViolation> {
        let mut ran = 0;
        loop {
            if self.scheduler.depth() > 0 || self.engine.is_dispatching() {
                return Err(ProtocolViolation::ContinuationReentered);
            }
            let next = self.continuations.borrow_mut().pop_front();
            let Some(continuation) = next else {
                break;
            };
            if let Err(error) = continuation(self) {
                self.errors.report(CallbackFailure {
                    origin: CallbackOrigin::Continuation,
                    error,
                });
            }
            ran += 1;
        }
        Ok(ran)
    }
}
