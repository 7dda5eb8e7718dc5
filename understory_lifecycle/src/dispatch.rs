// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dispatch engine: capture, target, and bubble over a composed path.
//!
//! ## Phases
//!
//! For a path `[target, p1, ..., root]`:
//!
//! 1. Capture visits `root..p1` and runs capture listeners. Skipped when
//!    [`DispatchConfig::capture_phase`] is off.
//! 2. Target runs every listener on `target` in registration order.
//! 3. Bubble visits `p1..root` and runs non-capture listeners, only if the
//!    event bubbles.
//!
//! Propagation cannot be stopped; every node on the path is visited.
//!
//! ## Reentrancy
//!
//! No internal borrow is held while a listener runs. Listeners may add or
//! remove listeners and may dispatch other events through
//! [`EventContext::engine`]. The listener list at a node is read by index up
//! to the length observed when dispatch reached that node.
//!
//! ## Errors
//!
//! A listener returning `Err` is reported on the [`ErrorChannel`] and the
//! dispatch continues. A protocol violation raised from inside a listener is
//! remembered and returned once the whole path has been visited.

use alloc::rc::Rc;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt::{self, Debug};

use tracing::{debug, error, trace};

use crate::error::{CallbackFailure, CallbackOrigin, ErrorChannel, ProtocolViolation};
use crate::event::{Event, Phase, Prevention};
use crate::listener::{
    AddOutcome, Listener, ListenerOptions, ListenerRegistry, Preventable, RemoveOutcome,
};
use crate::path::ComposedPath;
use crate::types::TreeLookup;

/// Dispatch configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DispatchConfig {
    /// Run the capture phase.
    pub capture_phase: bool,
    /// Maximum nesting of dispatches started from listeners.
    pub max_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capture_phase: true,
            max_depth: 32,
        }
    }
}

/// Runs events over composed paths and owns the listener registry.
pub struct DispatchEngine<K> {
    tree: Rc<dyn TreeLookup<K>>,
    listeners: RefCell<ListenerRegistry<K>>,
    errors: Rc<ErrorChannel<K>>,
    depth: Cell<usize>,
    config: DispatchConfig,
}

impl<K> Debug for DispatchEngine<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("listeners", &self.listeners)
            .field("depth", &self.depth.get())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: Copy + Ord + Debug + 'static> DispatchEngine<K> {
    /// Create an engine with default configuration.
    pub fn new(tree: Rc<dyn TreeLookup<K>>, errors: Rc<ErrorChannel<K>>) -> Self {
        Self::with_config(tree, errors, DispatchConfig::default())
    }

    /// Create an engine with `config`.
    pub fn with_config(
        tree: Rc<dyn TreeLookup<K>>,
        errors: Rc<ErrorChannel<K>>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            tree,
            listeners: RefCell::new(ListenerRegistry::new()),
            errors,
            depth: Cell::new(0),
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> DispatchConfig {
        self.config
    }

    /// Channel receiving listener failures.
    pub fn errors(&self) -> &Rc<ErrorChannel<K>> {
        &self.errors
    }

    /// Register a listener. See [`ListenerRegistry::add`].
    pub fn add_listener(
        &self,
        target: K,
        kind: &str,
        listener: Listener<K>,
        options: ListenerOptions,
    ) -> AddOutcome {
        self.listeners
            .borrow_mut()
            .add(target, kind, listener, options)
    }

    /// Unregister a listener. See [`ListenerRegistry::remove`].
    pub fn remove_listener(&self, target: K, kind: &str, listener: &Listener<K>) -> RemoveOutcome {
        self.listeners.borrow_mut().remove(target, kind, listener)
    }

    /// Live listeners for (`target`, `kind`).
    pub fn listener_count(&self, target: K, kind: &str) -> usize {
        self.listeners
            .borrow()
            .live_count(&*self.tree, target, kind)
    }

    /// True if any target may have a listener for `kind`.
    pub fn is_listening(&self, kind: &str) -> bool {
        self.listeners.borrow().is_listening(kind)
    }

    /// True while a dispatch is running.
    pub fn is_dispatching(&self) -> bool {
        self.depth.get() > 0
    }

    /// Drop every listener on `target`.
    pub fn forget_target(&self, target: K) -> usize {
        self.listeners.borrow_mut().forget(target)
    }

    /// Drop listener lists for dead targets. Refused during dispatch.
    pub fn compact(&self) -> Result<usize, ProtocolViolation> {
        self.listeners.borrow_mut().compact(&*self.tree)
    }

    /// Inspect the registry. Do not dispatch from `f`.
    pub fn with_registry<R>(&self, f: impl FnOnce(&ListenerRegistry<K>) -> R) -> R {
        f(&self.listeners.borrow())
    }

    /// Dispatch `event` at `target`.
    ///
    /// Returns whether the default action was prevented (softly or hard).
    /// Fails without running any listener if the event was already
    /// dispatched, `target` is dead, or nesting is too deep.
    pub fn dispatch(&self, event: &mut Event<K>, target: K) -> Result<bool, ProtocolViolation> {
        if event.phase() != Phase::None {
            return Err(ProtocolViolation::EventAlreadyDispatched {
                kind: event.kind().to_string(),
            });
        }
        if !self.tree.is_alive(&target) {
            return Err(ProtocolViolation::DeadTarget);
        }
        if self.depth.get() >= self.config.max_depth {
            return Err(ProtocolViolation::DispatchDepthExceeded {
                limit: self.config.max_depth,
            });
        }

        let path = ComposedPath::compute(&*self.tree, target, event.is_composed());
        debug!(
            event = event.kind(),
            ?target,
            path_len = path.len(),
            depth = self.depth.get(),
            "dispatch"
        );
        event.begin(target, path.nodes().to_vec());

        let scope = DispatchScope::enter(self);
        // Listeners added from here on wait for the next dispatch. During a
        // dispatch lists only grow or tombstone, so these bounds stay valid.
        let bounds: Vec<usize> = {
            let listeners = self.listeners.borrow();
            path.nodes()
                .iter()
                .map(|node| listeners.snapshot_len(*node, event.kind()))
                .collect()
        };
        let mut violation = None;
        if self.config.capture_phase {
            event.set_phase(Phase::Capture);
            for index in (1..path.len()).rev() {
                self.invoke_at(event, &path, index, bounds[index], &mut violation);
            }
        }
        event.set_phase(Phase::Target);
        self.invoke_at(event, &path, 0, bounds[0], &mut violation);
        if event.bubbles() {
            event.set_phase(Phase::Bubble);
            for index in 1..path.len() {
                self.invoke_at(event, &path, index, bounds[index], &mut violation);
            }
        }
        event.finish();
        drop(scope);

        match violation {
            Some(violation) => Err(violation),
            None => Ok(event.default_prevented()),
        }
    }

    fn invoke_at(
        &self,
        event: &mut Event<K>,
        path: &ComposedPath<K>,
        index: usize,
        len: usize,
        violation: &mut Option<ProtocolViolation>,
    ) {
        let node = path.nodes()[index];
        let phase = event.phase();
        if len == 0 {
            return;
        }
        let target = path.target_at(index).unwrap_or(node);
        event.set_current_target(Some(node));
        for slot in 0..len {
            let Some((listener, options)) =
                self.listeners.borrow().live_entry(node, event.kind(), slot)
            else {
                continue;
            };
            let wanted = match phase {
                Phase::Capture => options.capture,
                Phase::Bubble => !options.capture,
                _ => true,
            };
            if !wanted {
                continue;
            }
            if options.trusted_only && !event.is_trusted() {
                trace!(event = event.kind(), ?node, "skipping trusted-only listener");
                continue;
            }
            if options.once {
                self.listeners
                    .borrow_mut()
                    .remove(node, event.kind(), &listener);
            }
            let mut cx = EventContext {
                engine: self,
                event: &mut *event,
                current_target: node,
                target,
                options,
                listener: listener.clone(),
                violation: &mut *violation,
            };
            if let Err(error) = listener.call(&mut cx) {
                self.errors.report(CallbackFailure {
                    origin: CallbackOrigin::Listener {
                        event: event.kind().to_string(),
                        node,
                        phase,
                    },
                    error,
                });
            }
        }
        event.set_current_target(None);
    }
}

/// Tracks dispatch nesting; purges listener tombstones when the outermost dispatch ends.
struct DispatchScope<'a, K: Copy + Ord + Debug + 'static> {
    engine: &'a DispatchEngine<K>,
}

impl<'a, K: Copy + Ord + Debug + 'static> DispatchScope<'a, K> {
    fn enter(engine: &'a DispatchEngine<K>) -> Self {
        engine.depth.set(engine.depth.get() + 1);
        engine.listeners.borrow_mut().enter_dispatch();
        Self { engine }
    }
}

impl<K: Copy + Ord + Debug + 'static> Drop for DispatchScope<'_, K> {
    fn drop(&mut self) {
        let engine = self.engine;
        engine.depth.set(engine.depth.get().saturating_sub(1));
        let mut listeners = engine.listeners.borrow_mut();
        listeners.exit_dispatch();
        if !listeners.is_dispatching()
            && let Err(err) = listeners.cleanup()
        {
            error!(%err, "listener cleanup failed");
        }
    }
}

/// What a listener sees while it runs.
pub struct EventContext<'a, K> {
    engine: &'a DispatchEngine<K>,
    event: &'a mut Event<K>,
    current_target: K,
    target: K,
    options: ListenerOptions,
    listener: Listener<K>,
    violation: &'a mut Option<ProtocolViolation>,
}

impl<K: Debug> Debug for EventContext<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("event", &self.event)
            .field("current_target", &self.current_target)
            .field("target", &self.target)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a, K: Copy + Ord + Debug + 'static> EventContext<'a, K> {
    /// The engine running this dispatch. Use it to add or remove listeners
    /// or to dispatch nested events.
    pub fn engine(&self) -> &'a DispatchEngine<K> {
        self.engine
    }

    /// The event being dispatched.
    pub fn event(&self) -> &Event<K> {
        self.event
    }

    /// Event type.
    pub fn kind(&self) -> &str {
        self.event.kind()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.event.phase()
    }

    /// The node whose listener is running.
    pub fn current_target(&self) -> K {
        self.current_target
    }

    /// The target as seen from the current node, retargeted across boundaries.
    pub fn target(&self) -> K {
        self.target
    }

    /// Options the running listener was registered with.
    pub fn options(&self) -> ListenerOptions {
        self.options
    }

    /// Prevent the default action according to this listener's [`Preventable`] mode.
    ///
    /// A hard-preventing listener calling this on an already suppressed event
    /// is a protocol violation.
    pub fn prevent_default(&mut self) -> Result<(), ProtocolViolation> {
        match self.options.preventable {
            Preventable::None => {
                trace!(event = self.event.kind(), "prevent ignored for non-preventable listener");
                Ok(())
            }
            Preventable::Soft => {
                self.event.escalate(Prevention::Soft);
                Ok(())
            }
            Preventable::Hard => {
                if self.event.default_suppressed() {
                    let kind = self.event.kind().to_string();
                    return self.violate(ProtocolViolation::AlreadySuppressed { kind });
                }
                self.event.escalate(Prevention::Hard);
                Ok(())
            }
        }
    }

    /// Always fails: propagation cannot be stopped.
    pub fn stop_propagation(&mut self) -> Result<(), ProtocolViolation> {
        self.violate(ProtocolViolation::PropagationStopRejected)
    }

    /// Remove the running listener from the current node.
    pub fn remove_self(&self) -> RemoveOutcome {
        self.engine
            .remove_listener(self.current_target, self.event.kind(), &self.listener)
    }

    fn violate(&mut self, violation: ProtocolViolation) -> Result<(), ProtocolViolation> {
        if self.violation.is_none() {
            *self.violation = Some(violation.clone());
        }
        Err(violation)
    }
}
