// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Listener storage: per event type, per target, in registration order.
//!
//! ## Removal during dispatch
//!
//! While any dispatch is running, removal only marks the entry as removed.
//! Dispatch reads entries by index against a length captured when it reached
//! the node, so entries appended mid-dispatch are not visited and tombstoned
//! entries are skipped. Tombstones are purged by [`ListenerRegistry::cleanup`]
//! once the outermost dispatch has finished.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Debug};

use tracing::trace;

use crate::dispatch::EventContext;
use crate::error::{CallbackError, ProtocolViolation};
use crate::types::Liveness;
use crate::weak::WeakRegistry;

/// Signature of an event listener.
pub type ListenerFn<K> = dyn Fn(&mut EventContext<'_, K>) -> Result<(), CallbackError>;

/// A shared, identity-compared event listener.
///
/// Two `Listener`s are the same listener iff they are clones of one another.
pub struct Listener<K>(Rc<ListenerFn<K>>);

impl<K> Listener<K> {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&mut EventContext<'_, K>) -> Result<(), CallbackError> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// True if `self` and `other` are the same listener.
    pub fn same(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub(crate) fn call(&self, cx: &mut EventContext<'_, K>) -> Result<(), CallbackError> {
        (self.0)(cx)
    }
}

impl<K> Clone for Listener<K> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<K> Debug for Listener<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// How a listener may affect the default action.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Preventable {
    /// Calls to prevent the default action are ignored.
    None,
    /// Prevention is advisory.
    Soft,
    /// Prevention suppresses the default action.
    #[default]
    Hard,
}

/// Per-registration listener options.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ListenerOptions {
    /// Skip untrusted events.
    pub trusted_only: bool,
    /// Effect of calling prevent from this listener.
    pub preventable: Preventable,
    /// Run during capture instead of bubble. Target phase runs both.
    pub capture: bool,
    /// Remove the listener right before its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    /// Default options: bubble phase, hard prevention, any event.
    pub const fn new() -> Self {
        Self {
            trusted_only: false,
            preventable: Preventable::Hard,
            capture: false,
            once: false,
        }
    }

    /// Only receive trusted events.
    #[must_use]
    pub const fn with_trusted_only(mut self) -> Self {
        self.trusted_only = true;
        self
    }

    /// Run in the capture phase.
    #[must_use]
    pub const fn with_capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Set the prevention strength.
    #[must_use]
    pub const fn with_preventable(mut self, preventable: Preventable) -> Self {
        self.preventable = preventable;
        self
    }

    /// Fire at most once.
    #[must_use]
    pub const fn with_once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// A registered listener and its options.
#[derive(Clone, Debug)]
pub struct ListenerEntry<K> {
    listener: Listener<K>,
    options: ListenerOptions,
    removed: bool,
}

impl<K> ListenerEntry<K> {
    /// The listener.
    pub fn listener(&self) -> &Listener<K> {
        &self.listener
    }

    /// Its options.
    pub fn options(&self) -> ListenerOptions {
        self.options
    }

    /// True if removed during a dispatch and awaiting cleanup.
    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

/// Result of [`ListenerRegistry::add`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    /// First live listener for this (target, type).
    First,
    /// Added after existing live listeners.
    Added,
    /// The same listener was already registered; nothing changed.
    AlreadyPresent,
}

impl AddOutcome {
    /// Whether this add took the (target, type) pair from no listeners to one.
    pub fn is_first(self) -> bool {
        self == Self::First
    }
}

/// Result of [`ListenerRegistry::remove`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RemoveOutcome {
    /// The listener was not registered.
    NotPresent,
    /// Removed; other live listeners remain.
    Removed,
    /// Removed; no live listeners remain for this (target, type).
    RemovedLast,
}

impl RemoveOutcome {
    /// Whether no live listeners remain after this removal.
    pub fn is_now_empty(self) -> bool {
        self == Self::RemovedLast
    }
}

/// Listener lists keyed by event type and target node.
pub struct ListenerRegistry<K> {
    lists: BTreeMap<String, WeakRegistry<K, Vec<ListenerEntry<K>>>>,
    pending_cleanup: BTreeSet<(String, K)>,
    active_dispatches: usize,
}

impl<K> Default for ListenerRegistry<K> {
    fn default() -> Self {
        Self {
            lists: BTreeMap::new(),
            pending_cleanup: BTreeSet::new(),
            active_dispatches: 0,
        }
    }
}

impl<K> Debug for ListenerRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("event_types", &self.lists.len())
            .field("pending_cleanup", &self.pending_cleanup.len())
            .field("active_dispatches", &self.active_dispatches)
            .finish()
    }
}

impl<K: Copy + Ord + Debug> ListenerRegistry<K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `listener` for (`target`, `kind`) unless it is already registered there.
    pub fn add(
        &mut self,
        target: K,
        kind: &str,
        listener: Listener<K>,
        options: ListenerOptions,
    ) -> AddOutcome {
        let list = self
            .lists
            .entry(kind.into())
            .or_default()
            .get_or_insert_with(target, Vec::new);
        if list.iter().any(|e| !e.removed && e.listener.same(&listener)) {
            trace!(?target, kind, "listener already registered");
            return AddOutcome::AlreadyPresent;
        }
        let first = list.iter().all(|e| e.removed);
        list.push(ListenerEntry {
            listener,
            options,
            removed: false,
        });
        if first {
            AddOutcome::First
        } else {
            AddOutcome::Added
        }
    }

    /// Remove `listener` from (`target`, `kind`).
    ///
    /// During a dispatch the entry is tombstoned instead of spliced out.
    pub fn remove(&mut self, target: K, kind: &str, listener: &Listener<K>) -> RemoveOutcome {
        let Some(targets) = self.lists.get_mut(kind) else {
            return RemoveOutcome::NotPresent;
        };
        let Some(list) = targets.raw_get_mut(&target) else {
            return RemoveOutcome::NotPresent;
        };
        let Some(index) = list
            .iter()
            .position(|e| !e.removed && e.listener.same(listener))
        else {
            return RemoveOutcome::NotPresent;
        };
        if self.active_dispatches > 0 {
            list[index].removed = true;
            self.pending_cleanup.insert((kind.into(), target));
        } else {
            list.remove(index);
        }
        let last = list.iter().all(|e| e.removed);
        if list.is_empty() {
            targets.delete(&target);
        }
        if targets.stored_len() == 0 {
            self.lists.remove(kind);
        }
        if last {
            RemoveOutcome::RemovedLast
        } else {
            RemoveOutcome::Removed
        }
    }

    /// Entries for (`target`, `kind`), including tombstones, if `target` is alive.
    pub fn get<L: Liveness<K> + ?Sized>(
        &self,
        live: &L,
        target: K,
        kind: &str,
    ) -> Option<&[ListenerEntry<K>]> {
        self.lists
            .get(kind)?
            .get(live, &target)
            .map(Vec::as_slice)
    }

    /// Number of live (non-tombstoned) listeners for (`target`, `kind`).
    pub fn live_count<L: Liveness<K> + ?Sized>(&self, live: &L, target: K, kind: &str) -> usize {
        self.get(live, target, kind)
            .map_or(0, |list| list.iter().filter(|e| !e.removed).count())
    }

    /// True if any target may have a listener for `kind`.
    pub fn is_listening(&self, kind: &str) -> bool {
        self.lists.contains_key(kind)
    }

    /// Drop every listener registered on `target`. Returns how many live listeners went away.
    pub fn forget(&mut self, target: K) -> usize {
        let mut dropped = 0;
        if self.active_dispatches > 0 {
            for (kind, targets) in &mut self.lists {
                if let Some(list) = targets.raw_get_mut(&target) {
                    for entry in list.iter_mut().filter(|e| !e.removed) {
                        entry.removed = true;
                        dropped += 1;
                    }
                    self.pending_cleanup.insert((kind.clone(), target));
                }
            }
        } else {
            self.lists.retain(|_, targets| {
                if let Some(list) = targets.delete(&target) {
                    dropped += list.iter().filter(|e| !e.removed).count();
                }
                targets.stored_len() > 0
            });
        }
        dropped
    }

    /// Purge tombstoned entries. Refused while a dispatch is running.
    pub fn cleanup(&mut self) -> Result<usize, ProtocolViolation> {
        if self.active_dispatches > 0 {
            return Err(ProtocolViolation::CleanupDuringDispatch);
        }
        let mut purged = 0;
        for (kind, target) in core::mem::take(&mut self.pending_cleanup) {
            let Some(targets) = self.lists.get_mut(&kind) else {
                continue;
            };
            if let Some(list) = targets.raw_get_mut(&target) {
                let before = list.len();
                list.retain(|e| !e.removed);
                purged += before - list.len();
                if list.is_empty() {
                    targets.delete(&target);
                }
            }
            if targets.stored_len() == 0 {
                self.lists.remove(&kind);
            }
        }
        if purged > 0 {
            trace!(purged, "listener tombstones purged");
        }
        Ok(purged)
    }

    /// Drop lists whose targets are dead. Refused while a dispatch is running.
    pub fn compact<L: Liveness<K> + ?Sized>(&mut self, live: &L) -> Result<usize, ProtocolViolation> {
        let mut dropped = self.cleanup()?;
        self.lists.retain(|_, targets| {
            dropped += targets.compact(live);
            targets.stored_len() > 0
        });
        Ok(dropped)
    }

    /// True while at least one dispatch is running.
    pub fn is_dispatching(&self) -> bool {
        self.active_dispatches > 0
    }

    pub(crate) fn enter_dispatch(&mut self) {
        self.active_dispatches += 1;
    }

    pub(crate) fn exit_dispatch(&mut self) {
        self.active_dispatches = self.active_dispatches.saturating_sub(1);
    }

    /// Current stored length for (`target`, `kind`), tombstones included.
    pub(crate) fn snapshot_len(&self, target: K, kind: &str) -> usize {
        self.lists
            .get(kind)
            .and_then(|targets| targets.raw_get(&target))
            .map_or(0, Vec::len)
    }

    /// The live entry at `index`, if it has not been tombstoned.
    pub(crate) fn live_entry(
        &self,
        target: K,
        kind: &str,
        index: usize,
    ) -> Option<(Listener<K>, ListenerOptions)> {
        let entry = self.lists.get(kind)?.raw_get(&target)?.get(index)?;
        (!entry.removed).then(|| (entry.listener.clone(), entry.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlwaysAlive;
    use crate::types::test_tree::TestTree;

    fn noop() -> Listener<u32> {
        Listener::new(|_| Ok(()))
    }

    #[test]
    fn add_reports_first_and_dedups_by_identity() {
        let mut reg = ListenerRegistry::new();
        let a = noop();
        let b = noop();
        let opts = ListenerOptions::new();
        assert_eq!(reg.add(1, "click", a.clone(), opts), AddOutcome::First);
        assert_eq!(reg.add(1, "click", b.clone(), opts), AddOutcome::Added);
        assert_eq!(reg.add(1, "click", a.clone(), opts), AddOutcome::AlreadyPresent);
        assert!(reg.add(2, "click", a, opts).is_first());
        assert_eq!(reg.live_count(&AlwaysAlive, 1, "click"), 2);
        assert!(reg.is_listening("click"));
        assert!(!reg.is_listening("input"));
    }

    #[test]
    fn remove_outside_dispatch_splices() {
        let mut reg = ListenerRegistry::new();
        let a = noop();
        let b = noop();
        reg.add(1, "click", a.clone(), ListenerOptions::new());
        reg.add(1, "click", b.clone(), ListenerOptions::new());
        assert!(!reg.remove(1, "click", &a).is_now_empty());
        assert_eq!(reg.remove(1, "click", &a), RemoveOutcome::NotPresent);
        assert!(reg.remove(1, "click", &b).is_now_empty());
        assert!(!reg.is_listening("click"));
        assert_eq!(reg.remove(9, "nope", &b), RemoveOutcome::NotPresent);
    }

    #[test]
    fn remove_during_dispatch_tombstones_until_cleanup() {
        let mut reg = ListenerRegistry::new();
        let a = noop();
        let b = noop();
        reg.add(1, "click", a.clone(), ListenerOptions::new());
        reg.add(1, "click", b.clone(), ListenerOptions::new());
        reg.enter_dispatch();
        assert_eq!(reg.remove(1, "click", &a), RemoveOutcome::Removed);
        assert_eq!(reg.snapshot_len(1, "click"), 2);
        assert!(reg.live_entry(1, "click", 0).is_none());
        assert!(reg.live_entry(1, "click", 1).is_some());
        assert_eq!(reg.cleanup(), Err(ProtocolViolation::CleanupDuringDispatch));

        // A tombstone does not count as present: re-adding appends a fresh entry.
        assert_eq!(reg.add(1, "click", a.clone(), ListenerOptions::new()), AddOutcome::Added);
        assert_eq!(reg.snapshot_len(1, "click"), 3);

        reg.exit_dispatch();
        assert_eq!(reg.cleanup(), Ok(1));
        let order: Vec<bool> = reg
            .get(&AlwaysAlive, 1, "click")
            .unwrap()
            .iter()
            .map(|e| e.listener().same(&b))
            .collect();
        assert_eq!(order, [true, false]);
    }

    #[test]
    fn forget_and_compact_drop_dead_targets() {
        let mut tree = TestTree::new();
        let mut reg = ListenerRegistry::new();
        reg.add(1, "click", noop(), ListenerOptions::new());
        reg.add(1, "input", noop(), ListenerOptions::new());
        reg.add(2, "click", noop(), ListenerOptions::new());
        assert_eq!(reg.forget(1), 2);
        assert!(!reg.is_listening("input"));

        tree.kill(2);
        assert!(reg.get(&tree, 2, "click").is_none());
        assert_eq!(reg.compact(&tree), Ok(1));
        assert!(!reg.is_listening("click"));
    }

    #[test]
    fn forget_during_dispatch_tombstones() {
        let mut reg = ListenerRegistry::new();
        reg.add(1, "click", noop(), ListenerOptions::new());
        reg.enter_dispatch();
        assert_eq!(reg.forget(1), 1);
        assert_eq!(reg.live_count(&AlwaysAlive, 1, "click"), 0);
        reg.exit_dispatch();
        assert_eq!(reg.cleanup(), Ok(1));
        assert!(!reg.is_listening("click"));
    }
}
