// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Events: flags, phases, and default-action prevention state.

use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

bitflags! {
    /// Static properties of an event, fixed at construction.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EventFlags: u8 {
        /// Run a bubble phase after the target phase.
        const BUBBLES = 1 << 0;
        /// Cross encapsulation boundaries to hosts when building the path.
        const COMPOSED = 1 << 1;
        /// Raised by the host platform rather than by script.
        const TRUSTED = 1 << 2;
    }
}

/// Dispatch phase of an event.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Phase {
    /// Not yet dispatched.
    #[default]
    None,
    /// Walking from the outermost ancestor toward the target.
    Capture,
    /// At the target itself.
    Target,
    /// Walking from the target's parent outward.
    Bubble,
    /// Dispatch has completed.
    Finished,
}

/// How strongly the default action has been prevented.
///
/// Ordered: prevention only ever increases during a dispatch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Prevention {
    /// Nobody asked to prevent the default action.
    #[default]
    None,
    /// Advisory prevention; the host may still run the default action.
    Soft,
    /// The default action is suppressed.
    Hard,
}

/// A dispatchable event.
///
/// An event is dispatched at most once. The composed path and target are
/// recorded when dispatch starts and remain readable afterwards.
#[derive(Clone, Debug)]
pub struct Event<K> {
    kind: String,
    flags: EventFlags,
    phase: Phase,
    prevention: Prevention,
    path: Vec<K>,
    target: Option<K>,
    current_target: Option<K>,
}

impl<K: Copy> Event<K> {
    /// Create an event of type `kind`.
    pub fn new(kind: impl Into<String>, flags: EventFlags) -> Self {
        Self {
            kind: kind.into(),
            flags,
            phase: Phase::None,
            prevention: Prevention::None,
            path: Vec::new(),
            target: None,
            current_target: None,
        }
    }

    /// Create a trusted event of type `kind` with no other flags.
    pub fn trusted(kind: impl Into<String>) -> Self {
        Self::new(kind, EventFlags::TRUSTED)
    }

    /// Add [`EventFlags::BUBBLES`].
    #[must_use]
    pub fn bubbling(mut self) -> Self {
        self.flags |= EventFlags::BUBBLES;
        self
    }

    /// Add [`EventFlags::COMPOSED`].
    #[must_use]
    pub fn composed(mut self) -> Self {
        self.flags |= EventFlags::COMPOSED;
        self
    }

    /// Event type.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Event flags.
    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    /// True if a bubble phase runs.
    pub fn bubbles(&self) -> bool {
        self.flags.contains(EventFlags::BUBBLES)
    }

    /// True if the path crosses encapsulation boundaries.
    pub fn is_composed(&self) -> bool {
        self.flags.contains(EventFlags::COMPOSED)
    }

    /// True if raised by the host platform.
    pub fn is_trusted(&self) -> bool {
        self.flags.contains(EventFlags::TRUSTED)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current prevention level.
    pub fn prevention(&self) -> Prevention {
        self.prevention
    }

    /// True once any listener prevented the default action, softly or hard.
    pub fn default_prevented(&self) -> bool {
        self.prevention != Prevention::None
    }

    /// True once a hard-preventing listener suppressed the default action.
    pub fn default_suppressed(&self) -> bool {
        self.prevention == Prevention::Hard
    }

    /// Nodes visited by dispatch, target first. Empty before dispatch.
    pub fn composed_path(&self) -> &[K] {
        &self.path
    }

    /// The original target, once dispatch has started.
    pub fn target(&self) -> Option<K> {
        self.target
    }

    /// The node whose listeners are running, if any.
    pub fn current_target(&self) -> Option<K> {
        self.current_target
    }

    pub(crate) fn begin(&mut self, target: K, path: Vec<K>) {
        self.target = Some(target);
        self.path = path;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn set_current_target(&mut self, node: Option<K>) {
        self.current_target = node;
    }

    pub(crate) fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.current_target = None;
    }

    /// Raise prevention to `level`; never lowers it.
    pub(crate) fn escalate(&mut self, level: Prevention) {
        self.prevention = self.prevention.max(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_flags() {
        let e = Event::<u32>::trusted("click").bubbling().composed();
        assert!(e.is_trusted() && e.bubbles() && e.is_composed());
        let e = Event::<u32>::new("load", EventFlags::empty());
        assert!(!e.is_trusted() && !e.bubbles() && !e.is_composed());
        assert_eq!(e.phase(), Phase::None);
    }

    #[test]
    fn prevention_is_monotonic() {
        let mut e = Event::<u32>::new("submit", EventFlags::empty());
        assert!(!e.default_prevented());
        e.escalate(Prevention::Soft);
        assert!(e.default_prevented() && !e.default_suppressed());
        e.escalate(Prevention::Hard);
        e.escalate(Prevention::Soft);
        e.escalate(Prevention::None);
        assert_eq!(e.prevention(), Prevention::Hard);
        assert!(e.default_suppressed());
    }
}
