// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors: protocol violations, callback failures, and the error channel.
//!
//! Two kinds of failure are kept apart:
//!
//! - [`ProtocolViolation`] is a caller mistake (popping the wrong frame,
//!   dispatching an event twice, trying to stop propagation). It is returned
//!   to the caller as an `Err` and never swallowed.
//! - [`CallbackError`] is raised by user code (listeners, ready callbacks,
//!   continuations). It is isolated: the failing callback is reported on the
//!   [`ErrorChannel`] and the operation that invoked it carries on.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt::{self, Debug};

use thiserror::Error;
use tracing::warn;

use crate::event::Phase;
use crate::frame::FrameId;

/// A caller broke the frame, dispatch, or listener protocol.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A frame was popped while another frame was on top of the stack.
    #[error("frame {found:?} popped while {current:?} is current")]
    PopNotCurrent {
        /// The frame the caller asked to pop.
        found: FrameId,
        /// The frame actually on top, if any.
        current: Option<FrameId>,
    },
    /// The frame id is not open and not a detached branch.
    #[error("frame {0:?} is not known to this stack")]
    UnknownFrame(FrameId),
    /// Resume was requested for a frame that is not a branch.
    #[error("frame {0:?} is not a branch")]
    NotABranch(FrameId),
    /// Resume was requested for a branch that has not been popped yet.
    #[error("branch {0:?} is still open")]
    BranchStillOpen(FrameId),
    /// Pushing another frame would exceed the configured nesting limit.
    #[error("frame nesting exceeded {limit}")]
    FrameDepthExceeded {
        /// The configured limit.
        limit: usize,
    },
    /// A nested dispatch would exceed the configured nesting limit.
    #[error("dispatch nesting exceeded {limit}")]
    DispatchDepthExceeded {
        /// The configured limit.
        limit: usize,
    },
    /// The event has already gone through dispatch.
    #[error("event `{kind}` has already been dispatched")]
    EventAlreadyDispatched {
        /// Event type.
        kind: String,
    },
    /// The dispatch target is no longer owned by the tree.
    #[error("dispatch target is not a live node")]
    DeadTarget,
    /// A listener tried to stop propagation.
    #[error("propagation cannot be stopped once dispatch has started")]
    PropagationStopRejected,
    /// A hard-preventing listener called prevent on an already suppressed event.
    #[error("default action of `{kind}` is already suppressed")]
    AlreadySuppressed {
        /// Event type.
        kind: String,
    },
    /// Listener storage was compacted or cleaned while a dispatch was running.
    #[error("listener cleanup requested during dispatch")]
    CleanupDuringDispatch,
    /// Continuations were run inside an open frame or dispatch.
    #[error("continuations cannot run inside an open frame or dispatch")]
    ContinuationReentered,
}

/// An error raised by user callback code.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// A plain message.
    #[error("{0}")]
    Message(String),
    /// The callback hit a protocol violation and bailed out with `?`.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    /// Any other error type.
    #[error(transparent)]
    Other(Box<dyn core::error::Error + 'static>),
}

impl CallbackError {
    /// Build a [`CallbackError::Message`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn other(error: impl core::error::Error + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

/// Which kind of callback failed, and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOrigin<K> {
    /// An event listener.
    Listener {
        /// Event type being dispatched.
        event: String,
        /// The node whose listener failed.
        node: K,
        /// Phase at the time of failure.
        phase: Phase,
    },
    /// A ready callback.
    Ready {
        /// The node that became ready.
        node: K,
    },
    /// A child-ready callback.
    ChildReady {
        /// The node whose subtree completed.
        node: K,
    },
    /// A queued continuation.
    Continuation,
}

/// A callback failure as delivered to error sinks.
#[derive(Debug)]
pub struct CallbackFailure<K> {
    /// Where it happened.
    pub origin: CallbackOrigin<K>,
    /// What went wrong.
    pub error: CallbackError,
}

/// Handle returned by [`ErrorChannel::subscribe`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SinkId(u64);

type Sink<K> = Rc<dyn Fn(&CallbackFailure<K>)>;

/// Reporting channel for isolated callback failures.
///
/// Every report is logged at `warn` and then handed to each subscribed sink.
/// Sinks may subscribe or unsubscribe from inside a report; the change takes
/// effect on the next report.
pub struct ErrorChannel<K> {
    sinks: RefCell<Vec<(SinkId, Sink<K>)>>,
    next_sink: Cell<u64>,
    reported: Cell<u64>,
}

impl<K> Default for ErrorChannel<K> {
    fn default() -> Self {
        Self {
            sinks: RefCell::new(Vec::new()),
            next_sink: Cell::new(0),
            reported: Cell::new(0),
        }
    }
}

impl<K> Debug for ErrorChannel<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("sinks", &self.sinks.borrow().len())
            .field("reported", &self.reported.get())
            .finish()
    }
}

impl<K: Debug> ErrorChannel<K> {
    /// Create a channel with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink; it receives every failure reported from now on.
    pub fn subscribe(&self, sink: impl Fn(&CallbackFailure<K>) + 'static) -> SinkId {
        let id = SinkId(self.next_sink.get());
        self.next_sink.set(id.0 + 1);
        self.sinks.borrow_mut().push((id, Rc::new(sink)));
        id
    }

    /// Remove a sink. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks.borrow_mut();
        let before = sinks.len();
        sinks.retain(|(sink, _)| *sink != id);
        sinks.len() != before
    }

    /// Report a failure to every sink.
    pub fn report(&self, failure: CallbackFailure<K>) {
        warn!(origin = ?failure.origin, error = %failure.error, "callback failed");
        self.reported.set(self.reported.get() + 1);
        let sinks: Vec<Sink<K>> = self
            .sinks
            .borrow()
            .iter()
            .map(|(_, sink)| Rc::clone(sink))
            .collect();
        for sink in sinks {
            sink(&failure);
        }
    }

    /// Total number of failures reported so far.
    pub fn reported(&self) -> u64 {
        self.reported.get()
    }
}
