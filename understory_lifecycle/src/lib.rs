// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_lifecycle --heading-base-level=0

//! Understory Lifecycle: deterministic construction frames, ready callbacks, and composed event dispatch.
//!
//! ## Overview
//!
//! This crate is the runtime core that sits between a host element tree and
//! the code that builds and drives it. It does not own nodes. The host hands it
//! node keys and a [`TreeLookup`](crate::types::TreeLookup) capability, and the
//! crate decides:
//!
//! - in which order ready and child-ready callbacks run while nested
//!   construction operations (parsing, cloning, upgrading) are in flight,
//! - which listeners an event reaches, in which phase, and with which target.
//!
//! ## Components
//!
//! - [`WeakRegistry`](crate::weak::WeakRegistry): side tables keyed by node
//!   identity that check liveness on every read and never keep a node alive.
//! - [`ListenerRegistry`](crate::listener::ListenerRegistry): listeners per
//!   event type and target, in registration order, safe to mutate mid-dispatch.
//! - [`ComposedPath`](crate::path::ComposedPath) and
//!   [`DispatchEngine`](crate::dispatch::DispatchEngine): capture → target →
//!   bubble over a path that optionally crosses encapsulation boundaries, with
//!   per-node retargeting and soft or hard default prevention.
//! - [`FrameStack`](crate::frame::FrameStack): nested construction frames with
//!   a single ready slot each, and deferred template branches.
//! - [`ReadyScheduler`](crate::ready::ReadyScheduler): fires ready callbacks as
//!   frames displace and pop, and child-ready callbacks in post-order when the
//!   outermost frame closes.
//! - [`Runtime`](crate::runtime::Runtime): one facade over all of the above
//!   with a shared [`ErrorChannel`](crate::error::ErrorChannel) and a
//!   continuation queue.
//!
//! ## Errors
//!
//! Caller mistakes are [`ProtocolViolation`](crate::error::ProtocolViolation)s
//! and are returned. Failures inside listeners and lifecycle callbacks are
//! isolated: they are reported on the error channel and the surrounding
//! operation carries on.
//!
//! ## Determinism
//!
//! Everything is single-threaded and runs to completion. Given the same
//! sequence of calls, callbacks run in the same order.
//!
//! ## Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use understory_lifecycle::event::Event;
//! use understory_lifecycle::frame::FrameKind;
//! use understory_lifecycle::listener::{Listener, ListenerOptions};
//! use understory_lifecycle::ready::LifecycleCallbacks;
//! use understory_lifecycle::runtime::Runtime;
//! use understory_lifecycle::types::{Liveness, ParentLookup, TreeLookup};
//!
//! /// `parents[i]` is the parent of node `i`.
//! struct Chain {
//!     parents: Vec<Option<usize>>,
//! }
//!
//! impl ParentLookup<usize> for Chain {
//!     fn parent_of(&self, node: &usize) -> Option<usize> {
//!         self.parents[*node]
//!     }
//! }
//!
//! impl Liveness<usize> for Chain {
//!     fn is_alive(&self, node: &usize) -> bool {
//!         *node < self.parents.len()
//!     }
//! }
//!
//! impl TreeLookup<usize> for Chain {
//!     fn children_of(&self, node: &usize) -> Vec<usize> {
//!         (0..self.parents.len())
//!             .filter(|&n| self.parents[n] == Some(*node))
//!             .collect()
//!     }
//!
//!     fn host_of(&self, _root: &usize) -> Option<usize> {
//!         None
//!     }
//! }
//!
//! // 0 > 1 > 2
//! let tree = Rc::new(Chain { parents: vec![None, Some(0), Some(1)] });
//! let runtime: Runtime<usize> = Runtime::new(tree);
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! for node in [1, 2] {
//!     let log = log.clone();
//!     runtime.define_lifecycle(
//!         node,
//!         LifecycleCallbacks::new().on_ready(move |_, n: usize| {
//!             log.borrow_mut().push(format!("ready {n}"));
//!             Ok(())
//!         }),
//!     );
//! }
//!
//! // Both nodes are built inside one frame: 1 fires when 2 displaces it,
//! // and 2 fires when the frame pops.
//! let frame = runtime.on_construct_start(FrameKind::Parse).unwrap();
//! runtime.on_node_ready_candidate(1);
//! runtime.on_node_ready_candidate(2);
//! runtime.on_construct_end(frame).unwrap();
//!
//! let click_log = log.clone();
//! let on_click: Listener<usize> = Listener::new(move |cx| {
//!     let line = format!("click at {} for {}", cx.current_target(), cx.target());
//!     click_log.borrow_mut().push(line);
//!     cx.prevent_default()?;
//!     Ok(())
//! });
//! runtime.register_listener(0, "click", on_click, ListenerOptions::new());
//!
//! let mut click = Event::trusted("click").bubbling();
//! assert_eq!(runtime.dispatch(&mut click, 2), Ok(true));
//! assert_eq!(*log.borrow(), ["ready 1", "ready 2", "click at 0 for 2"]);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod adapters;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod frame;
pub mod listener;
pub mod path;
pub mod ready;
pub mod runtime;
pub mod types;
pub mod weak;
