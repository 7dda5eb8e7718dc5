// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Template branches.
//!
//! Nodes built inside a branch frame stay dormant until the branch is
//! resumed: their ready and child-ready callbacks are held back, and then
//! run in the usual order when the template content goes live.
//!
//! Run:
//! - `cargo run -p understory_demos --example template_branch`

use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use understory_element_tree::{ElementData, ElementTree, NodeId};
use understory_lifecycle::frame::FrameKind;
use understory_lifecycle::ready::LifecycleCallbacks;
use understory_lifecycle::runtime::Runtime;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let tree = Rc::new(RefCell::new(ElementTree::new()));
    let runtime: Runtime<NodeId> = Runtime::new(tree.clone());

    let insert = |parent: Option<NodeId>, tag: &'static str| {
        let node = tree.borrow_mut().insert(parent, ElementData::custom(tag));
        runtime.define_lifecycle(
            node,
            LifecycleCallbacks::new()
                .on_ready(move |_, _| {
                    println!("  ready        {tag}");
                    Ok(())
                })
                .on_child_ready(move |_, _| {
                    println!("  child-ready  {tag}");
                    Ok(())
                }),
        );
        runtime.on_node_ready_candidate(node);
        node
    };

    println!("== Parse with a template ==");
    let parse = runtime.on_construct_start(FrameKind::Parse).unwrap();
    let page = insert(None, "x-page");
    let branch = runtime.on_construct_start(FrameKind::Branch).unwrap();
    let row = insert(Some(page), "x-row");
    let cell = runtime.on_construct_start(FrameKind::Construct).unwrap();
    insert(Some(row), "x-cell");
    runtime.on_construct_end(cell).unwrap();
    runtime.on_construct_end(branch).unwrap();
    runtime.on_construct_end(parse).unwrap();
    println!(
        "detached branches: {}",
        runtime.scheduler().detached_branches()
    );

    println!("\n== Template content goes live ==");
    runtime.scheduler().resume_branch(branch).unwrap();
    println!(
        "detached branches: {}",
        runtime.scheduler().detached_branches()
    );
}
