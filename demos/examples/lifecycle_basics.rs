// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lifecycle basics.
//!
//! Builds a small element tree inside nested construction frames and prints
//! the order in which ready and child-ready callbacks run.
//!
//! Run:
//! - `RUST_LOG=understory_lifecycle=trace cargo run -p understory_demos --example lifecycle_basics`

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

    let names = Rc::new(RefCell::new(Vec::<(NodeId, String)>::new()));
    let name_of = {
        let names = names.clone();
        move |node: NodeId| {
            names
                .borrow()
                .iter()
                .find(|(n, _)| *n == node)
                .map_or_else(|| format!("{node:?}"), |(_, name)| name.clone())
        }
    };

    let define = |node: NodeId, name: &str| {
        names.borrow_mut().push((node, name.to_string()));
        let on_ready = name_of.clone();
        let on_child = name_of.clone();
        runtime.define_lifecycle(
            node,
            LifecycleCallbacks::new()
                .on_ready(move |s, n| {
                    println!("  ready        {:<10} (depth {})", on_ready(n), s.depth());
                    Ok(())
                })
                .on_child_ready(move |_, n| {
                    println!("  child-ready  {}", on_child(n));
                    Ok(())
                }),
        );
    };

    // <x-app>
    //   <x-list>
    //     <x-item/> <x-item/>
    //   </x-list>
    //   <x-footer/>
    // </x-app>
    println!("== Parse ==");
    let parse = runtime.on_construct_start(FrameKind::Parse).unwrap();

    let app = tree.borrow_mut().insert(None, ElementData::custom("x-app"));
    define(app, "app");
    runtime.on_node_ready_candidate(app);

    let list_frame = runtime.on_construct_start(FrameKind::Construct).unwrap();
    let list = tree.borrow_mut().insert(Some(app), ElementData::custom("x-list"));
    define(list, "list");
    runtime.on_node_ready_candidate(list);
    for i in 0..2 {
        let item = tree.borrow_mut().insert(Some(list), ElementData::custom("x-item"));
        define(item, &format!("item{i}"));
        // Each item displaces the previous occupant of the list frame's ready slot.
        runtime.on_node_ready_candidate(item);
    }
    runtime.on_construct_end(list_frame).unwrap();

    let footer = tree.borrow_mut().insert(Some(app), ElementData::custom("x-footer"));
    define(footer, "footer");
    runtime.on_node_ready_candidate(footer);

    println!("-- outermost frame pops --");
    runtime.on_construct_end(parse).unwrap();
    println!(
        "pending readies: {}, open frames: {}",
        runtime.scheduler().pending_ready(),
        runtime.scheduler().depth()
    );

    println!("\n== Late upgrade (no frame open) ==");
    let late = tree.borrow_mut().insert(Some(app), ElementData::custom("x-late"));
    define(late, "late");
    runtime.on_node_ready_candidate(late);

    println!("\n== Removal ==");
    println!("forgot {} nodes", runtime.forget(list));
    tree.borrow_mut().remove(list);
    println!("compacted {} entries", runtime.compact().unwrap());
}
