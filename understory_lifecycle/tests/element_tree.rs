// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The runtime driving an [`ElementTree`] through the adapter.

use std::cell::RefCell;
use std::rc::Rc;

use understory_element_tree::{ElementData, ElementTree, NodeId};
use understory_lifecycle::event::{Event, Phase};
use understory_lifecycle::frame::FrameKind;
use understory_lifecycle::listener::{Listener, ListenerOptions};
use understory_lifecycle::ready::LifecycleCallbacks;
use understory_lifecycle::runtime::Runtime;

type Log = Rc<RefCell<Vec<String>>>;

fn lifecycle(log: &Log, name: &'static str) -> LifecycleCallbacks<NodeId> {
    let ready = log.clone();
    let child = log.clone();
    LifecycleCallbacks::new()
        .on_ready(move |_, _| {
            ready.borrow_mut().push(format!("ready {name}"));
            Ok(())
        })
        .on_child_ready(move |_, _| {
            child.borrow_mut().push(format!("child-ready {name}"));
            Ok(())
        })
}

#[test]
fn shadow_content_built_in_a_branch_waits_for_resume() {
    let tree = Rc::new(RefCell::new(ElementTree::new()));
    let runtime: Runtime<NodeId> = Runtime::new(tree.clone());
    let log = Log::default();

    let parse = runtime.on_construct_start(FrameKind::Parse).unwrap();
    let host = tree.borrow_mut().insert(None, ElementData::custom("x-card"));
    runtime.define_lifecycle(host, lifecycle(&log, "card"));
    runtime.on_node_ready_candidate(host);

    let branch = runtime.on_construct_start(FrameKind::Branch).unwrap();
    let shadow = tree.borrow_mut().attach_shadow(host).unwrap();
    let button = tree
        .borrow_mut()
        .insert(Some(shadow), ElementData::custom("x-button"));
    runtime.define_lifecycle(button, lifecycle(&log, "button"));
    runtime.on_node_ready_candidate(button);
    runtime.on_construct_end(branch).unwrap();
    runtime.on_construct_end(parse).unwrap();

    assert_eq!(*log.borrow(), ["ready card", "child-ready card"]);
    assert_eq!(runtime.scheduler().detached_branches(), 1);

    runtime.scheduler().resume_branch(branch).unwrap();
    assert_eq!(
        *log.borrow(),
        [
            "ready card",
            "child-ready card",
            "ready button",
            "child-ready button"
        ]
    );
    assert_eq!(runtime.scheduler().detached_branches(), 0);
}

#[test]
fn forgetting_a_host_clears_its_shadow_tree() {
    let mut t = ElementTree::new();
    let body = t.insert(None, ElementData::element("body"));
    let host = t.insert(Some(body), ElementData::custom("x-card"));
    let shadow = t.attach_shadow(host).unwrap();
    let button = t.insert(Some(shadow), ElementData::element("button"));
    let tree = Rc::new(RefCell::new(t));
    let runtime: Runtime<NodeId> = Runtime::new(tree.clone());

    let hits = Rc::new(RefCell::new(Vec::new()));
    for node in [body, host, shadow, button] {
        let hits = hits.clone();
        runtime.register_listener(
            node,
            "click",
            Listener::new(move |cx| {
                hits.borrow_mut().push((cx.current_target(), cx.phase()));
                Ok(())
            }),
            ListenerOptions::new(),
        );
    }

    assert_eq!(runtime.forget(host), 3);
    runtime
        .dispatch(&mut Event::trusted("click").bubbling().composed(), button)
        .unwrap();
    assert_eq!(*hits.borrow(), [(body, Phase::Bubble)]);

    tree.borrow_mut().remove(host);
    assert_eq!(runtime.compact(), Ok(0));
    assert_eq!(runtime.engine().listener_count(body, "click"), 1);
}
