// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composed dispatch.
//!
//! Dispatches a click from inside a shadow root and shows which listeners
//! see it, in which phase, and with which (retargeted) target. Also shows
//! soft versus hard default prevention and a rejected propagation stop.
//!
//! Run:
//! - `cargo run -p understory_demos --example composed_dispatch`

use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use understory_element_tree::{ElementData, ElementTree, NodeId};
use understory_lifecycle::event::{Event, EventFlags};
use understory_lifecycle::listener::{Listener, ListenerOptions, Preventable};
use understory_lifecycle::runtime::Runtime;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // <body>
    //   <x-card>            (host)
    //     #shadow-root
    //       <button/>
    let mut t = ElementTree::new();
    let body = t.insert(None, ElementData::element("body"));
    let card = t.insert(Some(body), ElementData::custom("x-card"));
    let shadow = t.attach_shadow(card).unwrap();
    let button = t.insert(Some(shadow), ElementData::element("button"));
    let tree = Rc::new(RefCell::new(t));
    let runtime: Runtime<NodeId> = Runtime::new(tree.clone());

    let names = [(body, "body"), (card, "x-card"), (shadow, "#shadow"), (button, "button")];
    let name = move |node: NodeId| {
        names
            .iter()
            .find(|(n, _)| *n == node)
            .map_or("?", |(_, name)| *name)
    };

    for (node, _) in names {
        for options in [ListenerOptions::new().with_capture(), ListenerOptions::new()] {
            runtime.register_listener(
                node,
                "click",
                Listener::new(move |cx| {
                    println!(
                        "  {:<8} at {:<8} target={}",
                        format!("{:?}", cx.phase()),
                        name(cx.current_target()),
                        name(cx.target())
                    );
                    Ok(())
                }),
                options,
            );
        }
    }

    println!("== Composed click ==");
    let mut click = Event::trusted("click").bubbling().composed();
    runtime.dispatch(&mut click, button).unwrap();

    println!("\n== Non-composed click ==");
    let mut click = Event::trusted("click").bubbling();
    runtime.dispatch(&mut click, button).unwrap();

    println!("\n== Prevention ==");
    runtime.register_listener(
        card,
        "submit",
        Listener::new(|cx| {
            cx.prevent_default()?;
            Ok(())
        }),
        ListenerOptions::new().with_preventable(Preventable::Soft),
    );
    let mut submit = Event::trusted("submit").bubbling().composed();
    let prevented = runtime.dispatch(&mut submit, button).unwrap();
    println!(
        "  soft: prevented={prevented} suppressed={}",
        submit.default_suppressed()
    );

    runtime.register_listener(
        body,
        "submit",
        Listener::new(|cx| {
            cx.prevent_default()?;
            Ok(())
        }),
        ListenerOptions::new().with_trusted_only(),
    );
    let mut submit = Event::trusted("submit").bubbling().composed();
    runtime.dispatch(&mut submit, button).unwrap();
    println!("  trusted + hard: suppressed={}", submit.default_suppressed());
    let mut synthetic = Event::new("submit", EventFlags::BUBBLES | EventFlags::COMPOSED);
    runtime.dispatch(&mut synthetic, button).unwrap();
    println!("  synthetic: suppressed={}", synthetic.default_suppressed());

    println!("\n== Stopping propagation ==");
    runtime.register_listener(
        button,
        "keydown",
        Listener::new(|cx| {
            cx.stop_propagation()?;
            Ok(())
        }),
        ListenerOptions::new(),
    );
    runtime.errors().subscribe(move |failure| {
        println!("  reported: {} ({:?})", failure.error, failure.origin);
    });
    let mut key = Event::trusted("keydown").bubbling();
    println!("  dispatch -> {:?}", runtime.dispatch(&mut key, button));
}
