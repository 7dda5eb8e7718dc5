// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cell::RefCell;
use std::rc::Rc;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_element_tree::{ElementData, ElementTree, NodeId};
use understory_lifecycle::event::Event;
use understory_lifecycle::listener::{Listener, ListenerOptions, Preventable};
use understory_lifecycle::path::ComposedPath;
use understory_lifecycle::runtime::Runtime;

/// A chain of `depth` elements, split into nested shadow trees every `every` levels.
fn gen_shadowed_chain(depth: usize, every: usize) -> (ElementTree, Vec<NodeId>) {
    let mut tree = ElementTree::new();
    let mut nodes = Vec::with_capacity(depth);
    let mut parent = None;
    for level in 0..depth {
        let node = tree.insert(parent, ElementData::custom("x-level"));
        nodes.push(node);
        parent = if every > 0 && level % every == every - 1 {
            tree.attach_shadow(node)
        } else {
            Some(node)
        };
    }
    (tree, nodes)
}

fn bench_composed_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("composed_path");
    for &depth in &[16usize, 64, 256] {
        let (tree, nodes) = gen_shadowed_chain(depth, 8);
        let leaf = *nodes.last().unwrap();
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_function(format!("composed_d{}", depth), |b| {
            b.iter(|| black_box(ComposedPath::compute(&tree, leaf, true).len()));
        });
        group.bench_function(format!("closed_d{}", depth), |b| {
            b.iter(|| black_box(ComposedPath::compute(&tree, leaf, false).len()));
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    for &depth in &[16usize, 64, 256] {
        let (tree, nodes) = gen_shadowed_chain(depth, 8);
        let leaf = *nodes.last().unwrap();
        let runtime = Runtime::new(Rc::new(RefCell::new(tree)));
        for &node in &nodes {
            let capture = Listener::new(|cx| {
                black_box(cx.target());
                Ok(())
            });
            let bubble = Listener::new(|cx| {
                cx.prevent_default()?;
                Ok(())
            });
            runtime.register_listener(node, "click", capture, ListenerOptions::new().with_capture());
            runtime.register_listener(
                node,
                "click",
                bubble,
                ListenerOptions::new().with_preventable(Preventable::Soft),
            );
        }
        group.throughput(Throughput::Elements((depth * 2) as u64));
        group.bench_function(format!("composed_bubbling_d{}", depth), |b| {
            b.iter(|| {
                let mut event = Event::trusted("click").bubbling().composed();
                black_box(runtime.dispatch(&mut event, leaf).unwrap());
            });
        });
        group.bench_function(format!("unlistened_d{}", depth), |b| {
            b.iter(|| {
                let mut event = Event::trusted("input").bubbling().composed();
                black_box(runtime.dispatch(&mut event, leaf).unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_composed_path, bench_dispatch);
criterion_main!(benches);
