// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_element_tree::{ElementData, ElementTree, NodeId};
use understory_lifecycle::frame::FrameKind;
use understory_lifecycle::ready::LifecycleCallbacks;
use understory_lifecycle::runtime::Runtime;

/// A balanced tree of `fanout^levels` leaves under one root, with each node's level.
fn gen_tree(fanout: usize, levels: usize) -> (ElementTree, Vec<(NodeId, usize)>) {
    let mut tree = ElementTree::new();
    let root = tree.insert(None, ElementData::custom("x-root"));
    let mut out = vec![(root, 0)];
    let mut work = vec![(root, 0)];
    while let Some((parent, level)) = work.pop() {
        if level == levels {
            continue;
        }
        for _ in 0..fanout {
            let child = tree.insert(Some(parent), ElementData::custom("x-item"));
            out.push((child, level + 1));
            work.push((child, level + 1));
        }
    }
    (tree, out)
}

fn runtime_with_counters(tree: ElementTree, nodes: &[(NodeId, usize)]) -> (Runtime<NodeId>, Rc<Cell<u64>>) {
    let runtime = Runtime::new(Rc::new(RefCell::new(tree)));
    let fired = Rc::new(Cell::new(0_u64));
    for &(node, _) in nodes {
        let ready = fired.clone();
        let child = fired.clone();
        runtime.define_lifecycle(
            node,
            LifecycleCallbacks::new()
                .on_ready(move |_, _| {
                    ready.set(ready.get() + 1);
                    Ok(())
                })
                .on_child_ready(move |_, _| {
                    child.set(child.get() + 1);
                    Ok(())
                }),
        );
    }
    (runtime, fired)
}

/// Replays a parse: one frame per node, nested by tree level.
fn replay_parse(runtime: &Runtime<NodeId>, nodes: &[(NodeId, usize)]) {
    let mut open: Vec<_> = Vec::new();
    for &(node, level) in nodes {
        while open.len() > level {
            let frame = open.pop().unwrap();
            runtime.on_construct_end(frame).unwrap();
        }
        open.push(runtime.on_construct_start(FrameKind::Parse).unwrap());
        runtime.on_node_ready_candidate(node);
    }
    while let Some(frame) = open.pop() {
        runtime.on_construct_end(frame).unwrap();
    }
}

fn bench_nested_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_parse");
    for &(fanout, levels) in &[(4usize, 3usize), (8, 3), (4, 5)] {
        let (tree, nodes) = gen_tree(fanout, levels);
        group.throughput(Throughput::Elements(nodes.len() as u64));
        group.bench_function(format!("fanout{}_levels{}", fanout, levels), |b| {
            b.iter_batched(
                || runtime_with_counters(tree.clone(), &nodes),
                |(runtime, fired)| {
                    replay_parse(&runtime, &nodes);
                    black_box(fired.get());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_flat_displacement(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_displacement");
    for &n in &[64usize, 512, 4096] {
        let (tree, nodes) = gen_tree(n, 1);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("single_frame_n{}", n), |b| {
            b.iter_batched(
                || runtime_with_counters(tree.clone(), &nodes),
                |(runtime, fired)| {
                    let frame = runtime.on_construct_start(FrameKind::Markup).unwrap();
                    for &(node, _) in &nodes {
                        runtime.on_node_ready_candidate(node);
                    }
                    runtime.on_construct_end(frame).unwrap();
                    black_box(fired.get());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_nested_parse, bench_flat_displacement);
criterion_main!(benches);
