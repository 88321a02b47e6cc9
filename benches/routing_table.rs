//! Micro-benchmarks for RoutingTable operations: insert and closest nodes
//! at varying table sizes. Reports nanoseconds-per-operation.
//!
//! Run: `cargo bench --bench routing_table`

use std::time::Instant;

use kadnet::{
    routing_table::{RoutingTable, SlackBucket, TrackedNode},
    KeyFactory, Node,
};

const BUCKET_SIZE: usize = 20;

fn main() {
    println!("routing_table\n");

    bench_insert();
    bench_closest();
}

fn table(factory: &KeyFactory) -> RoutingTable {
    let local = Node::new(factory.random(), ([127, 0, 0, 1], 6881).into());

    RoutingTable::new(local, BUCKET_SIZE, 10, |_| {
        Box::new(SlackBucket::new(BUCKET_SIZE))
    })
}

fn nodes(factory: &KeyFactory, count: usize) -> Vec<Node> {
    (0..count)
        .map(|i| Node::new(factory.random(), ([127, 0, 0, 1], i as u16).into()))
        .collect()
}

fn bench_insert() {
    println!("insert");

    let factory = KeyFactory::default();

    for prefilled in [0, 100, 400] {
        let table = table(&factory);
        for node in nodes(&factory, prefilled) {
            table.insert(TrackedNode::contacted(node));
        }

        // Pre-generate nodes outside the timed section
        let fresh = nodes(&factory, 1000);

        let start = Instant::now();
        for node in fresh {
            table.insert(TrackedNode::contacted(node));
        }
        let per_op = start.elapsed().as_nanos() / 1000;

        println!(
            "{prefilled:>4} prefilled: {per_op}ns/op (final size: {})",
            table.size()
        );
    }
}

fn bench_closest() {
    println!("\nclosest_nodes_by_key");

    let factory = KeyFactory::default();

    for size in [20, 200, 2000] {
        let table = table(&factory);
        for node in nodes(&factory, size) {
            table.insert(TrackedNode::contacted(node));
        }

        let targets: Vec<_> = (0..1000).map(|_| factory.random()).collect();

        let start = Instant::now();
        for target in &targets {
            let _ = table.closest_nodes_by_key(target, BUCKET_SIZE);
        }
        let per_op = start.elapsed().as_nanos() / targets.len() as u128;

        println!("{size:>5} inserted: {per_op}ns/op (table size: {})", table.size());
    }
}
