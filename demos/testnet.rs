//! Run lookups on an in-memory network and print how many nodes they queried.

use std::{sync::Arc, time::Instant};

use clap::Parser;
use kadnet::{Dht, KeyFactory, LookupStrategy, Statistics, Testnet};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes
    #[arg(short, long, default_value_t = 32)]
    nodes: usize,
    /// Number of lookups for random keys
    #[arg(short, long, default_value_t = 100)]
    lookups: usize,
    /// Key length in bytes
    #[arg(long, default_value_t = 4)]
    key_length: usize,
    /// Bucket size (K)
    #[arg(short, long, default_value_t = 8)]
    k: usize,
    /// Answer repeated lookups from caches
    #[arg(long)]
    cache: bool,
    /// Log debug messages
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let statistics = Arc::new(Statistics::new());
    let strategy = if cli.cache {
        LookupStrategy::LocalCache
    } else {
        LookupStrategy::Kademlia
    };

    let start = Instant::now();

    let testnet = Testnet::with_builder(cli.nodes, |_| {
        let mut builder = Dht::builder();
        builder
            .key_length(cli.key_length)
            .bucket_size(cli.k)
            .lookup_strategy(strategy);
        builder
    })
    .expect("Failed to create testnet");

    println!(
        "Created {} nodes in {:?}",
        testnet.nodes.len(),
        start.elapsed()
    );

    let mut builder = Dht::builder();
    builder
        .key_length(cli.key_length)
        .bucket_size(cli.k)
        .lookup_strategy(strategy)
        .observer(statistics.clone());

    let client = testnet
        .network()
        .spawn(&builder)
        .expect("Failed to spawn client");
    client.join(&testnet.bootstrap).expect("Failed to join");

    let factory = KeyFactory::new(cli.key_length);
    let start = Instant::now();

    for _ in 0..cli.lookups {
        let key = factory.random();

        if let Err(error) = client.find_node(&key) {
            println!("Lookup failed: {error}");
        }
    }

    println!(
        "{} lookups in {:?}, {:.2} nodes queried on average, {} local cache hits, {} remote cache hits",
        statistics.lookups(),
        start.elapsed(),
        statistics.average_queried(),
        statistics.local_cache_hits(),
        statistics.remote_cache_hits(),
    );
}
