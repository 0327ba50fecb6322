//! Boots a local ring, measures lookups, then measures healing after nodes leave.

use chordring_lib::identifier::{hash_key, RingId};
use chordring_node::{ChordService, Config, LookupMetrics, NodeError};
use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Parser)]
#[command(name = "chordring-bench", version)]
struct Args {
    /// Nodes in the ring
    #[arg(long, default_value_t = 8)]
    nodes: usize,

    /// Lookups to perform once the ring is stable
    #[arg(long, default_value_t = 200)]
    lookups: usize,

    /// Nodes to remove one at a time after the lookups
    #[arg(long, default_value_t = 2)]
    leaves: usize,

    #[arg(long, default_value_t = 100)]
    stabilize_interval_ms: u64,

    /// How long to wait for the ring to settle
    #[arg(long, default_value_t = 60)]
    convergence_timeout_secs: u64,

    #[arg(long)]
    seed: Option<u64>,
}

/// Owner of `id` on a ring made of `ids`, which must be sorted.
fn expected_owner(ids: &[(RingId, SocketAddr)], id: RingId) -> Option<SocketAddr> {
    ids.iter()
        .find(|(node_id, _)| *node_id >= id)
        .or_else(|| ids.first())
        .map(|(_, address)| *address)
}

fn expected_successor(ids: &[(RingId, SocketAddr)], id: RingId) -> Option<SocketAddr> {
    ids.iter()
        .find(|(node_id, _)| *node_id > id)
        .or_else(|| ids.first())
        .map(|(_, address)| *address)
}

fn sorted_ids(services: &[ChordService]) -> Vec<(RingId, SocketAddr)> {
    let mut ids: Vec<_> = services
        .iter()
        .map(|s| (s.node().id(), s.address()))
        .collect();
    ids.sort();
    ids
}

fn ring_is_consistent(services: &[ChordService]) -> bool {
    let ids = sorted_ids(services);
    services.iter().all(|s| {
        s.node().successor().map(|succ| succ.address) == expected_successor(&ids, s.node().id())
    })
}

async fn wait_for_convergence(services: &[ChordService], timeout: Duration) -> Option<Duration> {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if ring_is_consistent(services) {
            return Some(started.elapsed());
        }
        sleep(Duration::from_millis(20)).await;
    }
    None
}

async fn run(args: Args) -> Result<LookupMetrics, NodeError> {
    let config = Config {
        address: SocketAddr::from(([127, 0, 0, 1], 0)),
        stabilize_interval: Duration::from_millis(args.stabilize_interval_ms),
        ..Config::default()
    };
    let convergence_timeout = Duration::from_secs(args.convergence_timeout_secs);
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut metrics = LookupMetrics::new();

    let mut services: Vec<ChordService> = Vec::with_capacity(args.nodes);
    let mut bootstrap = None;
    for _ in 0..args.nodes.max(1) {
        let mut service = ChordService::bind(config.clone()).await?;
        let contact = *bootstrap.get_or_insert(service.address());
        service.join(Some(contact)).await?;
        services.push(service);
    }
    info!("Started {} nodes, bootstrap {:?}", services.len(), bootstrap);

    match wait_for_convergence(&services, convergence_timeout).await {
        Some(elapsed) => info!("Ring converged in {:?}", elapsed),
        None => warn!("Ring did not converge within {:?}", convergence_timeout),
    }

    let ids = sorted_ids(&services);
    for n in 0..args.lookups {
        let key = hash_key(&format!("key{}", n));
        let start = rng.gen_range(0..services.len());
        let Some(service) = services.get(start) else {
            continue;
        };

        let started = Instant::now();
        let owner = service.node().search_successor(key).await;
        let success = Some(owner.address) == expected_owner(&ids, key);
        metrics.record_lookup(started.elapsed(), success);
    }
    info!(
        "{} lookups, {:.1}% correct",
        metrics.total_queries,
        metrics.success_rate()
    );

    for _ in 0..args.leaves {
        if services.len() < 2 {
            break;
        }
        let index = rng.gen_range(0..services.len());
        let mut leaving = services.swap_remove(index);
        let address = leaving.address();
        leaving.shutdown().await;
        info!("Node {} left", address);

        let started = Instant::now();
        match wait_for_convergence(&services, convergence_timeout).await {
            Some(_) => metrics.record_stabilization(started.elapsed()),
            None => warn!("Ring did not heal after {} left", address),
        }
    }

    for service in services.iter_mut() {
        service.shutdown().await;
    }
    Ok(metrics)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let metrics = match run(Args::parse()).await {
        Ok(metrics) => metrics,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match metrics.to_json() {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to render metrics: {}", e);
            ExitCode::FAILURE
        }
    }
}
