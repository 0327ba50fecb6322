use chordring_node::{ChordService, Config, NodeError};
use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Run one node of a Chord ring.
#[derive(Debug, Parser)]
#[command(name = "chordring-node", version)]
struct Args {
    /// Local port to listen on
    port: u16,

    /// Address of a node already in the ring
    #[arg(requires = "contact_port")]
    contact_ip: Option<String>,

    /// Port of the contact node
    contact_port: Option<u16>,

    /// Host or ip this node binds and advertises
    #[arg(long, env = "CHORD_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "CHORD_STABILIZE_INTERVAL_MS", default_value_t = 500)]
    stabilize_interval_ms: u64,

    /// Connections served concurrently
    #[arg(long, env = "CHORD_WORKERS", default_value_t = 10)]
    workers: usize,

    /// Timeout for one request to a peer
    #[arg(long, env = "CHORD_TIMEOUT_MS", default_value_t = 2000)]
    timeout_ms: u64,
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, NodeError> {
    tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addresses| addresses.next())
        .ok_or_else(|| NodeError::Resolve(format!("{}:{}", host, port)))
}

async fn run(args: Args) -> Result<(), NodeError> {
    let address = resolve(&args.host, args.port).await?;
    let contact = match (&args.contact_ip, args.contact_port) {
        (Some(ip), Some(port)) => Some(resolve(ip, port).await?),
        _ => None,
    };

    let config = Config {
        address,
        stabilize_interval: Duration::from_millis(args.stabilize_interval_ms),
        worker_pool_size: args.workers,
        request_timeout: Duration::from_millis(args.timeout_ms),
    };

    let mut service = ChordService::bind(config).await?;
    // Without a contact the node starts a ring of its own.
    let contact = contact.unwrap_or_else(|| service.address());
    service.join(Some(contact)).await?;

    println!("Joined the ring as {}", service.address());
    println!("{}", service.node().neighbors_report());
    println!("Commands: info, exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "info" => print!("{}", service.node().state_report()),
                "exit" => break,
                "" => {}
                other => println!("Unknown command {:?}. Commands: info, exit", other),
            },
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    service.shutdown().await;
    println!("Node {} left the ring", service.address());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
