//! Real sockets: services on ephemeral localhost ports.
use chordring_node::{ChordService, Config};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn test_config() -> Config {
    Config {
        address: SocketAddr::from(([127, 0, 0, 1], 0)),
        stabilize_interval: Duration::from_millis(50),
        request_timeout: Duration::from_millis(500),
        ..Config::default()
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    condition()
}

#[tokio::test]
async fn test_two_services_form_a_ring() {
    let mut a = ChordService::bind(test_config()).await.unwrap();
    let mut b = ChordService::bind(test_config()).await.unwrap();
    let (addr_a, addr_b) = (a.address(), b.address());

    a.join(Some(addr_a)).await.unwrap();
    b.join(Some(addr_a)).await.unwrap();

    let converged = wait_until(
        || {
            a.node().successor().map(|s| s.address) == Some(addr_b)
                && b.node().successor().map(|s| s.address) == Some(addr_a)
                && a.node().predecessor().map(|p| p.address) == Some(addr_b)
                && b.node().predecessor().map(|p| p.address) == Some(addr_a)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(converged, "{}\n{}", a.node().state_report(), b.node().state_report());

    let owner_of_b = a.node().search_successor(b.node().id()).await;
    assert_eq!(owner_of_b.address, addr_b);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_survivor_recovers_after_peer_shutdown() {
    let mut a = ChordService::bind(test_config()).await.unwrap();
    let mut b = ChordService::bind(test_config()).await.unwrap();
    let addr_a = a.address();

    a.join(Some(addr_a)).await.unwrap();
    b.join(Some(addr_a)).await.unwrap();
    let addr_b = b.address();
    assert!(
        wait_until(
            || a.node().successor().map(|s| s.address) == Some(addr_b),
            Duration::from_secs(5)
        )
        .await
    );

    b.shutdown().await;

    let recovered = wait_until(
        || {
            a.node().successor().map(|s| s.address) == Some(addr_a)
                && a.node().predecessor().is_none()
        },
        Duration::from_secs(10),
    )
    .await;
    assert!(recovered, "{}", a.node().state_report());

    a.shutdown().await;
}
