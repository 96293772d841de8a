//! Load test for the pyramids relay.
//!
//! Spawns multiple bot clients that:
//! - Connect to the relay
//! - Periodically send a random pose
//! - Receive and count relayed events
//!
//! Usage: cargo run -p pyramids-client --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N        Number of clients to spawn (default: 100)
//!   --duration S       Test duration in seconds (default: 30)
//!   --interval-ms MS   Delay between pose updates per client (default: 2000)
//!   --url URL          Relay URL (default: PYRAMIDS_WS_URL or ws://127.0.0.1:9001/ws)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pyramids_client::{ClientConfig, NetEvent, PlayerRoster, RelayClient};
use pyramids_shared::protocol::ServerMsg;
use pyramids_shared::vec3::Vec3;
use rand::Rng;
use tokio::sync::broadcast;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    connected_total: AtomicU64,
    moves_sent: AtomicU64,
    events_received: AtomicU64,
    joins_received: AtomicU64,
    moves_received: AtomicU64,
    leaves_received: AtomicU64,
    lagged: AtomicU64,
    errors: AtomicU64,
    connect_latency_sum_ms: AtomicU64,
    peers_seen_sum: AtomicU64,
}

impl Metrics {
    /// Average connect latency (ms) and roster size over the bots that
    /// actually connected.
    fn connected_averages(&self) -> Option<(u64, u64)> {
        let connected = self.connected_total.load(Ordering::Relaxed);
        if connected == 0 {
            return None;
        }
        Some((
            self.connect_latency_sum_ms.load(Ordering::Relaxed) / connected,
            self.peers_seen_sum.load(Ordering::Relaxed) / connected,
        ))
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    config: ClientConfig,
    interval: Duration,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let mut client = match RelayClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Client {} has a bad config: {}", client_id, e);
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    let mut events = client.subscribe();

    let connect_start = Instant::now();
    client.connect();

    let connected = tokio::time::timeout(Duration::from_secs(5), client.wait_connected()).await;
    match connected {
        Ok(Some(id)) => {
            if client_id < 3 {
                eprintln!("Client {} connected as {}", client_id, id);
            }
        }
        _ => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect", client_id);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }
    metrics.connected.fetch_add(1, Ordering::Relaxed);
    metrics.connected_total.fetch_add(1, Ordering::Relaxed);
    metrics
        .connect_latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);

    let mut move_timer = tokio::time::interval(interval);
    move_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut roster = PlayerRoster::new();
    let test_end = tokio::time::Instant::now() + duration;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(test_end) => break,

            _ = move_timer.tick() => {
                let (position, rotation) = {
                    let mut rng = rand::thread_rng();
                    (
                        Vec3::new(
                            rng.gen_range(-5.0..5.0),
                            rng.gen_range(-5.0..5.0),
                            rng.gen_range(-5.0..5.0),
                        ),
                        rng.gen_range(0.0..std::f64::consts::TAU),
                    )
                };
                client.send_pose(position, rotation);
                metrics.moves_sent.fetch_add(1, Ordering::Relaxed);
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        metrics.events_received.fetch_add(1, Ordering::Relaxed);
                        match &event {
                            NetEvent::Message(ServerMsg::PlayerJoined(_)) => {
                                metrics.joins_received.fetch_add(1, Ordering::Relaxed);
                            }
                            NetEvent::Message(ServerMsg::PlayerMoved(_)) => {
                                metrics.moves_received.fetch_add(1, Ordering::Relaxed);
                            }
                            NetEvent::Message(ServerMsg::PlayerLeft(_)) => {
                                metrics.leaves_received.fetch_add(1, Ordering::Relaxed);
                            }
                            NetEvent::Disconnected => {
                                metrics.errors.fetch_add(1, Ordering::Relaxed);
                            }
                            _ => {}
                        }
                        roster.apply(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        metrics.lagged.fetch_add(n, Ordering::Relaxed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    metrics
        .peers_seen_sum
        .fetch_add(roster.len() as u64, Ordering::Relaxed);
    client.disconnect();
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut interval_ms: u64 = 2000;
    let mut url = ClientConfig::from_env().url;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--interval-ms" => {
                i += 1;
                interval_ms = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(2000);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Pyramids Relay Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Move interval: {}ms per client", interval_ms);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);
    let interval = Duration::from_millis(interval_ms.max(1));
    // Bots stay up for the whole run; a retry storm would skew the numbers
    let config = ClientConfig::new(url).with_reconnect(None);

    println!("Spawning {} clients...", num_clients);
    let spawn_start = Instant::now();

    let mut handles = Vec::with_capacity(num_clients as usize);
    for client_id in 0..num_clients {
        let config = config.clone();
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            run_client(client_id, config, interval, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();
        loop {
            ticker.tick().await;
            println!(
                "[{:3}s] connected={}, sent={}, received={}, joins={}, moves={}, leaves={}, lagged={}, errors={}",
                start.elapsed().as_secs(),
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.moves_sent.load(Ordering::Relaxed),
                metrics_clone.events_received.load(Ordering::Relaxed),
                metrics_clone.joins_received.load(Ordering::Relaxed),
                metrics_clone.moves_received.load(Ordering::Relaxed),
                metrics_clone.leaves_received.load(Ordering::Relaxed),
                metrics_clone.lagged.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    // Wait for all clients to finish
    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    let sent = metrics.moves_sent.load(Ordering::Relaxed);
    let moves = metrics.moves_received.load(Ordering::Relaxed);
    let errors = metrics.errors.load(Ordering::Relaxed);
    let lagged = metrics.lagged.load(Ordering::Relaxed);

    println!();
    println!("=== Final Results ===");
    println!("Total moves sent: {}", sent);
    println!("Total playerMoved received: {}", moves);
    println!("Total events lagged: {}", lagged);
    println!("Total errors: {}", errors);
    println!(
        "Clients connected: {}/{}",
        metrics.connected_total.load(Ordering::Relaxed),
        num_clients
    );
    if let Some((latency, peers)) = metrics.connected_averages() {
        println!("Average connect latency: {}ms", latency);
        println!("Average peers in roster at end: {}", peers);
    }

    // Every move fans out to the other N-1 clients
    let expected = sent * (num_clients.saturating_sub(1)) as u64;
    if expected > 0 {
        println!(
            "Delivery rate: {:.1}%",
            moves as f64 / expected as f64 * 100.0
        );
    }
}
