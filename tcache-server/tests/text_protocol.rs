//! End-to-end tests against a real server instance: a `CacheClient` talks
//! text protocol over an actual TCP socket to `tcache-server`'s connection
//! driver, with no protocol mocking on either side.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use tcache_client::{CacheClient, ClientConfig, DeleteResult, StoreResult};
use tcache_common::clock::Clock;
use tcache_engine::{Cache, CacheConfig};
use tcache_server::config::ServerConfig;
use tcache_server::connection::run_connection;
use tcache_server::state::ServerState;

/// Spins up one real server instance on an ephemeral port, in its own
/// background thread running a dedicated tokio runtime, and returns its
/// address. Torn down when the thread's runtime is dropped at process
/// exit; tests are short-lived enough not to need explicit shutdown.
fn spawn_server() -> String {
    let (addr_tx, addr_rx) = std::sync::mpsc::channel();

    thread::spawn(move || {
        let rt = Runtime::new().expect("build runtime");
        rt.block_on(async move {
            let config = ServerConfig { max_conns: 64, ..ServerConfig::default() };
            let clock = Arc::new(Clock::new());
            let cache = Cache::new(CacheConfig::default(), clock.clone());
            let state = ServerState::new(config, cache, clock.clone());

            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let addr = listener.local_addr().expect("local_addr");
            addr_tx.send(addr.to_string()).expect("send addr");

            // Drives the clock itself so delete-lock and flush_all windows
            // in these tests actually advance in real time.
            let clock_state = state.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(250));
                loop {
                    ticker.tick().await;
                    clock_state.clock.tick();
                }
            });
            let sweep_state = state.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(250));
                loop {
                    ticker.tick().await;
                    sweep_state.cache.sweep_deferred();
                }
            });

            loop {
                let (stream, peer) = listener.accept().await.expect("accept");
                let state = state.clone();
                tokio::spawn(run_connection(stream, state, peer.to_string()));
            }
        });
    });

    addr_rx.recv().expect("receive bound address")
}

fn client(addr: &str) -> CacheClient {
    let config = ClientConfig {
        addr: addr.to_string(),
        max_idle: 4,
        max_total: 8,
        read_timeout: Some(Duration::from_secs(2)),
        write_timeout: Some(Duration::from_secs(2)),
        connect_timeout: Some(Duration::from_secs(2)),
    };
    CacheClient::with_config(config).expect("client")
}

#[test]
fn set_then_get_roundtrips_value_and_flags() {
    let addr = spawn_server();
    let client = client(&addr);

    client.set(b"k1", 42, 0, b"hello").unwrap();
    let value = client.get(b"k1").unwrap().expect("hit");
    assert_eq!(value.flags, 42);
    assert_eq!(value.data, b"hello");
}

#[test]
fn add_fails_on_existing_key_replace_fails_on_missing_key() {
    let addr = spawn_server();
    let client = client(&addr);

    client.set(b"k2", 0, 0, b"first").unwrap();
    assert_eq!(client.add(b"k2", 0, 0, b"second").unwrap(), StoreResult::NotStored);
    assert_eq!(client.get(b"k2").unwrap().unwrap().data, b"first");

    assert_eq!(client.replace(b"missing-k2", 0, 0, b"x").unwrap(), StoreResult::NotStored);
    assert!(client.get(b"missing-k2").unwrap().is_none());
}

#[test]
fn incr_and_decr_saturate_at_bounds() {
    let addr = spawn_server();
    let client = client(&addr);

    client.set(b"counter", 0, 0, b"10").unwrap();
    assert_eq!(client.incr(b"counter", 5).unwrap(), Some(15));
    assert_eq!(client.decr(b"counter", 100).unwrap(), Some(0));
    assert_eq!(client.incr(b"missing-counter", 1).unwrap(), None);
}

#[test]
fn get_many_returns_only_hits() {
    let addr = spawn_server();
    let client = client(&addr);

    client.set(b"multi-a", 0, 0, b"1").unwrap();
    client.set(b"multi-c", 0, 0, b"3").unwrap();

    let mut hits = client.get_many(&[b"multi-a", b"multi-b", b"multi-c"]).unwrap();
    hits.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, b"multi-a");
    assert_eq!(hits[1].0, b"multi-c");
}

#[test]
fn delete_with_window_blocks_add_and_replace_until_it_expires() {
    let addr = spawn_server();
    let client = client(&addr);

    client.set(b"locked", 0, 0, b"v").unwrap();
    assert_eq!(client.delete(b"locked", Some(1)).unwrap(), DeleteResult::Deleted);

    assert!(client.get(b"locked").unwrap().is_none());
    assert_eq!(client.add(b"locked", 0, 0, b"y").unwrap(), StoreResult::NotStored);
    // `set` is exempt from the delete-lock window.
    client.set(b"locked", 0, 0, b"z").unwrap();
    assert_eq!(client.get(b"locked").unwrap().unwrap().data, b"z");
}

#[test]
fn flush_all_hides_items_stored_before_the_call() {
    let addr = spawn_server();
    let client = client(&addr);

    client.set(b"pre-flush", 0, 0, b"old").unwrap();
    std::thread::sleep(Duration::from_millis(600));
    client.flush_all(None).unwrap();
    client.set(b"post-flush", 0, 0, b"new").unwrap();

    assert!(client.get(b"pre-flush").unwrap().is_none());
    assert_eq!(client.get(b"post-flush").unwrap().unwrap().data, b"new");
}

#[test]
fn stats_reports_well_formed_lines() {
    let addr = spawn_server();
    let client = client(&addr);

    client.set(b"stats-key", 0, 0, b"v").unwrap();
    let _ = client.get(b"stats-key").unwrap();

    let stats = client.stats().unwrap();
    let names: Vec<&[u8]> = stats.iter().map(|(k, _)| k.as_slice()).collect();
    assert!(names.contains(&b"cmd_get".as_slice()));
    assert!(names.contains(&b"cmd_set".as_slice()));
    assert!(names.contains(&b"curr_items".as_slice()));
    assert!(names.contains(&b"version".as_slice()));
}

#[test]
fn version_returns_the_crate_version() {
    let addr = spawn_server();
    let client = client(&addr);
    let version = client.version().unwrap();
    assert_eq!(version, env!("CARGO_PKG_VERSION").as_bytes());
}
