//! # Listener Bring-Up
//!
//! Binds whichever of TCP/UDP/Unix the configuration enables, spawns the
//! periodic clock-tick and deferred-delete sweep tasks, and hands every
//! accepted connection off to [`crate::connection::run_connection`]. UDP
//! has no persistent connection state, so it's driven by its own loop in
//! this module rather than `connection.rs`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, UdpSocket, UnixListener};
use tokio::task::JoinSet;
use tracing::{info, warn};

use tcache_common::clock::Clock;
use tcache_engine::{Cache, CacheConfig};

use crate::config::ServerConfig;
use crate::connection;
use crate::dispatch::{self, DispatchOutcome, Response};
use crate::protocol::{self, ParseOutcome};
use crate::state::ServerState;
use crate::udp::{self, UDP_MAX_PAYLOAD_SIZE};

/// Brings the server up and runs until a listener task exits. Each
/// enabled transport runs on its own task for the life of the process;
/// since none of them return on their own, the first one to end
/// (normally only on a bind-time error surfaced earlier, or a panic)
/// ends the process.
pub async fn run(config: ServerConfig) -> Result<()> {
    let clock = Arc::new(Clock::new());
    let cache = Cache::new(
        CacheConfig {
            max_bytes: config.max_bytes,
            eviction_enabled: config.eviction_enabled,
            ..CacheConfig::default()
        },
        clock.clone(),
    );
    let state = ServerState::new(config, cache, clock);

    spawn_clock_tick(state.clone());
    spawn_delete_sweep(state.clone());

    let mut listeners = JoinSet::new();

    if let Some(port) = state.config.tcp_port {
        let listener = TcpListener::bind((state.config.bind_address.as_str(), port))
            .await
            .with_context(|| format!("binding tcp {}:{port}", state.config.bind_address))?;
        info!(addr = %listener.local_addr().unwrap(), "listening on tcp");
        let state = state.clone();
        listeners.spawn(run_tcp(listener, state));
    }

    if let Some(port) = state.config.udp_port {
        let socket = UdpSocket::bind((state.config.bind_address.as_str(), port))
            .await
            .with_context(|| format!("binding udp {}:{port}", state.config.bind_address))?;
        info!(addr = %socket.local_addr().unwrap(), "listening on udp");
        let state = state.clone();
        listeners.spawn(run_udp(socket, state));
    }

    if let Some(path) = state.config.unix_path.clone() {
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).with_context(|| format!("binding unix socket {path}"))?;
        info!(path = %path, "listening on unix socket");
        let state = state.clone();
        listeners.spawn(run_unix(listener, state));
    }

    if listeners.is_empty() {
        anyhow::bail!("no listeners enabled: configure at least one of tcp/udp/unix-socket");
    }

    match listeners.join_next().await {
        Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(e))) => Err(e),
        Some(Err(join_err)) => Err(anyhow::anyhow!("listener task panicked: {join_err}")),
        None => Ok(()),
    }
}

async fn run_tcp(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    loop {
        let permit = match state.accept_permits.acquire().await {
            Ok(p) => p,
            Err(_) => return Ok(()),
        };
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "tcp accept failed");
                continue;
            }
        };
        let _ = stream.set_nodelay(true);
        let state = state.clone();
        let peer = peer.to_string();
        permit.forget();
        tokio::spawn(async move {
            connection::run_connection(stream, state.clone(), peer).await;
            state.accept_permits.add_permits(1);
        });
    }
}

async fn run_unix(listener: UnixListener, state: Arc<ServerState>) -> Result<()> {
    loop {
        let permit = match state.accept_permits.acquire().await {
            Ok(p) => p,
            Err(_) => return Ok(()),
        };
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "unix accept failed");
                continue;
            }
        };
        let state = state.clone();
        let peer = format!("{addr:?}");
        permit.forget();
        tokio::spawn(async move {
            connection::run_connection(stream, state.clone(), peer).await;
            state.accept_permits.add_permits(1);
        });
    }
}

/// UDP has no per-client connection: every datagram is a complete request
/// (spec.md §6 — a request must fit in one datagram), so this loop reads,
/// dispatches, and replies without any read-buffer bookkeeping. A
/// storage command (which needs a second datagram for its value) is
/// rejected rather than supported, per spec.md §6 Non-goals.
async fn run_udp(socket: UdpSocket, state: Arc<ServerState>) -> Result<()> {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; UDP_MAX_PAYLOAD_SIZE];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "udp recv failed");
                continue;
            }
        };
        let Some(header) = udp::DatagramHeader::decode(&buf[..n]) else {
            continue;
        };
        let payload = buf[udp::UDP_HEADER_LEN..n].to_vec();
        let socket = socket.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let response = if header.total != 1 {
                let mut buf = Vec::new();
                protocol::resp_server_error(&mut buf, "multi-packet request not supported");
                Some(udp::FramedResponse::flat(buf))
            } else {
                handle_udp_command(&payload, &state)
            };
            if let Some(response) = response {
                let datagrams = udp::build_response_datagrams_for(header.request_id, &response);
                for datagram in datagrams {
                    if let Err(e) = socket.send_to(&datagram, peer).await {
                        warn!(error = %e, "udp send failed");
                        break;
                    }
                }
            }
        });
    }
}

fn handle_udp_command(line: &[u8], state: &Arc<ServerState>) -> Option<udp::FramedResponse> {
    let trimmed = strip_line_ending(line);
    match protocol::parse_command(trimmed) {
        ParseOutcome::ProtocolError(_) => {
            let mut buf = Vec::new();
            protocol::resp_error(&mut buf);
            Some(udp::FramedResponse::flat(buf))
        }
        ParseOutcome::ClientError(protocol::ClientError(msg)) => {
            let mut buf = Vec::new();
            protocol::resp_client_error(&mut buf, msg);
            Some(udp::FramedResponse::flat(buf))
        }
        ParseOutcome::Command(cmd) => match dispatch::dispatch(cmd, state) {
            DispatchOutcome::NeedsPayload { .. } => {
                let mut buf = Vec::new();
                protocol::resp_client_error(&mut buf, "storage commands are not supported over udp");
                Some(udp::FramedResponse::flat(buf))
            }
            DispatchOutcome::Done(Response::Quit) => None,
            DispatchOutcome::Done(Response::Simple(buf)) => Some(udp::FramedResponse::flat(buf)),
            DispatchOutcome::Done(Response::Get(get)) => {
                let (payload, unsplittable) = get.flatten();
                Some(udp::FramedResponse { payload, unsplittable })
            }
        },
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn spawn_clock_tick(state: Arc<ServerState>) {
    let interval = state.config.clock_tick_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.clock.tick();
        }
    });
}

fn spawn_delete_sweep(state: Arc<ServerState>) {
    let interval = state.config.deferred_delete_sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.cache.sweep_deferred();
        }
    });
}
