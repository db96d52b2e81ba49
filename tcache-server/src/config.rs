//! # Process Configuration
//!
//! Argument parsing is an explicit external collaborator (spec.md §1/§6):
//! there is no config file and no `clap` dependency, matching the teacher's
//! minimal-binary style. `parse_args` turns a process argument list into a
//! [`ServerConfig`]; `main.rs` is the only caller.

use std::time::Duration;

/// Parsed command-line flags. Defaults mirror the reference
/// implementation's stock defaults (port 11211, 64 MiB memory cap, 1024
/// max connections, eviction enabled).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port for the text protocol, if enabled. `None` disables TCP.
    pub tcp_port: Option<u16>,
    /// UDP port for the text protocol, if enabled. `None` disables UDP.
    pub udp_port: Option<u16>,
    /// AF_LOCAL stream socket path, if enabled.
    pub unix_path: Option<String>,
    /// Address to bind listening sockets to.
    pub bind_address: String,
    /// Item storage ceiling, in bytes.
    pub max_bytes: usize,
    /// Maximum simultaneous client connections.
    pub max_conns: usize,
    /// Whether LRU eviction is allowed when `max_bytes` is exhausted.
    pub eviction_enabled: bool,
    /// Worker thread count (the tokio runtime's worker pool size).
    pub threads: usize,
    /// Commands a connection may process per wakeup before yielding.
    pub reqs_per_event: usize,
    /// Log verbosity; forwarded to `tracing`'s filter on startup and
    /// adjustable at runtime via the `verbosity` command.
    pub verbosity: u32,
    /// Daemonize after startup (external collaborator; see spec.md §1).
    pub daemonize: bool,
    /// Optional pidfile path, written after a successful bind.
    pub pid_file: Option<String>,
    /// Optional user to drop privileges to after binding.
    pub setuid_user: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            tcp_port: Some(11211),
            udp_port: None,
            unix_path: None,
            bind_address: "0.0.0.0".to_string(),
            max_bytes: 64 * 1024 * 1024,
            max_conns: 1024,
            eviction_enabled: true,
            threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            reqs_per_event: 20,
            verbosity: 0,
            daemonize: false,
            pid_file: None,
            setuid_user: None,
        }
    }
}

impl ServerConfig {
    pub fn deferred_delete_sweep_interval(&self) -> Duration {
        Duration::from_secs(5)
    }

    pub fn clock_tick_interval(&self) -> Duration {
        Duration::from_secs(1)
    }
}

/// Parses flags in the spec.md §6 CLI surface. Returns a human-readable
/// error string (never panics) so `main` can print it and exit non-zero.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ServerConfig, String> {
    let mut config = ServerConfig::default();
    config.tcp_port = Some(11211);
    let mut explicit_tcp = false;
    let mut explicit_udp = false;

    let mut iter = args.into_iter();
    // Skip argv[0].
    iter.next();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-p" | "--port" => {
                let v = next_value(&mut iter, &arg)?;
                config.tcp_port = Some(parse_port(&v)?);
                explicit_tcp = true;
            }
            "-U" | "--udp-port" => {
                let v = next_value(&mut iter, &arg)?;
                let port = parse_port(&v)?;
                config.udp_port = if port == 0 { None } else { Some(port) };
                explicit_udp = true;
            }
            "-s" | "--unix-socket" => {
                config.unix_path = Some(next_value(&mut iter, &arg)?);
            }
            "-l" | "--listen" => {
                config.bind_address = next_value(&mut iter, &arg)?;
            }
            "-m" | "--memory-limit" => {
                let v = next_value(&mut iter, &arg)?;
                let mib: usize = v.parse().map_err(|_| format!("bad value for {arg}: {v}"))?;
                config.max_bytes = mib.saturating_mul(1024 * 1024);
            }
            "-c" | "--conn-limit" => {
                let v = next_value(&mut iter, &arg)?;
                config.max_conns = v.parse().map_err(|_| format!("bad value for {arg}: {v}"))?;
            }
            "-M" | "--disable-evictions" => {
                config.eviction_enabled = false;
            }
            "-t" | "--threads" => {
                let v = next_value(&mut iter, &arg)?;
                config.threads = v.parse().map_err(|_| format!("bad value for {arg}: {v}"))?;
            }
            "-R" | "--max-reqs-per-event" => {
                let v = next_value(&mut iter, &arg)?;
                config.reqs_per_event = v.parse().map_err(|_| format!("bad value for {arg}: {v}"))?;
            }
            "-v" | "--verbose" => {
                config.verbosity = config.verbosity.saturating_add(1);
            }
            "-vv" => {
                config.verbosity = config.verbosity.saturating_add(2);
            }
            "-d" | "--daemonize" => {
                config.daemonize = true;
            }
            "-P" | "--pidfile" => {
                config.pid_file = Some(next_value(&mut iter, &arg)?);
            }
            "-u" | "--user" => {
                config.setuid_user = Some(next_value(&mut iter, &arg)?);
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }

    // A unix socket disables the TCP port unless the caller explicitly
    // asked for one too, matching the reference implementation's
    // "mutually exclusive by default" posture (spec.md §6).
    if config.unix_path.is_some() && !explicit_tcp {
        config.tcp_port = None;
    }
    let _ = explicit_udp;

    Ok(config)
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    iter.next().ok_or_else(|| format!("missing value for {flag}"))
}

fn parse_port(s: &str) -> Result<u16, String> {
    s.parse().map_err(|_| format!("bad port: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> {
        std::iter::once("tcache-server".to_string())
            .chain(s.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_port_11211() {
        let config = parse_args(args(&[])).unwrap();
        assert_eq!(config.tcp_port, Some(11211));
        assert!(config.eviction_enabled);
    }

    #[test]
    fn parses_port_and_memory_limit() {
        let config = parse_args(args(&["-p", "11311", "-m", "128"])).unwrap();
        assert_eq!(config.tcp_port, Some(11311));
        assert_eq!(config.max_bytes, 128 * 1024 * 1024);
    }

    #[test]
    fn disables_eviction_flag() {
        let config = parse_args(args(&["-M"])).unwrap();
        assert!(!config.eviction_enabled);
    }

    #[test]
    fn unix_socket_disables_tcp_by_default() {
        let config = parse_args(args(&["-s", "/tmp/tcache.sock"])).unwrap();
        assert_eq!(config.tcp_port, None);
        assert_eq!(config.unix_path.as_deref(), Some("/tmp/tcache.sock"));
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    #[test]
    fn missing_value_is_an_error() {
        assert!(parse_args(args(&["-p"])).is_err());
    }
}
