//! # CLI Bootstrap
//!
//! Parses arguments, brings up `tracing`, sizes the tokio runtime to the
//! configured thread count, and runs the server until a listener fails.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = match tcache_server::config::parse_args(std::env::args()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("tcache-server: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(config.verbosity);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .enable_all()
        .build()?;

    runtime.block_on(tcache_server::run(config))
}

fn init_tracing(verbosity: u32) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
