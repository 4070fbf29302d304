pub mod collector;
pub mod config;
pub mod db;
pub mod ingest_client;
pub mod kinds;
pub mod locations;
pub mod models;
pub mod pins;
pub mod populate;
pub mod server;
pub mod utils;

use tracing_subscriber::EnvFilter;

/// Logs go to stderr so that commands printing JSON keep stdout clean.
/// The filter comes from `LOG_LEVEL`, defaulting to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
