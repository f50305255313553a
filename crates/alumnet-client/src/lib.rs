//! Chat client for the alumni network: conversation cache, server access and
//! the live channel, independent of any particular front end.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod live;
pub mod session;
pub mod snapshot;
pub mod state;

pub use error::{ClientError, Result};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Logs go to stderr so they do not interleave
/// with conversation output on stdout.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("alumnet_client_lib=info,alumnet_chat=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
