//! Tracing subscriber setup shared by both binaries

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber
///
/// Filter comes from `RUST_LOG` (default: `info`). `ERROR` events are written
/// to stderr, everything else to stdout.
pub fn init() {
    let writer = std::io::stderr
        .with_max_level(Level::ERROR)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .init();
}
