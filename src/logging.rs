//! Logging system initialization
//!
//! Sets up the tracing subscriber for embedding applications and tools.
//! Library code only emits `tracing` events and never installs a subscriber
//! on its own.

use tracing_appender::non_blocking::WorkerGuard;

/// Initialize logging with the given default filter directive.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns a guard that
/// must be kept alive for the duration of the program so buffered log
/// writes are flushed on shutdown.
pub fn init_logging(default_filter: &str) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(filter)
        .with_level(true)
        .init();

    guard
}
