//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the config provide one.
pub const DEFAULT_LOG_FILTER: &str = "info,frameloop=debug";

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` takes precedence over `filter`. An unparsable `filter` falls
/// back to [`DEFAULT_LOG_FILTER`].
///
/// # Example
/// ```
/// frameloop_core::init_logging(frameloop_core::DEFAULT_LOG_FILTER);
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // A second initialization (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
