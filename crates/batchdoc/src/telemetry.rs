//! Global subscriber setup.
//!
//! Installs a JSON formatter filtered by `RUST_LOG` (default `info`) and
//! forwards `log` records from the storage layer and worker pool into
//! `tracing`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber. Returns `false` when one was already set,
/// which makes repeated calls from tests harmless.
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

pub fn init_with_filter(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .json()
            .with_timer(fmt::time::SystemTime)
            .with_current_span(true)
            .with_target(true),
    );

    // The log bridge is process-global too; a second install is a no-op.
    let _ = tracing_log::LogTracer::init();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
