//! Tracing subscriber setup for binaries and tests.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable overriding the configured filter.
pub const LOG_ENV: &str = "LGMUX_LOG";

/// Installs a `fmt` subscriber filtered by `LGMUX_LOG`, falling back to `filter`.
/// Returns `false` if a global subscriber was already set.
pub fn init(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_thread_names(true))
        .try_init()
        .is_ok()
}
