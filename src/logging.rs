//! Log setup. The library itself only emits `tracing` events; an application
//! embedding it can call [init] to get them printed.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Fallback filter when the configured one doesn't parse.
const DEFAULT_FILTER: &str = "info";

/// Install a fmt subscriber filtered at the configured level. `RUST_LOG`, if
/// set, wins. Calling this more than once (or after someone else installed a
/// subscriber) is harmless: we return false and leave theirs alone.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(config));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init().is_ok()
}

/// The filter a config asks for, ignoring the environment.
fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_new(config.level()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
