//! Tracing subscriber setup for binaries and tests that embed the crate.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "rolepack=info";

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`.
///
/// # Errors
///
/// Returns an error if `default_filter` does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(
    default_filter: &str,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
}
