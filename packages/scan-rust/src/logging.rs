//! Tracing subscriber setup for the `driftnet` binary and embedders.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global subscriber.
///
/// `RUST_LOG` takes priority over `default_level`. With `json` set, events
/// are written as one JSON object per line.
///
/// # Errors
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(default_level: &str, json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(())
}
