//! Structured logging setup.
//!
//! Logs go to stderr so they never interleave with the report printed on
//! stdout. `RUST_LOG` overrides the default level.

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Default directive when `RUST_LOG` is unset.
pub fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

        let result = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .try_init();

        // Another subscriber (e.g. a test harness) may already be installed.
        if result.is_err() {
            tracing::debug!("global tracing subscriber already set");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_lowers_level() {
        assert_eq!(default_level(false), "info");
        assert_eq!(default_level(true), "debug");
    }

    #[test]
    fn init_is_idempotent() {
        init(false);
        init(true);
        tracing::info!("still logging");
    }
}
