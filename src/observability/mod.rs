//! Observability and telemetry.
//!
//! One `tracing-subscriber` registry for the whole process: an
//! `EnvFilter` driven by `RUST_LOG` (default `fabula=info`), plus either
//! a human-readable or a JSON fmt layer. Metrics go through the
//! `metrics` facade; without an installed recorder they are no-ops, so
//! library users pay nothing unless they opt in.

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Default filter directive when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "fabula=info";

/// Initializes the global tracing subscriber.
///
/// Safe to call more than once; only the first call installs anything.
/// `json` selects machine-readable output for log shippers.
pub fn init(json: bool) {
    OBSERVABILITY_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init(false);
        init(true);
        assert!(OBSERVABILITY_INIT.get().is_some());
    }
}
