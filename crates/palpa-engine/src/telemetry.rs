//! Tracing subscriber setup for binaries embedding the engine.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "palpa=info";

/// Install a global fmt subscriber; `RUST_LOG` overrides `default_filter`.
///
/// Fails if a global subscriber is already set.
pub fn init(default_filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init(DEFAULT_FILTER);
        assert!(init(DEFAULT_FILTER).is_err());
    }
}
