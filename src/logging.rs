//! Tracing subscriber setup for the `logwarden` binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,logwarden=debug";

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`.
///
/// Calling it again after a subscriber is installed is a no-op.
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

/// Like `init`, with a caller-chosen fallback filter.
pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();

    if let Err(err) = result {
        use std::error::Error;
        let already_set = err
            .source()
            .and_then(|s| s.downcast_ref::<tracing::dispatcher::SetGlobalDefaultError>())
            .is_some();
        if !already_set {
            eprintln!("failed to initialize tracing: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init();
        init_with_default("warn");
        tracing::info!("still logging");
    }
}
