use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Debug builds print human-readable lines with targets; release builds
/// emit JSON for log shipping. `RUST_LOG` overrides `default_level`.
/// Calling this twice is harmless: the second install is ignored.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = if cfg!(debug_assertions) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}
