use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. Safe to call more than once; later
/// calls are no-ops once a subscriber is already installed.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}
