use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "CATALOG_LOG";

/// JSON logs on stdout, filtered by `CATALOG_LOG` (default `info`).
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .with_target(false)
        .try_init();
}
