use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber reading `RUST_LOG` (default `info`),
/// writing structured JSON to stdout. A thin convenience for binaries
/// embedding this client; libraries that already own a subscriber should
/// not call this.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}
