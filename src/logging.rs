//! Logging configuration using tracing
//!
//! Structured logging to stderr, filtered through the RUST_LOG environment variable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// - Filtering via RUST_LOG (defaults to "warn", or "info" for the server)
/// - Formatted output to stderr with target and line numbers
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - Show info and above
/// - `RUST_LOG=jiralink=debug` - Debug level for this crate only
/// - `RUST_LOG=jiralink::auth=trace,tower_http=warn` - Per-module levels
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init_with_default(default_level: &str) -> crate::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| crate::JiraLinkError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize with the quiet CLI default
pub fn init() -> crate::Result<()> {
    init_with_default("warn")
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init_with_default("debug");
}
