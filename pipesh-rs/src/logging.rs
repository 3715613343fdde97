use tracing_subscriber::EnvFilter;

/// Variable holding the log filter directives, e.g. `PIPESH_LOG=pipesh=debug`.
pub const LOG_ENV: &str = "PIPESH_LOG";

/// Installs the stderr subscriber. Calling it twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
