use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with a compact stdout layer.
///
/// - Stdout: compact, human-readable for dev console
/// - Default level: INFO (engine at DEBUG), override via RUST_LOG env
///
/// Safe to call more than once; later calls are no-ops so embedding hosts
/// and test binaries can both initialize freely.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,prompt_lab_engine=debug"));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init();

    tracing::debug!("Tracing initialized");
}
