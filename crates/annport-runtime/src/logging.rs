use annport_core::LogSeverity;
use tracing_subscriber::EnvFilter;

/// Filter directive for a severity. Fatal has no tracing level of its own.
pub fn directive(severity: LogSeverity) -> &'static str {
    match severity {
        LogSeverity::Trace => "trace",
        LogSeverity::Debug => "debug",
        LogSeverity::Info => "info",
        LogSeverity::Warning => "warn",
        LogSeverity::Error | LogSeverity::Fatal => "error",
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over `severity` when
/// set. A subscriber that is already installed is left in place.
pub fn configure(severity: LogSeverity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(severity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
