use crate::RunnerError;
use tracing_subscriber::EnvFilter;

/// Install the global log subscriber, writing to stderr.
///
/// `RUST_LOG` selects the filter (default `info`); `verbose` forces `debug`.
pub fn init_logging(verbose: bool) -> Result<(), RunnerError> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| RunnerError::Config(format!("failed to install log subscriber: {}", e)))
}
