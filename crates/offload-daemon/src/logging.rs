use eyre::{eyre, Result};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "offload_core=info,offload_daemon=info";
const VERBOSE_LOG_FILTER: &str = "offload_core=debug,offload_daemon=debug";

/// Install the stderr subscriber. `log` records from the core crate are
/// bridged by tracing-subscriber's default `tracing-log` integration.
pub(crate) fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| eyre!("failed to initialize logging: {err}"))
}
