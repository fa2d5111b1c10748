use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives of the binaries.
pub const LOG_ENV: &str = "RECOBLEND_LOG";

const DEFAULT_DIRECTIVES: &str = "recoblend=info,als=info,blend=info";

pub fn to_millis(duration: Duration) -> u64 {
    (duration.as_secs() * 1_000) + (duration.subsec_nanos() / 1_000_000) as u64
}

/// Installs a stderr fmt subscriber filtered by `RECOBLEND_LOG`. Falls back to info level for
/// this crate and its binaries when the variable is unset or does not parse.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    if installed.is_err() {
        tracing::debug!("a global subscriber was already installed");
    }
}
