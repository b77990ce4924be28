//! Tracing subscriber setup
//!
//! `RUST_LOG` overrides `log.level` when set. Output goes to stderr so that
//! command output on stdout stays machine-readable.

use crate::config::LogConfig;
use crate::errors::{GuardError, GuardResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing(config: &LogConfig) -> GuardResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| GuardError::config(format!("log.level '{}': {e}", config.level)))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| GuardError::internal(format!("tracing already initialised: {e}")))
}
