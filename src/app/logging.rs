use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

/// `RUST_LOG` wins; otherwise info for this crate with quieter HTTP internals.
const DEFAULT_FILTER: &str = "info,reqwest=warn,actix_server=warn";

pub fn init() -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(AppError::logging_init)
}
