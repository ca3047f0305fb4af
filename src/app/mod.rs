pub mod actions;
pub mod config;
pub mod coordinator;
mod error;
mod logging;
mod runtime;
pub mod services;

pub use error::AppError;

use crate::domain::diagnostics::field_mask;

/// Runs against the live vendor API.
pub fn run() -> Result<(), AppError> {
    bootstrap(config::AppConfig::from_env)
}

/// Runs against a recorded response script (`REPLAY_SCRIPT`).
pub fn run_replay() -> Result<(), AppError> {
    bootstrap(config::AppConfig::replay_from_env)
}

/// One polling cycle printed as JSON. Uses the replay client when
/// `REPLAY_SCRIPT` is set.
pub fn run_status() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    logging::init()?;

    let config = if std::env::var_os("REPLAY_SCRIPT").is_some() {
        config::AppConfig::replay_from_env()?
    } else {
        config::AppConfig::from_env()?
    };

    let snapshot = runtime::snapshot(config)?;
    let rendered = serde_json::to_string_pretty(&snapshot).map_err(AppError::runtime)?;
    println!("{rendered}");
    Ok(())
}

fn bootstrap(
    load: impl FnOnce() -> Result<config::AppConfig, AppError>,
) -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    logging::init()?;

    let config = load()?;

    tracing::info!(
        account = %field_mask(&config.username, 3, 2),
        pin_configured = config.pin.is_some(),
        use_china_servers = config.use_china_servers,
        scan_interval_min = config.scan_interval_min,
        health_update_interval_min = config.health_update_interval_min,
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        client_mode = ?config.client_mode,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
