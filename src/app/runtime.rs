use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use serde_json::{Map, Value, json};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::incontrol_client::InControlClient;
use crate::adapters::incontrol_http::{Credentials, InControlHttpClient};
use crate::adapters::incontrol_replay::InControlReplayClient;
use crate::app::actions::ServiceExecutor;
use crate::app::config::{AppConfig, ClientMode};
use crate::app::coordinator::{
    CoordinatorOptions, RefreshTrigger, UpdateCoordinator, start_health_updater, start_poller,
};
use crate::app::error::AppError;
use crate::app::services::{ActionSettings, CoordinatorService, SqlitePreferenceStore};
use crate::domain::entities::{entities_for_vehicle, render_state};
use crate::domain::status_flags::SystemClock;
use crate::domain::units::HostUnits;

fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

fn build_client(config: &AppConfig) -> Result<Arc<dyn InControlClient>, AppError> {
    match &config.client_mode {
        ClientMode::Vendor => {
            let credentials = Credentials {
                email: config.username.clone(),
                password: config.password.clone(),
                device_id: config.device_id.clone(),
            };
            let client = InControlHttpClient::new(credentials, config.use_china_servers)
                .map_err(AppError::vendor)?;
            Ok(Arc::new(client))
        }
        ClientMode::Replay { script_path } => {
            let client =
                InControlReplayClient::from_file(script_path).map_err(AppError::vendor)?;
            Ok(Arc::new(client))
        }
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let mut connection = open_connection(&config.db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;
    let preferences = SqlitePreferenceStore::new(Arc::new(Mutex::new(connection)));

    // The blocking HTTP client owns its own runtime; it is created and dropped
    // on this thread, outside the actix system.
    let client = build_client(&config)?;
    let host_units = HostUnits::for_system(config.unit_system);
    let temperature_unit = host_units.temperature;

    let coordinator = Arc::new(UpdateCoordinator::new(
        Arc::clone(&client),
        Arc::new(SystemClock),
        CoordinatorOptions {
            account: config.username.clone(),
            host_units,
            pressure_override: config.pressure_unit.clone(),
        },
        Some(Arc::new(preferences)),
    ));

    coordinator.connect().map_err(AppError::vendor)?;
    if !coordinator.refresh() {
        tracing::warn!("initial refresh failed, entities start unavailable");
    }

    let (trigger, signals) = RefreshTrigger::channel();
    let poller_handle = start_poller(
        Arc::clone(&coordinator),
        minutes(config.scan_interval_min),
        signals,
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    let health_handle = (config.health_update_interval_min > 0).then(|| {
        tracing::info!(
            interval_min = config.health_update_interval_min,
            "scheduled health status updates enabled"
        );
        start_health_updater(
            Arc::clone(&coordinator),
            minutes(config.health_update_interval_min),
            Arc::clone(&stop_flag),
        )
    });

    let executor = Arc::new(ServiceExecutor::new(Arc::clone(&client), temperature_unit));
    let service = Arc::new(CoordinatorService::new(
        Arc::clone(&coordinator),
        executor,
        trigger.clone(),
        ActionSettings {
            pin: config.pin.clone(),
            default_climate_temp: config.default_climate_temp,
            service_duration_hours: config.default_service_duration_h,
        },
    ));
    let api_state = ApiState {
        vehicle_queries: Arc::clone(&service) as _,
        vehicle_commands: service,
    };

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allowed_methods(["GET", "POST"])
                .allow_any_header();

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    trigger.shutdown();
    stop_flag.store(true, Ordering::Relaxed);

    let poller_result = poller_handle.join();
    let health_result = health_handle.map(|handle| handle.join()).transpose();
    drop(coordinator);
    drop(client);

    if poller_result.is_err() {
        return Err(AppError::runtime("poller thread panicked"));
    }
    if health_result.is_err() {
        return Err(AppError::runtime("health update thread panicked"));
    }

    server_result.map_err(AppError::runtime)
}

/// Connects, runs one polling cycle and returns the vehicles with their
/// rendered entity states.
pub fn snapshot(config: AppConfig) -> Result<Value, AppError> {
    let client = build_client(&config)?;
    let coordinator = UpdateCoordinator::new(
        Arc::clone(&client),
        Arc::new(SystemClock),
        CoordinatorOptions {
            account: config.username.clone(),
            host_units: HostUnits::for_system(config.unit_system),
            pressure_override: config.pressure_unit.clone(),
        },
        None,
    );

    coordinator.connect().map_err(AppError::vendor)?;
    let success = coordinator.refresh();

    let mut vehicles = Vec::new();
    for vehicle in coordinator.vehicles().map_err(AppError::runtime)? {
        let mut entities = Map::new();
        for descriptor in entities_for_vehicle(&vehicle) {
            let state = render_state(&descriptor, &vehicle, success);
            entities.insert(
                descriptor.entity_id,
                json!({"state": state.state, "attributes": state.attributes}),
            );
        }
        vehicles.push(json!({
            "vin": vehicle.vin,
            "name": vehicle.name,
            "engineType": vehicle.engine_type.as_str(),
            "lastUpdated": vehicle.last_updated,
            "entities": entities,
        }));
    }

    Ok(json!({
        "lastUpdateSuccess": success,
        "user": coordinator.user().map_err(AppError::runtime)?,
        "vehicles": vehicles,
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::minutes;

    #[test]
    fn interval_minutes_do_not_truncate() {
        assert_eq!(minutes(5), Duration::from_secs(300));
        assert_eq!(minutes(1 << 33), Duration::from_secs((1 << 33) * 60));
        assert_eq!(minutes(u64::MAX), Duration::from_secs(u64::MAX));
    }
}
