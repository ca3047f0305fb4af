use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::db;
use crate::adapters::db::{DbError, UnitPreferenceRecord};
use crate::app::actions::{ActionOutcome, ServiceExecutor};
use crate::app::coordinator::{CoordinatorError, RefreshTrigger, UpdateCoordinator};
use crate::domain::catalog::{ActionParam, button_descriptor, switch_descriptor, vendor_service};
use crate::domain::diagnostics::build_diagnostics;
use crate::domain::entities::{
    EntityDescriptor, EntityState, Platform, entities_for_vehicle, render_state,
};
use crate::domain::models::{UserRecord, VehicleRecord};
use crate::domain::switch_params::{ActionContext, build_action_params};

pub const SWITCH_REFRESH_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
    #[error("vehicle state unavailable: {0}")]
    State(#[from] CoordinatorError),
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    #[error("service {service} is not supported by {entity_id}")]
    UnsupportedService { entity_id: String, service: String },
    #[error("unable to perform {0}: no PIN configured")]
    PinRequired(String),
}

pub trait UnitPreferenceStore: Send + Sync {
    fn load_units(&self, account: &str) -> Result<Option<String>, ServiceError>;
    fn save_units(&self, account: &str, raw_units: &str) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SqlitePreferenceStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqlitePreferenceStore {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }

    pub fn schema_version(&self) -> Result<u32, ServiceError> {
        self.with_connection(db::schema_version)
    }
}

impl UnitPreferenceStore for SqlitePreferenceStore {
    fn load_units(&self, account: &str) -> Result<Option<String>, ServiceError> {
        let record = self.with_connection(|connection| db::load_unit_preferences(connection, account))?;
        Ok(record.map(|record| record.raw_units))
    }

    fn save_units(&self, account: &str, raw_units: &str) -> Result<(), ServiceError> {
        let record = UnitPreferenceRecord {
            account: account.to_string(),
            raw_units: raw_units.to_string(),
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.with_connection(|connection| db::save_unit_preferences(connection, &record))
    }
}

/// An entity description merged with its current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub platform: Platform,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub available: bool,
}

impl EntityView {
    fn new(descriptor: EntityDescriptor, state: EntityState) -> Self {
        Self {
            entity_id: descriptor.entity_id,
            unique_id: descriptor.unique_id,
            name: descriptor.name,
            icon: descriptor.icon,
            platform: descriptor.platform,
            state: state.state,
            attributes: state.attributes,
            available: state.available,
        }
    }
}

pub trait VehicleQueryHandler: Send + Sync {
    fn last_update_success(&self) -> bool;
    fn user(&self) -> Result<Option<UserRecord>, ServiceError>;
    fn vehicles(&self) -> Result<Vec<VehicleRecord>, ServiceError>;
    fn vehicle(&self, vin: &str) -> Result<Option<VehicleRecord>, ServiceError>;
    fn entities(&self) -> Result<Vec<EntityView>, ServiceError>;
    fn entity(&self, entity_id: &str) -> Result<Option<EntityView>, ServiceError>;
    fn diagnostics(&self) -> Result<Value, ServiceError>;
}

pub trait VehicleCommandHandler: Send + Sync {
    fn call_service(
        &self,
        entity_id: &str,
        service: &str,
        data: &Map<String, Value>,
    ) -> Result<ActionOutcome, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub pin: Option<String>,
    pub default_climate_temp: f64,
    pub service_duration_hours: i64,
}

#[derive(Clone)]
pub struct CoordinatorService {
    coordinator: Arc<UpdateCoordinator>,
    executor: Arc<ServiceExecutor>,
    refresh: RefreshTrigger,
    settings: ActionSettings,
    switch_refresh_delay: Duration,
}

impl CoordinatorService {
    pub fn new(
        coordinator: Arc<UpdateCoordinator>,
        executor: Arc<ServiceExecutor>,
        refresh: RefreshTrigger,
        settings: ActionSettings,
    ) -> Self {
        Self {
            coordinator,
            executor,
            refresh,
            settings,
            switch_refresh_delay: SWITCH_REFRESH_DELAY,
        }
    }

    pub fn with_switch_refresh_delay(mut self, delay: Duration) -> Self {
        self.switch_refresh_delay = delay;
        self
    }

    fn find_entity(
        &self,
        entity_id: &str,
    ) -> Result<Option<(EntityDescriptor, VehicleRecord)>, ServiceError> {
        for vehicle in self.coordinator.vehicles()? {
            if let Some(descriptor) = entities_for_vehicle(&vehicle)
                .into_iter()
                .find(|entity| entity.entity_id == entity_id)
            {
                return Ok(Some((descriptor, vehicle)));
            }
        }
        Ok(None)
    }

    fn require_pin(&self, action: &str) -> Result<&str, ServiceError> {
        self.settings.pin.as_deref().ok_or_else(|| {
            warn!(action, "cannot perform action, PIN not set in options");
            ServiceError::PinRequired(action.to_string())
        })
    }

    fn toggle_switch(
        &self,
        descriptor: &EntityDescriptor,
        vehicle: &VehicleRecord,
        turn_on: bool,
    ) -> Result<ActionOutcome, ServiceError> {
        let switch = descriptor
            .code
            .and_then(switch_descriptor)
            .ok_or_else(|| ServiceError::UnknownEntity(descriptor.entity_id.clone()))?;

        let pin = if switch.requires_pin() {
            Some(self.require_pin(&descriptor.name)?)
        } else {
            self.settings.pin.as_deref()
        };
        let context = ActionContext {
            pin,
            default_climate_temp: self.settings.default_climate_temp,
            service_duration_hours: self.settings.service_duration_hours,
        };
        let params = build_action_params(switch, turn_on, &context, self.coordinator.clock().now());

        let outcome = self
            .executor
            .execute(vehicle, switch.service_for(turn_on), &params);
        self.refresh.request_after(self.switch_refresh_delay);
        Ok(outcome)
    }

    fn run_with_pin(
        &self,
        vehicle: &VehicleRecord,
        service_name: &str,
        action: &str,
    ) -> Result<ActionOutcome, ServiceError> {
        let pin = self.require_pin(action)?;
        let mut params = Map::new();
        params.insert(ActionParam::Pin.key().to_string(), Value::from(pin));
        Ok(self.executor.execute(vehicle, service_name, &params))
    }

    fn run_named_service(
        &self,
        vehicle: &VehicleRecord,
        service_name: &str,
        data: &Map<String, Value>,
    ) -> Result<ActionOutcome, ServiceError> {
        let mut params = data.clone();
        let needs_pin = vendor_service(service_name)
            .is_some_and(|service| service.inputs.contains(&ActionParam::Pin));

        if needs_pin && !params.contains_key(ActionParam::Pin.key()) {
            let pin = self.require_pin(service_name)?;
            params.insert(ActionParam::Pin.key().to_string(), Value::from(pin));
        }

        let outcome = self.executor.execute(vehicle, service_name, &params);
        self.refresh.request_now();
        Ok(outcome)
    }
}

impl VehicleQueryHandler for CoordinatorService {
    fn last_update_success(&self) -> bool {
        self.coordinator.last_update_success()
    }

    fn user(&self) -> Result<Option<UserRecord>, ServiceError> {
        Ok(self.coordinator.user()?)
    }

    fn vehicles(&self) -> Result<Vec<VehicleRecord>, ServiceError> {
        Ok(self.coordinator.vehicles()?)
    }

    fn vehicle(&self, vin: &str) -> Result<Option<VehicleRecord>, ServiceError> {
        Ok(self.coordinator.vehicle(vin)?)
    }

    fn entities(&self) -> Result<Vec<EntityView>, ServiceError> {
        let available = self.coordinator.last_update_success();
        let mut views = Vec::new();

        for vehicle in self.coordinator.vehicles()? {
            for descriptor in entities_for_vehicle(&vehicle) {
                let state = render_state(&descriptor, &vehicle, available);
                views.push(EntityView::new(descriptor, state));
            }
        }

        Ok(views)
    }

    fn entity(&self, entity_id: &str) -> Result<Option<EntityView>, ServiceError> {
        let available = self.coordinator.last_update_success();
        Ok(self.find_entity(entity_id)?.map(|(descriptor, vehicle)| {
            let state = render_state(&descriptor, &vehicle, available);
            EntityView::new(descriptor, state)
        }))
    }

    fn diagnostics(&self) -> Result<Value, ServiceError> {
        let user = self.coordinator.user()?;
        let vehicles = self.coordinator.vehicles()?;
        Ok(build_diagnostics(user.as_ref(), &vehicles))
    }
}

impl VehicleCommandHandler for CoordinatorService {
    fn call_service(
        &self,
        entity_id: &str,
        service: &str,
        data: &Map<String, Value>,
    ) -> Result<ActionOutcome, ServiceError> {
        let (descriptor, vehicle) = self
            .find_entity(entity_id)?
            .ok_or_else(|| ServiceError::UnknownEntity(entity_id.to_string()))?;

        debug!(entity_id, service, "service call received");

        match (descriptor.platform, service) {
            (Platform::Switch, "turn_on") => self.toggle_switch(&descriptor, &vehicle, true),
            (Platform::Switch, "turn_off") => self.toggle_switch(&descriptor, &vehicle, false),
            (Platform::Lock, "lock" | "unlock") => {
                let service_name = if service == "lock" {
                    "lock_vehicle"
                } else {
                    "unlock_vehicle"
                };
                let outcome = self.run_with_pin(&vehicle, service_name, service)?;
                self.refresh.request_now();
                Ok(outcome)
            }
            (Platform::Button, "press") => {
                let button = descriptor
                    .code
                    .and_then(button_descriptor)
                    .ok_or_else(|| ServiceError::UnknownEntity(entity_id.to_string()))?;
                self.run_with_pin(&vehicle, button.service, &descriptor.name)
            }
            (_, name) if vendor_service(name).is_some() => {
                self.run_named_service(&vehicle, name, data)
            }
            _ => Err(ServiceError::UnsupportedService {
                entity_id: entity_id.to_string(),
                service: service.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{Map, Value, json};

    use super::{
        ActionSettings, CoordinatorService, ServiceError, SqlitePreferenceStore,
        UnitPreferenceStore, VehicleCommandHandler, VehicleQueryHandler,
    };
    use crate::app::actions::ServiceExecutor;
    use crate::app::coordinator::{PollerSignal, RefreshTrigger, UpdateCoordinator};
    use crate::domain::temperature::TemperatureUnit;
    use crate::test_support::{
        FixedClock, ScriptedClient, coordinator_options, open_test_connection,
        scripted_vehicle_client, shared,
    };

    fn service(
        client: &Arc<ScriptedClient>,
        pin: Option<&str>,
    ) -> (CoordinatorService, std::sync::mpsc::Receiver<PollerSignal>) {
        let coordinator = Arc::new(UpdateCoordinator::new(
            Arc::clone(client) as _,
            Arc::new(FixedClock::default()),
            coordinator_options(),
            None,
        ));
        coordinator.connect().expect("connect should succeed");
        assert!(coordinator.refresh());

        let executor = Arc::new(
            ServiceExecutor::new(Arc::clone(client) as _, TemperatureUnit::Celsius)
                .with_monitor_interval(Duration::ZERO),
        );
        let (trigger, signals) = RefreshTrigger::channel();
        let service = CoordinatorService::new(
            coordinator,
            executor,
            trigger,
            ActionSettings {
                pin: pin.map(ToString::to_string),
                default_climate_temp: 21.0,
                service_duration_hours: 24,
            },
        )
        .with_switch_refresh_delay(Duration::ZERO);

        (service, signals)
    }

    #[test]
    fn lists_entities_with_availability() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, Some("1234"));

        let entities = service.entities().expect("entities should load");
        let charging = entities
            .iter()
            .find(|entity| entity.entity_id == "switch.my_pace_charging")
            .expect("charging switch should exist");

        assert_eq!(charging.state, "on");
        assert!(charging.available);
        assert!(
            entities
                .iter()
                .any(|entity| entity.entity_id == "device_tracker.my_pace_device_tracker")
        );

        let trip = entities
            .iter()
            .find(|entity| entity.entity_id == "sensor.my_pace_last_trip")
            .expect("last trip sensor should exist");
        assert_eq!(trip.attributes["id"], 9001);
        assert_eq!(trip.state, "unknown");
    }

    #[test]
    fn switch_without_pin_fails_before_vendor_call() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, None);

        let err = service
            .call_service("switch.my_pace_guardian_mode", "turn_on", &Map::new())
            .expect_err("pin is required");

        assert!(matches!(err, ServiceError::PinRequired(_)));
        assert!(client.last_invocation().is_none());
    }

    #[test]
    fn switch_turn_on_sends_assembled_params_and_schedules_refresh() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, signals) = service(&client, Some("1234"));

        let outcome = service
            .call_service("switch.my_pace_guardian_mode", "turn_on", &Map::new())
            .expect("call should run");

        assert!(outcome.success);
        let (function, params) = client.last_invocation().expect("invoke recorded");
        assert_eq!(function, "enable_guardian_mode");
        assert_eq!(params["pin"], "1234");
        assert!(params["expiration_time"].is_i64());
        assert_eq!(
            signals.recv_timeout(Duration::from_secs(5)),
            Ok(PollerSignal::Refresh)
        );
    }

    #[test]
    fn charging_turn_off_calls_stop_function() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, Some("1234"));

        service
            .call_service("switch.my_pace_charging", "turn_off", &Map::new())
            .expect("call should run");

        let (function, params) = client.last_invocation().expect("invoke recorded");
        assert_eq!(function, "charging_stop");
        assert!(params.is_empty());
    }

    #[test]
    fn lock_uses_configured_pin() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, Some("1234"));

        let outcome = service
            .call_service("lock.my_pace_doors", "unlock", &Map::new())
            .expect("call should run");

        assert!(outcome.success);
        let (function, params) = client.last_invocation().expect("invoke recorded");
        assert_eq!(function, "unlock");
        assert_eq!(Value::Object(params), json!({"pin": "1234"}));
    }

    #[test]
    fn button_press_requires_pin() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, None);

        let err = service
            .call_service("button.my_pace_honk_blink", "press", &Map::new())
            .expect_err("pin is required");

        assert!(matches!(err, ServiceError::PinRequired(_)));
    }

    #[test]
    fn named_vendor_service_receives_caller_data() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, Some("1234"));
        let data = json!({"max_charge_level": 80})
            .as_object()
            .cloned()
            .unwrap_or_default();

        let outcome = service
            .call_service("lock.my_pace_doors", "set_max_charge_level", &data)
            .expect("call should run");

        assert!(outcome.success);
        let (function, params) = client.last_invocation().expect("invoke recorded");
        assert_eq!(function, "set_max_soc");
        assert_eq!(Value::Object(params), json!({"max_charge_level": 80}));
    }

    #[test]
    fn unknown_entity_and_service_are_rejected() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, Some("1234"));

        assert!(matches!(
            service.call_service("switch.nope", "turn_on", &Map::new()),
            Err(ServiceError::UnknownEntity(_))
        ));
        assert!(matches!(
            service.call_service("lock.my_pace_doors", "turn_on", &Map::new()),
            Err(ServiceError::UnsupportedService { .. })
        ));
    }

    #[test]
    fn diagnostics_mask_vins() {
        let client = Arc::new(scripted_vehicle_client());
        let (service, _signals) = service(&client, Some("1234"));

        let diagnostics = service.diagnostics().expect("diagnostics should build");

        assert!(diagnostics.get("SADHA2B10K1XXXXXX").is_some());
        assert_eq!(diagnostics["user"]["firstName"], "Alex");
    }

    #[test]
    fn sqlite_store_round_trips_units() {
        let store = SqlitePreferenceStore::new(shared(open_test_connection("unit-store")));

        assert_eq!(store.load_units("driver@example.com").expect("load"), None);
        store
            .save_units("driver@example.com", "Km Litres Celsius X kWh Wh")
            .expect("save should succeed");

        assert_eq!(
            store.load_units("driver@example.com").expect("load").as_deref(),
            Some("Km Litres Celsius X kWh Wh")
        );
        assert_eq!(store.schema_version().expect("version"), 1);
    }
}
