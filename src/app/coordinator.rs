use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::incontrol_client::{ClientError, InControlClient};
use crate::app::services::UnitPreferenceStore;
use crate::domain::diagnostics::field_mask;
use crate::domain::models::{GuardianState, UserRecord, VehicleRecord};
use crate::domain::status_flags::{Clock, classify_engine_type, derive_tracked_status, value_matches};
use crate::domain::telemetry::{
    parse_attributes, parse_climate_target, parse_guardian, parse_last_trip, parse_position,
    parse_status, parse_user, parse_vins, supported_services, unit_preferences,
};
use crate::domain::temperature::raw_target_to_celsius;
use crate::domain::units::HostUnits;

const FALLBACK_CLIMATE_TEMP: f64 = 21.0;
const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("{operation} failed: {source}")]
    Account {
        operation: &'static str,
        source: ClientError,
    },
    #[error("{operation} failed for {vehicle}: {source}")]
    Vehicle {
        operation: &'static str,
        vehicle: String,
        source: ClientError,
    },
    #[error("coordinator state lock poisoned")]
    LockPoisoned,
}

fn account_error(operation: &'static str) -> impl FnOnce(ClientError) -> CoordinatorError {
    move |source| CoordinatorError::Account { operation, source }
}

fn vehicle_error(operation: &'static str, vin: &str) -> impl FnOnce(ClientError) -> CoordinatorError {
    let vehicle = field_mask(vin, 3, 2);
    move |source| CoordinatorError::Vehicle {
        operation,
        vehicle,
        source,
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Account the unit preferences are stored under.
    pub account: String,
    pub host_units: HostUnits,
    pub pressure_override: Option<String>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    user: Option<UserRecord>,
    vehicles: BTreeMap<String, VehicleRecord>,
    last_update_success: bool,
}

pub struct UpdateCoordinator {
    client: Arc<dyn InControlClient>,
    clock: Arc<dyn Clock>,
    options: CoordinatorOptions,
    preferences: Option<Arc<dyn UnitPreferenceStore>>,
    state: RwLock<CoordinatorState>,
}

impl UpdateCoordinator {
    pub fn new(
        client: Arc<dyn InControlClient>,
        clock: Arc<dyn Clock>,
        options: CoordinatorOptions,
        preferences: Option<Arc<dyn UnitPreferenceStore>>,
    ) -> Self {
        Self {
            client,
            clock,
            options,
            preferences,
            state: RwLock::new(CoordinatorState::default()),
        }
    }

    pub fn client(&self) -> &Arc<dyn InControlClient> {
        &self.client
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn host_units(&self) -> &HostUnits {
        &self.options.host_units
    }

    /// Authenticates, loads the account and every vehicle's attributes.
    pub fn connect(&self) -> Result<(), CoordinatorError> {
        info!("connecting to vendor API");
        self.client.connect().map_err(account_error("connect"))?;

        let user = self.load_user()?;
        let vehicles_payload = self
            .client
            .list_vehicles()
            .map_err(account_error("list vehicles"))?;
        let vins = parse_vins(&vehicles_payload);
        if vins.is_empty() {
            warn!("no vehicles found in this account");
        }

        let mut vehicles = BTreeMap::new();
        for vin in vins {
            let attributes = self
                .client
                .get_attributes(&vin)
                .map_err(vehicle_error("get attributes", &vin))?;
            let mut vehicle = VehicleRecord::new(vin.clone());
            apply_attributes(&mut vehicle, &attributes);
            vehicles.insert(vin, vehicle);
        }

        let mut state = self.state.write().map_err(|_| CoordinatorError::LockPoisoned)?;
        state.user = Some(user);
        state.vehicles = vehicles;
        info!(vehicles = state.vehicles.len(), "connected to vendor API");

        Ok(())
    }

    fn load_user(&self) -> Result<UserRecord, CoordinatorError> {
        let user_info = self
            .client
            .get_user_info()
            .map_err(account_error("get user info"))?;

        let stored = self.preferences.as_ref().and_then(|store| {
            store
                .load_units(&self.options.account)
                .inspect_err(|error| warn!(error = %error, "failed to load stored unit preferences"))
                .ok()
                .flatten()
        });

        let user = parse_user(
            &user_info,
            stored.as_deref(),
            &self.options.host_units,
            self.options.pressure_override.as_deref(),
        );

        if let (Some(store), Some(raw)) = (&self.preferences, unit_preferences(&user_info))
            && let Err(error) = store.save_units(&self.options.account, &raw)
        {
            warn!(error = %error, "failed to store unit preferences");
        }

        debug!(units_from_account = user.units_from_account, "user data loaded");
        Ok(user)
    }

    /// Runs one polling cycle. Returns whether it succeeded; a failed cycle
    /// keeps the previous data and marks every entity unavailable.
    pub fn refresh(&self) -> bool {
        let mut vehicles = match self.state.read() {
            Ok(state) => state.vehicles.clone(),
            Err(_) => {
                warn!("coordinator state lock poisoned");
                return false;
            }
        };

        let result = vehicles
            .values_mut()
            .try_for_each(|vehicle| self.update_vehicle(vehicle));

        let Ok(mut state) = self.state.write() else {
            warn!("coordinator state lock poisoned");
            return false;
        };

        match result {
            Ok(()) => {
                for vehicle in vehicles.values() {
                    info!(vehicle = %vehicle.name, "vehicle update received");
                }
                state.vehicles = vehicles;
                state.last_update_success = true;
                true
            }
            Err(error) => {
                warn!(error = %error, "unable to update data from vendor servers");
                state.last_update_success = false;
                false
            }
        }
    }

    fn update_vehicle(&self, vehicle: &mut VehicleRecord) -> Result<(), CoordinatorError> {
        self.update_status(vehicle)?;
        self.update_guardian_mode(vehicle);
        self.update_position(vehicle)?;

        if value_matches(&vehicle.status, "PRIVACY_SWITCH", "FALSE") {
            self.update_last_trip(vehicle)?;
        } else {
            vehicle.last_trip = None;
            debug!(
                vehicle = %vehicle.name,
                "journey recording is disabled, trip data not loaded"
            );
        }

        Ok(())
    }

    fn update_status(&self, vehicle: &mut VehicleRecord) -> Result<(), CoordinatorError> {
        let payload = self
            .client
            .get_status(&vehicle.vin)
            .map_err(vehicle_error("get status", &vehicle.vin))?;
        let status = parse_status(&payload);

        if status.core.is_none() && status.ev.is_none() {
            debug!(vin = %field_mask(&vehicle.vin, 3, 2), "status data is empty");
        }
        if let Some(core) = status.core {
            vehicle.status = core;
            vehicle.last_updated = status.last_updated;
        }
        if let Some(ev) = status.ev {
            vehicle.status_ev = ev;
        }
        vehicle.engine_type = classify_engine_type(&vehicle.fuel, &vehicle.status_ev);

        vehicle.target_climate_temp = match self.client.get_rcc_target_value(&vehicle.vin) {
            Ok(payload) => raw_target_to_celsius(parse_climate_target(&payload)),
            Err(error) => {
                debug!(error = %error, "climate target unavailable");
                FALLBACK_CLIMATE_TEMP
            }
        };

        vehicle.tracked_status = derive_tracked_status(vehicle, self.clock.now());
        Ok(())
    }

    fn update_guardian_mode(&self, vehicle: &mut VehicleRecord) {
        if !vehicle.supports("GMCC") {
            return;
        }

        vehicle.guardian_mode = match self.client.get_guardian_mode_status(&vehicle.vin) {
            Ok(payload) => parse_guardian(&payload),
            Err(error) => {
                debug!(error = %error, "guardian mode not available");
                GuardianState::unsupported()
            }
        };
        vehicle.tracked_status = derive_tracked_status(vehicle, self.clock.now());
    }

    fn update_position(&self, vehicle: &mut VehicleRecord) -> Result<(), CoordinatorError> {
        let payload = self
            .client
            .get_position(&vehicle.vin)
            .map_err(vehicle_error("get position", &vehicle.vin))?;

        vehicle.position = parse_position(&payload);
        if vehicle.position.is_none() {
            debug!(vehicle = %vehicle.name, "no position data received");
        }
        Ok(())
    }

    fn update_last_trip(&self, vehicle: &mut VehicleRecord) -> Result<(), CoordinatorError> {
        let payload = self
            .client
            .get_trips(&vehicle.vin, 1)
            .map_err(vehicle_error("get trips", &vehicle.vin))?;

        vehicle.last_trip = parse_last_trip(&payload);
        Ok(())
    }

    /// Asks every vehicle to report fresh health data. Failures are logged.
    pub fn request_health_updates(&self) {
        let vins: Vec<String> = match self.state.read() {
            Ok(state) => state.vehicles.keys().cloned().collect(),
            Err(_) => return,
        };

        for vin in vins {
            debug!(vin = %field_mask(&vin, 3, 2), "requesting health update");
            if let Err(error) = self.client.invoke(&vin, "get_health_status", &Map::new()) {
                debug!(error = %error, "health status update failed");
            }
        }
    }

    pub fn user(&self) -> Result<Option<UserRecord>, CoordinatorError> {
        let state = self.state.read().map_err(|_| CoordinatorError::LockPoisoned)?;
        Ok(state.user.clone())
    }

    pub fn vehicles(&self) -> Result<Vec<VehicleRecord>, CoordinatorError> {
        let state = self.state.read().map_err(|_| CoordinatorError::LockPoisoned)?;
        Ok(state.vehicles.values().cloned().collect())
    }

    pub fn vehicle(&self, vin: &str) -> Result<Option<VehicleRecord>, CoordinatorError> {
        let state = self.state.read().map_err(|_| CoordinatorError::LockPoisoned)?;
        Ok(state.vehicles.get(vin).cloned())
    }

    pub fn last_update_success(&self) -> bool {
        self.state
            .read()
            .map(|state| state.last_update_success)
            .unwrap_or(false)
    }
}

fn apply_attributes(vehicle: &mut VehicleRecord, payload: &Value) {
    let attributes = parse_attributes(payload);
    if attributes.is_empty() {
        debug!(vin = %field_mask(&vehicle.vin, 3, 2), "attribute data is empty");
        return;
    }

    vehicle.name = attributes
        .get("nickname")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    vehicle.fuel = attributes
        .get("fuelType")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    vehicle.supported_services = supported_services(&attributes);
    vehicle.attributes = attributes;
    vehicle.engine_type = classify_engine_type(&vehicle.fuel, &vehicle.status_ev);

    debug!(
        vin = %field_mask(&vehicle.vin, 3, 2),
        fuel = %vehicle.fuel,
        engine_type = vehicle.engine_type.as_str(),
        "retrieved attribute data"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerSignal {
    Refresh,
    Shutdown,
}

/// Handle for forcing a refresh outside the regular interval.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    sender: Sender<PollerSignal>,
}

impl RefreshTrigger {
    pub fn channel() -> (Self, Receiver<PollerSignal>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }

    pub fn request_now(&self) {
        if self.sender.send(PollerSignal::Refresh).is_err() {
            debug!("poller stopped, refresh request dropped");
        }
    }

    pub fn request_after(&self, delay: Duration) {
        let sender = self.sender.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            let _ = sender.send(PollerSignal::Refresh);
        });
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(PollerSignal::Shutdown);
    }
}

pub fn start_poller(
    coordinator: Arc<UpdateCoordinator>,
    poll_interval: Duration,
    signals: Receiver<PollerSignal>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            match signals.recv_timeout(poll_interval) {
                Ok(PollerSignal::Refresh) | Err(RecvTimeoutError::Timeout) => {
                    coordinator.refresh();
                }
                Ok(PollerSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

pub fn start_health_updater(
    coordinator: Arc<UpdateCoordinator>,
    interval: Duration,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while sleep_unless_stopped(interval, &stop_flag) {
            coordinator.request_health_updates();
        }
    })
}

fn sleep_unless_stopped(duration: Duration, stop_flag: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(STOP_CHECK_INTERVAL);
        std::thread::sleep(step);
        remaining -= step;
    }
    !stop_flag.load(Ordering::Relaxed)
}
