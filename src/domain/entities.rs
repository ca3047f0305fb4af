use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::catalog::{BUTTONS, SWITCHES, button_descriptor, switch_descriptor};
use crate::domain::models::VehicleRecord;
use crate::domain::status_flags::{parse_timestamp, value_matches};

const DOOR_STATUS_KEYS: &[(&str, &str)] = &[
    ("front left", "DOOR_FRONT_LEFT_LOCK_STATUS"),
    ("front right", "DOOR_FRONT_RIGHT_LOCK_STATUS"),
    ("rear left", "DOOR_REAR_LEFT_LOCK_STATUS"),
    ("rear right", "DOOR_REAR_RIGHT_LOCK_STATUS"),
    ("bonnet", "DOOR_ENGINE_HOOD_LOCK_STATUS"),
    ("boot", "DOOR_BOOT_LOCK_STATUS"),
];

const DOOR_POSITION_KEYS: &[(&str, &str)] = &[
    ("front left", "DOOR_FRONT_LEFT_POSITION"),
    ("front right", "DOOR_FRONT_RIGHT_POSITION"),
    ("rear left", "DOOR_REAR_LEFT_POSITION"),
    ("rear right", "DOOR_REAR_RIGHT_POSITION"),
    ("bonnet", "DOOR_ENGINE_HOOD_POSITION"),
    ("boot", "DOOR_BOOT_POSITION"),
];

const CAR_INFO_ATTRIBUTES: &[(&str, &str)] = &[
    ("registration", "registrationNumber"),
    ("model year", "modelYear"),
    ("make", "vehicleBrand"),
    ("model", "vehicleType"),
    ("body", "bodyType"),
    ("colour", "exteriorColorName"),
    ("doors", "numberOfDoors"),
    ("seats", "seatsQuantity"),
    ("engine", "engineCode"),
    ("transmission", "gearboxCode"),
    ("fuel", "fuelType"),
    ("weight", "grossWeight"),
];

const TYRE_STATUS_KEYS: &[(&str, &str)] = &[
    ("front left", "TYRE_STATUS_FRONT_LEFT"),
    ("front right", "TYRE_STATUS_FRONT_RIGHT"),
    ("rear left", "TYRE_STATUS_REAR_LEFT"),
    ("rear right", "TYRE_STATUS_REAR_RIGHT"),
];

const TYRE_PRESSURE_KEYS: &[(&str, &str)] = &[
    ("front left", "TYRE_PRESSURE_FRONT_LEFT"),
    ("front right", "TYRE_PRESSURE_FRONT_RIGHT"),
    ("rear left", "TYRE_PRESSURE_REAR_LEFT"),
    ("rear right", "TYRE_PRESSURE_REAR_RIGHT"),
];

const WINDOW_STATUS_KEYS: &[(&str, &str)] = &[
    ("front left", "WINDOW_FRONT_LEFT_STATUS"),
    ("front right", "WINDOW_FRONT_RIGHT_STATUS"),
    ("rear left", "WINDOW_REAR_LEFT_STATUS"),
    ("rear right", "WINDOW_REAR_RIGHT_STATUS"),
    ("sunroof", "IS_SUNROOF_OPEN"),
];

const SERVICE_STATUS_KEYS: &[(&str, &str)] = &[
    ("brake fluid", "BRAKE_FLUID_WARN"),
    ("coolant level", "ENG_COOLANT_LEVEL_WARN"),
    ("DPF", "EXT_PARTICULATE_FILTER_WARN"),
    ("engine blockage", "ENGINE_BLOCK"),
    ("exhaust fluid", "EXT_EXHAUST_FLUID_WARN"),
    ("oil level", "EXT_OIL_LEVEL_WARN"),
    ("washer fluid", "WASHER_FLUID_WARN"),
];

const SERVICE_STATUS_OK: &[&str] = &["CLEAR", "FUNCTIONING", "NORMAL", "NORMAL_UNBLOCKED"];

/// Tyre pressures arrive in centibar.
const PSI_PER_BAR: f64 = 14.5038;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Info,
    Windows,
    Tyres,
    ServiceInfo,
    Range,
    LastTrip,
}

impl Sensor {
    const ALWAYS: [Self; 5] = [
        Self::Info,
        Self::Windows,
        Self::Tyres,
        Self::ServiceInfo,
        Self::Range,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Windows => "windows",
            Self::Tyres => "tyres",
            Self::ServiceInfo => "service info",
            Self::Range => "range",
            Self::LastTrip => "last trip",
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Self::Info => "mdi:car",
            Self::Windows => "mdi:car-door",
            Self::Tyres => "mdi:car-tire-alert",
            Self::ServiceInfo => "mdi:wrench",
            Self::Range => "mdi:gas-station",
            Self::LastTrip => "mdi:map-marker-path",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Switch,
    Lock,
    Button,
    DeviceTracker,
    Sensor,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Lock => "lock",
            Self::Button => "button",
            Self::DeviceTracker => "device_tracker",
            Self::Sensor => "sensor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub platform: Platform,
    pub vin: String,
    /// Service code backing a switch or button.
    pub code: Option<&'static str>,
    pub sensor: Option<Sensor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub state: String,
    pub attributes: Map<String, Value>,
    pub available: bool,
}

pub fn entities_for_vehicle(vehicle: &VehicleRecord) -> Vec<EntityDescriptor> {
    let mut entities = Vec::new();

    for switch in SWITCHES.iter().filter(|switch| vehicle.supports(switch.code)) {
        entities.push(describe(
            vehicle,
            Platform::Switch,
            switch.name,
            switch.icon,
            Some(switch.code),
        ));
    }

    if vehicle.supports("RDL") || vehicle.supports("RDU") {
        entities.push(describe(vehicle, Platform::Lock, "doors", "mdi:car-key", None));
    }

    for button in BUTTONS.iter().filter(|button| vehicle.supports(button.code)) {
        entities.push(describe(
            vehicle,
            Platform::Button,
            button.name,
            button.icon,
            Some(button.code),
        ));
    }

    if vehicle.position.is_some() {
        entities.push(describe(
            vehicle,
            Platform::DeviceTracker,
            "device tracker",
            "mdi:car-connected",
            None,
        ));
    }

    let trip = vehicle.last_trip.is_some().then_some(Sensor::LastTrip);
    for sensor in Sensor::ALWAYS.into_iter().chain(trip) {
        let mut entity = describe(vehicle, Platform::Sensor, sensor.name(), sensor.icon(), None);
        entity.sensor = Some(sensor);
        entities.push(entity);
    }

    entities
}

fn describe(
    vehicle: &VehicleRecord,
    platform: Platform,
    name: &str,
    icon: &'static str,
    code: Option<&'static str>,
) -> EntityDescriptor {
    let nickname = vehicle
        .attribute_str("nickname")
        .unwrap_or(vehicle.vin.as_str());
    let prefix = format!(
        "{}{}-{}",
        vehicle.attribute_str("vehicleBrand").unwrap_or_default(),
        vehicle.attribute_str("vehicleType").unwrap_or_default(),
        vin_suffix(&vehicle.vin),
    );

    EntityDescriptor {
        entity_id: format!(
            "{}.{}_{}",
            platform.as_str(),
            slugify(nickname),
            slugify(name)
        ),
        unique_id: format!("{prefix}-{name}"),
        name: format!("{nickname} {}", title_case(name)),
        icon,
        platform,
        vin: vehicle.vin.clone(),
        code,
        sensor: None,
    }
}

pub fn render_state(
    descriptor: &EntityDescriptor,
    vehicle: &VehicleRecord,
    available: bool,
) -> EntityState {
    let mut attributes = Map::new();

    let state = match descriptor.platform {
        Platform::Switch => {
            let switch = descriptor.code.and_then(switch_descriptor);
            if let Some(switch) = switch {
                for attribute in switch.attributes {
                    let value = (attribute.value)(vehicle).map(|raw| local_time_or_raw(&raw));
                    attributes.insert(
                        attribute.name.to_string(),
                        value.map(Value::from).unwrap_or(Value::Null),
                    );
                }
            }
            let is_on = switch.is_some_and(|switch| (switch.state)(&vehicle.tracked_status));
            on_off(is_on)
        }
        Platform::Lock => {
            door_attributes(vehicle, &mut attributes);
            if value_matches(&vehicle.status, "DOOR_IS_ALL_DOORS_LOCKED", "TRUE") {
                "locked".to_string()
            } else {
                "unlocked".to_string()
            }
        }
        Platform::Button => {
            if let Some(button) = descriptor.code.and_then(button_descriptor) {
                attributes.insert("service".to_string(), Value::from(button.service));
            }
            "unknown".to_string()
        }
        Platform::DeviceTracker => match &vehicle.position {
            Some(position) => {
                attributes.insert("latitude".to_string(), Value::from(round8(position.latitude)));
                attributes.insert(
                    "longitude".to_string(),
                    Value::from(round8(position.longitude)),
                );
                attributes.insert("speed".to_string(), Value::from(position.speed));
                attributes.insert("heading".to_string(), Value::from(position.heading));
                attributes.insert(
                    "location".to_string(),
                    Value::from(position.formatted_address.clone()),
                );
                attributes.insert("source_type".to_string(), Value::from("gps"));
                "not_home".to_string()
            }
            None => "unknown".to_string(),
        },
        Platform::Sensor => match descriptor.sensor {
            Some(sensor) => render_sensor(sensor, vehicle, &mut attributes),
            None => "unknown".to_string(),
        },
    };

    EntityState {
        state,
        attributes,
        available,
    }
}

fn render_sensor(sensor: Sensor, vehicle: &VehicleRecord, attributes: &mut Map<String, Value>) -> String {
    match sensor {
        Sensor::Info => {
            for (label, key) in CAR_INFO_ATTRIBUTES {
                let value = vehicle.attributes.get(*key).cloned().unwrap_or(Value::Null);
                attributes.insert(title_case(label), value);
            }
            if let Some(km) = status_number(vehicle, "ODOMETER_METERS").map(|meters| meters / 1000.0) {
                attributes.insert("Odometer".to_string(), Value::from(km.trunc() as i64));
            }
            vehicle
                .attribute_str("registrationNumber")
                .unwrap_or("unknown")
                .to_string()
        }
        Sensor::Windows => {
            status_attributes(vehicle, WINDOW_STATUS_KEYS, " Position", attributes);
            let closed = WINDOW_STATUS_KEYS.iter().all(|(_, key)| {
                matches!(vehicle.status.get(*key).map(String::as_str), Some("CLOSED" | "FALSE"))
            });
            let state = if closed { "Closed" } else { "Open" };
            state.to_string()
        }
        Sensor::Tyres => {
            status_attributes(vehicle, TYRE_STATUS_KEYS, " Status", attributes);
            for (tyre, key) in TYRE_PRESSURE_KEYS {
                if let Some(centibar) = status_number(vehicle, key) {
                    let psi = (centibar / 100.0 * PSI_PER_BAR * 10.0).round() / 10.0;
                    attributes.insert(format!("{} Pressure (PSI)", title_case(tyre)), Value::from(psi));
                }
            }
            let normal = TYRE_STATUS_KEYS
                .iter()
                .all(|(_, key)| value_matches(&vehicle.status, key, "NORMAL"));
            ok_or_warning(normal)
        }
        Sensor::ServiceInfo => {
            status_attributes(vehicle, SERVICE_STATUS_KEYS, "", attributes);
            let healthy = SERVICE_STATUS_KEYS.iter().all(|(_, key)| {
                vehicle
                    .status
                    .get(*key)
                    .is_some_and(|value| SERVICE_STATUS_OK.contains(&value.as_str()))
            });
            ok_or_warning(healthy)
        }
        Sensor::Range => {
            attributes.insert(
                "Fuel Type".to_string(),
                vehicle.attributes.get("fuelType").cloned().unwrap_or(Value::Null),
            );
            if let Some(level) = vehicle.status.get("FUEL_LEVEL_PERC") {
                attributes.insert("Fuel Level".to_string(), Value::from(format!("{level}%")));
            }
            attributes.insert("unit_of_measurement".to_string(), Value::from("km"));
            vehicle
                .status
                .get("DISTANCE_TO_EMPTY_FUEL")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string())
        }
        Sensor::LastTrip => {
            let Some(trip) = &vehicle.last_trip else {
                return "unknown".to_string();
            };
            if let Some(id) = trip.get("id") {
                attributes.insert("id".to_string(), id.clone());
            }
            let details = trip.get("tripDetails").and_then(Value::as_object);
            for (key, value) in details.into_iter().flatten() {
                if !value.is_object() && !value.is_array() {
                    attributes.insert(key.clone(), value.clone());
                }
            }
            attributes.insert("unit_of_measurement".to_string(), Value::from("km"));
            details
                .and_then(|details| details.get("distance"))
                .and_then(Value::as_f64)
                .map(|meters| format!("{:.1}", meters / 1000.0))
                .unwrap_or_else(|| "unknown".to_string())
        }
    }
}

fn status_attributes(
    vehicle: &VehicleRecord,
    keys: &[(&str, &str)],
    suffix: &str,
    attributes: &mut Map<String, Value>,
) {
    for (label, key) in keys {
        if let Some(value) = vehicle.status.get(*key) {
            attributes.insert(
                format!("{}{suffix}", title_case(label)),
                Value::from(title_case(value)),
            );
        }
    }
}

fn status_number(vehicle: &VehicleRecord, key: &str) -> Option<f64> {
    vehicle.status.get(key)?.trim().parse().ok()
}

fn ok_or_warning(ok: bool) -> String {
    let state = if ok { "Ok" } else { "Warning" };
    state.to_string()
}

fn on_off(is_on: bool) -> String {
    let state = if is_on { "on" } else { "off" };
    state.to_string()
}

fn door_attributes(vehicle: &VehicleRecord, attributes: &mut Map<String, Value>) {
    let groups = [(DOOR_STATUS_KEYS, "Status"), (DOOR_POSITION_KEYS, "Position")];
    for (keys, suffix) in groups {
        for (door, key) in keys {
            if let Some(value) = vehicle.status.get(*key)
                && !value.is_empty()
                && value != "UNKNOWN"
            {
                attributes.insert(
                    format!("{} {suffix}", title_case(door)),
                    Value::from(title_case(value)),
                );
            }
        }
    }
}

fn local_time_or_raw(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|timestamp| timestamp.with_timezone(&Local).to_rfc3339())
        .unwrap_or_else(|| raw.to_string())
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

fn vin_suffix(vin: &str) -> &str {
    let start = vin.len().saturating_sub(6);
    vin.get(start..).unwrap_or(vin)
}

pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for char in value.chars().flat_map(char::to_lowercase) {
        if char.is_ascii_alphanumeric() {
            slug.push(char);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Upper-cases the first letter of every word, lower-cases the rest.
pub fn title_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for char in value.chars() {
        if char.is_alphabetic() {
            if previous_is_letter {
                result.extend(char.to_lowercase());
            } else {
                result.extend(char.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            result.push(char);
            previous_is_letter = false;
        }
    }
    result
}
