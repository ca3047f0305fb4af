//! Flattening of the vendor's heterogeneous response shapes. Missing or
//! malformed fields resolve to defaults instead of errors.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::models::{GuardianState, Position, UserRecord};
use crate::domain::units::{HostUnits, parse_user_units};

const ALWAYS_SUPPORTED_SERVICES: &[&str] = &["PM", "SM", "TM"];
const PRECONDITIONING_SERVICES: &[&str] = &["ECCON", "ECCOFF"];
const DEFAULT_RAW_CLIMATE_TARGET: f64 = 42.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPayload {
    pub core: Option<BTreeMap<String, String>>,
    pub ev: Option<BTreeMap<String, String>>,
    pub last_updated: Option<String>,
}

pub fn parse_status(payload: &Value) -> StatusPayload {
    let vehicle_status = payload.get("vehicleStatus");

    StatusPayload {
        core: vehicle_status
            .and_then(|status| status.get("coreStatus"))
            .and_then(flatten_key_values),
        ev: vehicle_status
            .and_then(|status| status.get("evStatus"))
            .and_then(flatten_key_values),
        last_updated: payload
            .get("lastUpdatedTime")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}

/// `[{"key": k, "value": v}, ...]` into a sorted map. Empty lists give `None`.
pub fn flatten_key_values(list: &Value) -> Option<BTreeMap<String, String>> {
    let entries = list.as_array()?;

    let flattened: BTreeMap<String, String> = entries
        .iter()
        .filter_map(|entry| {
            let key = entry.get("key")?.as_str()?;
            let value = match entry.get("value")? {
                Value::Null => return None,
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            Some((key.to_string(), value))
        })
        .collect();

    if flattened.is_empty() {
        None
    } else {
        Some(flattened)
    }
}

pub fn parse_attributes(payload: &Value) -> BTreeMap<String, Value> {
    payload
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(key, _)| key.as_str() != "capabilities")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Vendor services that are both capable and enabled, plus the pseudo
/// services every vehicle gets.
pub fn supported_services(attributes: &BTreeMap<String, Value>) -> Vec<String> {
    let mut services: Vec<String> = attributes
        .get("availableServices")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter(|service| flag(service, "vehicleCapable") && flag(service, "serviceEnabled"))
                .filter_map(|service| service.get("serviceType").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    services.extend(ALWAYS_SUPPORTED_SERVICES.iter().map(|code| code.to_string()));

    if services.iter().any(|code| code == "ECC") {
        services.extend(PRECONDITIONING_SERVICES.iter().map(|code| code.to_string()));
    }

    services
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn parse_guardian(payload: &Value) -> GuardianState {
    GuardianState {
        capable: true,
        status: payload
            .get("status")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        expiry: payload.get("expiry").and_then(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }),
    }
}

/// Accepts both the bare position object and the `{"position": {...}}` envelope.
pub fn parse_position(payload: &Value) -> Option<Position> {
    let position = payload.get("position").unwrap_or(payload);

    Some(Position {
        latitude: position.get("latitude").and_then(parse_f64)?,
        longitude: position.get("longitude").and_then(parse_f64)?,
        speed: position.get("speed").and_then(parse_f64),
        heading: position.get("heading").and_then(parse_f64),
        formatted_address: payload
            .get("address")
            .and_then(|address| address.get("formattedAddress"))
            .and_then(Value::as_str)
            .map(ToString::to_string),
    })
}

pub fn parse_last_trip(payload: &Value) -> Option<Value> {
    payload
        .get("trips")
        .and_then(Value::as_array)
        .and_then(|trips| trips.first())
        .cloned()
}

/// The raw 31..=57 climate target; falls back to 42 (21°C).
pub fn parse_climate_target(payload: &Value) -> f64 {
    payload
        .get("value")
        .and_then(parse_f64)
        .unwrap_or(DEFAULT_RAW_CLIMATE_TARGET)
}

pub fn parse_vins(payload: &Value) -> Vec<String> {
    payload
        .get("vehicles")
        .and_then(Value::as_array)
        .map(|vehicles| {
            vehicles
                .iter()
                .filter_map(|vehicle| vehicle.get("vin").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Raw unit preference string reported by the account, if any.
pub fn unit_preferences(user_info: &Value) -> Option<String> {
    user_info
        .get("contact")
        .and_then(|contact| contact.get("userPreferences"))
        .and_then(|prefs| prefs.get("unitsOfMeasurement"))
        .and_then(Value::as_str)
        .filter(|raw| !raw.is_empty())
        .map(ToString::to_string)
}

pub fn parse_user(
    user_info: &Value,
    stored_units: Option<&str>,
    host: &HostUnits,
    pressure_override: Option<&str>,
) -> UserRecord {
    let contact = user_info.get("contact").cloned().unwrap_or_default();
    let received = unit_preferences(user_info);
    let raw_units = received.as_deref().or(stored_units).unwrap_or_default();

    UserRecord {
        first_name: name_field(&contact, "firstName"),
        middle_name: name_field(&contact, "middleName"),
        last_name: name_field(&contact, "lastName"),
        units: parse_user_units(raw_units, host, pressure_override),
        units_from_account: received.is_some(),
    }
}

fn name_field(contact: &Value, key: &str) -> String {
    contact
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub status: String,
    pub failure_reason: Option<String>,
    pub raw: Map<String, Value>,
}

impl ServiceStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "Started" | "Running")
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.status.as_str(), "Successful" | "MessageDelivered")
    }
}

pub fn parse_service_status(payload: &Value) -> ServiceStatus {
    ServiceStatus {
        status: payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        failure_reason: payload
            .get("failureReason")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        raw: payload.as_object().cloned().unwrap_or_default(),
    }
}

/// Whether the vendor still lists an active service request for the vehicle.
pub fn has_active_services(payload: &Value) -> bool {
    payload
        .get("services")
        .and_then(Value::as_array)
        .is_some_and(|services| !services.is_empty())
}

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
