use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

pub const FUEL_TYPE_BATTERY: &str = "Electric";
pub const FUEL_TYPE_HYBRID: &str = "Hybrid";
pub const FUEL_TYPE_ICE: &str = "ICE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineType {
    Battery,
    Hybrid,
    Ice,
    Unknown,
}

impl EngineType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Battery => FUEL_TYPE_BATTERY,
            Self::Hybrid => FUEL_TYPE_HYBRID,
            Self::Ice => FUEL_TYPE_ICE,
            Self::Unknown => "Unknown",
        }
    }
}

/// Booleans derived from the raw status maps on every poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedStatus {
    pub climate_active: bool,
    pub guardian_mode_active: bool,
    pub is_charging: bool,
    /// Mirrors `PRIVACY_SWITCH == "FALSE"`, i.e. journey recording is on.
    pub privacy_mode_enabled: bool,
    pub transport_mode_enabled: bool,
    pub service_mode_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianState {
    pub capable: bool,
    pub status: Option<String>,
    pub expiry: Option<String>,
}

impl Default for GuardianState {
    fn default() -> Self {
        Self {
            capable: true,
            status: None,
            expiry: None,
        }
    }
}

impl GuardianState {
    pub fn unsupported() -> Self {
        Self {
            capable: false,
            status: None,
            expiry: Some("0".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub formatted_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub vin: String,
    pub name: String,
    pub fuel: String,
    pub engine_type: EngineType,
    pub last_updated: Option<String>,
    pub attributes: BTreeMap<String, Value>,
    pub supported_services: Vec<String>,
    pub status: BTreeMap<String, String>,
    pub status_ev: BTreeMap<String, String>,
    pub position: Option<Position>,
    pub guardian_mode: GuardianState,
    pub last_trip: Option<Value>,
    pub tracked_status: TrackedStatus,
    pub target_climate_temp: f64,
}

impl VehicleRecord {
    pub fn new(vin: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            name: String::new(),
            fuel: "Unknown".to_string(),
            engine_type: EngineType::Unknown,
            last_updated: None,
            attributes: BTreeMap::new(),
            supported_services: Vec::new(),
            status: BTreeMap::new(),
            status_ev: BTreeMap::new(),
            position: None,
            guardian_mode: GuardianState::default(),
            last_trip: None,
            tracked_status: TrackedStatus::default(),
            target_climate_temp: 21.0,
        }
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn supports(&self, service_code: &str) -> bool {
        self.supported_services
            .iter()
            .any(|code| code == service_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUnits {
    pub distance: String,
    pub fuel: String,
    pub temperature: String,
    pub pressure: String,
    pub energy_regenerated: String,
    pub energy_consumed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub units: UserUnits,
    pub units_from_account: bool,
}
