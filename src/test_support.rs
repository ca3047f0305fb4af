use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use serde_json::{Map, Value, json};

use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::incontrol_client::{ClientError, InControlClient};
use crate::app::coordinator::CoordinatorOptions;
use crate::app::services::{ServiceError, UnitPreferenceStore};
use crate::domain::status_flags::Clock;
use crate::domain::units::{HostUnits, UnitSystem};

pub const VIN: &str = "SADHA2B10K1012345";
pub const ACCOUNT: &str = "driver@example.com";

static TEST_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn open_test_connection(test_name: &str) -> Connection {
    let template = ensure_template_db();
    let test_db_path = unique_test_db_path(test_name);

    if let Some(parent) = test_db_path.parent() {
        std::fs::create_dir_all(parent).expect("test db dir should be creatable");
    }

    std::fs::copy(&template, &test_db_path).expect("template db should be copied");
    open_connection(test_db_path.to_string_lossy().as_ref()).expect("test db should open")
}

pub fn shared(connection: Connection) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(connection))
}

fn ensure_template_db() -> PathBuf {
    static TEMPLATE_PATH: OnceLock<PathBuf> = OnceLock::new();

    TEMPLATE_PATH
        .get_or_init(|| {
            let template_path = std::env::var("TEST_DB_TEMPLATE_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| Path::new("./target/testdb/incontrol_template.db").to_path_buf());

            if let Some(parent) = template_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).expect("template parent dir should be creatable");
            }

            let mut connection = open_connection(template_path.to_string_lossy().as_ref())
                .expect("template db opens");
            run_migrations(&mut connection).expect("template migrations should succeed");

            template_path
        })
        .clone()
}

fn unique_test_db_path(test_name: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    Path::new("./target/testdb")
        .join(format!("{test_name}-{now}-{counter}.sqlite"))
        .to_path_buf()
}

/// Always reports 2026-03-01 09:30 UTC unless built with another instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
                .single()
                .expect("fixed instant is valid"),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    units: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn insert(&self, account: &str, raw_units: &str) {
        self.units
            .lock()
            .expect("store lock")
            .insert(account.to_string(), raw_units.to_string());
    }

    pub fn get(&self, account: &str) -> Option<String> {
        self.units.lock().expect("store lock").get(account).cloned()
    }
}

impl UnitPreferenceStore for MemoryPreferenceStore {
    fn load_units(&self, account: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.get(account))
    }

    fn save_units(&self, account: &str, raw_units: &str) -> Result<(), ServiceError> {
        self.insert(account, raw_units);
        Ok(())
    }
}

pub fn coordinator_options() -> CoordinatorOptions {
    CoordinatorOptions {
        account: ACCOUNT.to_string(),
        host_units: HostUnits::for_system(UnitSystem::Metric),
        pressure_override: None,
    }
}

#[derive(Debug)]
enum Scripted {
    /// The last value repeats once the queue is drained to one entry.
    Values(VecDeque<Value>),
    Failure(u16),
}

/// In-memory vendor client. Responses are keyed by method name, optionally
/// narrowed by scope (`get_status:<vin>`, `invoke:<function>`).
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    invocations: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl ScriptedClient {
    pub fn respond(&self, key: &str, value: Value) {
        self.respond_sequence(key, vec![value]);
    }

    pub fn respond_sequence(&self, key: &str, values: Vec<Value>) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(key.to_string(), Scripted::Values(values.into()));
    }

    pub fn fail(&self, key: &str, status: u16) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(key.to_string(), Scripted::Failure(status));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|recorded| recorded.as_str() == call)
            .count()
    }

    pub fn last_invocation(&self) -> Option<(String, Map<String, Value>)> {
        self.invocations.lock().expect("invocations lock").last().cloned()
    }

    fn answer(&self, method: &str, scope: Option<&str>) -> Result<Value, ClientError> {
        let call = match scope {
            Some(scope) => format!("{method}:{scope}"),
            None => method.to_string(),
        };
        self.calls.lock().expect("calls lock").push(call.clone());

        let mut responses = self.responses.lock().expect("responses lock");
        let key = if responses.contains_key(&call) {
            call
        } else {
            method.to_string()
        };

        match responses.get_mut(&key) {
            Some(Scripted::Values(values)) => {
                let value = if values.len() > 1 {
                    values.pop_front()
                } else {
                    values.front().cloned()
                };
                value.ok_or_else(|| not_found(&key))
            }
            Some(Scripted::Failure(status)) => Err(ClientError::Http {
                status: *status,
                message: format!("scripted failure for {key}"),
            }),
            None => Err(not_found(&key)),
        }
    }
}

fn not_found(key: &str) -> ClientError {
    ClientError::Http {
        status: 404,
        message: format!("no scripted response for {key}"),
    }
}

impl InControlClient for ScriptedClient {
    fn connect(&self) -> Result<(), ClientError> {
        self.answer("connect", None).map(|_| ())
    }

    fn list_vehicles(&self) -> Result<Value, ClientError> {
        self.answer("list_vehicles", None)
    }

    fn get_user_info(&self) -> Result<Value, ClientError> {
        self.answer("get_user_info", None)
    }

    fn get_attributes(&self, vin: &str) -> Result<Value, ClientError> {
        self.answer("get_attributes", Some(vin))
    }

    fn get_status(&self, vin: &str) -> Result<Value, ClientError> {
        self.answer("get_status", Some(vin))
    }

    fn get_position(&self, vin: &str) -> Result<Value, ClientError> {
        self.answer("get_position", Some(vin))
    }

    fn get_guardian_mode_status(&self, vin: &str) -> Result<Value, ClientError> {
        self.answer("get_guardian_mode_status", Some(vin))
    }

    fn get_trips(&self, vin: &str, _count: u32) -> Result<Value, ClientError> {
        self.answer("get_trips", Some(vin))
    }

    fn get_rcc_target_value(&self, vin: &str) -> Result<Value, ClientError> {
        self.answer("get_rcc_target_value", Some(vin))
    }

    fn get_services(&self, vin: &str) -> Result<Value, ClientError> {
        self.answer("get_services", Some(vin))
    }

    fn get_service_status(&self, vin: &str, _service_id: &str) -> Result<Value, ClientError> {
        self.answer("get_service_status", Some(vin))
    }

    fn invoke(
        &self,
        _vin: &str,
        function: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ClientError> {
        self.invocations
            .lock()
            .expect("invocations lock")
            .push((function.to_string(), params.clone()));
        self.answer("invoke", Some(function))
    }
}

/// A single electric vehicle with journey recording on and no running services.
pub fn scripted_vehicle_client() -> ScriptedClient {
    let client = ScriptedClient::default();

    client.respond("connect", json!({}));
    client.respond("list_vehicles", json!({"vehicles": [{"vin": VIN, "role": "Primary"}]}));
    client.respond(
        "get_user_info",
        json!({
            "contact": {
                "firstName": "Alex",
                "lastName": "Driver",
                "userPreferences": {
                    "unitsOfMeasurement": "Km Litres Celsius DistPerVol kWhPer100Dist WhPerDist"
                }
            }
        }),
    );
    client.respond(
        "get_attributes",
        json!({
            "nickname": "My Pace",
            "fuelType": "Electric",
            "vehicleBrand": "Jaguar",
            "vehicleType": "I-PACE",
            "registrationNumber": "AB12 CDE",
            "capabilities": [{"capability": "ECC"}],
            "availableServices": [
                {"serviceType": "CP", "vehicleCapable": true, "serviceEnabled": true},
                {"serviceType": "ECC", "vehicleCapable": true, "serviceEnabled": true},
                {"serviceType": "GMCC", "vehicleCapable": true, "serviceEnabled": true},
                {"serviceType": "HBLF", "vehicleCapable": true, "serviceEnabled": true},
                {"serviceType": "RDL", "vehicleCapable": true, "serviceEnabled": true},
                {"serviceType": "RDU", "vehicleCapable": true, "serviceEnabled": true},
                {"serviceType": "REON", "vehicleCapable": false, "serviceEnabled": true}
            ]
        }),
    );
    client.respond(
        "get_status",
        json!({
            "lastUpdatedTime": "2026-03-01T09:00:00+0000",
            "vehicleStatus": {
                "coreStatus": [
                    {"key": "PRIVACY_SWITCH", "value": "FALSE"},
                    {"key": "DOOR_IS_ALL_DOORS_LOCKED", "value": "TRUE"}
                ],
                "evStatus": [
                    {"key": "EV_IS_CHARGING", "value": "TRUE"}
                ]
            }
        }),
    );
    client.respond("get_rcc_target_value", json!({"value": "44"}));
    client.respond("get_guardian_mode_status", json!({"status": "INACTIVE"}));
    client.respond(
        "get_position",
        json!({
            "position": {
                "latitude": 51.507_351_23,
                "longitude": -0.127_758_31,
                "speed": 0,
                "heading": 90
            }
        }),
    );
    client.respond("get_trips", json!({"trips": [{"id": 9001}]}));
    client.respond("get_services", json!({"services": []}));
    client.respond("invoke", json!({"customerServiceId": "svc-0001"}));
    client.respond("get_service_status", json!({"status": "Successful"}));

    client
}
