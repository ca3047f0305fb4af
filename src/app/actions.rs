use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::adapters::incontrol_client::{ClientError, InControlClient};
use crate::domain::catalog::{ActionParam, VendorService, vendor_service};
use crate::domain::diagnostics::field_mask;
use crate::domain::models::VehicleRecord;
use crate::domain::switch_params::expiry_to_epoch_millis;
use crate::domain::telemetry::{ServiceStatus, has_active_services, parse_service_status};
use crate::domain::temperature::{TemperatureUnit, convert_temp_value};

const MONITOR_INTERVAL: Duration = Duration::from_secs(2);
const MAX_MONITOR_POLLS: usize = 150;
const NOT_APPLICABLE_CODE: &str = "NA";

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown service {0}")]
    UnknownService(String),
    #[error("service {service} is not available on this vehicle")]
    Unsupported { service: String },
    #[error("another request is still processing")]
    InProgress,
    #[error("invalid value for {0}")]
    InvalidParameter(&'static str),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("service call finished with status {status}")]
    Failed {
        status: String,
        reason: Option<String>,
    },
    #[error("service call still pending after {0} status checks")]
    Timeout(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub service: String,
    pub success: bool,
    pub status: Option<String>,
    pub failure_reason: Option<String>,
}

impl ActionOutcome {
    fn succeeded(service: &str, status: Option<String>) -> Self {
        Self {
            service: service.to_string(),
            success: true,
            status,
            failure_reason: None,
        }
    }

    fn failed(service: &str, error: &ActionError) -> Self {
        let (status, failure_reason) = match error {
            ActionError::Failed { status, reason } => (Some(status.clone()), reason.clone()),
            other => (None, Some(other.to_string())),
        };
        Self {
            service: service.to_string(),
            success: false,
            status,
            failure_reason,
        }
    }
}

/// Validates, invokes and monitors named vendor services.
pub struct ServiceExecutor {
    client: Arc<dyn InControlClient>,
    temperature_unit: TemperatureUnit,
    monitor_interval: Duration,
}

impl ServiceExecutor {
    pub fn new(client: Arc<dyn InControlClient>, temperature_unit: TemperatureUnit) -> Self {
        Self {
            client,
            temperature_unit,
            monitor_interval: MONITOR_INTERVAL,
        }
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Failures are logged and reported in the outcome rather than returned.
    pub fn execute(
        &self,
        vehicle: &VehicleRecord,
        service_name: &str,
        data: &Map<String, Value>,
    ) -> ActionOutcome {
        match self.try_execute(vehicle, service_name, data) {
            Ok(status) => {
                debug!(service = service_name, vehicle = %vehicle.name, "service call successful");
                ActionOutcome::succeeded(service_name, status)
            }
            Err(ActionError::Client(client_error)) if client_error.is_unauthorized() => {
                warn!(service = service_name, vehicle = %vehicle.name, "unauthorised error calling service");
                ActionOutcome::failed(service_name, &ActionError::Client(client_error))
            }
            Err(action_error) => {
                error!(
                    service = service_name,
                    vehicle = %vehicle.name,
                    error = %action_error,
                    "error calling service"
                );
                ActionOutcome::failed(service_name, &action_error)
            }
        }
    }

    fn try_execute(
        &self,
        vehicle: &VehicleRecord,
        service_name: &str,
        data: &Map<String, Value>,
    ) -> Result<Option<String>, ActionError> {
        let service = vendor_service(service_name)
            .ok_or_else(|| ActionError::UnknownService(service_name.to_string()))?;

        self.validate(vehicle, service)?;
        let params = self.prepare_params(service, data)?;

        debug!(service = service_name, vehicle = %vehicle.name, "calling service");
        let response = self.client.invoke(&vehicle.vin, service.function, &params)?;

        let service_id = match response.get("customerServiceId").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None if response.get("error").is_some() => {
                return Err(ActionError::Failed {
                    status: "Error".to_string(),
                    reason: response.get("error").map(Value::to_string),
                });
            }
            None => return Ok(None),
        };

        let status = self.monitor(&vehicle.vin, &service_id)?;
        Ok(Some(status.status))
    }

    fn validate(&self, vehicle: &VehicleRecord, service: &VendorService) -> Result<(), ActionError> {
        if service.code != NOT_APPLICABLE_CODE && !vehicle.supports(service.code) {
            return Err(ActionError::Unsupported {
                service: service.name.to_string(),
            });
        }

        let active = self.client.get_services(&vehicle.vin)?;
        if has_active_services(&active) {
            return Err(ActionError::InProgress);
        }

        Ok(())
    }

    /// Keeps only the inputs the vendor function accepts, converting
    /// temperatures to the vehicle scale and expiry strings to epoch millis.
    fn prepare_params(
        &self,
        service: &VendorService,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ActionError> {
        let mut params = Map::new();

        for input in service.inputs {
            let Some(value) = data.get(input.key()).filter(|value| !value.is_null()) else {
                continue;
            };

            let converted = match input {
                ActionParam::TargetValue | ActionParam::TargetTemp => {
                    let target = number(value).ok_or(ActionError::InvalidParameter(input.key()))?;
                    convert_temp_value(self.temperature_unit, service.code, target)
                        .map(Value::from)
                        .unwrap_or_else(|| value.clone())
                }
                ActionParam::ExpirationTime => match value {
                    Value::Number(_) => value.clone(),
                    other => other
                        .as_str()
                        .and_then(expiry_to_epoch_millis)
                        .map(Value::from)
                        .ok_or(ActionError::InvalidParameter(input.key()))?,
                },
                _ => value.clone(),
            };

            params.insert(input.key().to_string(), converted);
        }

        Ok(params)
    }

    fn monitor(&self, vin: &str, service_id: &str) -> Result<ServiceStatus, ActionError> {
        let mut status = parse_service_status(&self.client.get_service_status(vin, service_id)?);
        let mut polls = 0;

        while status.is_pending() {
            if polls >= MAX_MONITOR_POLLS {
                return Err(ActionError::Timeout(polls));
            }
            debug!(status = %status.status, "awaiting service call result");
            std::thread::sleep(self.monitor_interval);
            status = parse_service_status(&self.client.get_service_status(vin, service_id)?);
            polls += 1;
        }

        if status.is_successful() {
            return Ok(status);
        }

        let masked = masked_status(&status.raw);
        debug!(status = %masked, "full service status");

        Err(ActionError::Failed {
            status: status.status,
            reason: status.failure_reason,
        })
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn masked_status(raw: &Map<String, Value>) -> Value {
    let mut masked = raw.clone();
    mask_field(&mut masked, "vehicleId", 3, 2);
    mask_field(&mut masked, "customerServiceId", 11, 9);
    Value::Object(masked)
}

fn mask_field(map: &mut Map<String, Value>, key: &str, from_start: usize, from_end: usize) {
    if let Some(Value::String(text)) = map.get_mut(key) {
        *text = field_mask(text, from_start, from_end);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{Map, Value, json};

    use super::{ServiceExecutor, masked_status};
    use crate::domain::models::VehicleRecord;
    use crate::domain::temperature::TemperatureUnit;
    use crate::test_support::{ScriptedClient, VIN, scripted_vehicle_client};

    fn executor(client: &Arc<ScriptedClient>) -> ServiceExecutor {
        ServiceExecutor::new(Arc::clone(client) as _, TemperatureUnit::Celsius)
            .with_monitor_interval(Duration::ZERO)
    }

    fn vehicle(services: &[&str]) -> VehicleRecord {
        let mut vehicle = VehicleRecord::new(VIN);
        vehicle.name = "My Pace".to_string();
        vehicle.supported_services = services.iter().map(|code| code.to_string()).collect();
        vehicle
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn monitors_until_successful() {
        let client = Arc::new(scripted_vehicle_client());
        client.respond_sequence(
            "get_service_status",
            vec![
                json!({"status": "Started"}),
                json!({"status": "Running"}),
                json!({"status": "Successful"}),
            ],
        );

        let outcome = executor(&client).execute(
            &vehicle(&["RDL"]),
            "lock_vehicle",
            &data(json!({"pin": "1234", "entity_id": "lock.my_pace_doors"})),
        );

        assert!(outcome.success);
        assert_eq!(outcome.status.as_deref(), Some("Successful"));
        assert_eq!(client.count(&format!("get_service_status:{VIN}")), 3);
        let (function, params) = client.last_invocation().expect("invoke should be recorded");
        assert_eq!(function, "lock");
        assert_eq!(Value::Object(params), json!({"pin": "1234"}));
    }

    #[test]
    fn rejects_unsupported_service_without_calling_vendor() {
        let client = Arc::new(scripted_vehicle_client());

        let outcome = executor(&client).execute(&vehicle(&["PM"]), "lock_vehicle", &Map::new());

        assert!(!outcome.success);
        assert_eq!(client.count("invoke:lock"), 0);
    }

    #[test]
    fn rejects_when_another_service_is_running() {
        let client = Arc::new(scripted_vehicle_client());
        client.respond("get_services", json!({"services": [{"serviceType": "RDU"}]}));

        let outcome = executor(&client).execute(&vehicle(&["RDL"]), "lock_vehicle", &Map::new());

        assert!(!outcome.success);
        assert_eq!(
            outcome.failure_reason.as_deref(),
            Some("another request is still processing")
        );
        assert_eq!(client.count("invoke:lock"), 0);
    }

    #[test]
    fn response_without_service_id_is_success() {
        let client = Arc::new(scripted_vehicle_client());
        client.respond("invoke", json!({}));

        let outcome = executor(&client).execute(&vehicle(&["HBLF"]), "honk_blink", &Map::new());

        assert!(outcome.success);
        assert_eq!(outcome.status, None);
        assert_eq!(client.count(&format!("get_service_status:{VIN}")), 0);
    }

    #[test]
    fn response_with_error_is_failure() {
        let client = Arc::new(scripted_vehicle_client());
        client.respond("invoke", json!({"error": "denied"}));

        let outcome = executor(&client).execute(&vehicle(&["HBLF"]), "honk_blink", &Map::new());

        assert!(!outcome.success);
    }

    #[test]
    fn failed_status_reports_reason() {
        let client = Arc::new(scripted_vehicle_client());
        client.respond(
            "get_service_status",
            json!({
                "status": "Failed",
                "failureReason": "VehicleAsleep",
                "vehicleId": VIN,
                "customerServiceId": "abcdefghijklmnopqrstuvwxyz"
            }),
        );

        let outcome = executor(&client).execute(&vehicle(&["HBLF"]), "honk_blink", &Map::new());

        assert!(!outcome.success);
        assert_eq!(outcome.status.as_deref(), Some("Failed"));
        assert_eq!(outcome.failure_reason.as_deref(), Some("VehicleAsleep"));
    }

    #[test]
    fn transport_error_is_failure() {
        let client = Arc::new(scripted_vehicle_client());
        client.fail("invoke", 401);

        let outcome = executor(&client).execute(&vehicle(&["HBLF"]), "honk_blink", &Map::new());

        assert!(!outcome.success);
    }

    #[test]
    fn converts_temperature_and_expiry_inputs() {
        let client = Arc::new(scripted_vehicle_client());
        client.respond("invoke", json!({}));
        let executor = executor(&client);

        executor.execute(
            &vehicle(&["REON"]),
            "start_vehicle",
            &data(json!({"pin": "1234", "target_value": 21.0})),
        );
        let (_, engine) = client.last_invocation().expect("engine start recorded");

        executor.execute(
            &vehicle(&["ECC"]),
            "start_preconditioning",
            &data(json!({"target_temp": "22"})),
        );
        let (_, climate) = client.last_invocation().expect("preconditioning recorded");

        executor.execute(
            &vehicle(&["TM"]),
            "enable_transport_mode",
            &data(json!({"pin": "1234", "expiration_time": "2026-03-01 09:41:00"})),
        );
        let (_, transport) = client.last_invocation().expect("transport mode recorded");

        assert_eq!(engine["target_value"], 42);
        assert_eq!(climate["target_temp"], 220);
        assert_eq!(transport["expiration_time"], 1_772_358_060_000_i64);
    }

    #[test]
    fn invalid_expiry_is_rejected_before_invoke() {
        let client = Arc::new(scripted_vehicle_client());

        let outcome = executor(&client).execute(
            &vehicle(&["TM"]),
            "enable_transport_mode",
            &data(json!({"pin": "1234", "expiration_time": "tomorrow"})),
        );

        assert!(!outcome.success);
        assert_eq!(client.count("invoke:enable_transport_mode"), 0);
    }

    #[test]
    fn unknown_service_is_failure() {
        let client = Arc::new(scripted_vehicle_client());

        let outcome = executor(&client).execute(&vehicle(&[]), "launch_rocket", &Map::new());

        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason.as_deref(), Some("unknown service launch_rocket"));
    }

    #[test]
    fn failed_status_log_masks_identifiers() {
        let raw = data(json!({
            "status": "Failed",
            "vehicleId": VIN,
            "customerServiceId": "abcdefghijklmnopqrstuvwxyz"
        }));

        let masked = masked_status(&raw);

        assert_eq!(masked["status"], "Failed");
        assert_eq!(masked["vehicleId"], "SADxxxxxxxxxxxx45");
        assert_eq!(masked["customerServiceId"], "abcdefghijkxxxxxxrstuvwxyz");
    }
}
