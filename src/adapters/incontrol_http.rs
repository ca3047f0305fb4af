use std::sync::Mutex;
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, Timelike};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::adapters::incontrol_client::{ClientError, InControlClient};

const REQUEST_TIMEOUT_SECONDS: u64 = 30;
const BASIC_AUTH: &str = "Basic YXM6YXNwYXNz";
const TOKEN_LIFETIME_SECONDS: &str = "86400";
const SERVICE_TOKEN_HEADER: &str = "X-servicetoken";
const DEVICE_ID_HEADER: &str = "X-Device-Id";

const USER_MEDIA_TYPE: &str = "application/vnd.wirelesscar.ngtp.if9.User-v3+json";
const START_SERVICE_V2: &str = "application/vnd.wirelesscar.ngtp.if9.StartServiceConfiguration-v2+json";
const START_SERVICE_V3: &str =
    "application/vnd.wirelesscar.ngtp.if9.StartServiceConfiguration-v3+json; charset=utf-8";
const PHEV_SERVICE: &str = "application/vnd.wirelesscar.ngtp.if9.PhevService-v1+json; charset=utf-8";
const GUARDIAN_ALARMS: &str =
    "application/vnd.wirelesscar.ngtp.if9.GuardianAlarmList-v1.3+json; charset=utf-8";
const AUTHENTICATE_REQUEST: &str =
    "application/vnd.wirelesscar.ngtp.if9.AuthenticateRequest-v2+json; charset=utf-8";
const VEHICLE_SETTINGS: &str = "application/vnd.wirelesscar.ngtp.if9.VehicleSettings-v1+json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub ifas: String,
    pub ifop: String,
    pub if9: String,
}

impl Endpoints {
    pub fn for_region(use_china_servers: bool) -> Self {
        let region = if use_china_servers { "chn" } else { "row" };
        let domain = if use_china_servers {
            "jlrmotor.com.cn"
        } else {
            "jlrmotor.com"
        };

        Self {
            ifas: format!("https://ifas.prod-{region}.{domain}/ifas/jlr"),
            ifop: format!("https://ifop.prod-{region}.{domain}/ifop/jlr"),
            if9: format!("https://if9.prod-{region}.{domain}/if9/jlr"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub device_id: String,
}

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    user_id: String,
}

/// Where the PIN for a service authentication comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinSource {
    User,
    VinSuffix,
    Empty,
}

/// A fully planned remote action: service authentication followed by the
/// call that carries the resulting token.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub service_name: &'static str,
    pub pin: String,
    pub method: Method,
    pub path: String,
    pub content_type: &'static str,
    pub body: Option<Value>,
    pub token_in_header: bool,
}

pub struct InControlHttpClient {
    http: Client,
    endpoints: Endpoints,
    credentials: Credentials,
    session: Mutex<Option<Session>>,
}

impl InControlHttpClient {
    pub fn new(credentials: Credentials, use_china_servers: bool) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            http,
            endpoints: Endpoints::for_region(use_china_servers),
            credentials,
            session: Mutex::new(None),
        })
    }

    fn session(&self) -> Result<Session, ClientError> {
        self.session
            .lock()
            .map_err(|_| ClientError::NotConnected)?
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(DEVICE_ID_HEADER, &self.credentials.device_id)
            .header("Connection", "close")
    }

    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let session = self.session()?;
        let url = format!("{}/{path}", self.endpoints.if9);
        Ok(self
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", session.access_token)))
    }

    fn get(&self, path: &str, accept: &str) -> Result<Value, ClientError> {
        send(self.authorized(Method::GET, path)?.header(ACCEPT, accept))
    }

    fn get_vehicle(&self, vin: &str, path: &str, accept: &str) -> Result<Value, ClientError> {
        self.get(&format!("vehicles/{vin}/{path}"), accept)
    }

    fn post(&self, path: &str, content_type: &str, body: &Value) -> Result<Value, ClientError> {
        send(
            self.authorized(Method::POST, path)?
                .header(CONTENT_TYPE, content_type)
                .body(serde_json::to_vec(body)?),
        )
    }

    fn authenticate_service(&self, vin: &str, service_name: &str, pin: &str) -> Result<String, ClientError> {
        let user_id = self.session()?.user_id;
        let response = self.post(
            &format!("vehicles/{vin}/users/{user_id}/authenticate"),
            AUTHENTICATE_REQUEST,
            &json!({ "serviceName": service_name, "pin": pin }),
        )?;

        response
            .get("token")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| ClientError::Http {
                status: 200,
                message: format!("authentication for {service_name} returned no token"),
            })
    }

    fn execute(&self, vin: &str, call: RemoteCall) -> Result<Value, ClientError> {
        let token = self.authenticate_service(vin, call.service_name, &call.pin)?;
        let mut builder = self.authorized(call.method, &call.path)?;

        if call.token_in_header {
            builder = builder.header(SERVICE_TOKEN_HEADER, &token);
        }

        if let Some(mut body) = call.body {
            if let Value::Object(map) = &mut body {
                map.insert("token".to_string(), Value::from(token));
            }
            builder = builder
                .header(CONTENT_TYPE, call.content_type)
                .body(serde_json::to_vec(&body)?);
        }

        send(builder)
    }
}

fn send(builder: RequestBuilder) -> Result<Value, ClientError> {
    let response = builder.send()?;
    let status = response.status();
    let text = response.text()?;

    if !status.is_success() {
        return Err(ClientError::Http {
            status: status.as_u16(),
            message: text,
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    Ok(serde_json::from_str(&text)?)
}

fn vin_suffix(vin: &str) -> String {
    let start = vin.len().saturating_sub(4);
    vin.get(start..).unwrap_or(vin).to_string()
}

fn resolve_pin(source: PinSource, vin: &str, params: &Map<String, Value>) -> Result<String, ClientError> {
    match source {
        PinSource::User => params
            .get("pin")
            .and_then(value_to_string)
            .ok_or(ClientError::MissingParameter("pin")),
        PinSource::VinSuffix => Ok(vin_suffix(vin)),
        PinSource::Empty => Ok(String::new()),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn required<'a>(params: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value, ClientError> {
    params.get(key).ok_or(ClientError::MissingParameter(key))
}

fn service_parameters(entries: Vec<(&str, Value)>) -> Value {
    let list: Vec<Value> = entries
        .into_iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    json!({ "serviceParameters": list })
}

fn departure_timer(raw: &Value) -> Result<Value, ClientError> {
    let text = raw.as_str().ok_or(ClientError::MissingParameter("departure_datetime"))?;
    let parsed = NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| ClientError::MissingParameter("departure_datetime"))?;
    Ok(json!({
        "timers": [{
            "departureTime": { "hour": parsed.hour(), "minute": parsed.minute() },
            "timerIndex": 1,
            "timerTarget": {
                "singleDay": {
                    "day": parsed.day(),
                    "month": parsed.month(),
                    "year": parsed.year()
                }
            },
            "timerType": { "key": "BOTHCHARGEANDPRECONDITION", "value": true }
        }]
    }))
}

/// Maps a vendor function name and its converted parameters to the request
/// sequence the API expects.
pub fn plan_remote_call(
    vin: &str,
    function: &str,
    params: &Map<String, Value>,
) -> Result<RemoteCall, ClientError> {
    let post = |service_name: &'static str,
                pin: PinSource,
                endpoint: &str,
                content_type: &'static str,
                body: Value|
     -> Result<RemoteCall, ClientError> {
        Ok(RemoteCall {
            service_name,
            pin: resolve_pin(pin, vin, params)?,
            method: Method::POST,
            path: format!("vehicles/{vin}/{endpoint}"),
            content_type,
            body: Some(body),
            token_in_header: false,
        })
    };
    let prov = |command: &str, end_time: Value| {
        post(
            "PROV",
            PinSource::User,
            "prov",
            START_SERVICE_V3,
            json!({ "serviceCommand": command, "startTime": null, "endTime": end_time }),
        )
    };
    let empty = || json!({});

    match function {
        "get_health_status" => post("VHS", PinSource::Empty, "healthstatus", START_SERVICE_V3, empty()),
        "lock" => post("RDL", PinSource::User, "lock", START_SERVICE_V2, empty()),
        "unlock" => post("RDU", PinSource::User, "unlock", START_SERVICE_V2, empty()),
        "reset_alarm" => post("ALOFF", PinSource::User, "unlock", START_SERVICE_V2, empty()),
        "honk_blink" => post("HBLF", PinSource::VinSuffix, "honkBlink", START_SERVICE_V2, empty()),
        "remote_engine_start" => post("REON", PinSource::User, "engineOn", START_SERVICE_V2, empty()),
        "remote_engine_stop" => post("REOFF", PinSource::User, "engineOff", START_SERVICE_V2, empty()),
        "charging_start" | "charging_stop" => {
            let setting = if function == "charging_start" {
                "FORCE_ON"
            } else {
                "FORCE_OFF"
            };
            post(
                "CP",
                PinSource::VinSuffix,
                "chargeProfile",
                PHEV_SERVICE,
                service_parameters(vec![("CHARGE_NOW_SETTING", Value::from(setting))]),
            )
        }
        "set_max_soc" | "set_one_off_max_soc" => {
            let key = if function == "set_max_soc" {
                "SET_PERMANENT_MAX_SOC"
            } else {
                "SET_ONE_OFF_MAX_SOC"
            };
            let level = required(params, "max_charge_level")?.clone();
            post(
                "CP",
                PinSource::VinSuffix,
                "chargeProfile",
                PHEV_SERVICE,
                service_parameters(vec![(key, level)]),
            )
        }
        "add_departure_timer" => {
            let timers = departure_timer(required(params, "departure_datetime")?)?;
            post(
                "CP",
                PinSource::VinSuffix,
                "chargeProfile",
                PHEV_SERVICE,
                service_parameters(vec![("departureTimerSetting", timers)]),
            )
        }
        "delete_departure_timer" => post(
            "CP",
            PinSource::VinSuffix,
            "chargeProfile",
            PHEV_SERVICE,
            service_parameters(vec![(
                "departureTimerSetting",
                json!({ "timers": [{ "timerIndex": 1 }] }),
            )]),
        ),
        "preconditioning_start" => {
            let target = required(params, "target_temp")?.clone();
            post(
                "ECC",
                PinSource::VinSuffix,
                "preconditioning",
                PHEV_SERVICE,
                service_parameters(vec![
                    ("PRECONDITIONING", Value::from("START")),
                    ("TARGET_TEMPERATURE_CELSIUS", target),
                ]),
            )
        }
        "preconditioning_stop" => post(
            "ECC",
            PinSource::VinSuffix,
            "preconditioning",
            PHEV_SERVICE,
            service_parameters(vec![("PRECONDITIONING", Value::from("STOP"))]),
        ),
        "enable_privacy_mode" => prov("privacySwitch_on", Value::Null),
        "disable_privacy_mode" => prov("privacySwitch_off", Value::Null),
        "enable_service_mode" | "disable_service_mode" => prov(
            "protectionStrategy_serviceMode",
            required(params, "expiration_time")?.clone(),
        ),
        "enable_transport_mode" | "disable_transport_mode" => prov(
            "protectionStrategy_transportMode",
            required(params, "expiration_time")?.clone(),
        ),
        "enable_guardian_mode" => post(
            "GMCC",
            PinSource::User,
            "gm/alarms",
            GUARDIAN_ALARMS,
            json!({
                "status": "ACTIVE",
                "endTime": required(params, "expiration_time")?.clone()
            }),
        ),
        "disable_guardian_mode" => Ok(RemoteCall {
            service_name: "GMCC",
            pin: resolve_pin(PinSource::User, vin, params)?,
            method: Method::DELETE,
            path: format!("vehicles/{vin}/gm/alarms/INTRUSION"),
            content_type: GUARDIAN_ALARMS,
            body: None,
            token_in_header: true,
        }),
        other => Err(ClientError::UnsupportedFunction(other.to_string())),
    }
}

impl InControlClient for InControlHttpClient {
    fn connect(&self) -> Result<(), ClientError> {
        let credentials = &self.credentials;

        let tokens = send(
            self.request(Method::POST, &format!("{}/tokens", self.endpoints.ifas))
                .header(AUTHORIZATION, BASIC_AUTH)
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&json!({
                    "grant_type": "password",
                    "username": credentials.email,
                    "password": credentials.password
                }))?),
        )?;
        let access_token = tokens
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Http {
                status: 200,
                message: "token response without access_token".to_string(),
            })?
            .to_string();
        let authorization_token = tokens
            .get("authorization_token")
            .and_then(Value::as_str)
            .unwrap_or_default();

        send(
            self.request(
                Method::POST,
                &format!("{}/users/{}/clients", self.endpoints.ifop, credentials.email),
            )
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&json!({
                "access_token": access_token,
                "authorization_token": authorization_token,
                "expires_in": TOKEN_LIFETIME_SECONDS,
                "deviceID": credentials.device_id
            }))?),
        )?;
        debug!("device registered with vendor");

        let user = send(
            self.request(
                Method::GET,
                &format!("{}/users?loginName={}", self.endpoints.if9, credentials.email),
            )
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .header(ACCEPT, USER_MEDIA_TYPE),
        )?;
        let user_id = user
            .get("userId")
            .and_then(value_to_string)
            .ok_or_else(|| ClientError::Http {
                status: 200,
                message: "login response without userId".to_string(),
            })?;

        let mut session = self.session.lock().map_err(|_| ClientError::NotConnected)?;
        *session = Some(Session {
            access_token,
            user_id,
        });
        info!("connected to vendor API");

        Ok(())
    }

    fn list_vehicles(&self) -> Result<Value, ClientError> {
        let user_id = self.session()?.user_id;
        self.get(
            &format!("users/{user_id}/vehicles?primaryOnly=true"),
            "application/json",
        )
    }

    fn get_user_info(&self) -> Result<Value, ClientError> {
        let user_id = self.session()?.user_id;
        self.get(&format!("users/{user_id}"), USER_MEDIA_TYPE)
    }

    fn get_attributes(&self, vin: &str) -> Result<Value, ClientError> {
        self.get_vehicle(vin, "attributes", "application/vnd.ngtp.org.VehicleAttributes-v8+json")
    }

    fn get_status(&self, vin: &str) -> Result<Value, ClientError> {
        self.get_vehicle(
            vin,
            "status?includeInactive=true",
            "application/vnd.ngtp.org.if9.healthstatus-v4+json",
        )
    }

    fn get_position(&self, vin: &str) -> Result<Value, ClientError> {
        self.get_vehicle(vin, "position", "application/json")
    }

    fn get_guardian_mode_status(&self, vin: &str) -> Result<Value, ClientError> {
        self.get_vehicle(
            vin,
            "gm/status",
            "application/vnd.wirelesscar.ngtp.if9.GuardianStatus-v1.3+json",
        )
    }

    fn get_trips(&self, vin: &str, count: u32) -> Result<Value, ClientError> {
        self.get_vehicle(
            vin,
            &format!("trips?count={count}"),
            "application/vnd.ngtp.org.triplist-v2+json",
        )
    }

    fn get_rcc_target_value(&self, vin: &str) -> Result<Value, ClientError> {
        self.get_vehicle(vin, "settings/ClimateControlRccTargetTemp", "application/json")
    }

    fn get_services(&self, vin: &str) -> Result<Value, ClientError> {
        self.get_vehicle(
            vin,
            "services?active=true",
            "application/vnd.wirelesscar.ngtp.if9.ServiceList-v2+json",
        )
    }

    fn get_service_status(&self, vin: &str, service_id: &str) -> Result<Value, ClientError> {
        self.get_vehicle(
            vin,
            &format!("services/{service_id}"),
            "application/vnd.wirelesscar.ngtp.if9.ServiceStatus-v5+json",
        )
    }

    fn invoke(
        &self,
        vin: &str,
        function: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ClientError> {
        let call = plan_remote_call(vin, function, params)?;

        if function == "remote_engine_start"
            && let Some(target) = params.get("target_value")
        {
            self.post(
                &format!("vehicles/{vin}/settings"),
                VEHICLE_SETTINGS,
                &json!({
                    "settings": [{
                        "key": "ClimateControlRccTargetTemp",
                        "value": value_to_string(target),
                        "applied": 1
                    }]
                }),
            )?;
        }

        debug!(function, "invoking remote action");
        self.execute(vin, call)
    }
}
