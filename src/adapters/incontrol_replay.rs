use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::adapters::incontrol_client::{ClientError, InControlClient};

/// Responses keyed by `method:vin` (or `invoke:function`), falling back to
/// the bare method name.
#[derive(Debug, Clone, Deserialize)]
struct ScriptFile {
    #[serde(default = "default_loop")]
    loop_forever: bool,
    responses: BTreeMap<String, Vec<ScriptEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptEvent {
    ok: Option<Value>,
    error: Option<String>,
}

#[derive(Debug)]
pub struct InControlReplayClient {
    script: ScriptFile,
    positions: Mutex<HashMap<String, usize>>,
}

fn default_loop() -> bool {
    true
}

impl InControlReplayClient {
    pub fn from_file(path: &str) -> Result<Self, ClientError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ClientError> {
        let script: ScriptFile = serde_json::from_str(content)?;

        if let Some((key, _)) = script.responses.iter().find(|(_, events)| events.is_empty()) {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("replay script has no events for {key}"),
            )));
        }
        if !script.responses.contains_key("connect") {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "replay script must contain a connect sequence",
            )));
        }

        Ok(Self {
            script,
            positions: Mutex::new(HashMap::new()),
        })
    }

    fn respond(&self, method: &str, scope: Option<&str>) -> Result<Value, ClientError> {
        let scoped = scope.map(|scope| format!("{method}:{scope}"));
        let key = scoped
            .filter(|key| self.script.responses.contains_key(key))
            .unwrap_or_else(|| method.to_string());

        let events = self.script.responses.get(&key).ok_or_else(|| ClientError::Http {
            status: 404,
            message: format!("no scripted response for {key}"),
        })?;

        let event = {
            let mut positions = self
                .positions
                .lock()
                .map_err(|_| ClientError::Io(io::Error::other("replay state lock poisoned")))?;
            let position = positions.entry(key.clone()).or_insert(0);

            if *position >= events.len() {
                if self.script.loop_forever {
                    *position = 0;
                } else {
                    return Err(ClientError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("replay finished for {key}"),
                    )));
                }
            }

            let event = events[*position].clone();
            *position = position.saturating_add(1);
            event
        };

        match (event.ok, event.error) {
            (Some(payload), None) => Ok(payload),
            (None, Some(error)) => Err(map_script_error(&error)),
            _ => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "script event must contain exactly one of: ok or error",
            ))),
        }
    }
}

fn map_script_error(kind: &str) -> ClientError {
    let normalized = kind.trim().to_ascii_lowercase();
    let http = |status: u16| ClientError::Http {
        status,
        message: kind.to_string(),
    };

    match normalized.as_str() {
        "timeout" => ClientError::Io(io::Error::new(io::ErrorKind::TimedOut, kind)),
        "network_unreachable" | "internet_down" => {
            ClientError::Io(io::Error::new(io::ErrorKind::NetworkUnreachable, kind))
        }
        "host_unreachable" => ClientError::Io(io::Error::new(io::ErrorKind::HostUnreachable, kind)),
        "connection_refused" => {
            ClientError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, kind))
        }
        "unauthorized" => http(401),
        "forbidden" => http(403),
        "not_found" => http(404),
        "server_error" => http(500),
        "invalid_json" => match serde_json::from_str::<Value>("not json") {
            Err(parse_err) => ClientError::Json(parse_err),
            Ok(_) => ClientError::Io(io::Error::new(io::ErrorKind::InvalidData, kind)),
        },
        _ => ClientError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown scripted error kind: {kind}"),
        )),
    }
}

impl InControlClient for InControlReplayClient {
    fn connect(&self) -> Result<(), ClientError> {
        self.respond("connect", None).map(|_| ())
    }

    fn list_vehicles(&self) -> Result<Value, ClientError> {
        self.respond("list_vehicles", None)
    }

    fn get_user_info(&self) -> Result<Value, ClientError> {
        self.respond("get_user_info", None)
    }

    fn get_attributes(&self, vin: &str) -> Result<Value, ClientError> {
        self.respond("get_attributes", Some(vin))
    }

    fn get_status(&self, vin: &str) -> Result<Value, ClientError> {
        self.respond("get_status", Some(vin))
    }

    fn get_position(&self, vin: &str) -> Result<Value, ClientError> {
        self.respond("get_position", Some(vin))
    }

    fn get_guardian_mode_status(&self, vin: &str) -> Result<Value, ClientError> {
        self.respond("get_guardian_mode_status", Some(vin))
    }

    fn get_trips(&self, vin: &str, _count: u32) -> Result<Value, ClientError> {
        self.respond("get_trips", Some(vin))
    }

    fn get_rcc_target_value(&self, vin: &str) -> Result<Value, ClientError> {
        self.respond("get_rcc_target_value", Some(vin))
    }

    fn get_services(&self, vin: &str) -> Result<Value, ClientError> {
        self.respond("get_services", Some(vin))
    }

    fn get_service_status(&self, _vin: &str, service_id: &str) -> Result<Value, ClientError> {
        self.respond("get_service_status", Some(service_id))
    }

    fn invoke(
        &self,
        _vin: &str,
        function: &str,
        _params: &Map<String, Value>,
    ) -> Result<Value, ClientError> {
        self.respond("invoke", Some(function))
    }
}
