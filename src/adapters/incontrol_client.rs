use serde_json::{Map, Value};
use thiserror::Error;

/// Blocking access to the vendor API. Every payload is returned as raw JSON;
/// shaping happens in `domain::telemetry`.
pub trait InControlClient: Send + Sync + 'static {
    fn connect(&self) -> Result<(), ClientError>;
    fn list_vehicles(&self) -> Result<Value, ClientError>;
    fn get_user_info(&self) -> Result<Value, ClientError>;
    fn get_attributes(&self, vin: &str) -> Result<Value, ClientError>;
    fn get_status(&self, vin: &str) -> Result<Value, ClientError>;
    fn get_position(&self, vin: &str) -> Result<Value, ClientError>;
    fn get_guardian_mode_status(&self, vin: &str) -> Result<Value, ClientError>;
    fn get_trips(&self, vin: &str, count: u32) -> Result<Value, ClientError>;
    fn get_rcc_target_value(&self, vin: &str) -> Result<Value, ClientError>;
    fn get_services(&self, vin: &str) -> Result<Value, ClientError>;
    fn get_service_status(&self, vin: &str, service_id: &str) -> Result<Value, ClientError>;
    /// Runs the vendor `function` (e.g. `lock`, `enable_guardian_mode`) with
    /// already converted parameters.
    fn invoke(
        &self,
        vin: &str,
        function: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ClientError>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("vendor request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("vendor returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("failed to parse vendor response as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not connected to the vendor API")]
    NotConnected,
    #[error("unsupported vendor function: {0}")]
    UnsupportedFunction(String),
    #[error("missing parameter {0}")]
    MissingParameter(&'static str),
    #[error("replay failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Request(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }
}
