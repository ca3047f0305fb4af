use crate::app::AppError;
use crate::domain::units::UnitSystem;

const REPLAY_ACCOUNT: &str = "replay@localhost";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    Vendor,
    Replay { script_path: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub username: String,
    pub password: String,
    pub device_id: String,
    pub pin: Option<String>,
    pub use_china_servers: bool,
    pub scan_interval_min: u64,
    pub health_update_interval_min: u64,
    pub default_climate_temp: f64,
    pub default_service_duration_h: i64,
    pub unit_system: UnitSystem,
    /// `None` keeps the unit system's pressure unit.
    pub pressure_unit: Option<String>,
    pub db_path: String,
    pub http_bind: String,
    pub client_mode: ClientMode,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok(), false)
    }

    pub fn replay_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok(), true)
    }

    fn from_lookup<F>(lookup: F, replay: bool) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_mode = if replay {
            let script_path = non_empty(&lookup, "REPLAY_SCRIPT")
                .ok_or_else(|| AppError::config("REPLAY_SCRIPT is required"))?;
            ClientMode::Replay { script_path }
        } else {
            ClientMode::Vendor
        };

        let (username, password) = if replay {
            (
                non_empty(&lookup, "INCONTROL_USERNAME").unwrap_or_else(|| REPLAY_ACCOUNT.to_string()),
                non_empty(&lookup, "INCONTROL_PASSWORD").unwrap_or_default(),
            )
        } else {
            (
                non_empty(&lookup, "INCONTROL_USERNAME")
                    .ok_or_else(|| AppError::config("INCONTROL_USERNAME is required"))?,
                non_empty(&lookup, "INCONTROL_PASSWORD")
                    .ok_or_else(|| AppError::config("INCONTROL_PASSWORD is required"))?,
            )
        };

        let scan_interval_min = parse_or_default(&lookup, "SCAN_INTERVAL_MIN", 5_u64)?;
        if scan_interval_min < 1 {
            return Err(AppError::config("SCAN_INTERVAL_MIN must be at least 1"));
        }

        Ok(Self {
            username,
            password,
            device_id: non_empty(&lookup, "INCONTROL_DEVICE_ID")
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            pin: non_empty(&lookup, "INCONTROL_PIN"),
            use_china_servers: parse_bool(&lookup, "USE_CHINA_SERVERS")?,
            scan_interval_min,
            health_update_interval_min: parse_or_default(&lookup, "HEALTH_UPDATE_INTERVAL_MIN", 0_u64)?,
            default_climate_temp: parse_or_default(&lookup, "DEFAULT_CLIMATE_TEMP", 21.0_f64)?,
            default_service_duration_h: parse_or_default(&lookup, "DEFAULT_SERVICE_DURATION_H", 24_i64)?,
            unit_system: parse_unit_system(&lookup)?,
            pressure_unit: parse_pressure_unit(&lookup)?,
            db_path: non_empty(&lookup, "DB_PATH")
                .unwrap_or_else(|| "/var/lib/incontrol/incontrol.db".to_string()),
            http_bind: non_empty(&lookup, "HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            client_mode,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<bool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(_) => Err(AppError::config(format!("{key} must be true or false"))),
    }
}

fn parse_unit_system<F>(lookup: &F) -> Result<UnitSystem, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, "UNIT_SYSTEM").map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("metric") => Ok(UnitSystem::Metric),
        Some("imperial") => Ok(UnitSystem::Imperial),
        Some(_) => Err(AppError::config("UNIT_SYSTEM must be metric or imperial")),
    }
}

fn parse_pressure_unit<F>(lookup: &F) -> Result<Option<String>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, "PRESSURE_UNIT").as_deref() {
        None | Some("Default") => Ok(None),
        Some(unit @ ("bar" | "psi" | "kPa")) => Ok(Some(unit.to_string())),
        Some(_) => Err(AppError::config(
            "PRESSURE_UNIT must be one of Default, bar, psi, kPa",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ClientMode};
    use crate::domain::units::UnitSystem;

    fn credentials(key: &str) -> Option<String> {
        match key {
            "INCONTROL_USERNAME" => Some("driver@example.com".to_string()),
            "INCONTROL_PASSWORD" => Some("secret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn rejects_missing_username() {
        let result = AppConfig::from_lookup(|_| None, false);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: INCONTROL_USERNAME is required"
        );
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let result = AppConfig::from_lookup(credentials, false).expect("config should be valid");

        assert_eq!(result.username, "driver@example.com");
        assert_eq!(result.pin, None);
        assert!(!result.use_china_servers);
        assert_eq!(result.scan_interval_min, 5);
        assert_eq!(result.health_update_interval_min, 0);
        assert_eq!(result.default_climate_temp, 21.0);
        assert_eq!(result.default_service_duration_h, 24);
        assert_eq!(result.unit_system, UnitSystem::Metric);
        assert_eq!(result.pressure_unit, None);
        assert_eq!(result.db_path, "/var/lib/incontrol/incontrol.db");
        assert_eq!(result.http_bind, "0.0.0.0:8080");
        assert_eq!(result.client_mode, ClientMode::Vendor);
        assert!(uuid::Uuid::parse_str(&result.device_id).is_ok());
    }

    #[test]
    fn reads_overrides() {
        let result = AppConfig::from_lookup(
            |key| match key {
                "INCONTROL_PIN" => Some("1234".to_string()),
                "USE_CHINA_SERVERS" => Some("TRUE".to_string()),
                "UNIT_SYSTEM" => Some("Imperial".to_string()),
                "PRESSURE_UNIT" => Some("bar".to_string()),
                "DEFAULT_CLIMATE_TEMP" => Some("22.5".to_string()),
                other => credentials(other),
            },
            false,
        )
        .expect("config should be valid");

        assert_eq!(result.pin.as_deref(), Some("1234"));
        assert!(result.use_china_servers);
        assert_eq!(result.unit_system, UnitSystem::Imperial);
        assert_eq!(result.pressure_unit.as_deref(), Some("bar"));
        assert_eq!(result.default_climate_temp, 22.5);
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let result = AppConfig::from_lookup(
            |key| match key {
                "SCAN_INTERVAL_MIN" => Some("abc".to_string()),
                other => credentials(other),
            },
            false,
        );

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: SCAN_INTERVAL_MIN must be a valid number"
        );
    }

    #[test]
    fn rejects_zero_scan_interval() {
        let result = AppConfig::from_lookup(
            |key| match key {
                "SCAN_INTERVAL_MIN" => Some("0".to_string()),
                other => credentials(other),
            },
            false,
        );

        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_pressure_unit() {
        let result = AppConfig::from_lookup(
            |key| match key {
                "PRESSURE_UNIT" => Some("atm".to_string()),
                other => credentials(other),
            },
            false,
        );

        assert!(result.is_err());
    }

    #[test]
    fn replay_requires_script_but_not_credentials() {
        assert!(AppConfig::from_lookup(|_| None, true).is_err());

        let result = AppConfig::from_lookup(
            |key| match key {
                "REPLAY_SCRIPT" => Some("testdata/replay/single_vehicle.json".to_string()),
                _ => None,
            },
            true,
        )
        .expect("replay config should be valid");

        assert_eq!(result.username, "replay@localhost");
        assert_eq!(
            result.client_mode,
            ClientMode::Replay {
                script_path: "testdata/replay/single_vehicle.json".to_string()
            }
        );
    }
}
