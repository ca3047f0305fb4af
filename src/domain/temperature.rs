//! Conversion from user-facing temperatures to the integer scales the
//! remote climate actions expect.

use serde::Serialize;

const RAW_MIN: i64 = 31;
const RAW_MAX: i64 = 57;
const PRECONDITION_MIN: i64 = 155;
const PRECONDITION_MAX: i64 = 285;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

/// Values already on the 31..=57 vehicle scale pass through unchanged.
/// Returns `None` for service codes that take no temperature.
pub fn convert_temp_value(unit: TemperatureUnit, service_code: &str, target: f64) -> Option<i64> {
    if (RAW_MIN as f64..=RAW_MAX as f64).contains(&target) {
        return Some(target as i64);
    }

    match service_code {
        "REON" => {
            let raw = match unit {
                TemperatureUnit::Celsius => (target * 2.0) as i64,
                TemperatureUnit::Fahrenheit => (target - 27.0) as i64,
            };
            Some(raw.clamp(RAW_MIN, RAW_MAX))
        }
        "ECC" => {
            let raw = match unit {
                TemperatureUnit::Celsius => (target * 10.0) as i64,
                TemperatureUnit::Fahrenheit => (((target - 27.0) / 2.0) * 10.0) as i64,
            };
            Some(raw.clamp(PRECONDITION_MIN, PRECONDITION_MAX))
        }
        _ => None,
    }
}

/// Climate target reported by the vehicle, on the 31..=57 scale, as Celsius.
pub fn raw_target_to_celsius(raw: f64) -> f64 {
    (raw as i64) as f64 / 2.0
}
