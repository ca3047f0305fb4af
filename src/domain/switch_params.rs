use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::catalog::{ActionParam, SwitchDescriptor};

const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:00";
const EXPIRY_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values a switch may inject into a remote action call.
#[derive(Debug, Clone)]
pub struct ActionContext<'a> {
    pub pin: Option<&'a str>,
    pub default_climate_temp: f64,
    pub service_duration_hours: i64,
}

pub fn format_expiry(timestamp: DateTime<Utc>) -> String {
    timestamp.format(EXPIRY_FORMAT).to_string()
}

pub fn expiry_to_epoch_millis(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw.trim(), EXPIRY_PARSE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Builds the parameter map for toggling `descriptor` by name lookup only.
pub fn build_action_params(
    descriptor: &SwitchDescriptor,
    turn_on: bool,
    context: &ActionContext<'_>,
    now: DateTime<Utc>,
) -> Map<String, Value> {
    let params = descriptor.params_for(turn_on);
    let mut result = Map::new();

    if params.contains(&ActionParam::Pin)
        && let Some(pin) = context.pin
    {
        result.insert(ActionParam::Pin.key().to_string(), Value::from(pin));
    }

    for param in [ActionParam::TargetValue, ActionParam::TargetTemp] {
        if params.contains(&param) {
            result.insert(
                param.key().to_string(),
                Value::from(context.default_climate_temp),
            );
        }
    }

    if params.contains(&ActionParam::ExpirationTime) {
        let expiry = if turn_on {
            now + Duration::hours(context.service_duration_hours)
        } else {
            now
        };
        result.insert(
            ActionParam::ExpirationTime.key().to_string(),
            Value::from(format_expiry(expiry)),
        );
    }

    result
}
