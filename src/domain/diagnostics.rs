//! Redacted dumps of the cached account and vehicle data.

use serde_json::{Map, Value};

use crate::domain::models::{UserRecord, VehicleRecord};

pub const REDACTED: &str = "**REDACTED**";

const ANON_KEYS: &[&str] = &[
    "vin",
    "longitude",
    "latitude",
    "minLongitude",
    "minLatitude",
    "maxLongitude",
    "maxLatitude",
    "address",
    "formattedAddress",
    "postalCode",
    "city",
    "registrationNumber",
    "serialNumber",
    "TU_STATUS_IMEI",
];

/// Replaces every character between `from_start` and `from_end` with `x`.
pub fn field_mask(value: &str, from_start: usize, from_end: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= from_start + from_end {
        return value.to_string();
    }

    let masked = chars.len() - from_start - from_end;
    let mut result: String = chars[..from_start].iter().collect();
    result.extend(std::iter::repeat_n('x', masked));
    result.extend(&chars[chars.len() - from_end..]);
    result
}

pub fn anonymise_vin(vin: &str) -> String {
    let prefix: String = vin.chars().take(11).collect();
    format!("{prefix}XXXXXX")
}

pub fn anonymise_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if ANON_KEYS.contains(&key.as_str()) {
                    *nested = Value::from(REDACTED);
                } else {
                    anonymise_value(nested);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(anonymise_value),
        _ => {}
    }
}

pub fn build_diagnostics<'a>(
    user: Option<&UserRecord>,
    vehicles: impl IntoIterator<Item = &'a VehicleRecord>,
) -> Value {
    let mut dump = Map::new();
    dump.insert(
        "user".to_string(),
        user.and_then(|user| serde_json::to_value(user).ok())
            .unwrap_or(Value::Null),
    );

    for vehicle in vehicles {
        let mut data = serde_json::to_value(vehicle).unwrap_or(Value::Null);
        anonymise_value(&mut data);
        dump.insert(anonymise_vin(&vehicle.vin), data);
    }

    Value::Object(dump)
}
