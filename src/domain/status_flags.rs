use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::models::{
    EngineType, FUEL_TYPE_BATTERY, GuardianState, TrackedStatus, VehicleRecord,
};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

pub fn value_matches(data: &BTreeMap<String, String>, key: &str, expected: &str) -> bool {
    data.get(key).is_some_and(|value| value == expected)
}

/// True only for a parsable timestamp strictly after `now`.
pub fn is_date_active(data: &BTreeMap<String, String>, key: &str, now: DateTime<Utc>) -> bool {
    data.get(key)
        .and_then(|value| parse_timestamp(value))
        .is_some_and(|timestamp| timestamp > now)
}

/// Naive timestamps are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    NAIVE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(raw, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

pub fn classify_engine_type(fuel_type: &str, status_ev: &BTreeMap<String, String>) -> EngineType {
    if fuel_type == FUEL_TYPE_BATTERY {
        return EngineType::Battery;
    }

    if status_ev
        .get("EV_PHEV_RANGE_COMBINED_KM")
        .is_some_and(|value| !value.is_empty())
    {
        return EngineType::Hybrid;
    }

    EngineType::Ice
}

pub fn guardian_active(guardian: &GuardianState) -> bool {
    guardian.status.as_deref() == Some("ACTIVE")
}

pub fn derive_tracked_status(vehicle: &VehicleRecord, now: DateTime<Utc>) -> TrackedStatus {
    let climate_active = if vehicle.engine_type == EngineType::Ice {
        value_matches(
            &vehicle.status,
            "VEHICLE_STATE_TYPE",
            "ENGINE_ON_REMOTE_START",
        )
    } else {
        value_matches(&vehicle.status_ev, "EV_PRECONDITION_OPERATING_STATUS", "ON")
    };

    TrackedStatus {
        climate_active,
        guardian_mode_active: guardian_active(&vehicle.guardian_mode),
        is_charging: value_matches(&vehicle.status_ev, "EV_IS_CHARGING", "TRUE"),
        privacy_mode_enabled: value_matches(&vehicle.status, "PRIVACY_SWITCH", "FALSE"),
        service_mode_enabled: is_date_active(&vehicle.status, "SERVICE_MODE_STOP", now),
        transport_mode_enabled: is_date_active(&vehicle.status, "TRANSPORT_MODE_STOP", now),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, TimeZone, Utc};

    use super::{
        classify_engine_type, derive_tracked_status, is_date_active, parse_timestamp,
        value_matches,
    };
    use crate::domain::models::{EngineType, GuardianState, VehicleRecord};

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn value_match_is_exact_and_case_sensitive() {
        let data = map(&[("EV_IS_CHARGING", "TRUE"), ("PRIVACY_SWITCH", "false")]);

        assert!(value_matches(&data, "EV_IS_CHARGING", "TRUE"));
        assert!(!value_matches(&data, "EV_IS_CHARGING", "true"));
        assert!(!value_matches(&data, "PRIVACY_SWITCH", "FALSE"));
        assert!(!value_matches(&data, "MISSING", "TRUE"));
    }

    #[test]
    fn date_flag_requires_future_timestamp() {
        let data = map(&[
            ("FUTURE", "2026-03-01T12:30:00.000Z"),
            ("PAST", "2026-03-01T11:59:00+00:00"),
            ("NOW", "2026-03-01 12:00:00"),
            ("GARBAGE", "not a date"),
            ("EMPTY", ""),
        ]);

        assert!(is_date_active(&data, "FUTURE", now()));
        assert!(!is_date_active(&data, "PAST", now()));
        assert!(!is_date_active(&data, "NOW", now()));
        assert!(!is_date_active(&data, "GARBAGE", now()));
        assert!(!is_date_active(&data, "EMPTY", now()));
        assert!(!is_date_active(&data, "MISSING", now()));
    }

    #[test]
    fn parses_vendor_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 0).unwrap();

        assert_eq!(parse_timestamp("2026-03-01T10:15:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T10:15:00.000+0000"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T12:15:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01 10:15:00"), Some(expected));
        assert_eq!(parse_timestamp("0"), None);
    }

    #[test]
    fn classifies_engine_type() {
        let empty = BTreeMap::new();
        let phev = map(&[("EV_PHEV_RANGE_COMBINED_KM", "512")]);
        let blank_range = map(&[("EV_PHEV_RANGE_COMBINED_KM", "")]);

        assert_eq!(classify_engine_type("Electric", &phev), EngineType::Battery);
        assert_eq!(classify_engine_type("Petrol", &phev), EngineType::Hybrid);
        assert_eq!(classify_engine_type("Diesel", &empty), EngineType::Ice);
        assert_eq!(classify_engine_type("Diesel", &blank_range), EngineType::Ice);
    }

    #[test]
    fn derives_flags_for_ice_vehicle() {
        let mut vehicle = VehicleRecord::new("SADCA2BN0KA000001");
        vehicle.engine_type = EngineType::Ice;
        vehicle.status = map(&[
            ("VEHICLE_STATE_TYPE", "ENGINE_ON_REMOTE_START"),
            ("PRIVACY_SWITCH", "FALSE"),
            ("SERVICE_MODE_STOP", "2026-03-02T00:00:00Z"),
            ("TRANSPORT_MODE_STOP", "2026-02-01T00:00:00Z"),
        ]);
        vehicle.status_ev = map(&[("EV_PRECONDITION_OPERATING_STATUS", "ON")]);
        vehicle.guardian_mode = GuardianState {
            capable: true,
            status: Some("ACTIVE".to_string()),
            expiry: None,
        };

        let flags = derive_tracked_status(&vehicle, now());

        assert!(flags.climate_active);
        assert!(flags.guardian_mode_active);
        assert!(!flags.is_charging);
        assert!(flags.privacy_mode_enabled);
        assert!(flags.service_mode_enabled);
        assert!(!flags.transport_mode_enabled);
    }

    #[test]
    fn electric_climate_follows_preconditioning_status() {
        let mut vehicle = VehicleRecord::new("SADHA2B10K1000002");
        vehicle.engine_type = EngineType::Battery;
        vehicle.status = map(&[("VEHICLE_STATE_TYPE", "ENGINE_ON_REMOTE_START")]);
        vehicle.status_ev = map(&[
            ("EV_PRECONDITION_OPERATING_STATUS", "OFF"),
            ("EV_IS_CHARGING", "TRUE"),
        ]);

        let flags = derive_tracked_status(&vehicle, now());

        assert!(!flags.climate_active);
        assert!(flags.is_charging);
        assert!(!flags.privacy_mode_enabled);
        assert!(!flags.guardian_mode_active);
    }
}
