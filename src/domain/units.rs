use crate::domain::models::UserUnits;
use crate::domain::temperature::TemperatureUnit;

pub const KILO_WATT_HOUR: &str = "kWh";
pub const UNKNOWN_UNIT: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSystem {
    Metric,
    Imperial,
}

/// Units the host falls back to when the account does not say otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUnits {
    pub length: &'static str,
    pub volume: &'static str,
    pub temperature: TemperatureUnit,
    pub pressure: &'static str,
}

impl HostUnits {
    pub fn for_system(system: UnitSystem) -> Self {
        match system {
            UnitSystem::Metric => Self {
                length: "km",
                volume: "L",
                temperature: TemperatureUnit::Celsius,
                pressure: "Pa",
            },
            UnitSystem::Imperial => Self {
                length: "mi",
                volume: "gal",
                temperature: TemperatureUnit::Fahrenheit,
                pressure: "psi",
            },
        }
    }
}

pub fn vendor_unit_to_host(vendor: &str) -> Option<&'static str> {
    let unit = match vendor {
        "Miles" => "mi",
        "Km" => "km",
        "Litres" => "L",
        "USGallons" | "UKGallons" => "gal",
        "Celcius" | "Celsius" => "°C",
        "Fahrenheit" => "°F",
        "kWh" | "kWhPer100Dist" => "kWh",
        "Wh" | "WhPerDist" => "Wh",
        _ => return None,
    };
    Some(unit)
}

/// Reads the space separated vendor preference string. Slot 3 is skipped and
/// slot 5 is kept verbatim. Any missing slot falls back to host defaults for
/// every unit, with energy consumption reported as unknown.
pub fn parse_user_units(raw: &str, host: &HostUnits, pressure_override: Option<&str>) -> UserUnits {
    let pressure = pressure_override.unwrap_or(host.pressure).to_string();
    let slots: Vec<&str> = raw.split(' ').collect();

    if raw.is_empty() || slots.len() < 6 {
        return default_units(host, pressure);
    }

    let map_or = |slot: &str, default: &str| {
        vendor_unit_to_host(slot)
            .unwrap_or(default)
            .to_string()
    };

    UserUnits {
        distance: map_or(slots[0], host.length),
        fuel: map_or(slots[1], host.volume),
        temperature: map_or(slots[2], host.temperature.symbol()),
        pressure,
        energy_regenerated: map_or(slots[4], KILO_WATT_HOUR),
        energy_consumed: slots[5].to_string(),
    }
}

fn default_units(host: &HostUnits, pressure: String) -> UserUnits {
    UserUnits {
        distance: host.length.to_string(),
        fuel: host.volume.to_string(),
        temperature: host.temperature.symbol().to_string(),
        pressure,
        energy_regenerated: KILO_WATT_HOUR.to_string(),
        energy_consumed: UNKNOWN_UNIT.to_string(),
    }
}
