//! Static tables describing the remote actions the vendor offers and the
//! entities built on top of them.

use crate::domain::models::{TrackedStatus, VehicleRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionParam {
    Pin,
    TargetValue,
    TargetTemp,
    ExpirationTime,
    ChargeLevel,
    DepartureDatetime,
}

impl ActionParam {
    pub fn key(self) -> &'static str {
        match self {
            Self::Pin => "pin",
            Self::TargetValue => "target_value",
            Self::TargetTemp => "target_temp",
            Self::ExpirationTime => "expiration_time",
            Self::ChargeLevel => "max_charge_level",
            Self::DepartureDatetime => "departure_datetime",
        }
    }
}

pub struct SwitchAttribute {
    pub name: &'static str,
    pub value: fn(&VehicleRecord) -> Option<String>,
}

pub struct SwitchDescriptor {
    pub code: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub on_service: &'static str,
    pub off_service: &'static str,
    pub params: &'static [ActionParam],
    pub add_on_params: &'static [ActionParam],
    pub add_off_params: &'static [ActionParam],
    pub state: fn(&TrackedStatus) -> bool,
    pub attributes: &'static [SwitchAttribute],
}

impl SwitchDescriptor {
    pub fn requires_pin(&self) -> bool {
        self.params.contains(&ActionParam::Pin)
    }

    pub fn service_for(&self, turn_on: bool) -> &'static str {
        if turn_on {
            self.on_service
        } else {
            self.off_service
        }
    }

    pub fn params_for(&self, turn_on: bool) -> Vec<ActionParam> {
        let extra = if turn_on {
            self.add_on_params
        } else {
            self.add_off_params
        };
        self.params.iter().chain(extra).copied().collect()
    }
}

fn is_charging(status: &TrackedStatus) -> bool {
    status.is_charging
}

fn climate_active(status: &TrackedStatus) -> bool {
    status.climate_active
}

fn guardian_mode_active(status: &TrackedStatus) -> bool {
    status.guardian_mode_active
}

fn privacy_mode_enabled(status: &TrackedStatus) -> bool {
    status.privacy_mode_enabled
}

fn service_mode_enabled(status: &TrackedStatus) -> bool {
    status.service_mode_enabled
}

fn transport_mode_enabled(status: &TrackedStatus) -> bool {
    status.transport_mode_enabled
}

fn guardian_expiry(vehicle: &VehicleRecord) -> Option<String> {
    vehicle.guardian_mode.expiry.clone()
}

const PIN: &[ActionParam] = &[ActionParam::Pin];
const PIN_AND_EXPIRY: &[ActionParam] = &[ActionParam::Pin, ActionParam::ExpirationTime];

pub static SWITCHES: &[SwitchDescriptor] = &[
    SwitchDescriptor {
        code: "CP",
        name: "Charging",
        icon: "mdi:car-electric",
        on_service: "start_charging",
        off_service: "stop_charging",
        params: PIN,
        add_on_params: &[],
        add_off_params: &[],
        state: is_charging,
        attributes: &[],
    },
    SwitchDescriptor {
        code: "ECC",
        name: "Climate (Electric)",
        icon: "mdi:air-conditioner",
        on_service: "start_preconditioning",
        off_service: "stop_preconditioning",
        params: PIN,
        add_on_params: &[ActionParam::TargetTemp],
        add_off_params: &[],
        state: climate_active,
        attributes: &[],
    },
    SwitchDescriptor {
        code: "GMCC",
        name: "Guardian Mode",
        icon: "mdi:shield-car",
        on_service: "enable_guardian_mode",
        off_service: "disable_guardian_mode",
        params: PIN,
        add_on_params: &[ActionParam::ExpirationTime],
        add_off_params: &[],
        state: guardian_mode_active,
        attributes: &[SwitchAttribute {
            name: "expires",
            value: guardian_expiry,
        }],
    },
    SwitchDescriptor {
        code: "PM",
        name: "Journey Recording",
        icon: "mdi:transit-connection-variant",
        on_service: "disable_privacy_mode",
        off_service: "enable_privacy_mode",
        params: PIN,
        add_on_params: &[],
        add_off_params: &[],
        state: privacy_mode_enabled,
        attributes: &[],
    },
    SwitchDescriptor {
        code: "REON",
        name: "Climate (Engine)",
        icon: "mdi:air-conditioner",
        on_service: "start_vehicle",
        off_service: "stop_vehicle",
        params: PIN,
        add_on_params: &[ActionParam::TargetValue],
        add_off_params: &[],
        state: climate_active,
        attributes: &[],
    },
    SwitchDescriptor {
        code: "SM",
        name: "Service Mode",
        icon: "mdi:car-wrench",
        on_service: "enable_service_mode",
        off_service: "disable_service_mode",
        params: PIN_AND_EXPIRY,
        add_on_params: &[],
        add_off_params: &[],
        state: service_mode_enabled,
        attributes: &[],
    },
    SwitchDescriptor {
        code: "TM",
        name: "Transport Mode",
        icon: "mdi:train-car-flatbed-car",
        on_service: "enable_transport_mode",
        off_service: "disable_transport_mode",
        params: PIN_AND_EXPIRY,
        add_on_params: &[],
        add_off_params: &[],
        state: transport_mode_enabled,
        attributes: &[],
    },
];

pub fn switch_descriptor(code: &str) -> Option<&'static SwitchDescriptor> {
    SWITCHES.iter().find(|descriptor| descriptor.code == code)
}

#[derive(Debug)]
pub struct ButtonDescriptor {
    pub code: &'static str,
    pub name: &'static str,
    pub service: &'static str,
    pub icon: &'static str,
}

pub static BUTTONS: &[ButtonDescriptor] = &[
    ButtonDescriptor {
        code: "ALOFF",
        name: "Reset Alarm",
        service: "reset_alarm",
        icon: "mdi:alarm-light-off",
    },
    ButtonDescriptor {
        code: "HBLF",
        name: "Honk Blink",
        service: "honk_blink",
        icon: "mdi:car-light-high",
    },
    ButtonDescriptor {
        code: "VHS",
        name: "Update From Vehicle",
        service: "update_health_status",
        icon: "mdi:update",
    },
];

pub fn button_descriptor(code: &str) -> Option<&'static ButtonDescriptor> {
    BUTTONS.iter().find(|descriptor| descriptor.code == code)
}

/// A named remote action: the vendor function it maps to, the service code
/// the vehicle must support, and the inputs that function accepts.
#[derive(Debug)]
pub struct VendorService {
    pub name: &'static str,
    pub function: &'static str,
    pub code: &'static str,
    pub inputs: &'static [ActionParam],
}

pub static VENDOR_SERVICES: &[VendorService] = &[
    VendorService {
        name: "update_health_status",
        function: "get_health_status",
        code: "VHS",
        inputs: &[],
    },
    VendorService {
        name: "lock_vehicle",
        function: "lock",
        code: "RDL",
        inputs: PIN,
    },
    VendorService {
        name: "unlock_vehicle",
        function: "unlock",
        code: "RDU",
        inputs: PIN,
    },
    VendorService {
        name: "reset_alarm",
        function: "reset_alarm",
        code: "ALOFF",
        inputs: PIN,
    },
    VendorService {
        name: "honk_blink",
        function: "honk_blink",
        code: "HBLF",
        inputs: &[],
    },
    VendorService {
        name: "start_vehicle",
        function: "remote_engine_start",
        code: "REON",
        inputs: &[ActionParam::Pin, ActionParam::TargetValue],
    },
    VendorService {
        name: "stop_vehicle",
        function: "remote_engine_stop",
        code: "REOFF",
        inputs: PIN,
    },
    VendorService {
        name: "start_charging",
        function: "charging_start",
        code: "CP",
        inputs: &[],
    },
    VendorService {
        name: "stop_charging",
        function: "charging_stop",
        code: "CP",
        inputs: &[],
    },
    VendorService {
        name: "set_departure_timer",
        function: "add_departure_timer",
        code: "CP",
        inputs: &[ActionParam::DepartureDatetime],
    },
    VendorService {
        name: "delete_departure_timer",
        function: "delete_departure_timer",
        code: "CP",
        inputs: &[],
    },
    VendorService {
        name: "start_preconditioning",
        function: "preconditioning_start",
        code: "ECC",
        inputs: &[ActionParam::TargetTemp],
    },
    VendorService {
        name: "stop_preconditioning",
        function: "preconditioning_stop",
        code: "ECC",
        inputs: &[],
    },
    VendorService {
        name: "set_max_charge_level",
        function: "set_max_soc",
        code: "CP",
        inputs: &[ActionParam::ChargeLevel],
    },
    VendorService {
        name: "set_one_off_max_charge_level",
        function: "set_one_off_max_soc",
        code: "CP",
        inputs: &[ActionParam::ChargeLevel],
    },
    VendorService {
        name: "enable_privacy_mode",
        function: "enable_privacy_mode",
        code: "PM",
        inputs: PIN,
    },
    VendorService {
        name: "disable_privacy_mode",
        function: "disable_privacy_mode",
        code: "PM",
        inputs: PIN,
    },
    VendorService {
        name: "enable_guardian_mode",
        function: "enable_guardian_mode",
        code: "GMCC",
        inputs: PIN_AND_EXPIRY,
    },
    VendorService {
        name: "disable_guardian_mode",
        function: "disable_guardian_mode",
        code: "GMCC",
        inputs: PIN,
    },
    VendorService {
        name: "enable_service_mode",
        function: "enable_service_mode",
        code: "SM",
        inputs: PIN_AND_EXPIRY,
    },
    VendorService {
        name: "disable_service_mode",
        function: "disable_service_mode",
        code: "SM",
        inputs: PIN_AND_EXPIRY,
    },
    VendorService {
        name: "enable_transport_mode",
        function: "enable_transport_mode",
        code: "TM",
        inputs: PIN_AND_EXPIRY,
    },
    VendorService {
        name: "disable_transport_mode",
        function: "disable_transport_mode",
        code: "TM",
        inputs: PIN_AND_EXPIRY,
    },
];

pub fn vendor_service(name: &str) -> Option<&'static VendorService> {
    VENDOR_SERVICES.iter().find(|service| service.name == name)
}
