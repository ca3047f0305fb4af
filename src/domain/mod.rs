pub mod catalog;
pub mod diagnostics;
pub mod entities;
pub mod models;
pub mod status_flags;
pub mod switch_params;
pub mod telemetry;
pub mod temperature;
pub mod units;
