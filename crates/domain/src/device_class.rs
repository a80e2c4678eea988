//! Device-class vocabularies of the home-automation hub.
//!
//! A schema that names a `device_class` but no integration is routed to the
//! integration whose vocabulary contains the class. Some classes (`battery`,
//! `gas`, `power`, …) exist in both the binary-sensor and sensor vocabularies;
//! the lookup order below resolves those to `sensor`.

use crate::entity::Integration;

/// Device classes accepted by `binary_sensor` entities.
pub const BINARY_SENSOR_CLASSES: &[&str] = &[
    "battery",
    "battery_charging",
    "carbon_monoxide",
    "cold",
    "connectivity",
    "door",
    "garage_door",
    "gas",
    "heat",
    "light",
    "lock",
    "moisture",
    "motion",
    "moving",
    "occupancy",
    "opening",
    "plug",
    "power",
    "presence",
    "problem",
    "running",
    "safety",
    "smoke",
    "sound",
    "tamper",
    "update",
    "vibration",
    "window",
];

/// Device classes accepted by `sensor` entities.
pub const SENSOR_CLASSES: &[&str] = &[
    "apparent_power",
    "aqi",
    "area",
    "atmospheric_pressure",
    "battery",
    "blood_glucose_concentration",
    "carbon_dioxide",
    "carbon_monoxide",
    "conductivity",
    "current",
    "data_rate",
    "data_size",
    "date",
    "distance",
    "duration",
    "energy",
    "energy_distance",
    "energy_storage",
    "enum",
    "frequency",
    "gas",
    "humidity",
    "illuminance",
    "irradiance",
    "moisture",
    "monetary",
    "nitrogen_dioxide",
    "nitrogen_monoxide",
    "nitrous_oxide",
    "ozone",
    "ph",
    "pm1",
    "pm10",
    "pm25",
    "power",
    "power_factor",
    "precipitation",
    "precipitation_intensity",
    "pressure",
    "reactive_energy",
    "reactive_power",
    "signal_strength",
    "sound_pressure",
    "speed",
    "sulphur_dioxide",
    "temperature",
    "timestamp",
    "volatile_organic_compounds",
    "volatile_organic_compounds_parts",
    "voltage",
    "volume",
    "volume_flow_rate",
    "volume_storage",
    "water",
    "weight",
    "wind_direction",
    "wind_speed",
];

/// Device classes accepted by `humidifier` entities.
pub const HUMIDIFIER_CLASSES: &[&str] = &["humidifier", "dehumidifier"];

/// Infer the integration kind from a device class.
///
/// Vocabularies are consulted binary-sensor, sensor, humidifier; a later
/// match replaces an earlier one.
#[must_use]
pub fn infer_integration(device_class: &str) -> Option<Integration> {
    let mut found = None;
    if BINARY_SENSOR_CLASSES.contains(&device_class) {
        found = Some(Integration::BinarySensor);
    }
    if SENSOR_CLASSES.contains(&device_class) {
        found = Some(Integration::Sensor);
    }
    if HUMIDIFIER_CLASSES.contains(&device_class) {
        found = Some(Integration::Humidifier);
    }
    found
}
