use std::collections::BTreeMap;

use serde::Serialize;

/// Compressor run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunMode {
    Max = 0,
    Eco = 1,
}

impl RunMode {
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Max),
            1 => Some(Self::Eco),
            _ => None,
        }
    }
}

/// Low voltage cutout level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatterySaver {
    Low = 0,
    Mid = 1,
    High = 2,
}

impl BatterySaver {
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Low),
            1 => Some(Self::Mid),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

/// Unit of every temperature field in a status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemperatureUnit {
    Celsius = 0,
    Fahrenheit = 1,
}

impl TemperatureUnit {
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Celsius),
            1 => Some(Self::Fahrenheit),
            _ => None,
        }
    }
}

/// Readings and settings for one cooling compartment.
///
/// All temperatures are whole degrees in the unit declared by the
/// surrounding snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompartmentReading {
    pub target_temperature: i8,
    pub hysteresis: i8,
    pub correction_hot: i8,
    pub correction_mid: i8,
    pub correction_cold: i8,
    pub correction_halt: i8,
    pub current_temperature: i8,
}

/// One full status reading from the fridge.
///
/// Produced by decoding a Query, Set or Reset response. Comparison is
/// structural over every field, which is what the monitor uses to decide
/// whether anything changed between polls.
#[derive(Debug, Clone, PartialEq)]
pub struct FridgeSnapshot {
    pub controls_locked: bool,
    pub powered_on: bool,
    pub run_mode: RunMode,
    pub battery_saver: BatterySaver,
    pub max_selectable_temperature: i8,
    pub min_selectable_temperature: i8,
    pub start_delay: u8,
    pub temperature_unit: TemperatureUnit,
    pub battery_charge_percent: u8,
    pub battery_voltage: f32,
    /// Raw running status byte, only reported by some firmware.
    pub running_status: Option<u8>,
    pub compartment1: CompartmentReading,
    /// Present only on dual-zone fridges.
    pub compartment2: Option<CompartmentReading>,
}

/// The published form of a status reading.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub on: bool,
    pub run_mode: RunMode,
    pub low_voltage_level: BatterySaver,
    pub battery_voltage: f32,
    pub battery_charge_percent: u8,
    pub temperature_unit: TemperatureUnit,
    pub units: BTreeMap<&'static str, UnitReport>,
}

#[derive(Debug, Serialize)]
pub struct UnitReport {
    pub temperature: i8,
    pub target: i8,
}

impl FridgeSnapshot {
    /// Build the report published on state changes.
    pub fn report(&self) -> StatusReport {
        let mut units = BTreeMap::new();
        units.insert(
            "1",
            UnitReport {
                temperature: self.compartment1.current_temperature,
                target: self.compartment1.target_temperature,
            },
        );
        if let Some(c2) = &self.compartment2 {
            units.insert(
                "2",
                UnitReport {
                    temperature: c2.current_temperature,
                    target: c2.target_temperature,
                },
            );
        }

        StatusReport {
            on: self.powered_on,
            run_mode: self.run_mode,
            low_voltage_level: self.battery_saver,
            battery_voltage: self.battery_voltage,
            battery_charge_percent: self.battery_charge_percent,
            temperature_unit: self.temperature_unit,
            units,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_snapshot() -> FridgeSnapshot {
    FridgeSnapshot {
        controls_locked: false,
        powered_on: true,
        run_mode: RunMode::Eco,
        battery_saver: BatterySaver::Mid,
        max_selectable_temperature: 20,
        min_selectable_temperature: -20,
        start_delay: 0,
        temperature_unit: TemperatureUnit::Celsius,
        battery_charge_percent: 85,
        // 12 volts and 5 tenths, exactly representable
        battery_voltage: 12.5,
        running_status: None,
        compartment1: CompartmentReading {
            target_temperature: -4,
            hysteresis: 2,
            correction_hot: 0,
            correction_mid: 0,
            correction_cold: -1,
            correction_halt: 1,
            current_temperature: -5,
        },
        compartment2: None,
    }
}

#[test]
fn test_report_serialization() {
    let mut snapshot = sample_snapshot();
    snapshot.compartment2 = Some(CompartmentReading {
        target_temperature: 4,
        hysteresis: 1,
        correction_hot: 0,
        correction_mid: 0,
        correction_cold: 0,
        correction_halt: 0,
        current_temperature: 3,
    });

    let value = serde_json::to_value(snapshot.report()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "on": true,
            "runMode": "Eco",
            "lowVoltageLevel": "Mid",
            "batteryVoltage": 12.5,
            "batteryChargePercent": 85,
            "temperatureUnit": "Celsius",
            "units": {
                "1": { "temperature": -5, "target": -4 },
                "2": { "temperature": 3, "target": 4 },
            },
        })
    );
}

#[test]
fn test_report_omits_absent_compartment() {
    let report = sample_snapshot().report();
    assert!(report.units.contains_key("1"));
    assert!(!report.units.contains_key("2"));
}
