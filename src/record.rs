//! The binary records carried inside a frame's payload.
//!
//! A status record (the payload of a Query, Set or Reset response, after the
//! leading command code byte) has this layout:
//!
//! Offset | Field
//! 0      | controls locked (bool)
//! 1      | powered on (bool)
//! 2      | run mode
//! 3      | battery saver level
//! 4      | compartment 1 target temperature (i8)
//! 5      | max selectable temperature (i8)
//! 6      | min selectable temperature (i8)
//! 7      | compartment 1 hysteresis (i8)
//! 8      | start delay
//! 9      | temperature unit
//! 10..14 | compartment 1 corrections hot/mid/cold/halt (i8 each)
//! 14     | compartment 1 current temperature (i8)
//! 15     | battery charge percent
//! 16     | battery voltage, whole volts
//! 17     | battery voltage, tenths
//! 18..27 | compartment 2 (dual-zone fridges only): target, 2 reserved,
//!        | hysteresis, hot, mid, cold, halt, current, 1 reserved
//! 28     | running status, only on firmware that appends a 29th byte

use thiserror::Error;

use crate::fridge_state::{
    BatterySaver, CompartmentReading, FridgeSnapshot, RunMode, TemperatureUnit,
};

/// The shortest decodable status record.
const MIN_STATUS_LEN: usize = 18;
/// Records at least this long carry a second compartment section.
const DUAL_ZONE_LEN: usize = 28;

/// Ways in which a well-framed payload can fail to be a valid record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("status record too short: {0} bytes")]
    TooShort(usize),
    #[error("unknown {field} value {value}")]
    UnknownEnumValue { field: &'static str, value: u8 },
}

/// Command codes understood by the fridge. Code 3 is reserved and never
/// sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Bind = 0,
    Query = 1,
    Set = 2,
    Reset = 4,
    SetUnit1Target = 5,
    SetUnit2Target = 6,
}

impl CommandKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Bind),
            1 => Some(Self::Query),
            2 => Some(Self::Set),
            4 => Some(Self::Reset),
            5 => Some(Self::SetUnit1Target),
            6 => Some(Self::SetUnit2Target),
            _ => None,
        }
    }
}

/// A command ready to be framed and written to the fridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// One-time handshake; the fridge expects a button press to confirm.
    Bind,
    Query,
    Set(FridgeSnapshot),
    Reset,
    SetUnit1Target(i8),
    SetUnit2Target(i8),
}

impl Request {
    pub fn kind(&self) -> CommandKind {
        match self {
            Request::Bind => CommandKind::Bind,
            Request::Query => CommandKind::Query,
            Request::Set(_) => CommandKind::Set,
            Request::Reset => CommandKind::Reset,
            Request::SetUnit1Target(_) => CommandKind::SetUnit1Target,
            Request::SetUnit2Target(_) => CommandKind::SetUnit2Target,
        }
    }

    /// Encode the command code and its parameters, ready for framing.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Request::Bind | Request::Query | Request::Reset => vec![self.kind() as u8],
            Request::Set(snapshot) => encode_set(snapshot),
            Request::SetUnit1Target(target) | Request::SetUnit2Target(target) => {
                vec![self.kind() as u8, *target as u8]
            }
        }
    }
}

fn encode_set(snapshot: &FridgeSnapshot) -> Vec<u8> {
    let c1 = &snapshot.compartment1;
    let mut payload = vec![
        CommandKind::Set as u8,
        u8::from(snapshot.controls_locked),
        u8::from(snapshot.powered_on),
        snapshot.run_mode as u8,
        snapshot.battery_saver as u8,
        c1.target_temperature as u8,
        snapshot.max_selectable_temperature as u8,
        snapshot.min_selectable_temperature as u8,
        c1.hysteresis as u8,
        snapshot.start_delay,
        snapshot.temperature_unit as u8,
        c1.correction_hot as u8,
        c1.correction_mid as u8,
        c1.correction_cold as u8,
        c1.correction_halt as u8,
    ];

    // The second compartment section is simply omitted on single-zone
    // fridges rather than zero-filled.
    if let Some(c2) = &snapshot.compartment2 {
        payload.extend_from_slice(&[
            c2.target_temperature as u8,
            0,
            0,
            c2.hysteresis as u8,
            c2.correction_hot as u8,
            c2.correction_mid as u8,
            c2.correction_cold as u8,
            c2.correction_halt as u8,
            0,
            0,
            0,
        ]);
    }

    payload
}

/// Decode a status record. `payload` starts after the command code byte.
pub fn decode_status(payload: &[u8]) -> Result<FridgeSnapshot, RecordError> {
    if payload.len() < MIN_STATUS_LEN {
        return Err(RecordError::TooShort(payload.len()));
    }

    let run_mode = RunMode::from_code(payload[2]).ok_or(RecordError::UnknownEnumValue {
        field: "run_mode",
        value: payload[2],
    })?;
    let battery_saver =
        BatterySaver::from_code(payload[3]).ok_or(RecordError::UnknownEnumValue {
            field: "battery_saver",
            value: payload[3],
        })?;
    let temperature_unit =
        TemperatureUnit::from_code(payload[9]).ok_or(RecordError::UnknownEnumValue {
            field: "temperature_unit",
            value: payload[9],
        })?;

    let compartment1 = CompartmentReading {
        target_temperature: payload[4] as i8,
        hysteresis: payload[7] as i8,
        correction_hot: payload[10] as i8,
        correction_mid: payload[11] as i8,
        correction_cold: payload[12] as i8,
        correction_halt: payload[13] as i8,
        current_temperature: payload[14] as i8,
    };

    let compartment2 = if payload.len() >= DUAL_ZONE_LEN {
        Some(CompartmentReading {
            target_temperature: payload[18] as i8,
            hysteresis: payload[21] as i8,
            correction_hot: payload[22] as i8,
            correction_mid: payload[23] as i8,
            correction_cold: payload[24] as i8,
            correction_halt: payload[25] as i8,
            current_temperature: payload[26] as i8,
        })
    } else {
        None
    };

    // The byte sits at offset 28, so despite the app's >= 28 length check it
    // takes a 29-byte record to actually carry it.
    let running_status = (payload.len() > DUAL_ZONE_LEN).then(|| payload[28]);

    Ok(FridgeSnapshot {
        controls_locked: payload[0] != 0,
        powered_on: payload[1] != 0,
        run_mode,
        battery_saver,
        max_selectable_temperature: payload[5] as i8,
        min_selectable_temperature: payload[6] as i8,
        start_delay: payload[8],
        temperature_unit,
        battery_charge_percent: payload[15],
        battery_voltage: f32::from(payload[16]) + f32::from(payload[17]) / 10.0,
        running_status,
        compartment1,
        compartment2,
    })
}

/// An 18-byte single-zone status record matching
/// [`crate::fridge_state::sample_snapshot`].
#[cfg(test)]
pub(crate) fn sample_status_payload() -> Vec<u8> {
    vec![
        0x00, 0x01, 0x01, 0x01, // unlocked, on, Eco, Mid
        0xFC, 0x14, 0xEC, 0x02, // target -4, max 20, min -20, hysteresis 2
        0x00, 0x00, // no start delay, Celsius
        0x00, 0x00, 0xFF, 0x01, // corrections 0, 0, -1, 1
        0xFB, // current temperature -5
        0x55, 0x0C, 0x05, // 85 %, 12.5 V
    ]
}

#[cfg(test)]
fn dual_zone_payload() -> Vec<u8> {
    let mut payload = sample_status_payload();
    // target 4, 2 reserved, hysteresis 1, corrections, current 3, 1 reserved
    payload.extend_from_slice(&[0x04, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00]);
    payload
}

#[test]
fn test_decode_minimal_status() {
    let snapshot = decode_status(&sample_status_payload()).unwrap();
    assert_eq!(snapshot, crate::fridge_state::sample_snapshot());
    assert_eq!(snapshot.compartment2, None);
    assert_eq!(snapshot.running_status, None);
}

#[test]
fn test_decode_dual_zone_status() {
    let snapshot = decode_status(&dual_zone_payload()).unwrap();
    let c2 = snapshot.compartment2.expect("dual-zone record");
    assert_eq!(c2.target_temperature, 4);
    assert_eq!(c2.hysteresis, 1);
    assert_eq!(c2.current_temperature, 3);
    // 28 bytes is not enough to carry the running status byte
    assert_eq!(snapshot.running_status, None);
}

#[test]
fn test_decode_running_status() {
    let mut payload = dual_zone_payload();
    payload.push(0x01);
    let snapshot = decode_status(&payload).unwrap();
    assert_eq!(snapshot.running_status, Some(1));
}

#[test]
fn test_decode_battery_voltage() {
    let mut payload = sample_status_payload();
    payload[16] = 12;
    payload[17] = 6;
    let snapshot = decode_status(&payload).unwrap();
    assert!((snapshot.battery_voltage - 12.6).abs() < 1e-6);
}

#[test]
fn test_decode_too_short() {
    let payload = [0u8; 17];
    assert_eq!(decode_status(&payload), Err(RecordError::TooShort(17)));
}

#[test]
fn test_decode_unknown_enum_values() {
    let mut payload = sample_status_payload();
    payload[2] = 7;
    assert_eq!(
        decode_status(&payload),
        Err(RecordError::UnknownEnumValue { field: "run_mode", value: 7 })
    );

    let mut payload = sample_status_payload();
    payload[3] = 9;
    assert_eq!(
        decode_status(&payload),
        Err(RecordError::UnknownEnumValue { field: "battery_saver", value: 9 })
    );

    let mut payload = sample_status_payload();
    payload[9] = 5;
    assert_eq!(
        decode_status(&payload),
        Err(RecordError::UnknownEnumValue { field: "temperature_unit", value: 5 })
    );
}

#[test]
fn test_command_code_3_is_reserved() {
    assert_eq!(CommandKind::from_code(3), None);
    assert_eq!(CommandKind::from_code(7), None);
}

#[test]
fn test_encode_scalar_commands() {
    assert_eq!(Request::Bind.encode(), [0]);
    assert_eq!(Request::Query.encode(), [1]);
    assert_eq!(Request::Reset.encode(), [4]);
}

#[test]
fn test_encode_target_commands() {
    assert_eq!(Request::SetUnit1Target(-4).encode(), [5, 0xFC]);
    assert_eq!(Request::SetUnit2Target(3).encode(), [6, 3]);
}

#[test]
fn test_encode_set_single_zone() {
    let snapshot = decode_status(&sample_status_payload()).unwrap();
    assert_eq!(
        Request::Set(snapshot).encode(),
        [
            0x02, // command code
            0x00, 0x01, 0x01, 0x01, 0xFC, 0x14, 0xEC, 0x02, 0x00, 0x00, 0x00, 0x00, 0xFF,
            0x01,
        ]
    );
}

#[test]
fn test_encode_set_dual_zone() {
    let snapshot = decode_status(&dual_zone_payload()).unwrap();
    assert_eq!(
        Request::Set(snapshot).encode(),
        [
            0x02, // command code
            0x00, 0x01, 0x01, 0x01, 0xFC, 0x14, 0xEC, 0x02, 0x00, 0x00, 0x00, 0x00, 0xFF,
            0x01, // compartment 1
            0x04, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // compartment 2
        ]
    );
}

#[test]
fn test_set_reencodes_decoded_settings() {
    // Decoding a status record and re-encoding the snapshot as a Set command
    // must reproduce the same settings bytes, for both zone layouts.
    for payload in [sample_status_payload(), dual_zone_payload()] {
        let snapshot = decode_status(&payload).unwrap();
        let reencoded = Request::Set(snapshot.clone()).encode();
        let redecoded = decode_status(&payload).unwrap();
        assert_eq!(redecoded, snapshot);
        assert_eq!(reencoded, Request::Set(redecoded).encode());
    }
}
