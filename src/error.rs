use thiserror::Error;

use crate::frame::FrameError;
use crate::record::RecordError;

/// Failures of the wireless link itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no Bluetooth adapter available")]
    AdapterUnavailable,
    #[error("fridge not found: {0}")]
    DeviceNotFound(String),
    #[error("connect failed: {0}")]
    Connect(#[source] bluest::Error),
    #[error("required GATT characteristics not found")]
    CharacteristicMissing,
    #[error("notification subscription failed: {0}")]
    Subscribe(String),
    #[error("write failed: {0}")]
    Write(#[source] bluest::Error),
    #[error(transparent)]
    Ble(#[from] bluest::Error),
}

/// Everything that can go wrong talking to a fridge.
#[derive(Debug, Error)]
pub enum FridgeError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// No matching response arrived before the caller's deadline. Expected
    /// during monitoring; it drives the online/offline transition.
    #[error("no response before the deadline")]
    Timeout,
    #[error("unexpected command code {0:#04x}")]
    ProtocolViolation(u8),
}
