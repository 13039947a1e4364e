// Error taxonomy for board communication
//
// Each variant maps onto exactly one protocol or physical condition. The
// coarse category is available through `BoardError::class()`.

use crate::bus::protocol::MessageType;

/// Coarse failure category a caller can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The board did not answer (sentinel mismatch or timeout)
    TransportAbsent,
    /// Firmware major.minor differs from what this driver speaks
    FirmwareVersion,
    /// Port type or device-level configuration state does not match
    SensorMismatch,
    /// A decoded value is outside the device's valid range
    InvalidValue,
    /// Grove I2C passthrough reported a bus fault
    I2cBus,
    /// Caller passed an argument the protocol cannot express
    InvalidArgument,
    /// Host-side failure: lock file, SPI device, configuration persistence
    Host,
}

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("No SPI response to {message:?}")]
    NoResponse { message: MessageType },

    #[error("Timed out {operation}")]
    Timeout { operation: &'static str },

    #[error("No board detected (manufacturer {manufacturer:?}, board {board:?})")]
    NotDetected { manufacturer: String, board: String },

    #[error("Firmware version {found} is not compatible, {required}.x required")]
    FirmwareVersion { found: String, required: String },

    #[error("Sensor mismatch on {port}: {reason}")]
    SensorMismatch { port: &'static str, reason: String },

    #[error("Sensor on {port} not responding")]
    SensorNotResponding { port: &'static str },

    #[error("Object not detected within range on {port}")]
    ObjectNotDetected { port: &'static str },

    #[error("Invalid value from {port}: {reason}")]
    InvalidValue { port: &'static str, reason: String },

    #[error("I2C bus error on {port}")]
    I2cBus { port: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Reply too short for {message:?}: expected {expected} bytes, got {actual}")]
    ShortReply {
        message: MessageType,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[cfg(target_os = "linux")]
    #[error("SPI error: {0}")]
    Spi(#[from] rppal::spi::Error),
}

impl BoardError {
    /// Category of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            BoardError::NoResponse { .. }
            | BoardError::Timeout { .. }
            | BoardError::NotDetected { .. }
            | BoardError::ShortReply { .. } => ErrorClass::TransportAbsent,
            BoardError::FirmwareVersion { .. } => ErrorClass::FirmwareVersion,
            BoardError::SensorMismatch { .. } | BoardError::SensorNotResponding { .. } => {
                ErrorClass::SensorMismatch
            }
            BoardError::ObjectNotDetected { .. } | BoardError::InvalidValue { .. } => {
                ErrorClass::InvalidValue
            }
            BoardError::I2cBus { .. } => ErrorClass::I2cBus,
            BoardError::InvalidArgument(_) => ErrorClass::InvalidArgument,
            BoardError::Io(_) | BoardError::Config(_) => ErrorClass::Host,
            #[cfg(target_os = "linux")]
            BoardError::Spi(_) => ErrorClass::Host,
        }
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;
