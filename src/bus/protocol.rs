// Board SPI protocol: message registry and frame codec
//
// Request frame:  [address, message type, payload..., zero padding]
// Reply frame:    [echo, echo, reserved, status, payload...]
//
// The reply is the same length as the request. Only replies whose status
// byte equals SENTINEL carry data.

use crate::error::{BoardError, Result};

/// SPI address of the board
pub const ADDRESS: u8 = 8;

/// Status byte value confirming the board processed the request
pub const SENTINEL: u8 = 0xA5;

/// Index of the status byte within a reply
pub const STATUS_INDEX: usize = 3;

/// First payload byte within a reply
pub const PAYLOAD_INDEX: usize = 4;

/// Maximum number of bytes a grove I2C transaction may read or write
pub const GROVE_I2C_LENGTH_LIMIT: usize = 32;

/// Message types understood by the board firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    GetManufacturer = 1,
    GetName = 2,
    GetHardwareVersion = 3,
    GetFirmwareVersion = 4,
    GetId = 5,
    SetLed = 6,
    GetVoltage5v = 7,
    GetVoltageVcc = 8,
    SetServo = 9,
    SetMotorPwm = 10,
    SetMotorPosition = 11,
    SetMotorPositionKp = 12,
    SetMotorPositionKd = 13,
    SetMotorDps = 14,
    SetMotorLimits = 15,
    OffsetMotorEncoder = 16,
    GetMotorEncoderLeft = 17,
    GetMotorEncoderRight = 18,
    GetMotorStatusLeft = 19,
    GetMotorStatusRight = 20,
    SetGroveType = 21,
    SetGroveMode = 22,
    SetGroveState = 23,
    SetGrovePwmDuty = 24,
    SetGrovePwmFrequency = 25,
    GetGroveValue1 = 26,
    GetGroveValue2 = 27,
    GetGroveState1_1 = 28,
    GetGroveState1_2 = 29,
    GetGroveState2_1 = 30,
    GetGroveState2_2 = 31,
    GetGroveVoltage1_1 = 32,
    GetGroveVoltage1_2 = 33,
    GetGroveVoltage2_1 = 34,
    GetGroveVoltage2_2 = 35,
    GetGroveAnalog1_1 = 36,
    GetGroveAnalog1_2 = 37,
    GetGroveAnalog2_1 = 38,
    GetGroveAnalog2_2 = 39,
    StartGroveI2c1 = 40,
    StartGroveI2c2 = 41,
}

impl MessageType {
    /// Fixed frame length for this message, or `None` when the length
    /// depends on runtime state (grove value reads, I2C starts).
    pub const fn frame_len(self) -> Option<usize> {
        use MessageType::*;
        match self {
            GetManufacturer | GetName => Some(24),
            GetHardwareVersion | GetFirmwareVersion => Some(8),
            GetId => Some(20),
            SetLed => Some(6),
            GetVoltage5v | GetVoltageVcc => Some(6),
            SetServo => Some(5),
            SetMotorPwm => Some(4),
            SetMotorPosition => Some(7),
            SetMotorPositionKp | SetMotorPositionKd => Some(4),
            SetMotorDps => Some(5),
            SetMotorLimits => Some(6),
            OffsetMotorEncoder => Some(7),
            GetMotorEncoderLeft | GetMotorEncoderRight => Some(8),
            GetMotorStatusLeft | GetMotorStatusRight => Some(12),
            SetGroveType | SetGroveMode | SetGroveState => Some(4),
            SetGrovePwmDuty | SetGrovePwmFrequency => Some(5),
            GetGroveState1_1 | GetGroveState1_2 | GetGroveState2_1 | GetGroveState2_2 => Some(6),
            GetGroveVoltage1_1 | GetGroveVoltage1_2 | GetGroveVoltage2_1 | GetGroveVoltage2_2 => {
                Some(7)
            }
            GetGroveAnalog1_1 | GetGroveAnalog1_2 | GetGroveAnalog2_1 | GetGroveAnalog2_2 => {
                Some(7)
            }
            GetGroveValue1 | GetGroveValue2 | StartGroveI2c1 | StartGroveI2c2 => None,
        }
    }

    /// Setters are fire-and-forget: the reply is not inspected
    pub const fn is_setter(self) -> bool {
        use MessageType::*;
        matches!(
            self,
            SetLed
                | SetServo
                | SetMotorPwm
                | SetMotorPosition
                | SetMotorPositionKp
                | SetMotorPositionKd
                | SetMotorDps
                | SetMotorLimits
                | OffsetMotorEncoder
                | SetGroveType
                | SetGroveMode
                | SetGroveState
                | SetGrovePwmDuty
                | SetGrovePwmFrequency
        )
    }
}

/// Build a request frame of exactly `len` bytes
///
/// The payload follows the address and message type; the remainder is
/// zero padding that the board overwrites with its reply.
pub fn build_frame(message: MessageType, payload: &[u8], len: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(len.max(2 + payload.len()));
    frame.push(ADDRESS);
    frame.push(message as u8);
    frame.extend_from_slice(payload);
    if frame.len() < len {
        frame.resize(len, 0);
    }
    frame
}

/// Build a request frame using the registry's fixed length
///
/// Panics in debug builds if the message has no fixed length.
pub fn build_fixed(message: MessageType, payload: &[u8]) -> Vec<u8> {
    let len = message.frame_len();
    debug_assert!(len.is_some(), "{:?} has no fixed frame length", message);
    build_frame(message, payload, len.unwrap_or(2 + payload.len()))
}

/// Validate the reply sentinel and return the payload slice
pub fn check_reply(message: MessageType, reply: &[u8]) -> Result<&[u8]> {
    if reply.len() <= STATUS_INDEX || reply[STATUS_INDEX] != SENTINEL {
        return Err(BoardError::NoResponse { message });
    }
    Ok(&reply[PAYLOAD_INDEX..])
}

/// Ensure a payload holds at least `expected` bytes
pub fn require_len(message: MessageType, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() < expected {
        return Err(BoardError::ShortReply {
            message,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Big-endian unsigned 16-bit value
pub fn decode_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Big-endian two's-complement 16-bit value
pub fn decode_i16(bytes: &[u8]) -> i16 {
    i16::from_be_bytes([bytes[0], bytes[1]])
}

/// Big-endian unsigned 32-bit value
pub fn decode_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Big-endian two's-complement 32-bit value
pub fn decode_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decode a NUL-terminated ASCII string
pub fn decode_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Render a packed version number as `major.minor.patch`
pub fn format_version(raw: u32) -> String {
    format!("{}.{}.{}", raw / 1_000_000, (raw / 1000) % 1000, raw % 1000)
}

/// Render a board id as uppercase hex
pub fn format_id(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
