// Physical connectors and their wire encodings
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::bus::protocol::MessageType;
use crate::error::BoardError;

/// Motor selector; setters accept `Both`, getters need a single motor
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorPort {
    Left = 0x01,
    Right = 0x02,
    Both = 0x03,
}

impl MotorPort {
    pub fn mask(self) -> u8 {
        self as u8
    }

    /// Single motors addressed by this selector
    pub fn motors(self) -> &'static [MotorPort] {
        match self {
            MotorPort::Left => &[MotorPort::Left],
            MotorPort::Right => &[MotorPort::Right],
            MotorPort::Both => &[MotorPort::Left, MotorPort::Right],
        }
    }

    pub(crate) fn encoder_message(self) -> Result<MessageType, BoardError> {
        match self {
            MotorPort::Left => Ok(MessageType::GetMotorEncoderLeft),
            MotorPort::Right => Ok(MessageType::GetMotorEncoderRight),
            MotorPort::Both => Err(BoardError::InvalidArgument(
                "encoder reads need a single motor".into(),
            )),
        }
    }

    pub(crate) fn status_message(self) -> Result<MessageType, BoardError> {
        match self {
            MotorPort::Left => Ok(MessageType::GetMotorStatusLeft),
            MotorPort::Right => Ok(MessageType::GetMotorStatusRight),
            MotorPort::Both => Err(BoardError::InvalidArgument(
                "status reads need a single motor".into(),
            )),
        }
    }
}

/// Servo connectors
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServoPort {
    Servo1 = 0x01,
    Servo2 = 0x02,
    Both = 0x03,
}

impl ServoPort {
    pub fn mask(self) -> u8 {
        self as u8
    }
}

impl FromStr for ServoPort {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SERVO1" => Ok(ServoPort::Servo1),
            "SERVO2" => Ok(ServoPort::Servo2),
            _ => Err(BoardError::InvalidArgument(format!("unknown servo port {s:?}"))),
        }
    }
}

/// Dual-pin grove connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrovePort {
    Ad1,
    Ad2,
}

impl GrovePort {
    pub const ALL: [GrovePort; 2] = [GrovePort::Ad1, GrovePort::Ad2];

    /// Wire mask covering both pins of the port
    pub fn mask(self) -> u8 {
        match self {
            GrovePort::Ad1 => 0x03,
            GrovePort::Ad2 => 0x0C,
        }
    }

    pub fn index(self) -> usize {
        match self {
            GrovePort::Ad1 => 0,
            GrovePort::Ad2 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GrovePort::Ad1 => "AD1",
            GrovePort::Ad2 => "AD2",
        }
    }

    /// Signal pin 1 (the one most grove devices use)
    pub fn pin1(self) -> GrovePin {
        match self {
            GrovePort::Ad1 => GrovePin::Ad1Pin1,
            GrovePort::Ad2 => GrovePin::Ad2Pin1,
        }
    }

    pub fn pin2(self) -> GrovePin {
        match self {
            GrovePort::Ad1 => GrovePin::Ad1Pin2,
            GrovePort::Ad2 => GrovePin::Ad2Pin2,
        }
    }

    pub(crate) fn value_message(self) -> MessageType {
        match self {
            GrovePort::Ad1 => MessageType::GetGroveValue1,
            GrovePort::Ad2 => MessageType::GetGroveValue2,
        }
    }

    pub(crate) fn i2c_start_message(self) -> MessageType {
        match self {
            GrovePort::Ad1 => MessageType::StartGroveI2c1,
            GrovePort::Ad2 => MessageType::StartGroveI2c2,
        }
    }
}

impl fmt::Display for GrovePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GrovePort {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AD1" => Ok(GrovePort::Ad1),
            "AD2" => Ok(GrovePort::Ad2),
            _ => Err(BoardError::InvalidArgument(format!("unknown grove port {s:?}"))),
        }
    }
}

/// Single signal pin of a grove connector
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrovePin {
    Ad1Pin1 = 0x01,
    Ad1Pin2 = 0x02,
    Ad2Pin1 = 0x04,
    Ad2Pin2 = 0x08,
}

impl GrovePin {
    pub fn mask(self) -> u8 {
        self as u8
    }

    pub fn port(self) -> GrovePort {
        match self {
            GrovePin::Ad1Pin1 | GrovePin::Ad1Pin2 => GrovePort::Ad1,
            GrovePin::Ad2Pin1 | GrovePin::Ad2Pin2 => GrovePort::Ad2,
        }
    }

    pub(crate) fn state_message(self) -> MessageType {
        match self {
            GrovePin::Ad1Pin1 => MessageType::GetGroveState1_1,
            GrovePin::Ad1Pin2 => MessageType::GetGroveState1_2,
            GrovePin::Ad2Pin1 => MessageType::GetGroveState2_1,
            GrovePin::Ad2Pin2 => MessageType::GetGroveState2_2,
        }
    }

    pub(crate) fn voltage_message(self) -> MessageType {
        match self {
            GrovePin::Ad1Pin1 => MessageType::GetGroveVoltage1_1,
            GrovePin::Ad1Pin2 => MessageType::GetGroveVoltage1_2,
            GrovePin::Ad2Pin1 => MessageType::GetGroveVoltage2_1,
            GrovePin::Ad2Pin2 => MessageType::GetGroveVoltage2_2,
        }
    }

    pub(crate) fn analog_message(self) -> MessageType {
        match self {
            GrovePin::Ad1Pin1 => MessageType::GetGroveAnalog1_1,
            GrovePin::Ad1Pin2 => MessageType::GetGroveAnalog1_2,
            GrovePin::Ad2Pin1 => MessageType::GetGroveAnalog2_1,
            GrovePin::Ad2Pin2 => MessageType::GetGroveAnalog2_2,
        }
    }
}

/// Device type a grove port is configured as
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroveType {
    Custom = 1,
    IrRemote = 2,
    IrEv3Remote = 3,
    Ultrasonic = 4,
    I2c = 5,
}

impl GroveType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(GroveType::Custom),
            2 => Some(GroveType::IrRemote),
            3 => Some(GroveType::IrEv3Remote),
            4 => Some(GroveType::Ultrasonic),
            5 => Some(GroveType::I2c),
            _ => None,
        }
    }

    /// Frame length of a value read for this type
    pub fn value_frame_len(self, i2c_in_bytes: usize) -> usize {
        match self {
            GroveType::Custom | GroveType::IrRemote => 7,
            GroveType::IrEv3Remote => 10,
            GroveType::Ultrasonic => 8,
            GroveType::I2c => 6 + i2c_in_bytes,
        }
    }
}

/// Pin mode for custom grove ports
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroveMode {
    InputDigital = 0,
    OutputDigital = 1,
    InputDigitalPullup = 2,
    InputDigitalPulldown = 3,
    InputAnalog = 4,
    OutputPwm = 5,
    InputAnalogPullup = 6,
    InputAnalogPulldown = 7,
}

/// Device-level status byte carried by grove replies
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroveState {
    ValidData = 0,
    NotConfigured = 1,
    Configuring = 2,
    NoData = 3,
    I2cError = 4,
}

impl GroveState {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(GroveState::ValidData),
            1 => Some(GroveState::NotConfigured),
            2 => Some(GroveState::Configuring),
            3 => Some(GroveState::NoData),
            4 => Some(GroveState::I2cError),
            _ => None,
        }
    }
}

bitflags! {
    /// LED channels; combine with `|`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Leds: u8 {
        const EYE_RIGHT = 0x01;
        const EYE_LEFT = 0x02;
        const BLINKER_LEFT = 0x04;
        const BLINKER_RIGHT = 0x08;
        const WIFI = 0x80;
    }
}

bitflags! {
    /// Flags reported in the motor status reply
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MotorFlags: u8 {
        const LOW_VOLTAGE_FLOAT = 0x01;
        const OVERLOADED = 0x02;
    }
}
