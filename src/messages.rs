// Report types returned by the board and printed by the CLI

use serde::{Deserialize, Serialize};

use crate::board::ports::MotorFlags;
use crate::motion::MotionState;

/// Identity and supply readings of the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardInfo {
    pub manufacturer: String,
    pub board: String,
    pub hardware_version: String,
    pub firmware_version: String,
    pub id: String,
    pub voltage_5v: f64,
    pub voltage_battery: f64,
}

/// Decoded motor status reply
///
/// Position and speed are already scaled from ticks to degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorStatus {
    pub flags: MotorFlags,
    /// PWM power currently applied, -100..=100, or -128 when floating
    pub power: i8,
    pub position_degrees: f64,
    pub dps: f64,
}

/// Snapshot of both motors as seen by the motion controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionReport {
    pub left: MotorReport,
    pub right: MotorReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorReport {
    pub state: MotionState,
    pub target_degrees: Option<f64>,
    pub encoder_degrees: f64,
}

/// Supply voltages and both motor statuses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardStatus {
    pub voltage_5v: f64,
    pub voltage_battery: f64,
    pub left: MotorStatus,
    pub right: MotorStatus,
}
