// Hobby servo on one of the dedicated servo connectors
use crate::board::{Board, ServoPort};
use crate::bus::Transport;
use crate::error::Result;

/// Pulse width spanning the full 0..=180 degree travel
pub const PULSE_WIDTH_RANGE_US: f64 = 1850.0;

/// Pulse width at 90 degrees
pub const PULSE_WIDTH_CENTER_US: f64 = 1500.0;

#[derive(Debug, Clone, Copy)]
pub struct Servo {
    port: ServoPort,
}

impl Servo {
    pub fn new(port: ServoPort) -> Self {
        Self { port }
    }

    /// Pulse width for an angle, clamped to 0..=180 degrees
    pub fn pulse_for(degrees: f64) -> u32 {
        let degrees = degrees.clamp(0.0, 180.0);
        let start = PULSE_WIDTH_CENTER_US - PULSE_WIDTH_RANGE_US / 2.0;
        (start + PULSE_WIDTH_RANGE_US / 180.0 * degrees).round() as u32
    }

    pub fn rotate<T: Transport>(&self, board: &mut Board<T>, degrees: f64) -> Result<()> {
        board.set_servo(self.port, Self::pulse_for(degrees))
    }

    pub fn set_pulse<T: Transport>(&self, board: &mut Board<T>, pulse_us: u32) -> Result<()> {
        board.set_servo(self.port, pulse_us)
    }

    /// Stop driving the servo
    pub fn disable<T: Transport>(&self, board: &mut Board<T>) -> Result<()> {
        board.set_servo(self.port, 0)
    }
}
