// Grove ultrasonic ranger
//
// Meant for continuous polling loops: `read_mm` never fails. It averages a
// few plausible samples and returns ULTRASONIC_NO_READING_MM once too many
// attempts were skipped.

use tracing::debug;

use super::GroveDevice;
use super::sealed::Sealed;
use crate::board::{Board, GrovePin, GrovePort, GroveType, GroveValue};
use crate::bus::Transport;
use crate::error::{BoardError, Result};

/// Samples averaged per reading
pub const ULTRASONIC_SAMPLES: usize = 3;

/// Failed or implausible attempts tolerated per reading
pub const ULTRASONIC_MAX_SKIPS: usize = 5;

/// Largest distance the sensor can report reliably
pub const ULTRASONIC_MAX_MM: u16 = 4300;

/// Returned by `read_mm` when no reading could be taken
pub const ULTRASONIC_NO_READING_MM: u16 = 5010;

#[derive(Debug, Clone, Copy)]
pub struct UltrasonicSensor {
    port: GrovePort,
}

impl UltrasonicSensor {
    pub fn new<T: Transport>(board: &mut Board<T>, port: GrovePort) -> Result<Self> {
        board.set_grove_type(port, GroveType::Ultrasonic)?;
        Ok(Self { port })
    }

    /// Single raw reading; errors are returned, not retried
    pub fn try_read_mm<T: Transport>(&self, board: &mut Board<T>) -> Result<u16> {
        match board.get_grove_value(self.port)? {
            GroveValue::DistanceMm(mm) => Ok(mm),
            other => Err(BoardError::SensorMismatch {
                port: self.port.name(),
                reason: format!("expected a distance, got {:?}", other),
            }),
        }
    }

    /// Averaged distance in millimeters, or ULTRASONIC_NO_READING_MM
    pub fn read_mm<T: Transport>(&self, board: &mut Board<T>) -> u16 {
        let mut readings: Vec<u32> = Vec::with_capacity(ULTRASONIC_SAMPLES);
        let mut skips = 0;

        while readings.len() < ULTRASONIC_SAMPLES && skips < ULTRASONIC_MAX_SKIPS {
            match self.try_read_mm(board) {
                Ok(mm) if mm <= ULTRASONIC_MAX_MM => readings.push(mm as u32),
                Ok(mm) => {
                    debug!("Ultrasonic on {}: implausible {} mm", self.port, mm);
                    skips += 1;
                }
                Err(e) => {
                    debug!("Ultrasonic on {}: {}", self.port, e);
                    skips += 1;
                }
            }
        }

        if readings.len() < ULTRASONIC_SAMPLES {
            return ULTRASONIC_NO_READING_MM;
        }
        let sum: u32 = readings.iter().sum();
        (sum as f64 / readings.len() as f64).round() as u16
    }

    pub fn read_cm<T: Transport>(&self, board: &mut Board<T>) -> f64 {
        self.read_mm(board) as f64 / 10.0
    }

    pub fn read_inches<T: Transport>(&self, board: &mut Board<T>) -> f64 {
        (self.read_mm(board) as f64 / 25.4 * 10.0).round() / 10.0
    }
}

impl Sealed for UltrasonicSensor {}
impl GroveDevice for UltrasonicSensor {
    fn pin(&self) -> GrovePin {
        self.port.pin1()
    }
}
