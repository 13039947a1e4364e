// Sensor and actuator wrappers over grove and servo ports
//
// Each device configures its port when constructed and is then passed the
// board handle on every call. What a device can do is fixed by which of the
// capability traits it implements; the set is closed to this crate.

mod grove;
mod i2c;
mod servo;
mod ultrasonic;

pub use grove::{AnalogSensor, Buzzer, DigitalSensor, GroveLed};
pub use i2c::I2cDevice;
pub use servo::Servo;
pub use ultrasonic::{
    ULTRASONIC_MAX_MM, ULTRASONIC_MAX_SKIPS, ULTRASONIC_NO_READING_MM, ULTRASONIC_SAMPLES,
    UltrasonicSensor,
};

use tracing::{debug, warn};

use crate::board::{Board, GrovePin, GrovePort};
use crate::bus::Transport;
use crate::error::Result;

mod sealed {
    pub trait Sealed {}
}

/// A device attached to one grove pin
pub trait GroveDevice: sealed::Sealed {
    fn pin(&self) -> GrovePin;

    fn port(&self) -> GrovePort {
        self.pin().port()
    }
}

/// Devices that report a digital level
pub trait DigitalInput: GroveDevice {
    /// Pin level; one transparent retry, then 0
    fn read_digital<T: Transport>(&self, board: &mut Board<T>) -> u8 {
        let pin = self.pin();
        read_or_default("digital read", || board.get_grove_state(pin))
    }
}

/// Devices that report a 12-bit analog level
pub trait AnalogInput: GroveDevice {
    /// Raw 0..=4095 reading; one transparent retry, then 0
    fn read_analog<T: Transport>(&self, board: &mut Board<T>) -> u16 {
        let pin = self.pin();
        read_or_default("analog read", || board.get_grove_analog(pin))
    }

    /// Reading scaled to 0.0..=100.0
    fn read_percent<T: Transport>(&self, board: &mut Board<T>) -> f64 {
        self.read_analog(board) as f64 * 100.0 / 4095.0
    }

    /// Pin voltage; one transparent retry, then 0.0
    fn read_voltage<T: Transport>(&self, board: &mut Board<T>) -> f64 {
        let pin = self.pin();
        read_or_default("voltage read", || board.get_grove_voltage(pin))
    }
}

/// Devices driven by a PWM duty cycle
pub trait PwmOutput: GroveDevice {
    /// Duty in percent, clamped to 0..=100
    fn set_duty<T: Transport>(&self, board: &mut Board<T>, percent: f64) -> Result<()> {
        board.set_grove_pwm_duty(self.pin(), percent)
    }

    fn off<T: Transport>(&self, board: &mut Board<T>) -> Result<()> {
        self.set_duty(board, 0.0)
    }
}

/// Run a read, retry once on failure, then fall back to the default value
pub(crate) fn read_or_default<R: Default>(what: &str, mut read: impl FnMut() -> Result<R>) -> R {
    match read() {
        Ok(value) => value,
        Err(first) => {
            debug!("{} failed, retrying: {}", what, first);
            match read() {
                Ok(value) => value,
                Err(e) => {
                    warn!("{} failed twice, using default: {}", what, e);
                    R::default()
                }
            }
        }
    }
}
