// Plain grove devices: digital and analog inputs, LED and buzzer outputs
use super::sealed::Sealed;
use super::{AnalogInput, DigitalInput, GroveDevice, PwmOutput};
use crate::board::{Board, GroveMode, GrovePin, GrovePort, GroveType};
use crate::bus::Transport;
use crate::error::Result;

/// Configure a port as custom and put its signal pin in `mode`
fn configure<T: Transport>(
    board: &mut Board<T>,
    port: GrovePort,
    mode: GroveMode,
) -> Result<GrovePin> {
    let pin = port.pin1();
    board.set_grove_type(port, GroveType::Custom)?;
    board.set_grove_mode(pin, mode)?;
    Ok(pin)
}

/// Button, line follower, touch sensor, or any other on/off input
#[derive(Debug, Clone, Copy)]
pub struct DigitalSensor {
    pin: GrovePin,
}

impl DigitalSensor {
    pub fn new<T: Transport>(board: &mut Board<T>, port: GrovePort) -> Result<Self> {
        Self::with_mode(board, port, GroveMode::InputDigital)
    }

    /// Digital input with an explicit pull-up / pull-down mode
    pub fn with_mode<T: Transport>(
        board: &mut Board<T>,
        port: GrovePort,
        mode: GroveMode,
    ) -> Result<Self> {
        let pin = configure(board, port, mode)?;
        Ok(Self { pin })
    }

    pub fn is_pressed<T: Transport>(&self, board: &mut Board<T>) -> bool {
        self.read_digital(board) != 0
    }
}

impl Sealed for DigitalSensor {}
impl GroveDevice for DigitalSensor {
    fn pin(&self) -> GrovePin {
        self.pin
    }
}
impl DigitalInput for DigitalSensor {}

/// Light, sound, loudness, potentiometer, or any other analog input
#[derive(Debug, Clone, Copy)]
pub struct AnalogSensor {
    pin: GrovePin,
}

impl AnalogSensor {
    pub fn new<T: Transport>(board: &mut Board<T>, port: GrovePort) -> Result<Self> {
        let pin = configure(board, port, GroveMode::InputAnalog)?;
        Ok(Self { pin })
    }
}

impl Sealed for AnalogSensor {}
impl GroveDevice for AnalogSensor {
    fn pin(&self) -> GrovePin {
        self.pin
    }
}
impl AnalogInput for AnalogSensor {}

/// Dimmable grove LED
#[derive(Debug, Clone, Copy)]
pub struct GroveLed {
    pin: GrovePin,
}

impl GroveLed {
    pub fn new<T: Transport>(board: &mut Board<T>, port: GrovePort) -> Result<Self> {
        let pin = configure(board, port, GroveMode::OutputPwm)?;
        Ok(Self { pin })
    }

    pub fn light_max<T: Transport>(&self, board: &mut Board<T>) -> Result<()> {
        self.set_duty(board, 100.0)
    }
}

impl Sealed for GroveLed {}
impl GroveDevice for GroveLed {
    fn pin(&self) -> GrovePin {
        self.pin
    }
}
impl PwmOutput for GroveLed {}

/// Piezo buzzer driven at a chosen frequency with 50 % duty
#[derive(Debug, Clone, Copy)]
pub struct Buzzer {
    pin: GrovePin,
}

impl Buzzer {
    pub const DEFAULT_FREQUENCY_HZ: u32 = 24_000;

    pub fn new<T: Transport>(board: &mut Board<T>, port: GrovePort) -> Result<Self> {
        let pin = configure(board, port, GroveMode::OutputPwm)?;
        board.set_grove_pwm_frequency(port, Self::DEFAULT_FREQUENCY_HZ)?;
        Ok(Self { pin })
    }

    /// Sound a tone; frequency is clamped to 3..=48000 Hz
    pub fn sound<T: Transport>(&self, board: &mut Board<T>, hz: u32) -> Result<()> {
        board.set_grove_pwm_frequency(self.port(), hz)?;
        self.set_duty(board, 50.0)
    }
}

impl Sealed for Buzzer {}
impl GroveDevice for Buzzer {
    fn pin(&self) -> GrovePin {
        self.pin
    }
}
impl PwmOutput for Buzzer {}
