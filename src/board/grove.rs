// Grove port multiplexer
//
// The board does not describe custom-port payloads, so the host remembers
// what each port was last configured as and decodes value replies by that
// type. Replies pass two checks: the frame sentinel, then the device-level
// status byte.

use std::thread::sleep;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Board;
use super::ports::{GroveMode, GrovePin, GrovePort, GroveState, GroveType};
use crate::bus::Transport;
use crate::bus::protocol::{self, GROVE_I2C_LENGTH_LIMIT, MessageType};
use crate::config::{
    GROVE_I2C_BYTE_TIME, GROVE_I2C_READ_TIMEOUT, GROVE_I2C_START_TIMEOUT, GROVE_SETTLE,
};
use crate::error::{BoardError, ErrorClass, Result};

/// Host-side record of a grove port's configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroveConfig {
    pub kind: GroveType,
    /// Bytes requested by the last I2C start on this port
    pub i2c_in_bytes: usize,
}

impl Default for GroveConfig {
    fn default() -> Self {
        Self {
            kind: GroveType::Custom,
            i2c_in_bytes: 0,
        }
    }
}

/// Port value decoded according to the configured type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroveValue {
    Raw(u8),
    IrCode(u8),
    Ev3Remote([u8; 4]),
    DistanceMm(u16),
    I2c(Vec<u8>),
}

impl<T: Transport> Board<T> {
    /// Configure a port's device type and remember it for later reads
    pub fn set_grove_type(&mut self, port: GrovePort, kind: GroveType) -> Result<()> {
        self.grove[port.index()] = GroveConfig {
            kind,
            i2c_in_bytes: 0,
        };
        self.write(MessageType::SetGroveType, &[port.mask(), kind as u8])?;
        sleep(GROVE_SETTLE);
        Ok(())
    }

    /// Type the host last configured on `port`
    pub fn grove_type(&self, port: GrovePort) -> GroveType {
        self.grove[port.index()].kind
    }

    pub fn set_grove_mode(&mut self, pin: GrovePin, mode: GroveMode) -> Result<()> {
        self.write(MessageType::SetGroveMode, &[pin.mask(), mode as u8])?;
        sleep(GROVE_SETTLE);
        Ok(())
    }

    /// Drive a digital output pin high or low
    pub fn set_grove_state(&mut self, pin: GrovePin, high: bool) -> Result<()> {
        self.write(MessageType::SetGroveState, &[pin.mask(), high as u8])
    }

    /// PWM duty in percent, clamped to 0..=100 with 0.1 % resolution
    pub fn set_grove_pwm_duty(&mut self, pin: GrovePin, percent: f64) -> Result<()> {
        let duty = (percent.clamp(0.0, 100.0) * 10.0).round() as u16;
        let [hi, lo] = duty.to_be_bytes();
        self.write(MessageType::SetGrovePwmDuty, &[pin.mask(), hi, lo])
    }

    /// PWM frequency in Hz, clamped to 3..=48000
    pub fn set_grove_pwm_frequency(&mut self, port: GrovePort, hz: u32) -> Result<()> {
        let hz = hz.clamp(3, 48_000) as u16;
        let [hi, lo] = hz.to_be_bytes();
        self.write(MessageType::SetGrovePwmFrequency, &[port.mask(), hi, lo])
    }

    /// Read a port's composite value, decoded by its configured type
    pub fn get_grove_value(&mut self, port: GrovePort) -> Result<GroveValue> {
        let config = self.grove[port.index()];
        let message = port.value_message();
        let len = config.kind.value_frame_len(config.i2c_in_bytes);
        let payload = self.read_payload(message, len)?;
        decode_grove_value(port, config, &payload)
    }

    /// Digital level of a pin
    pub fn get_grove_state(&mut self, pin: GrovePin) -> Result<u8> {
        let message = pin.state_message();
        let payload = self.read_payload(message, message.frame_len().unwrap_or(6))?;
        let data = decode_pin_reply(pin, message, &payload, 1)?;
        Ok(data[0])
    }

    /// Pin voltage in volts
    pub fn get_grove_voltage(&mut self, pin: GrovePin) -> Result<f64> {
        let message = pin.voltage_message();
        let payload = self.read_payload(message, message.frame_len().unwrap_or(7))?;
        let data = decode_pin_reply(pin, message, &payload, 2)?;
        Ok(protocol::decode_u16(data) as f64 / 1000.0)
    }

    /// 12-bit analog reading of a pin
    pub fn get_grove_analog(&mut self, pin: GrovePin) -> Result<u16> {
        let message = pin.analog_message();
        let payload = self.read_payload(message, message.frame_len().unwrap_or(7))?;
        let data = decode_pin_reply(pin, message, &payload, 2)?;
        Ok(protocol::decode_u16(data))
    }

    /// Begin an I2C transaction on a port configured as `GroveType::I2c`
    ///
    /// Lengths above the 32-byte limit are rejected, not truncated.
    pub fn grove_i2c_start(
        &mut self,
        port: GrovePort,
        address: u8,
        out: &[u8],
        in_bytes: usize,
    ) -> Result<()> {
        if in_bytes > GROVE_I2C_LENGTH_LIMIT {
            return Err(BoardError::InvalidArgument(format!(
                "read length {} exceeds {} bytes",
                in_bytes, GROVE_I2C_LENGTH_LIMIT
            )));
        }
        if out.len() > GROVE_I2C_LENGTH_LIMIT {
            return Err(BoardError::InvalidArgument(format!(
                "write length {} exceeds {} bytes",
                out.len(),
                GROVE_I2C_LENGTH_LIMIT
            )));
        }
        let config = self.grove[port.index()];
        if config.kind != GroveType::I2c {
            return Err(BoardError::SensorMismatch {
                port: port.name(),
                reason: format!("configured as {:?}, not I2C", config.kind),
            });
        }

        let message = port.i2c_start_message();
        let mut payload = vec![(address & 0x7F) << 1, in_bytes as u8, out.len() as u8];
        payload.extend_from_slice(out);
        let frame = protocol::build_frame(message, &payload, 5 + out.len());
        let reply = self.transfer(&frame)?;

        self.grove[port.index()].i2c_in_bytes = in_bytes;
        protocol::check_reply(message, &reply)?;
        Ok(())
    }

    /// Write `out` then read `in_bytes` from an I2C device on a grove port
    ///
    /// The bus stays locked from the start through the final poll.
    pub fn grove_i2c_transfer(
        &mut self,
        port: GrovePort,
        address: u8,
        out: &[u8],
        in_bytes: usize,
    ) -> Result<Vec<u8>> {
        self.with_bus_held(|board| {
            let deadline = Instant::now() + GROVE_I2C_START_TIMEOUT;
            loop {
                match board.grove_i2c_start(port, address, out, in_bytes) {
                    Ok(()) => break,
                    Err(e) if e.class() == ErrorClass::TransportAbsent => {
                        if Instant::now() > deadline {
                            return Err(BoardError::Timeout {
                                operation: "starting grove I2C transaction",
                            });
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            sleep(i2c_settle_time(out.len(), in_bytes));

            let deadline = Instant::now() + GROVE_I2C_READ_TIMEOUT;
            loop {
                match board.get_grove_value(port) {
                    Ok(GroveValue::I2c(data)) => return Ok(data),
                    Ok(other) => {
                        return Err(BoardError::InvalidValue {
                            port: port.name(),
                            reason: format!("unexpected value {:?}", other),
                        });
                    }
                    Err(e)
                        if matches!(
                            e.class(),
                            ErrorClass::InvalidValue | ErrorClass::SensorMismatch
                        ) =>
                    {
                        debug!("Grove I2C on {} not ready: {}", port, e);
                        if Instant::now() > deadline {
                            warn!("Grove I2C on {} timed out", port);
                            return Err(BoardError::Timeout {
                                operation: "waiting for grove I2C data",
                            });
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

/// Time the board needs to clock a passthrough transaction
///
/// Each non-empty direction costs its length plus the address byte.
pub(crate) fn i2c_settle_time(out_len: usize, in_len: usize) -> Duration {
    let mut bytes = 0;
    if out_len > 0 {
        bytes += 1 + out_len;
    }
    if in_len > 0 {
        bytes += 1 + in_len;
    }
    GROVE_I2C_BYTE_TIME * bytes as u32
}

/// Decode a grove value payload (bytes after the sentinel)
///
/// Byte 0 echoes the port type, byte 1 is the device-level status, data
/// follows.
pub fn decode_grove_value(
    port: GrovePort,
    config: GroveConfig,
    payload: &[u8],
) -> Result<GroveValue> {
    let name = port.name();
    let message = port.value_message();
    protocol::require_len(message, payload, 2)?;

    let (echoed, status) = (payload[0], payload[1]);
    if echoed != config.kind as u8 {
        return Err(BoardError::SensorMismatch {
            port: name,
            reason: format!(
                "configured {:?}, board reports type {}",
                config.kind, echoed
            ),
        });
    }

    let state = GroveState::from_u8(status);
    if state != Some(GroveState::ValidData) {
        return Err(match (config.kind, state) {
            (GroveType::IrRemote | GroveType::IrEv3Remote, _) => BoardError::SensorMismatch {
                port: name,
                reason: format!("remote status {}", status),
            },
            (_, Some(GroveState::NotConfigured | GroveState::Configuring)) => {
                BoardError::SensorMismatch {
                    port: name,
                    reason: format!("device state {:?}", state),
                }
            }
            (GroveType::I2c, Some(GroveState::I2cError)) => BoardError::I2cBus { port: name },
            _ => BoardError::InvalidValue {
                port: name,
                reason: format!("device status {}", status),
            },
        });
    }

    let data = &payload[2..];
    match config.kind {
        GroveType::Custom => {
            protocol::require_len(message, data, 1)?;
            Ok(GroveValue::Raw(data[0]))
        }
        GroveType::IrRemote => {
            protocol::require_len(message, data, 1)?;
            Ok(GroveValue::IrCode(data[0]))
        }
        GroveType::IrEv3Remote => {
            protocol::require_len(message, data, 4)?;
            Ok(GroveValue::Ev3Remote([data[0], data[1], data[2], data[3]]))
        }
        GroveType::Ultrasonic => {
            protocol::require_len(message, data, 2)?;
            match protocol::decode_u16(data) {
                0 => Err(BoardError::SensorNotResponding { port: name }),
                1 => Err(BoardError::ObjectNotDetected { port: name }),
                mm => Ok(GroveValue::DistanceMm(mm)),
            }
        }
        GroveType::I2c => {
            protocol::require_len(message, data, config.i2c_in_bytes)?;
            Ok(GroveValue::I2c(data[..config.i2c_in_bytes].to_vec()))
        }
    }
}

/// Check the device-level status of a pin read and return its data bytes
pub fn decode_pin_reply<'a>(
    pin: GrovePin,
    message: MessageType,
    payload: &'a [u8],
    data_len: usize,
) -> Result<&'a [u8]> {
    protocol::require_len(message, payload, 1 + data_len)?;
    let port = pin.port().name();
    match GroveState::from_u8(payload[0]) {
        Some(GroveState::ValidData) => Ok(&payload[1..1 + data_len]),
        Some(state @ (GroveState::NotConfigured | GroveState::Configuring)) => {
            Err(BoardError::SensorMismatch {
                port,
                reason: format!("{:?} state {:?}", pin, state),
            })
        }
        _ => Err(BoardError::InvalidValue {
            port,
            reason: format!("{:?} status {}", pin, payload[0]),
        }),
    }
}
