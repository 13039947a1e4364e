// Motor setpoints, limits, status, and encoders
//
// Positions and speeds cross this boundary in degrees; the wire carries
// encoder ticks scaled by the robot constants.

use tracing::debug;

use super::Board;
use super::ports::{MotorFlags, MotorPort};
use crate::bus::Transport;
use crate::bus::protocol::{self, MessageType};
use crate::config::RobotConstants;
use crate::error::Result;
use crate::messages::{BoardStatus, MotorStatus};

/// Power value that lets the motor spin freely
pub const MOTOR_FLOAT: i8 = -128;

impl<T: Transport> Board<T> {
    /// Raw PWM power, clamped to -128..=127 (-128 floats the motor)
    ///
    /// Also the way to cancel a position or dps command in progress.
    pub fn set_motor_power(&mut self, port: MotorPort, power: i32) -> Result<()> {
        let power = power.clamp(-128, 127) as i8;
        self.write(MessageType::SetMotorPwm, &[port.mask(), power as u8])
    }

    /// Absolute target position in degrees
    pub fn set_motor_position(&mut self, port: MotorPort, degrees: f64) -> Result<()> {
        let ticks = saturate_i32(self.constants.degrees_to_ticks(degrees));
        debug!("Motor {:?} -> {} deg ({} ticks)", port, degrees, ticks);
        let [a, b, c, d] = ticks.to_be_bytes();
        self.write(MessageType::SetMotorPosition, &[port.mask(), a, b, c, d])
    }

    /// Proportional gain of the firmware position loop
    pub fn set_motor_position_kp(&mut self, port: MotorPort, kp: u8) -> Result<()> {
        self.write(MessageType::SetMotorPositionKp, &[port.mask(), kp])
    }

    /// Derivative gain of the firmware position loop
    pub fn set_motor_position_kd(&mut self, port: MotorPort, kd: u8) -> Result<()> {
        self.write(MessageType::SetMotorPositionKd, &[port.mask(), kd])
    }

    /// Target speed in degrees per second, saturated to the 16-bit wire range
    pub fn set_motor_dps(&mut self, port: MotorPort, dps: f64) -> Result<()> {
        let ticks = saturate_i16(self.constants.degrees_to_ticks(dps));
        let [hi, lo] = ticks.to_be_bytes();
        self.write(MessageType::SetMotorDps, &[port.mask(), hi, lo])
    }

    /// Power (percent, clamped to 0..=100) and speed (dps) ceilings; 0 means no limit
    pub fn set_motor_limits(&mut self, port: MotorPort, power: u8, dps: f64) -> Result<()> {
        let power = power.min(100);
        let ticks = saturate_u16(self.constants.degrees_to_ticks(dps.abs()));
        let [hi, lo] = ticks.to_be_bytes();
        self.write(MessageType::SetMotorLimits, &[port.mask(), power, hi, lo])
    }

    /// Flags, applied power, position, and speed of a single motor
    pub fn get_motor_status(&mut self, port: MotorPort) -> Result<MotorStatus> {
        let message = port.status_message()?;
        let len = message.frame_len().unwrap_or(12);
        let payload = self.read_payload(message, len)?;
        decode_motor_status(message, &payload, &self.constants)
    }

    /// Supply voltages plus the status of both motors
    pub fn status(&mut self) -> Result<BoardStatus> {
        Ok(BoardStatus {
            voltage_5v: self.get_voltage_5v()?,
            voltage_battery: self.get_voltage_battery()?,
            left: self.get_motor_status(MotorPort::Left)?,
            right: self.get_motor_status(MotorPort::Right)?,
        })
    }

    /// Raw encoder ticks of a single motor
    pub fn get_motor_encoder_ticks(&mut self, port: MotorPort) -> Result<i32> {
        self.read_i32(port.encoder_message()?)
    }

    /// Encoder position of a single motor in degrees
    pub fn get_motor_encoder(&mut self, port: MotorPort) -> Result<f64> {
        let ticks = self.get_motor_encoder_ticks(port)?;
        Ok(self.constants.ticks_to_degrees(ticks as i64))
    }

    /// Shift the encoder zero by `degrees`
    pub fn offset_motor_encoder(&mut self, port: MotorPort, degrees: f64) -> Result<()> {
        let ticks = saturate_i32(self.constants.degrees_to_ticks(degrees));
        self.offset_motor_encoder_ticks(port, ticks)
    }

    fn offset_motor_encoder_ticks(&mut self, port: MotorPort, ticks: i32) -> Result<()> {
        let [a, b, c, d] = ticks.to_be_bytes();
        self.write(MessageType::OffsetMotorEncoder, &[port.mask(), a, b, c, d])
    }

    /// Make the current position the new zero
    ///
    /// The board only supports relative offsets, so the current reading is
    /// written back as the offset, one motor at a time.
    pub fn reset_motor_encoder(&mut self, port: MotorPort) -> Result<()> {
        for &motor in port.motors() {
            let ticks = self.get_motor_encoder_ticks(motor)?;
            self.offset_motor_encoder_ticks(motor, ticks)?;
        }
        Ok(())
    }
}

/// Decode a motor status payload (bytes after the sentinel)
pub fn decode_motor_status(
    message: MessageType,
    payload: &[u8],
    constants: &RobotConstants,
) -> Result<MotorStatus> {
    protocol::require_len(message, payload, 8)?;
    let ticks = protocol::decode_i32(&payload[2..6]);
    let dps_ticks = protocol::decode_i16(&payload[6..8]);
    Ok(MotorStatus {
        flags: MotorFlags::from_bits_truncate(payload[0]),
        power: payload[1] as i8,
        position_degrees: constants.ticks_to_degrees(ticks as i64),
        dps: constants.ticks_to_degrees(dps_ticks as i64),
    })
}

fn saturate_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn saturate_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

fn saturate_u16(v: i64) -> u16 {
    v.clamp(0, u16::MAX as i64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::mock_board;
    use crate::error::BoardError;

    #[test]
    fn test_position_gain_frames() {
        let (mut board, mock) = mock_board();
        board.set_motor_position_kp(MotorPort::Left, 25).unwrap();
        assert_eq!(mock.last_sent().unwrap(), vec![8, 12, 0x01, 25]);
        board.set_motor_position_kd(MotorPort::Both, 70).unwrap();
        assert_eq!(mock.last_sent().unwrap(), vec![8, 13, 0x03, 70]);
    }

    #[test]
    fn test_motor_power_clamps() {
        let (mut board, mock) = mock_board();
        board.set_motor_power(MotorPort::Left, 500).unwrap();
        assert_eq!(mock.last_sent().unwrap(), vec![8, 10, 0x01, 127]);
        board.set_motor_power(MotorPort::Right, -500).unwrap();
        assert_eq!(mock.last_sent().unwrap(), vec![8, 10, 0x02, 0x80]);
    }

    #[test]
    fn test_motor_position_scales_degrees_to_ticks() {
        let (mut board, mock) = mock_board();
        // Default constants: 120 * 6 / 360 = 2 ticks per degree
        board.set_motor_position(MotorPort::Both, -90.0).unwrap();
        let frame = mock.last_sent().unwrap();
        assert_eq!(frame.len(), 7);
        assert_eq!(frame[..3], [8, 11, 0x03]);
        assert_eq!(i32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]), -180);
    }

    #[test]
    fn test_motor_dps_saturates() {
        let (mut board, mock) = mock_board();
        board.set_motor_dps(MotorPort::Left, 1.0e9).unwrap();
        let frame = mock.last_sent().unwrap();
        assert_eq!(frame.len(), 5);
        assert_eq!(i16::from_be_bytes([frame[3], frame[4]]), i16::MAX);
    }

    #[test]
    fn test_motor_limits_frame() {
        let (mut board, mock) = mock_board();
        board.set_motor_limits(MotorPort::Both, 150, 300.0).unwrap();
        assert_eq!(mock.last_sent().unwrap(), vec![8, 15, 0x03, 100, 0x02, 0x58]);
    }

    #[test]
    fn test_encoder_read_sign_extends() {
        let (mut board, mock) = mock_board();
        mock.push_payload(&0xFFFF_FF38u32.to_be_bytes());
        assert_eq!(board.get_motor_encoder(MotorPort::Left).unwrap(), -100.0);
        assert_eq!(mock.last_sent().unwrap(), vec![8, 17, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encoder_read_needs_single_motor() {
        let (mut board, mock) = mock_board();
        let err = board.get_motor_encoder(MotorPort::Both).unwrap_err();
        assert!(matches!(err, BoardError::InvalidArgument(_)));
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn test_encoder_read_without_sentinel_fails() {
        let (mut board, _mock) = mock_board();
        let err = board.get_motor_encoder(MotorPort::Right).unwrap_err();
        assert!(matches!(
            err,
            BoardError::NoResponse {
                message: MessageType::GetMotorEncoderRight
            }
        ));
    }

    #[test]
    fn test_reset_encoder_offsets_by_current_reading() {
        let (mut board, mock) = mock_board();
        mock.push_payload(&1234i32.to_be_bytes());
        mock.push_reply(vec![]);
        mock.push_payload(&(-77i32).to_be_bytes());
        board.reset_motor_encoder(MotorPort::Both).unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1][..3], [8, 16, 0x01]);
        assert_eq!(i32::from_be_bytes([sent[1][3], sent[1][4], sent[1][5], sent[1][6]]), 1234);
        assert_eq!(sent[3][..3], [8, 16, 0x02]);
        assert_eq!(i32::from_be_bytes([sent[3][3], sent[3][4], sent[3][5], sent[3][6]]), -77);
    }

    #[test]
    fn test_motor_status_decode() {
        let (mut board, mock) = mock_board();
        let mut payload = vec![0x02, (-50i8) as u8];
        payload.extend_from_slice(&(-720i32).to_be_bytes());
        payload.extend_from_slice(&600i16.to_be_bytes());
        mock.push_payload(&payload);

        let status = board.get_motor_status(MotorPort::Left).unwrap();
        assert_eq!(status.flags, MotorFlags::OVERLOADED);
        assert_eq!(status.power, -50);
        assert_eq!(status.position_degrees, -360.0);
        assert_eq!(status.dps, 300.0);
        assert_eq!(mock.last_sent().unwrap().len(), 12);
    }

    #[test]
    fn test_short_status_payload_rejected() {
        let constants = RobotConstants::default();
        let result = decode_motor_status(MessageType::GetMotorStatusRight, &[0, 0, 1], &constants);
        assert!(matches!(result, Err(BoardError::ShortReply { .. })));
    }

    #[test]
    fn test_status_reads_voltages_and_both_motors() {
        let (mut board, mock) = mock_board();
        mock.push_payload(&5010u16.to_be_bytes());
        mock.push_payload(&9600u16.to_be_bytes());
        mock.push_payload(&[0, 0, 0, 0, 0, 0, 0, 0]);
        mock.push_payload(&[0x01, 0, 0, 0, 0, 0, 0, 0]);

        let status = board.status().unwrap();
        assert_eq!(status.voltage_5v, 5.01);
        assert_eq!(status.voltage_battery, 9.6);
        assert!(status.left.flags.is_empty());
        assert_eq!(status.right.flags, MotorFlags::LOW_VOLTAGE_FLOAT);
    }
}
