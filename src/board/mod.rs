// Board handle
//
// Owns the transport, the bus arbiter, the robot constants used for tick
// scaling, and the host-side record of what each grove port was configured
// as. Every operation is one blocking transfer (or a short fixed sequence).

mod grove;
mod motor;
pub mod ports;

pub use grove::{GroveConfig, GroveValue, decode_grove_value, decode_pin_reply};
pub use motor::{MOTOR_FLOAT, decode_motor_status};
pub use ports::{
    GroveMode, GrovePin, GrovePort, GroveState, GroveType, Leds, MotorFlags, MotorPort, ServoPort,
};

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bus::protocol::{self, MessageType};
use crate::bus::{BusArbiter, BusGuard, LockMode, Transport};
use crate::config::{
    self, EXPECTED_BOARD, EXPECTED_MANUFACTURER, FIRMWARE_VERSION_REQUIRED, LEGACY_ENCODER_TICKS,
    RobotConstants,
};
use crate::error::{BoardError, Result};
use crate::messages::BoardInfo;

/// How a board handle is brought up
#[derive(Debug, Clone)]
pub struct BoardOptions {
    /// Verify manufacturer, board name, and firmware version on open
    pub detect: bool,
    pub lock: LockMode,
    /// Constants file to load (and rewrite on failure)
    pub config_path: Option<PathBuf>,
    /// Board ids known to carry 16-tick encoders
    pub legacy_serials_path: Option<PathBuf>,
    /// Explicit constants; skips the config file entirely
    pub constants: Option<RobotConstants>,
}

impl Default for BoardOptions {
    fn default() -> Self {
        Self {
            detect: true,
            lock: LockMode::default(),
            config_path: Some(PathBuf::from(config::DEFAULT_CONFIG_PATH)),
            legacy_serials_path: Some(PathBuf::from(config::DEFAULT_LEGACY_SERIALS_PATH)),
            constants: None,
        }
    }
}

impl BoardOptions {
    /// No detection, no locking, default constants
    pub fn offline() -> Self {
        Self {
            detect: false,
            lock: LockMode::Disabled,
            config_path: None,
            legacy_serials_path: None,
            constants: None,
        }
    }
}

pub struct Board<T: Transport> {
    transport: T,
    arbiter: Option<BusArbiter>,
    held: Option<BusGuard>,
    constants: RobotConstants,
    grove: [GroveConfig; 2],
}

#[cfg(target_os = "linux")]
impl Board<crate::bus::SpiTransport> {
    /// Open the board on the default SPI device
    pub fn open(options: BoardOptions) -> Result<Self> {
        let transport = crate::bus::SpiTransport::open()?;
        Self::new(transport, options)
    }
}

impl<T: Transport> Board<T> {
    /// Bring up a board over an arbitrary transport
    ///
    /// Detection failures (no board, wrong firmware) are returned as-is.
    pub fn new(transport: T, options: BoardOptions) -> Result<Self> {
        let arbiter = match &options.lock {
            LockMode::PerTransfer(path) => Some(BusArbiter::new(path)),
            LockMode::Disabled => {
                info!("Bus locking disabled; this process must own the bus exclusively");
                None
            }
        };

        let mut board = Self {
            transport,
            arbiter,
            held: None,
            constants: RobotConstants::default(),
            grove: [GroveConfig::default(); 2],
        };

        if options.detect {
            board.detect()?;
        }

        if let Some(constants) = options.constants {
            board.constants = constants;
        } else if let Some(path) = &options.config_path {
            board.load_robot_constants(path, options.legacy_serials_path.as_deref());
        }

        Ok(board)
    }

    /// Check identity strings and firmware compatibility
    pub fn detect(&mut self) -> Result<()> {
        let manufacturer = self.get_manufacturer()?;
        let board = self.get_board()?;
        if manufacturer != EXPECTED_MANUFACTURER || board != EXPECTED_BOARD {
            return Err(BoardError::NotDetected {
                manufacturer,
                board,
            });
        }

        let firmware = self.get_version_firmware()?;
        if !firmware_compatible(&firmware, FIRMWARE_VERSION_REQUIRED) {
            return Err(BoardError::FirmwareVersion {
                found: firmware,
                required: FIRMWARE_VERSION_REQUIRED.to_string(),
            });
        }

        info!("Detected {} {} (firmware {})", manufacturer, board, firmware);
        Ok(())
    }

    pub fn constants(&self) -> &RobotConstants {
        &self.constants
    }

    /// Load robot constants, rewriting the file when any field fell back
    ///
    /// Never fails: unreadable files produce defaults. When the ticks
    /// field is missing, the board id is checked against the legacy serial
    /// list to pick 16-tick encoders.
    pub fn load_robot_constants(&mut self, path: &Path, legacy_serials: Option<&Path>) {
        let loaded = RobotConstants::load(path);
        let mut constants = loaded.constants;

        if loaded.ticks_defaulted {
            if let Some(ticks) = legacy_serials.and_then(|list| self.legacy_ticks(list)) {
                constants.encoder_ticks_per_rotation = ticks;
            }
        }

        self.constants = constants;
        info!(
            "Robot constants: wheel {} mm, base {} mm, {} ticks, gear ratio {}",
            constants.wheel_diameter_mm,
            constants.wheel_base_width_mm,
            constants.encoder_ticks_per_rotation,
            constants.motor_gear_ratio
        );

        if loaded.defaulted {
            if let Err(e) = constants.save(path) {
                warn!("Could not rewrite {}: {}", path.display(), e);
            }
        }
    }

    fn legacy_ticks(&mut self, list: &Path) -> Option<u32> {
        let serials = config::read_legacy_serials(list);
        if serials.is_empty() {
            return None;
        }
        match self.get_id() {
            Ok(id) if serials.contains(&id) => {
                info!("Board {} has legacy {}-tick encoders", id, LEGACY_ENCODER_TICKS);
                Some(LEGACY_ENCODER_TICKS)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Could not read board id for encoder detection: {}", e);
                None
            }
        }
    }

    /// Override the constants, optionally persisting them
    pub fn set_robot_constants(
        &mut self,
        constants: RobotConstants,
        persist: Option<&Path>,
    ) -> Result<()> {
        self.constants = constants;
        if let Some(path) = persist {
            constants.save(path)?;
        }
        Ok(())
    }

    /// One full-duplex exchange, holding the bus lock unless already held
    pub fn transfer(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        debug!("SPI out: {:02X?}", frame);
        let reply = match (&self.held, &self.arbiter) {
            (None, Some(arbiter)) => {
                let guard = arbiter.acquire()?;
                let result = self.transport.transfer(frame);
                drop(guard);
                result?
            }
            _ => self.transport.transfer(frame)?,
        };
        debug!("SPI in:  {:02X?}", reply);
        Ok(reply)
    }

    /// Run `f` with the bus held for its whole duration
    ///
    /// Transfers issued inside `f` do not re-acquire the lock, so no other
    /// process can interleave a frame between them.
    pub fn with_bus_held<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.held.is_some() {
            return f(self);
        }
        let Some(arbiter) = &self.arbiter else {
            return f(self);
        };
        self.held = Some(arbiter.acquire()?);
        let result = f(self);
        self.held = None;
        result
    }

    pub fn is_bus_held(&self) -> bool {
        self.held.is_some()
    }

    pub(crate) fn write(&mut self, message: MessageType, payload: &[u8]) -> Result<()> {
        let frame = protocol::build_fixed(message, payload);
        self.transfer(&frame)?;
        Ok(())
    }

    pub(crate) fn read_payload(&mut self, message: MessageType, len: usize) -> Result<Vec<u8>> {
        let frame = protocol::build_frame(message, &[], len);
        let reply = self.transfer(&frame)?;
        Ok(protocol::check_reply(message, &reply)?.to_vec())
    }

    fn read_fixed(&mut self, message: MessageType, min_payload: usize) -> Result<Vec<u8>> {
        let len = message.frame_len().unwrap_or(protocol::PAYLOAD_INDEX + min_payload);
        let payload = self.read_payload(message, len)?;
        protocol::require_len(message, &payload, min_payload)?;
        Ok(payload)
    }

    pub(crate) fn read_u16(&mut self, message: MessageType) -> Result<u16> {
        let payload = self.read_fixed(message, 2)?;
        Ok(protocol::decode_u16(&payload))
    }

    pub(crate) fn read_u32(&mut self, message: MessageType) -> Result<u32> {
        let payload = self.read_fixed(message, 4)?;
        Ok(protocol::decode_u32(&payload))
    }

    pub(crate) fn read_i32(&mut self, message: MessageType) -> Result<i32> {
        let payload = self.read_fixed(message, 4)?;
        Ok(protocol::decode_i32(&payload))
    }

    fn read_string(&mut self, message: MessageType) -> Result<String> {
        let payload = self.read_fixed(message, 0)?;
        Ok(protocol::decode_string(&payload))
    }

    pub fn get_manufacturer(&mut self) -> Result<String> {
        self.read_string(MessageType::GetManufacturer)
    }

    pub fn get_board(&mut self) -> Result<String> {
        self.read_string(MessageType::GetName)
    }

    pub fn get_version_hardware(&mut self) -> Result<String> {
        let raw = self.read_u32(MessageType::GetHardwareVersion)?;
        Ok(protocol::format_version(raw))
    }

    pub fn get_version_firmware(&mut self) -> Result<String> {
        let raw = self.read_u32(MessageType::GetFirmwareVersion)?;
        Ok(protocol::format_version(raw))
    }

    /// 128-bit board serial number as 32 hex digits
    pub fn get_id(&mut self) -> Result<String> {
        let payload = self.read_fixed(MessageType::GetId, 16)?;
        Ok(protocol::format_id(&payload[..16]))
    }

    /// 5 V rail in volts
    pub fn get_voltage_5v(&mut self) -> Result<f64> {
        Ok(self.read_u16(MessageType::GetVoltage5v)? as f64 / 1000.0)
    }

    /// Battery (VCC) in volts
    pub fn get_voltage_battery(&mut self) -> Result<f64> {
        Ok(self.read_u16(MessageType::GetVoltageVcc)? as f64 / 1000.0)
    }

    pub fn board_info(&mut self) -> Result<BoardInfo> {
        Ok(BoardInfo {
            manufacturer: self.get_manufacturer()?,
            board: self.get_board()?,
            hardware_version: self.get_version_hardware()?,
            firmware_version: self.get_version_firmware()?,
            id: self.get_id()?,
            voltage_5v: self.get_voltage_5v()?,
            voltage_battery: self.get_voltage_battery()?,
        })
    }

    /// Set LED color; channel values are clamped to 0..=255
    pub fn set_led(&mut self, leds: Leds, red: i32, green: i32, blue: i32) -> Result<()> {
        let clamp = |v: i32| v.clamp(0, 255) as u8;
        self.write(
            MessageType::SetLed,
            &[leds.bits(), clamp(red), clamp(green), clamp(blue)],
        )
    }

    /// Set servo pulse width in microseconds; 0 turns the output off
    pub fn set_servo(&mut self, port: ServoPort, pulse_us: u32) -> Result<()> {
        let pulse = pulse_us.min(u16::MAX as u32) as u16;
        let [hi, lo] = pulse.to_be_bytes();
        self.write(MessageType::SetServo, &[port.mask(), hi, lo])
    }

    /// Return every output to a safe idle state
    pub fn reset_all(&mut self) -> Result<()> {
        for port in GrovePort::ALL {
            self.set_grove_type(port, GroveType::Custom)?;
        }
        self.set_motor_power(MotorPort::Both, MOTOR_FLOAT as i32)?;
        self.set_motor_limits(MotorPort::Both, 0, 0.0)?;
        self.set_servo(ServoPort::Both, 0)?;
        self.set_led(Leds::all(), 0, 0, 0)
    }

    /// Tracked configuration of a grove port
    pub fn grove_config(&self, port: GrovePort) -> GroveConfig {
        self.grove[port.index()]
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Compare the major.minor part of two version strings
pub fn firmware_compatible(found: &str, required: &str) -> bool {
    fn major_minor(v: &str) -> Vec<&str> {
        v.split('.').take(2).collect()
    }
    let required = major_minor(required);
    let found = major_minor(found);
    found.len() == required.len() && found == required
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bus::protocol::SENTINEL;
    use crate::bus::MockTransport;

    fn padded(text: &str, len: usize) -> Vec<u8> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(len, 0);
        bytes
    }

    /// Offline board over a fresh mock
    pub(crate) fn mock_board() -> (Board<MockTransport>, MockTransport) {
        let mock = MockTransport::new();
        let board = Board::new(mock.clone(), BoardOptions::offline()).unwrap();
        (board, mock)
    }

    fn detecting() -> BoardOptions {
        BoardOptions {
            detect: true,
            ..BoardOptions::offline()
        }
    }

    #[test]
    fn test_detect_accepts_expected_board() {
        let mock = MockTransport::new();
        mock.push_payload(&padded(EXPECTED_MANUFACTURER, 20));
        mock.push_payload(&padded(EXPECTED_BOARD, 20));
        mock.push_payload(&1_000_003u32.to_be_bytes());

        let board = Board::new(mock.clone(), detecting());
        assert!(board.is_ok());

        let sent = mock.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].len(), 24);
        assert_eq!(sent[2].len(), 8);
    }

    #[test]
    fn test_detect_rejects_firmware_mismatch() {
        let mock = MockTransport::new();
        mock.push_payload(&padded(EXPECTED_MANUFACTURER, 20));
        mock.push_payload(&padded(EXPECTED_BOARD, 20));
        mock.push_payload(&2_001_000u32.to_be_bytes());

        let err = Board::new(mock.clone(), detecting()).err().unwrap();
        assert!(matches!(err, BoardError::FirmwareVersion { .. }));
    }

    #[test]
    fn test_detect_propagates_absent_board() {
        let mock = MockTransport::new();
        let err = Board::new(mock.clone(), detecting()).err().unwrap();
        assert!(matches!(
            err,
            BoardError::NoResponse {
                message: MessageType::GetManufacturer
            }
        ));
    }

    #[test]
    fn test_detect_rejects_foreign_board() {
        let mock = MockTransport::new();
        mock.push_payload(&padded("Someone Else", 20));
        mock.push_payload(&padded("Widget", 20));
        let err = Board::new(mock.clone(), detecting()).err().unwrap();
        assert!(matches!(err, BoardError::NotDetected { .. }));
    }

    #[test]
    fn test_identity_reads() {
        let (mut board, mock) = mock_board();
        let id: Vec<u8> = (0u8..16).collect();
        mock.push_payload(&id);
        assert_eq!(board.get_id().unwrap(), "000102030405060708090A0B0C0D0E0F");

        mock.push_payload(&[0x1F, 0x40]);
        assert_eq!(board.get_voltage_battery().unwrap(), 8.0);
        assert_eq!(mock.last_sent().unwrap(), vec![8, 8, 0, 0, 0, 0]);

        mock.push_payload(&[0x13, 0x88]);
        assert_eq!(board.get_voltage_5v().unwrap(), 5.0);
        assert_eq!(mock.last_sent().unwrap(), vec![8, 7, 0, 0, 0, 0]);

        mock.push_payload(&3_000_000u32.to_be_bytes());
        assert_eq!(board.get_version_hardware().unwrap(), "3.0.0");
    }

    #[test]
    fn test_set_led_clamps_channels() {
        let (mut board, mock) = mock_board();
        board
            .set_led(Leds::EYE_LEFT | Leds::EYE_RIGHT, 300, -5, 128)
            .unwrap();
        assert_eq!(mock.last_sent().unwrap(), vec![8, 6, 0x03, 255, 0, 128]);
    }

    #[test]
    fn test_set_servo_encodes_pulse_big_endian() {
        let (mut board, mock) = mock_board();
        board.set_servo(ServoPort::Servo2, 1500).unwrap();
        assert_eq!(mock.last_sent().unwrap(), vec![8, 9, 0x02, 0x05, 0xDC]);
    }

    #[test]
    fn test_setters_ignore_missing_sentinel() {
        let (mut board, mock) = mock_board();
        mock.push_reply(vec![0; 6]);
        assert!(board.set_led(Leds::WIFI, 0, 0, 255).is_ok());
    }

    #[test]
    fn test_reset_all_frames() {
        let (mut board, mock) = mock_board();
        board.reset_all().unwrap();
        let sent = mock.sent();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[0], vec![8, 21, 0x03, 1]);
        assert_eq!(sent[1], vec![8, 21, 0x0C, 1]);
        assert_eq!(sent[2], vec![8, 10, 0x03, 0x80]);
        assert_eq!(sent[5][2], Leds::all().bits());
    }

    #[test]
    fn test_firmware_compatible() {
        assert!(firmware_compatible("1.0.3", "1.0"));
        assert!(!firmware_compatible("1.1.0", "1.0"));
        assert!(!firmware_compatible("2.0.0", "1.0"));
        assert!(!firmware_compatible("1", "1.0"));
    }

    #[test]
    fn test_constants_reload_rewrites_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robot.json");
        std::fs::write(&path, r#"{"wheel-diameter": 70.0, "wheel-base-width": 120.0}"#).unwrap();

        let (mut board, _mock) = mock_board();
        board.load_robot_constants(&path, None);
        assert_eq!(board.constants().encoder_ticks_per_rotation, 6);
        assert_eq!(board.constants().wheel_diameter_mm, 70.0);

        let reloaded = RobotConstants::load(&path);
        assert!(!reloaded.defaulted);
        assert_eq!(reloaded.constants.wheel_base_width_mm, 120.0);
    }

    #[test]
    fn test_legacy_serial_selects_16_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let serials = dir.path().join("serials.txt");
        std::fs::write(&serials, "000102030405060708090A0B0C0D0E0F\n").unwrap();

        let (mut board, mock) = mock_board();
        mock.push_payload(&(0u8..16).collect::<Vec<_>>());
        board.load_robot_constants(&dir.path().join("robot.json"), Some(&serials));
        assert_eq!(board.constants().encoder_ticks_per_rotation, 16);

        let saved = RobotConstants::load(&dir.path().join("robot.json"));
        assert_eq!(saved.constants.encoder_ticks_per_rotation, 16);
    }

    #[test]
    fn test_open_applies_legacy_serial_list() {
        let dir = tempfile::tempdir().unwrap();
        let serials = dir.path().join("serials.txt");
        std::fs::write(
            &serials,
            "# shipped with 16-tick encoders\n000102030405060708090a0b0c0d0e0f\n",
        )
        .unwrap();

        let mock = MockTransport::new();
        mock.push_payload(&(0u8..16).collect::<Vec<_>>());
        let options = BoardOptions {
            detect: false,
            lock: LockMode::Disabled,
            config_path: Some(dir.path().join("robot.json")),
            legacy_serials_path: Some(serials),
            ..BoardOptions::default()
        };
        let board = Board::new(mock.clone(), options).unwrap();
        assert_eq!(board.constants().encoder_ticks_per_rotation, 16);
        assert_eq!(mock.sent()[0][1], MessageType::GetId as u8);
    }

    #[test]
    fn test_default_options_use_standard_paths() {
        let options = BoardOptions::default();
        assert!(options.detect);
        assert_eq!(options.config_path, Some(PathBuf::from(config::DEFAULT_CONFIG_PATH)));
        assert_eq!(
            options.legacy_serials_path,
            Some(PathBuf::from(config::DEFAULT_LEGACY_SERIALS_PATH))
        );
    }

    #[test]
    fn test_transfer_takes_lock_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("bus.lock");
        let arbiter = BusArbiter::new(&lock_path);

        let observer = arbiter.clone();
        let mock = MockTransport::with_responder(move |out| {
            // Lock is held while the frame is on the wire
            let held = observer.is_locked().unwrap_or(false);
            let mut reply = vec![0, 0, 0, SENTINEL];
            reply.push(held as u8);
            reply.resize(out.len(), 0);
            reply
        });
        let options = BoardOptions {
            lock: LockMode::PerTransfer(lock_path),
            ..BoardOptions::offline()
        };
        let mut board = Board::new(mock, options).unwrap();

        let payload = board.read_payload(MessageType::GetVoltage5v, 6).unwrap();
        assert_eq!(payload[0], 1);
        assert!(!arbiter.is_locked().unwrap());

        let held_inside = board
            .with_bus_held(|b| {
                let _ = b.read_payload(MessageType::GetVoltage5v, 6)?;
                Ok(b.is_bus_held())
            })
            .unwrap();
        assert!(held_inside);
        assert!(!board.is_bus_held());
        assert!(!arbiter.is_locked().unwrap());
    }
}
