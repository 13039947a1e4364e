// Bus settings, timing constants, and persisted robot geometry
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;

// SPI device: bus 0, chip select 1, 500 kHz
pub const SPI_BUS: u8 = 0;
pub const SPI_SLAVE_SELECT: u8 = 1;
pub const SPI_CLOCK_HZ: u32 = 500_000;

// Lock file shared by every process using the bus
pub const DEFAULT_LOCK_PATH: &str = "/run/lock/robobus_spi.lock";

// Persisted robot constants
pub const DEFAULT_CONFIG_PATH: &str = "/home/pi/.robobus/robot_config.json";

// Board ids shipped with 16-tick encoders, one hex id per line
pub const DEFAULT_LEGACY_SERIALS_PATH: &str = "/home/pi/.robobus/legacy_serials.txt";

// Firmware major.minor this driver speaks
pub const FIRMWARE_VERSION_REQUIRED: &str = "1.0";

// Identity strings reported by a genuine board
pub const EXPECTED_MANUFACTURER: &str = "Dexter Industries";
pub const EXPECTED_BOARD: &str = "GoPiGo3";

// Settle time after grove type/mode changes
pub const GROVE_SETTLE: Duration = Duration::from_millis(10);

// Grove I2C passthrough: per-byte transfer time and retry windows
pub const GROVE_I2C_BYTE_TIME: Duration = Duration::from_micros(115);
pub const GROVE_I2C_START_TIMEOUT: Duration = Duration::from_millis(5);
pub const GROVE_I2C_READ_TIMEOUT: Duration = Duration::from_millis(5);

// Motion: convergence window, poll period, stall detection
pub const TARGET_TOLERANCE_DEGREES: f64 = 5.0;
pub const MOTION_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const STALL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SPEED_DPS: f64 = 300.0;

// Robot geometry defaults
pub const DEFAULT_WHEEL_DIAMETER_MM: f64 = 66.5;
pub const DEFAULT_WHEEL_BASE_WIDTH_MM: f64 = 117.0;
pub const DEFAULT_ENCODER_TICKS: u32 = 6;
pub const DEFAULT_MOTOR_GEAR_RATIO: f64 = 120.0;

// Early boards shipped with 16-tick encoders
pub const LEGACY_ENCODER_TICKS: u32 = 16;

const KEY_WHEEL_DIAMETER: &str = "wheel-diameter";
const KEY_WHEEL_BASE_WIDTH: &str = "wheel-base-width";
const KEY_TICKS: &str = "ticks";
const KEY_GEAR_RATIO: &str = "motor_gear_ratio";

/// Physical constants used to scale encoder ticks and plan motions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotConstants {
    #[serde(rename = "wheel-diameter")]
    pub wheel_diameter_mm: f64,
    #[serde(rename = "wheel-base-width")]
    pub wheel_base_width_mm: f64,
    #[serde(rename = "ticks")]
    pub encoder_ticks_per_rotation: u32,
    #[serde(rename = "motor_gear_ratio")]
    pub motor_gear_ratio: f64,
}

impl Default for RobotConstants {
    fn default() -> Self {
        Self {
            wheel_diameter_mm: DEFAULT_WHEEL_DIAMETER_MM,
            wheel_base_width_mm: DEFAULT_WHEEL_BASE_WIDTH_MM,
            encoder_ticks_per_rotation: DEFAULT_ENCODER_TICKS,
            motor_gear_ratio: DEFAULT_MOTOR_GEAR_RATIO,
        }
    }
}

/// Result of reading the constants file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedConstants {
    pub constants: RobotConstants,
    /// Some field was missing, unreadable, or non-positive
    pub defaulted: bool,
    /// The ticks field specifically fell back to its default
    pub ticks_defaulted: bool,
}

impl RobotConstants {
    /// Encoder ticks per degree of wheel rotation
    pub fn ticks_per_degree(&self) -> f64 {
        self.motor_gear_ratio * self.encoder_ticks_per_rotation as f64 / 360.0
    }

    /// Distance covered by one wheel revolution (mm)
    pub fn wheel_circumference(&self) -> f64 {
        self.wheel_diameter_mm * PI
    }

    /// Circle traced by the wheels when spinning in place (mm)
    pub fn wheel_base_circumference(&self) -> f64 {
        self.wheel_base_width_mm * PI
    }

    /// Degrees to raw encoder ticks, rounded to the nearest tick
    pub fn degrees_to_ticks(&self, degrees: f64) -> i64 {
        (degrees * self.ticks_per_degree()).round() as i64
    }

    /// Raw encoder ticks to degrees
    pub fn ticks_to_degrees(&self, ticks: i64) -> f64 {
        ticks as f64 / self.ticks_per_degree()
    }

    /// Read the constants file, falling back per field to defaults
    ///
    /// A missing or unparsable file yields all defaults.
    pub fn load(path: &Path) -> LoadedConstants {
        let document = match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Could not parse {}: {}", path.display(), e);
                    Value::Null
                }
            },
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                Value::Null
            }
        };
        Self::from_json(&document)
    }

    /// Per-field extraction from an already parsed document
    pub fn from_json(document: &Value) -> LoadedConstants {
        let positive = |key: &str| {
            document
                .get(key)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite() && *v > 0.0)
        };

        let defaults = Self::default();
        let diameter = positive(KEY_WHEEL_DIAMETER);
        let base_width = positive(KEY_WHEEL_BASE_WIDTH);
        let ticks = positive(KEY_TICKS).map(|v| v.round() as u32).filter(|&t| t > 0);
        let gear_ratio = positive(KEY_GEAR_RATIO);

        let constants = Self {
            wheel_diameter_mm: diameter.unwrap_or(defaults.wheel_diameter_mm),
            wheel_base_width_mm: base_width.unwrap_or(defaults.wheel_base_width_mm),
            encoder_ticks_per_rotation: ticks.unwrap_or(defaults.encoder_ticks_per_rotation),
            motor_gear_ratio: gear_ratio.unwrap_or(defaults.motor_gear_ratio),
        };

        LoadedConstants {
            constants,
            defaulted: diameter.is_none()
                || base_width.is_none()
                || ticks.is_none()
                || gear_ratio.is_none(),
            ticks_defaulted: ticks.is_none(),
        }
    }

    /// Write the constants as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Saved robot constants to {}", path.display());
        Ok(())
    }
}

/// Board ids known to carry 16-tick encoders, one hex id per line
pub fn read_legacy_serials(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_ascii_uppercase)
            .collect(),
        Err(_) => Vec::new(),
    }
}
