use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use robobus::board::{GrovePort, Leds, MOTOR_FLOAT, MotorPort, ServoPort};
use robobus::bus::{LockMode, Transport};
use robobus::sensors::{
    AnalogInput, AnalogSensor, DigitalInput, DigitalSensor, Servo, UltrasonicSensor,
};
use robobus::{Board, BoardError, BoardOptions, MotionController, Result};

#[derive(Parser, Debug)]
#[command(name = "robobus", about = "Drive and inspect a GoPiGo3-class robot board")]
struct Cli {
    /// Skip the shared bus lock (only safe if nothing else uses the bus)
    #[arg(long, global = true)]
    no_lock: bool,

    #[arg(long, global = true, value_name = "PATH")]
    lock_path: Option<PathBuf>,

    /// Robot constants file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Board ids that carry 16-tick encoders
    #[arg(long, global = true, value_name = "PATH")]
    legacy_serials: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identity strings, versions, and supply voltages
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Voltages plus motor flags, power, position, and speed
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Encoder positions in degrees
    Encoders,
    ResetEncoders,
    /// Drive straight and wait for the target
    Drive {
        #[arg(allow_negative_numbers = true)]
        distance: f64,
        #[arg(long, value_enum, default_value_t = Unit::Cm)]
        unit: Unit,
        #[arg(long, value_name = "DPS")]
        speed: Option<f64>,
    },
    /// Spin in place; positive is clockwise
    Turn {
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
        #[arg(long, value_name = "DPS")]
        speed: Option<f64>,
    },
    /// Drive an arc around a point `radius` cm from the robot's center
    Orbit {
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
        radius: f64,
        #[arg(long, value_name = "DPS")]
        speed: Option<f64>,
    },
    /// Float both motors
    Stop,
    Led {
        #[arg(value_enum)]
        which: LedChoice,
        red: u8,
        green: u8,
        blue: u8,
    },
    /// Rotate a servo to an angle, or send a raw pulse width
    Servo {
        port: ServoPort,
        #[arg(required_unless_present = "pulse")]
        degrees: Option<f64>,
        #[arg(long, value_name = "US", conflicts_with = "degrees")]
        pulse: Option<u32>,
    },
    /// Read the signal pin of a grove port
    GroveRead {
        port: GrovePort,
        #[arg(long, value_enum, default_value_t = ReadMode::Analog)]
        mode: ReadMode,
    },
    /// Distance from a grove ultrasonic ranger
    Ultrasonic {
        port: GrovePort,
    },
    /// Return every output to a safe idle state
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Unit {
    Cm,
    Inches,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LedChoice {
    EyeLeft,
    EyeRight,
    Eyes,
    BlinkerLeft,
    BlinkerRight,
    Wifi,
    All,
}

impl From<LedChoice> for Leds {
    fn from(choice: LedChoice) -> Self {
        match choice {
            LedChoice::EyeLeft => Leds::EYE_LEFT,
            LedChoice::EyeRight => Leds::EYE_RIGHT,
            LedChoice::Eyes => Leds::EYE_LEFT | Leds::EYE_RIGHT,
            LedChoice::BlinkerLeft => Leds::BLINKER_LEFT,
            LedChoice::BlinkerRight => Leds::BLINKER_RIGHT,
            LedChoice::Wifi => Leds::WIFI,
            LedChoice::All => Leds::all(),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReadMode {
    Analog,
    Digital,
    Voltage,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn options(cli: &Cli) -> BoardOptions {
    let mut options = BoardOptions::default();
    if cli.no_lock {
        options.lock = LockMode::Disabled;
    } else if let Some(path) = &cli.lock_path {
        options.lock = LockMode::PerTransfer(path.clone());
    }
    if let Some(path) = &cli.config {
        options.config_path = Some(path.clone());
    }
    if let Some(path) = &cli.legacy_serials {
        options.legacy_serials_path = Some(path.clone());
    }
    options
}

#[cfg(target_os = "linux")]
fn run(cli: Cli) -> Result<()> {
    let board = Board::open(options(&cli))?;
    execute(board, cli.command)
}

#[cfg(not(target_os = "linux"))]
fn run(_cli: Cli) -> Result<()> {
    Err(BoardError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "the SPI transport is only available on Linux",
    )))
}

fn print_report<R: Serialize + std::fmt::Debug>(report: &R, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{:#?}", report);
    }
    Ok(())
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn execute<T: Transport>(mut board: Board<T>, command: Command) -> Result<()> {
    match command {
        Command::Info { json } => print_report(&board.board_info()?, json),
        Command::Status { json } => print_report(&board.status()?, json),
        Command::Encoders => {
            let left = board.get_motor_encoder(MotorPort::Left)?;
            let right = board.get_motor_encoder(MotorPort::Right)?;
            println!("left: {:.1} deg  right: {:.1} deg", left, right);
            Ok(())
        }
        Command::ResetEncoders => board.reset_motor_encoder(MotorPort::Both),
        Command::Drive {
            distance,
            unit,
            speed,
        } => {
            let mut motion = controller(board, speed)?;
            let state = match unit {
                Unit::Cm => motion.drive_cm(distance, true)?,
                Unit::Inches => motion.drive_inches(distance, true)?,
            };
            info!("Drive finished: {:?}", state);
            Ok(())
        }
        Command::Turn { degrees, speed } => {
            let state = controller(board, speed)?.turn_degrees(degrees, true)?;
            info!("Turn finished: {:?}", state);
            Ok(())
        }
        Command::Orbit {
            degrees,
            radius,
            speed,
        } => {
            let state = controller(board, speed)?.orbit(degrees, radius, true)?;
            info!("Orbit finished: {:?}", state);
            Ok(())
        }
        Command::Stop => board.set_motor_power(MotorPort::Both, MOTOR_FLOAT as i32),
        Command::Led {
            which,
            red,
            green,
            blue,
        } => board.set_led(which.into(), red as i32, green as i32, blue as i32),
        Command::Servo {
            port,
            degrees,
            pulse,
        } => {
            let servo = Servo::new(port);
            match (degrees, pulse) {
                (_, Some(pulse)) => servo.set_pulse(&mut board, pulse),
                (Some(degrees), None) => servo.rotate(&mut board, degrees),
                (None, None) => Err(BoardError::InvalidArgument(
                    "servo needs an angle or --pulse".into(),
                )),
            }
        }
        Command::GroveRead { port, mode } => {
            match mode {
                ReadMode::Analog => {
                    let sensor = AnalogSensor::new(&mut board, port)?;
                    println!("{}: {}", port, sensor.read_analog(&mut board));
                }
                ReadMode::Voltage => {
                    let sensor = AnalogSensor::new(&mut board, port)?;
                    println!("{}: {:.3} V", port, sensor.read_voltage(&mut board));
                }
                ReadMode::Digital => {
                    let sensor = DigitalSensor::new(&mut board, port)?;
                    println!("{}: {}", port, sensor.read_digital(&mut board));
                }
            }
            Ok(())
        }
        Command::Ultrasonic { port } => {
            let sensor = UltrasonicSensor::new(&mut board, port)?;
            println!("{}: {} mm", port, sensor.read_mm(&mut board));
            Ok(())
        }
        Command::Reset => board.reset_all(),
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn controller<T: Transport>(board: Board<T>, speed: Option<f64>) -> Result<MotionController<T>> {
    let mut motion = MotionController::new(board)?;
    if let Some(dps) = speed {
        motion.set_speed(dps)?;
    }
    Ok(motion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_select_lock_mode() {
        let cli = Cli::parse_from(["robobus", "--no-lock", "stop"]);
        assert!(matches!(options(&cli).lock, LockMode::Disabled));

        let cli = Cli::parse_from(["robobus", "status", "--lock-path", "/tmp/bus.lock"]);
        assert!(matches!(
            options(&cli).lock,
            LockMode::PerTransfer(ref p) if p == &PathBuf::from("/tmp/bus.lock")
        ));
    }

    #[test]
    fn test_legacy_serials_flag_overrides_default() {
        let cli = Cli::parse_from(["robobus", "info"]);
        assert_eq!(
            options(&cli).legacy_serials_path,
            Some(PathBuf::from(robobus::config::DEFAULT_LEGACY_SERIALS_PATH))
        );

        let cli = Cli::parse_from(["robobus", "encoders", "--legacy-serials", "/tmp/serials.txt"]);
        assert_eq!(
            options(&cli).legacy_serials_path,
            Some(PathBuf::from("/tmp/serials.txt"))
        );
    }

    #[test]
    fn test_negative_distances_parse() {
        let cli = Cli::parse_from(["robobus", "turn", "-90"]);
        assert!(matches!(cli.command, Command::Turn { degrees, .. } if degrees == -90.0));
    }
}
