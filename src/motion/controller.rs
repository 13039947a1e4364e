// Encoder-based motion control
//
// Position moves are setpoints handed to the firmware's own loop; the host
// only learns about progress by polling encoders. Blocking calls poll until
// both wheels sit inside the tolerance window (or stop making progress);
// non-blocking calls return at once and leave polling to the caller.

use std::thread::sleep;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::kinematics::{
    distance_to_wheel_degrees, orbit_plan, turn_wheel_degrees, wheel_degrees_to_distance,
};
use crate::board::{Board, MotorPort};
use crate::bus::Transport;
use crate::config::{
    DEFAULT_SPEED_DPS, MOTION_POLL_INTERVAL, STALL_TIMEOUT, TARGET_TOLERANCE_DEGREES,
};
use crate::error::Result;
use crate::messages::{MotionReport, MotorReport};

/// Progress of a single motor's last command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    /// No command outstanding
    Idle,
    /// Setpoint written, not yet polled
    Commanded,
    /// Polled and still outside the tolerance window
    Converging,
    /// Inside the tolerance window
    Reached,
    /// No encoder progress for the stall timeout while outside the window
    Stalled,
}

/// Units for averaged encoder distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Cm,
    Inches,
}

/// Whether `reading` lies within `tolerance` of `target` (inclusive)
pub fn within_tolerance(reading: f64, target: f64, tolerance: f64) -> bool {
    (reading - target).abs() <= tolerance
}

// Encoder movement smaller than this does not count as progress
const PROGRESS_EPSILON_DEGREES: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct MotorTrack {
    state: MotionState,
    target: Option<f64>,
    last_reading: Option<f64>,
    last_progress: Instant,
}

impl MotorTrack {
    fn idle() -> Self {
        Self {
            state: MotionState::Idle,
            target: None,
            last_reading: None,
            last_progress: Instant::now(),
        }
    }

    fn command(&mut self, target: Option<f64>) {
        *self = Self {
            state: MotionState::Commanded,
            target,
            ..Self::idle()
        };
    }

    fn update(&mut self, reading: f64, tolerance: f64, stall_timeout: Duration) {
        let Some(target) = self.target else {
            return;
        };

        let moved = self
            .last_reading
            .is_none_or(|last| (reading - last).abs() >= PROGRESS_EPSILON_DEGREES);
        if moved {
            self.last_reading = Some(reading);
            self.last_progress = Instant::now();
        }

        self.state = if within_tolerance(reading, target, tolerance) {
            MotionState::Reached
        } else if self.last_progress.elapsed() >= stall_timeout {
            MotionState::Stalled
        } else {
            MotionState::Converging
        };
    }

    fn report(&self, encoder_degrees: f64) -> MotorReport {
        MotorReport {
            state: self.state,
            target_degrees: self.target,
            encoder_degrees,
        }
    }
}

/// Motion API over a board handle
pub struct MotionController<T: Transport> {
    board: Board<T>,
    speed: f64,
    tolerance: f64,
    poll_interval: Duration,
    stall_timeout: Duration,
    left: MotorTrack,
    right: MotorTrack,
}

impl<T: Transport> MotionController<T> {
    /// Wrap a board and apply the default speed limit
    pub fn new(board: Board<T>) -> Result<Self> {
        let mut controller = Self {
            board,
            speed: DEFAULT_SPEED_DPS,
            tolerance: TARGET_TOLERANCE_DEGREES,
            poll_interval: MOTION_POLL_INTERVAL,
            stall_timeout: STALL_TIMEOUT,
            left: MotorTrack::idle(),
            right: MotorTrack::idle(),
        };
        controller.set_speed(DEFAULT_SPEED_DPS)?;
        Ok(controller)
    }

    /// Override the poll period and stall timeout of blocking moves
    pub fn with_timing(mut self, poll_interval: Duration, stall_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn board(&self) -> &Board<T> {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board<T> {
        &mut self.board
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Speed ceiling (dps) for both motors
    pub fn set_speed(&mut self, dps: f64) -> Result<()> {
        self.speed = dps.abs();
        self.board.set_motor_limits(MotorPort::Both, 0, self.speed)
    }

    pub fn get_speed(&self) -> f64 {
        self.speed
    }

    fn track_mut(&mut self, motor: MotorPort) -> &mut MotorTrack {
        match motor {
            MotorPort::Right => &mut self.right,
            _ => &mut self.left,
        }
    }

    /// Absolute position setpoint in degrees
    pub fn set_motor_position(&mut self, port: MotorPort, degrees: f64) -> Result<()> {
        self.board.set_motor_position(port, degrees)?;
        for &motor in port.motors() {
            self.track_mut(motor).command(Some(degrees));
        }
        Ok(())
    }

    /// Velocity setpoint in degrees per second
    pub fn set_motor_dps(&mut self, port: MotorPort, dps: f64) -> Result<()> {
        self.board.set_motor_dps(port, dps)?;
        for &motor in port.motors() {
            if dps == 0.0 {
                *self.track_mut(motor) = MotorTrack::idle();
            } else {
                self.track_mut(motor).command(None);
            }
        }
        Ok(())
    }

    pub fn forward(&mut self) -> Result<()> {
        self.set_motor_dps(MotorPort::Both, self.speed)
    }

    pub fn backward(&mut self) -> Result<()> {
        self.set_motor_dps(MotorPort::Both, -self.speed)
    }

    /// Pivot left around the stopped left wheel
    pub fn left(&mut self) -> Result<()> {
        self.set_motor_dps(MotorPort::Left, 0.0)?;
        self.set_motor_dps(MotorPort::Right, self.speed)
    }

    /// Pivot right around the stopped right wheel
    pub fn right(&mut self) -> Result<()> {
        self.set_motor_dps(MotorPort::Left, self.speed)?;
        self.set_motor_dps(MotorPort::Right, 0.0)
    }

    pub fn spin_left(&mut self) -> Result<()> {
        self.set_motor_dps(MotorPort::Left, -self.speed)?;
        self.set_motor_dps(MotorPort::Right, self.speed)
    }

    pub fn spin_right(&mut self) -> Result<()> {
        self.set_motor_dps(MotorPort::Left, self.speed)?;
        self.set_motor_dps(MotorPort::Right, -self.speed)
    }

    /// Drive each wheel at a percentage (-100..=100) of the current speed
    pub fn steer(&mut self, left_percent: f64, right_percent: f64) -> Result<()> {
        let scale = |pct: f64| self.speed * pct.clamp(-100.0, 100.0) / 100.0;
        let (left, right) = (scale(left_percent), scale(right_percent));
        self.set_motor_dps(MotorPort::Left, left)?;
        self.set_motor_dps(MotorPort::Right, right)
    }

    /// Halt both motors
    ///
    /// This is the only way to cancel a move in progress: the board has no
    /// abort command, so a zero-speed setpoint replaces the old one.
    pub fn stop(&mut self) -> Result<()> {
        self.set_motor_dps(MotorPort::Both, 0.0)
    }

    /// Encoder positions (left, right) in degrees
    pub fn read_encoders(&mut self) -> Result<(f64, f64)> {
        let left = self.board.get_motor_encoder(MotorPort::Left)?;
        let right = self.board.get_motor_encoder(MotorPort::Right)?;
        Ok((left, right))
    }

    /// Mean distance travelled by both wheels
    pub fn read_encoders_average(&mut self, unit: DistanceUnit) -> Result<f64> {
        let (left, right) = self.read_encoders()?;
        let mm = wheel_degrees_to_distance(
            (left + right) / 2.0,
            self.board.constants().wheel_circumference(),
        );
        Ok(match unit {
            DistanceUnit::Cm => mm / 10.0,
            DistanceUnit::Inches => mm / 25.4,
        })
    }

    /// Zero both encoders and forget outstanding targets
    pub fn reset_encoders(&mut self) -> Result<()> {
        self.board.reset_motor_encoder(MotorPort::Both)?;
        self.left = MotorTrack::idle();
        self.right = MotorTrack::idle();
        Ok(())
    }

    /// Whether both encoders currently sit within tolerance of their targets
    ///
    /// Reads the encoders and nothing else; safe to call at any time.
    pub fn target_reached(&mut self, left_target: f64, right_target: f64) -> Result<bool> {
        let (left, right) = self.read_encoders()?;
        Ok(within_tolerance(left, left_target, self.tolerance)
            && within_tolerance(right, right_target, self.tolerance))
    }

    /// Read encoders once and advance each motor's state
    pub fn poll(&mut self) -> Result<MotionReport> {
        let (left, right) = self.read_encoders()?;
        self.left.update(left, self.tolerance, self.stall_timeout);
        self.right.update(right, self.tolerance, self.stall_timeout);
        Ok(MotionReport {
            left: self.left.report(left),
            right: self.right.report(right),
        })
    }

    /// Combined state of the outstanding position move
    ///
    /// Stalled wins over everything; Reached requires every targeted motor
    /// to be there.
    pub fn state(&self) -> MotionState {
        let targeted: Vec<MotionState> = [&self.left, &self.right]
            .iter()
            .filter(|track| track.target.is_some())
            .map(|track| track.state)
            .collect();

        if targeted.is_empty() {
            return if self.left.state == MotionState::Idle && self.right.state == MotionState::Idle
            {
                MotionState::Idle
            } else {
                MotionState::Commanded
            };
        }
        if targeted.contains(&MotionState::Stalled) {
            MotionState::Stalled
        } else if targeted.iter().all(|&s| s == MotionState::Reached) {
            MotionState::Reached
        } else if targeted.contains(&MotionState::Converging) {
            MotionState::Converging
        } else {
            MotionState::Commanded
        }
    }

    /// Poll until the outstanding position move ends
    ///
    /// Returns `Reached` or `Stalled`; `Idle` when nothing was commanded.
    pub fn wait_for_target(&mut self) -> Result<MotionState> {
        if self.left.target.is_none() && self.right.target.is_none() {
            return Ok(self.state());
        }
        loop {
            let report = self.poll()?;
            match self.state() {
                MotionState::Reached => {
                    debug!(
                        "Target reached: left {:.1}, right {:.1}",
                        report.left.encoder_degrees, report.right.encoder_degrees
                    );
                    return Ok(MotionState::Reached);
                }
                MotionState::Stalled => {
                    warn!(
                        "Motion stalled: left {:.1} (target {:?}), right {:.1} (target {:?})",
                        report.left.encoder_degrees,
                        report.left.target_degrees,
                        report.right.encoder_degrees,
                        report.right.target_degrees
                    );
                    return Ok(MotionState::Stalled);
                }
                _ => sleep(self.poll_interval),
            }
        }
    }

    fn finish(&mut self, blocking: bool) -> Result<MotionState> {
        if blocking {
            self.wait_for_target()
        } else {
            Ok(self.state())
        }
    }

    /// Rotate both wheels by the same relative amount
    pub fn drive_degrees(&mut self, degrees: f64, blocking: bool) -> Result<MotionState> {
        let (left, right) = self.read_encoders()?;
        self.set_motor_position(MotorPort::Left, left + degrees)?;
        self.set_motor_position(MotorPort::Right, right + degrees)?;
        self.finish(blocking)
    }

    /// Drive straight; negative distances drive backward
    pub fn drive_cm(&mut self, cm: f64, blocking: bool) -> Result<MotionState> {
        let degrees =
            distance_to_wheel_degrees(cm * 10.0, self.board.constants().wheel_circumference());
        info!("Drive {} cm ({:.1} wheel degrees)", cm, degrees);
        self.drive_degrees(degrees, blocking)
    }

    pub fn drive_inches(&mut self, inches: f64, blocking: bool) -> Result<MotionState> {
        self.drive_cm(inches * 2.54, blocking)
    }

    /// Spin in place; positive degrees turn clockwise
    pub fn turn_degrees(&mut self, degrees: f64, blocking: bool) -> Result<MotionState> {
        let wheel = turn_wheel_degrees(degrees, self.board.constants());
        info!("Turn {} deg ({:.1} wheel degrees)", degrees, wheel);
        let (left, right) = self.read_encoders()?;
        self.set_motor_position(MotorPort::Left, left + wheel)?;
        self.set_motor_position(MotorPort::Right, right - wheel)?;
        self.finish(blocking)
    }

    /// Travel `degrees` of a circle of `radius_cm` around an external point
    ///
    /// The slow wheel's speed ceiling is lowered for the move. A blocking
    /// orbit restores the regular speed when done; after a non-blocking
    /// orbit the caller restores it with `set_speed`.
    pub fn orbit(&mut self, degrees: f64, radius_cm: f64, blocking: bool) -> Result<MotionState> {
        let plan = orbit_plan(degrees, radius_cm * 10.0, self.speed, self.board.constants());
        info!(
            "Orbit {} deg at {} cm (left {:.1} deg @ {:.0} dps, right {:.1} deg @ {:.0} dps)",
            degrees, radius_cm, plan.left_degrees, plan.left_dps, plan.right_degrees, plan.right_dps
        );

        self.board.set_motor_limits(MotorPort::Left, 0, plan.left_dps)?;
        self.board.set_motor_limits(MotorPort::Right, 0, plan.right_dps)?;

        let (left, right) = self.read_encoders()?;
        self.set_motor_position(MotorPort::Left, left + plan.left_degrees)?;
        self.set_motor_position(MotorPort::Right, right + plan.right_degrees)?;

        if !blocking {
            return Ok(self.state());
        }
        // Restore the speed ceiling even when the wait fails
        let outcome = self.wait_for_target();
        let speed = self.speed;
        let restored = self.set_speed(speed);
        let outcome = outcome?;
        restored?;
        Ok(outcome)
    }
}

impl<T: Transport> Drop for MotionController<T> {
    fn drop(&mut self) {
        if self.left.state == MotionState::Idle && self.right.state == MotionState::Idle {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardOptions;
    use crate::bus::MockTransport;
    use crate::bus::protocol::{MessageType, SENTINEL};
    use crate::error::BoardError;
    use std::sync::{Arc, Mutex};

    /// Board emulator: encoders step toward their position setpoints on
    /// every read
    #[derive(Default)]
    struct Sim {
        position: [i32; 2],
        target: [Option<i32>; 2],
        step: i32,
        frozen: bool,
        /// Encoder reads answered before the board goes silent
        encoder_reads: Option<usize>,
    }

    fn sim_transport(sim: Arc<Mutex<Sim>>) -> MockTransport {
        MockTransport::with_responder(move |out| {
            let mut sim = sim.lock().unwrap();
            let mut reply = vec![0, 0, 0, SENTINEL];
            let message = out[1];
            if message == MessageType::SetMotorPosition as u8 {
                let ticks = i32::from_be_bytes([out[3], out[4], out[5], out[6]]);
                for i in 0..2 {
                    if out[2] & (1 << i) != 0 {
                        sim.target[i] = Some(ticks);
                    }
                }
            } else if message == MessageType::GetMotorEncoderLeft as u8
                || message == MessageType::GetMotorEncoderRight as u8
            {
                match sim.encoder_reads {
                    Some(0) => return vec![0; out.len()],
                    Some(n) => sim.encoder_reads = Some(n - 1),
                    None => {}
                }
                let i = (message - MessageType::GetMotorEncoderLeft as u8) as usize;
                if let (Some(target), false) = (sim.target[i], sim.frozen) {
                    let delta = (target - sim.position[i]).clamp(-sim.step, sim.step);
                    sim.position[i] += delta;
                }
                reply.extend_from_slice(&sim.position[i].to_be_bytes());
            }
            reply.resize(out.len(), 0);
            reply
        })
    }

    fn controller(sim: &Arc<Mutex<Sim>>) -> (MotionController<MockTransport>, MockTransport) {
        let mock = sim_transport(sim.clone());
        let board = Board::new(mock.clone(), BoardOptions::offline()).unwrap();
        let controller = MotionController::new(board)
            .unwrap()
            .with_timing(Duration::from_millis(1), Duration::from_millis(30));
        (controller, mock)
    }

    fn position_targets(mock: &MockTransport) -> Vec<(u8, i32)> {
        mock.sent()
            .iter()
            .filter(|f| f[1] == MessageType::SetMotorPosition as u8)
            .map(|f| (f[2], i32::from_be_bytes([f[3], f[4], f[5], f[6]])))
            .collect()
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let target = 90.0;
        assert!(within_tolerance(target + 5.0, target, 5.0));
        assert!(within_tolerance(target - 5.0, target, 5.0));
        assert!(!within_tolerance(target + 5.5, target, 5.0));
        assert!(!within_tolerance(target - 5.5, target, 5.0));
    }

    #[test]
    fn test_target_reached_needs_both_motors() {
        let mock = MockTransport::new();
        let board = Board::new(mock.clone(), BoardOptions::offline()).unwrap();
        let mut controller = MotionController::new(board).unwrap();

        // Ticks at 2 per degree: left at 95 deg, right at 84 deg
        mock.push_payload(&190i32.to_be_bytes());
        mock.push_payload(&168i32.to_be_bytes());
        assert!(!controller.target_reached(90.0, 90.0).unwrap());

        mock.push_payload(&190i32.to_be_bytes());
        mock.push_payload(&170i32.to_be_bytes());
        assert!(controller.target_reached(90.0, 90.0).unwrap());

        // Predicate does not touch motion state
        assert_eq!(controller.state(), MotionState::Idle);
    }

    #[test]
    fn test_blocking_drive_converges() {
        let sim = Arc::new(Mutex::new(Sim {
            step: 40,
            ..Sim::default()
        }));
        let (mut controller, mock) = controller(&sim);

        let circ = controller.board().constants().wheel_circumference();
        // One 360th of the circumference in cm commands 10 wheel degrees
        let outcome = controller.drive_cm(circ / 360.0, true).unwrap();
        assert_eq!(outcome, MotionState::Reached);
        assert_eq!(position_targets(&mock), vec![(0x01, 20), (0x02, 20)]);

        let outcome = controller.drive_cm(50.0, true).unwrap();
        assert_eq!(outcome, MotionState::Reached);
        let (left, right) = controller.read_encoders().unwrap();
        let expected = 20.0 / 2.0 + 500.0 / circ * 360.0;
        assert!((left - expected).abs() <= 5.0);
        assert!((right - expected).abs() <= 5.0);
    }

    #[test]
    fn test_non_blocking_move_is_polled_by_caller() {
        let sim = Arc::new(Mutex::new(Sim {
            step: 100,
            ..Sim::default()
        }));
        let (mut controller, _mock) = controller(&sim);

        let state = controller.drive_degrees(360.0, false).unwrap();
        assert_eq!(state, MotionState::Commanded);

        let mut polls = 0;
        while controller.state() != MotionState::Reached {
            let report = controller.poll().unwrap();
            assert_ne!(report.left.state, MotionState::Stalled);
            polls += 1;
            assert!(polls < 50);
        }
        // 720 ticks at 100 per read: several polls were needed
        assert!(polls > 1);
        assert_eq!(controller.poll().unwrap().left.target_degrees, Some(360.0));
    }

    #[test]
    fn test_turn_commands_opposite_targets() {
        let sim = Arc::new(Mutex::new(Sim {
            step: 10_000,
            ..Sim::default()
        }));
        let (mut controller, mock) = controller(&sim);

        controller.turn_degrees(360.0, true).unwrap();
        let targets = position_targets(&mock);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].1, -targets[1].1);

        let c = *controller.board().constants();
        let wheel = c.wheel_base_circumference() / c.wheel_circumference() * 360.0;
        assert_eq!(targets[0].1 as i64, c.degrees_to_ticks(wheel));
    }

    #[test]
    fn test_stalled_motor_is_reported() {
        let sim = Arc::new(Mutex::new(Sim {
            step: 10,
            frozen: true,
            ..Sim::default()
        }));
        let (mut controller, _mock) = controller(&sim);
        let outcome = controller.drive_degrees(90.0, true).unwrap();
        assert_eq!(outcome, MotionState::Stalled);
    }

    #[test]
    fn test_orbit_limits_slow_wheel_then_restores_speed() {
        let sim = Arc::new(Mutex::new(Sim {
            step: 10_000,
            ..Sim::default()
        }));
        let (mut controller, mock) = controller(&sim);
        mock.clear_sent();

        assert_eq!(controller.orbit(90.0, 30.0, true).unwrap(), MotionState::Reached);

        let limits: Vec<Vec<u8>> = mock
            .sent()
            .into_iter()
            .filter(|f| f[1] == MessageType::SetMotorLimits as u8)
            .collect();
        assert_eq!(limits.len(), 3);
        let dps = |f: &Vec<u8>| u16::from_be_bytes([f[4], f[5]]);
        assert_eq!(limits[0][2], 0x01);
        assert_eq!(dps(&limits[0]), 600);
        assert_eq!(limits[1][2], 0x02);
        assert!(dps(&limits[1]) < 600);
        assert_eq!(limits[2][2], 0x03);
        assert_eq!(dps(&limits[2]), 600);

        let targets = position_targets(&mock);
        assert!(targets[0].1 > targets[1].1);
    }

    #[test]
    fn test_orbit_restores_speed_when_wait_fails() {
        // Both encoders answer once for the start position, then go quiet
        let sim = Arc::new(Mutex::new(Sim {
            step: 1,
            encoder_reads: Some(2),
            ..Sim::default()
        }));
        let (mut controller, mock) = controller(&sim);
        mock.clear_sent();

        assert!(matches!(
            controller.orbit(90.0, 30.0, true),
            Err(BoardError::NoResponse { .. })
        ));

        let limits: Vec<Vec<u8>> = mock
            .sent()
            .into_iter()
            .filter(|f| f[1] == MessageType::SetMotorLimits as u8)
            .collect();
        assert_eq!(limits.len(), 3);
        let last = &limits[2];
        assert_eq!(last[2], 0x03);
        assert_eq!(u16::from_be_bytes([last[4], last[5]]), 600);
        assert_eq!(controller.get_speed(), DEFAULT_SPEED_DPS);
    }

    #[test]
    fn test_stop_cancels_and_goes_idle() {
        let sim = Arc::new(Mutex::new(Sim::default()));
        let (mut controller, mock) = controller(&sim);
        controller.drive_degrees(90.0, false).unwrap();
        controller.stop().unwrap();
        assert_eq!(controller.state(), MotionState::Idle);
        assert_eq!(mock.last_sent().unwrap(), vec![8, 14, 0x03, 0, 0]);
    }

    #[test]
    fn test_steer_scales_speed() {
        let sim = Arc::new(Mutex::new(Sim::default()));
        let (mut controller, mock) = controller(&sim);
        controller.steer(50.0, -200.0).unwrap();
        let sent = mock.sent();
        let n = sent.len();
        // 150 dps and -300 dps at 2 ticks per degree
        assert_eq!(sent[n - 2], vec![8, 14, 0x01, 0x01, 0x2C]);
        assert_eq!(sent[n - 1][..3], [8, 14, 0x02]);
        assert_eq!(i16::from_be_bytes([sent[n - 1][3], sent[n - 1][4]]), -600);
        assert_eq!(controller.state(), MotionState::Commanded);
    }

    #[test]
    fn test_encoder_average_in_cm() {
        let sim = Arc::new(Mutex::new(Sim {
            position: [720, 720],
            ..Sim::default()
        }));
        let (mut controller, _mock) = controller(&sim);
        let circ = controller.board().constants().wheel_circumference();
        let cm = controller.read_encoders_average(DistanceUnit::Cm).unwrap();
        assert!((cm - circ / 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_drop_stops_moving_robot() {
        let sim = Arc::new(Mutex::new(Sim::default()));
        let (mut controller, mock) = controller(&sim);
        controller.forward().unwrap();
        drop(controller);
        assert_eq!(mock.last_sent().unwrap(), vec![8, 14, 0x03, 0, 0]);
    }
}
