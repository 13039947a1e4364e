// Differential-drive geometry
// Converts linear distances, in-place turns, and orbits into wheel rotation.

use std::f64::consts::PI;

use crate::config::RobotConstants;

/// Wheel rotation (degrees) that covers `distance_mm`
pub fn distance_to_wheel_degrees(distance_mm: f64, wheel_circumference: f64) -> f64 {
    (distance_mm / wheel_circumference) * 360.0
}

/// Distance (mm) covered by `degrees` of wheel rotation
pub fn wheel_degrees_to_distance(degrees: f64, wheel_circumference: f64) -> f64 {
    degrees / 360.0 * wheel_circumference
}

/// Wheel rotation (degrees) to spin the robot in place by `rotation_degrees`
///
/// Each wheel travels along the circle traced by the contact patches
/// (`wheel_base_width * PI`); the left wheel turns forward for positive
/// rotation, the right wheel by the same amount backward.
pub fn turn_wheel_degrees(rotation_degrees: f64, constants: &RobotConstants) -> f64 {
    let travel_mm = (constants.wheel_base_circumference() * rotation_degrees) / 360.0;
    distance_to_wheel_degrees(travel_mm, constants.wheel_circumference())
}

/// Wheel targets and speed limits for an orbit around an external point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitPlan {
    /// Relative rotation of each wheel (degrees)
    pub left_degrees: f64,
    pub right_degrees: f64,
    /// Speed ceilings (dps): the outer wheel runs at the requested speed
    pub left_dps: f64,
    pub right_dps: f64,
}

/// Plan an orbit of `degrees` around a point `radius_mm` from the robot center
///
/// Positive degrees orbit clockwise: the left wheel is on the outside and
/// runs fast. The slow wheel's speed is scaled by `slow / fast` so both
/// arrive together.
pub fn orbit_plan(
    degrees: f64,
    radius_mm: f64,
    speed_dps: f64,
    constants: &RobotConstants,
) -> OrbitPlan {
    let wheel_circumference = constants.wheel_circumference();

    let drive_distance = PI * radius_mm.abs() * degrees.abs() / 180.0;
    let drive_difference = (constants.wheel_base_circumference() * degrees) / 360.0;

    let distance_degrees = distance_to_wheel_degrees(drive_distance, wheel_circumference);
    let difference_degrees = distance_to_wheel_degrees(drive_difference, wheel_circumference);

    let left_degrees = distance_degrees + difference_degrees;
    let right_degrees = distance_degrees - difference_degrees;

    let (fast, slow) = if degrees >= 0.0 {
        (left_degrees, right_degrees)
    } else {
        (right_degrees, left_degrees)
    };
    let ratio = if fast == 0.0 { 1.0 } else { (slow / fast).abs() };

    let speed = speed_dps.abs();
    let (left_dps, right_dps) = if degrees >= 0.0 {
        (speed, speed * ratio)
    } else {
        (speed * ratio, speed)
    };

    OrbitPlan {
        left_degrees,
        right_degrees,
        left_dps,
        right_dps,
    }
}
