// Motion layer for the two-wheel base
//
// Provides:
// - Differential-drive geometry (distance, in-place turns, orbits)
// - Encoder-polling motion controller with blocking and non-blocking moves

mod controller;
pub mod kinematics;

pub use controller::{DistanceUnit, MotionController, MotionState, within_tolerance};
pub use kinematics::{OrbitPlan, distance_to_wheel_degrees, orbit_plan, turn_wheel_degrees};
