// Host-side driver for a GoPiGo3-class robot controller board
//
// The board sits behind SPI and speaks a small request/reply protocol. This
// crate covers the wire codec, the bus lock shared with other processes,
// the grove port multiplexer, encoder-based motion, and sensor wrappers.

pub mod board;
pub mod bus;
pub mod config;
pub mod error;
pub mod messages;
pub mod motion;
pub mod sensors;

pub use board::{Board, BoardOptions};
pub use config::RobotConstants;
pub use error::{BoardError, ErrorClass, Result};
pub use motion::{MotionController, MotionState};
