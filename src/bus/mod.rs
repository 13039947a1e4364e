// Board bus plumbing
//
// Provides:
// - Transport trait with Linux SPI and scripted mock implementations
// - Message registry and frame codec for the board protocol
// - File-lock based arbitration of the bus across processes

pub mod lock;
pub mod protocol;
pub mod transport;

pub use lock::{BusArbiter, BusGuard, LockMode};
pub use protocol::{MessageType, ADDRESS, SENTINEL};
#[cfg(target_os = "linux")]
pub use transport::SpiTransport;
pub use transport::{MockTransport, Transport};
