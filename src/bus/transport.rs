// Full-duplex byte exchange with the board
//
// Every transfer clocks out exactly `out.len()` bytes and returns the same
// number of bytes clocked in.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Synchronous full-duplex transport
pub trait Transport: Send {
    /// Exchange `out` for an equally long reply
    fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>>;
}

#[cfg(target_os = "linux")]
pub use spi::SpiTransport;

#[cfg(target_os = "linux")]
mod spi {
    use rppal::spi::{BitOrder, Bus, Mode, SlaveSelect, Spi};
    use tracing::info;

    use super::Transport;
    use crate::config::{SPI_BUS, SPI_CLOCK_HZ, SPI_SLAVE_SELECT};
    use crate::error::Result;

    /// Linux spidev transport (Raspberry Pi SPI0, CE1 by default)
    pub struct SpiTransport {
        spi: Spi,
    }

    impl SpiTransport {
        /// Open the default SPI device for the board
        pub fn open() -> Result<Self> {
            Self::open_with(SPI_BUS, SPI_SLAVE_SELECT, SPI_CLOCK_HZ)
        }

        /// Open a specific bus / slave select at the given clock rate
        pub fn open_with(bus: u8, slave_select: u8, clock_hz: u32) -> Result<Self> {
            let bus = match bus {
                0 => Bus::Spi0,
                1 => Bus::Spi1,
                2 => Bus::Spi2,
                3 => Bus::Spi3,
                4 => Bus::Spi4,
                5 => Bus::Spi5,
                _ => Bus::Spi6,
            };
            let slave_select = match slave_select {
                0 => SlaveSelect::Ss0,
                1 => SlaveSelect::Ss1,
                _ => SlaveSelect::Ss2,
            };

            info!(
                "Opening SPI {:?}/{:?} at {} Hz",
                bus, slave_select, clock_hz
            );
            let spi = Spi::new(bus, slave_select, clock_hz, Mode::Mode0)?;
            spi.set_bit_order(BitOrder::MsbFirst)?;
            Ok(Self { spi })
        }
    }

    impl Transport for SpiTransport {
        fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>> {
            let mut reply = vec![0u8; out.len()];
            self.spi.transfer(&mut reply, out)?;
            Ok(reply)
        }
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Scripted transport for tests and dry runs
///
/// Replies come from the queue first, then from the responder. With
/// neither, the board is "absent": the reply is all zeros.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Default)]
struct MockInner {
    replies: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    sent: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock driven entirely by a closure computing each reply
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let mock = Self::new();
        mock.lock().responder = Some(Box::new(responder));
        mock
    }

    /// Queue a reply for the next transfer
    pub fn push_reply(&self, reply: Vec<u8>) {
        self.lock().replies.push_back(reply);
    }

    /// Queue a valid reply: sentinel at the status byte, then `payload`
    pub fn push_payload(&self, payload: &[u8]) {
        let mut reply = vec![0, 0, 0, super::protocol::SENTINEL];
        reply.extend_from_slice(payload);
        self.push_reply(reply);
    }

    /// Every frame sent so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Most recently sent frame
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.lock().sent.last().cloned()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        // A panicking test thread must not hide later assertions
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for MockTransport {
    fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>> {
        let mut inner = self.lock();
        inner.sent.push(out.to_vec());

        let mut reply = match inner.replies.pop_front() {
            Some(reply) => reply,
            None => match inner.responder.as_mut() {
                Some(responder) => responder(out),
                None => Vec::new(),
            },
        };
        reply.resize(out.len(), 0);
        Ok(reply)
    }
}
