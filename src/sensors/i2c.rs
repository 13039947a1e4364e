// I2C device reached through a grove port's passthrough
use super::GroveDevice;
use super::sealed::Sealed;
use crate::board::{Board, GrovePin, GrovePort, GroveType};
use crate::bus::Transport;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct I2cDevice {
    port: GrovePort,
    address: u8,
}

impl I2cDevice {
    /// Switch `port` to I2C passthrough for the 7-bit `address`
    pub fn new<T: Transport>(
        board: &mut Board<T>,
        port: GrovePort,
        address: u8,
    ) -> Result<Self> {
        board.set_grove_type(port, GroveType::I2c)?;
        Ok(Self {
            port,
            address: address & 0x7F,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn write<T: Transport>(&self, board: &mut Board<T>, bytes: &[u8]) -> Result<()> {
        board.grove_i2c_transfer(self.port, self.address, bytes, 0)?;
        Ok(())
    }

    pub fn read<T: Transport>(&self, board: &mut Board<T>, len: usize) -> Result<Vec<u8>> {
        board.grove_i2c_transfer(self.port, self.address, &[], len)
    }

    /// Write then read in one locked transaction
    pub fn write_read<T: Transport>(
        &self,
        board: &mut Board<T>,
        bytes: &[u8],
        len: usize,
    ) -> Result<Vec<u8>> {
        board.grove_i2c_transfer(self.port, self.address, bytes, len)
    }

    pub fn write_reg<T: Transport>(&self, board: &mut Board<T>, reg: u8, value: u8) -> Result<()> {
        self.write(board, &[reg, value])
    }

    pub fn read_reg<T: Transport>(
        &self,
        board: &mut Board<T>,
        reg: u8,
        len: usize,
    ) -> Result<Vec<u8>> {
        self.write_read(board, &[reg], len)
    }
}

impl Sealed for I2cDevice {}
impl GroveDevice for I2cDevice {
    fn pin(&self) -> GrovePin {
        self.port.pin1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::mock_board;
    use crate::error::BoardError;

    #[test]
    fn test_read_register() {
        let (mut board, mock) = mock_board();
        let device = I2cDevice::new(&mut board, GrovePort::Ad1, 0x29).unwrap();
        mock.clear_sent();

        mock.push_payload(&[]);
        mock.push_payload(&[5, 0, 0xEE, 0xAA]);
        let data = device.read_reg(&mut board, 0xC0, 2).unwrap();
        assert_eq!(data, vec![0xEE, 0xAA]);
        assert_eq!(mock.sent()[0], vec![8, 40, 0x52, 2, 1, 0xC0]);
    }

    #[test]
    fn test_write_only_transfer() {
        let (mut board, mock) = mock_board();
        let device = I2cDevice::new(&mut board, GrovePort::Ad2, 0x70).unwrap();
        mock.clear_sent();

        mock.push_payload(&[]);
        mock.push_payload(&[5, 0]);
        device.write_reg(&mut board, 0x01, 0xFF).unwrap();
        let sent = mock.sent();
        assert_eq!(sent[0], vec![8, 41, 0xE0, 0, 2, 0x01, 0xFF]);
        assert_eq!(sent[1].len(), 6);
    }

    #[test]
    fn test_oversized_read_rejected() {
        let (mut board, _mock) = mock_board();
        let device = I2cDevice::new(&mut board, GrovePort::Ad1, 0x29).unwrap();
        assert!(matches!(
            device.read(&mut board, 64),
            Err(BoardError::InvalidArgument(_))
        ));
    }
}
