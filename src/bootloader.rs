//! Bootloader commands built on the polled transport.

use embedded_hal::blocking::delay::DelayMs;

use crate::error::ProtocolError;
use crate::hal::Uart;
use crate::protocol::*;
use crate::transport::Transport;

type Result<T, E> = core::result::Result<T, ProtocolError<E>>;

pub struct Bootloader<'a, U, D> {
    link: Transport<'a, U, D>,
}

impl<'a, U, D> Bootloader<'a, U, D>
where
    U: Uart,
    D: DelayMs<u32>,
{
    pub fn new(link: Transport<'a, U, D>) -> Self {
        Self { link }
    }

    pub fn delay(&mut self) -> &mut D {
        self.link.delay()
    }

    /// Send the discovery character
    pub fn sync(&mut self) -> Result<(), U::Error> {
        debug!("SYNC");
        self.link.exchange(&[UART_DISC], 1).map(|_| ())
    }

    /// Fetch the bootloader version and supported commands
    pub fn get(&mut self) -> Result<Vec<u8>, U::Error> {
        debug!("GET");
        self.command(Command::Get)
    }

    /// Fetch the bootloader version and read protection status
    pub fn get_version(&mut self) -> Result<Vec<u8>, U::Error> {
        debug!("GET VERSION & READ PROTECTION STATUS");
        self.command(Command::GetVersionReadStatus)
    }

    pub fn get_id(&mut self) -> Result<Vec<u8>, U::Error> {
        debug!("GET ID");
        self.command(Command::GetId)
    }

    /// Erase all pages with the legacy erase command
    pub fn mass_erase(&mut self) -> Result<(), U::Error> {
        debug!("ERASE MEMORY");
        self.command(Command::Erase)?;
        self.link.exchange(&ERASE_ALL, 1).map(|_| ())
    }

    /// Erase all pages with the two byte addressed erase command
    pub fn extended_erase(&mut self) -> Result<(), U::Error> {
        debug!("EXTENDED ERASE MEMORY");
        self.command(Command::ExtendedErase)?;
        self.link.exchange(&EXTENDED_ERASE_ALL, 1).map(|_| ())
    }

    /// Write a full block at `address`
    pub fn write_page(
        &mut self,
        address: MemoryAddress,
        block: &[u8; BLOCK_SIZE],
    ) -> Result<(), U::Error> {
        debug!("WRITE MEMORY at {}", address);

        self.command(Command::WriteMemory)?;
        self.load_address(address)?;
        self.link.exchange(&DataFrame::page(block), 1).map(|_| ())
    }

    /// Read a full block from `address` into `out`.
    ///
    /// The Read Memory and Load Address acknowledgements are not checked;
    /// only the final response decides the outcome.
    pub fn read_page(
        &mut self,
        address: MemoryAddress,
        out: &mut [u8; BLOCK_SIZE],
    ) -> Result<(), U::Error> {
        debug!("READ MEMORY at {}", address);

        if let Err(e) = self.command(Command::ReadMemory) {
            debug!("Read memory command not acknowledged: {}", e);
        }
        if let Err(e) = self.load_address(address) {
            debug!("Read address not acknowledged: {}", e);
        }

        let data = self.link.exchange(&READ_BLOCK, READ_BLOCK_RESPONSE_LEN)?;
        if data.len() < READ_BLOCK_RESPONSE_LEN {
            return Err(ProtocolError::ResponseTimeout);
        }
        out.copy_from_slice(&data[1..READ_BLOCK_RESPONSE_LEN]);

        Ok(())
    }

    fn command(&mut self, command: Command) -> Result<Vec<u8>, U::Error> {
        self.link.exchange(&command.frame(), command.response_len())
    }

    fn load_address(&mut self, address: MemoryAddress) -> Result<(), U::Error> {
        self.link.exchange(&address.frame(), 1).map(|_| ())
    }
}
