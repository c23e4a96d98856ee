//! STM32 USART bootloader wire format, per AN3155.

use core::fmt;

/// Discovery (sync) character, lets the bootloader detect the baud rate
pub const UART_DISC: u8 = 0x7F;

pub const UART_ACK: u8 = 0x79;
pub const UART_NACK: u8 = 0x1F;

/// Bytes written or read per page operation
pub const BLOCK_SIZE: usize = 256;

/// Fill value for the unused tail of a short final block
pub const BLOCK_PAD: u8 = 0xFF;

/// Mass erase parameter: all pages, with complement
pub const ERASE_ALL: [u8; 2] = [0xFF, 0x00];

/// Extended erase parameter: global mass erase (0xFFFF), with checksum
pub const EXTENDED_ERASE_ALL: [u8; 3] = [0xFF, 0xFF, 0x00];

/// Read memory length parameter: 256 bytes, with complement
pub const READ_BLOCK: [u8; 2] = [0xFF, 0x00];

/// Response to a page read: ACK followed by the data
pub const READ_BLOCK_RESPONSE_LEN: usize = BLOCK_SIZE + 1;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    /// Fetch bootloader version and allowed commands
    Get = 0x00,

    /// Gets the bootloader version and the Read Protection status of the Flash memory.
    GetVersionReadStatus = 0x01,

    /// Gets the chip ID
    GetId = 0x02,

    /// Reads up to 256 bytes of memory starting from an address specified by the application.
    ReadMemory = 0x11,

    /// Writes up to 256 bytes to the RAM or Flash memory starting from an address specified by the application.
    WriteMemory = 0x31,

    /// Erases from one to all the Flash memory pages.
    Erase = 0x43,

    /// Erases from one to all the Flash memory pages using two byte addressing mode (available only for v3.0 USART bootloader versions and above).
    ExtendedErase = 0x44,
}

impl Command {
    /// Opcode followed by its complement
    pub fn frame(self) -> [u8; 2] {
        let c = self as u8;
        [c, !c]
    }

    /// Number of bytes the bootloader returns once the command is accepted,
    /// including the leading ACK
    pub fn response_len(self) -> usize {
        match self {
            // ACK, N, version, 11 command codes, ACK
            Command::Get => 15,
            // ACK, version, 2 option bytes, ACK
            Command::GetVersionReadStatus => 5,
            // ACK, N, 2 byte PID, ACK
            Command::GetId => 5,
            _ => 1,
        }
    }
}

/// XOR of all bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |c, b| c ^ b)
}

/// Length-prefixed data frame sent after a Write Memory load address
pub struct DataFrame;

impl DataFrame {
    /// Encode a full page: length byte (N-1 = 0xFF), the payload and a
    /// checksum over both
    pub fn page(payload: &[u8; BLOCK_SIZE]) -> Vec<u8> {
        let len = (BLOCK_SIZE - 1) as u8;

        let mut frame = Vec::with_capacity(BLOCK_SIZE + 2);
        frame.push(len);
        frame.extend_from_slice(payload);
        frame.push(payload.iter().fold(0xFF, |c, b| c ^ b));

        frame
    }
}

/// Big-endian load address of the next page operation
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct MemoryAddress([u8; 4]);

impl MemoryAddress {
    pub fn new(address: u32) -> Self {
        Self(address.to_be_bytes())
    }

    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Load address frame: the address followed by its XOR checksum
    pub fn frame(&self) -> [u8; 5] {
        let [a, b, c, d] = self.0;
        [a, b, c, d, checksum(&self.0)]
    }

    /// Step to the next block.
    ///
    /// Byte 2 is incremented with carry into bytes 1 and 0; byte 3 is never
    /// touched, so a base address that is not block aligned keeps its low
    /// byte for the whole session. Images already in the field were flashed
    /// with this rule.
    pub fn advance(&mut self) {
        self.0[2] = self.0[2].wrapping_add(1);
        if self.0[2] == 0 {
            self.0[1] = self.0[1].wrapping_add(1);
            if self.0[1] == 0 {
                self.0[0] = self.0[0].wrapping_add(1);
            }
        }
    }
}

impl From<MemoryAddress> for u32 {
    fn from(a: MemoryAddress) -> u32 {
        u32::from_be_bytes(a.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", u32::from(*self))
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress({:02x?})", self.0)
    }
}
