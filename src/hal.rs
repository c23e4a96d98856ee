//! Providers the flasher drives: control lines, the bootloader UART and the
//! store holding binary images.
//!
//! The flasher owns one of each for the duration of a flash operation and
//! never shares them; implementations need no internal locking.

use core::fmt::Debug;

/// Host GPIO line identifier
pub type PinId = u32;

/// Host UART peripheral identifier
pub type UartChannel = u8;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Level {
    Low,
    High,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StopBits {
    One,
    Two,
}

/// UART line settings
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct UartSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl UartSettings {
    /// Line settings required by the STM32 USART bootloader (AN3155).
    /// Even parity is part of the protocol, not a local preference.
    pub const BOOTLOADER: UartSettings = UartSettings {
        baud_rate: 115_200,
        data_bits: 8,
        parity: Parity::Even,
        stop_bits: StopBits::One,
    };
}

impl Default for UartSettings {
    fn default() -> Self {
        Self::BOOTLOADER
    }
}

/// Digital output lines wired to the target's RESET and BOOT0 pins
pub trait Gpio {
    type Error: Debug;

    /// Configure a line as a push-pull output
    fn set_output(&mut self, pin: PinId) -> Result<(), Self::Error>;

    /// Drive a configured output line; cannot fail once configured
    fn set_level(&mut self, pin: PinId, level: Level);
}

/// Byte-stream UART connected to the target's bootloader USART
pub trait Uart {
    type Error: Debug;

    fn configure(&mut self, channel: UartChannel, settings: &UartSettings)
        -> Result<(), Self::Error>;

    fn set_pins(&mut self, channel: UartChannel, tx: PinId, rx: PinId) -> Result<(), Self::Error>;

    /// Write raw bytes, returning the number accepted
    fn write(&mut self, channel: UartChannel, bytes: &[u8]) -> Result<usize, Self::Error>;

    /// Number of received bytes waiting to be read
    fn buffered_len(&mut self, channel: UartChannel) -> Result<usize, Self::Error>;

    /// Consume buffered bytes into `buff`, returning the number read
    fn read_exact(&mut self, channel: UartChannel, buff: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Sequential, read-only access to stored binary images
pub trait Storage {
    type Error: Debug;
    type Handle;

    /// Make the store available
    fn mount(&mut self) -> Result<(), Self::Error>;

    /// Open an image by name, `Ok(None)` when it does not exist
    fn open(&mut self, name: &str) -> Result<Option<Self::Handle>, Self::Error>;

    /// Image size in bytes
    fn size(&mut self, handle: &Self::Handle) -> Result<u64, Self::Error>;

    /// Read the next bytes of the image, returning 0 at the end
    fn read(&mut self, handle: &mut Self::Handle, buff: &mut [u8]) -> Result<usize, Self::Error>;

    /// Restart sequential reads from offset 0
    fn rewind(&mut self, handle: &mut Self::Handle) -> Result<(), Self::Error>;

    fn close(&mut self, handle: Self::Handle);
}
