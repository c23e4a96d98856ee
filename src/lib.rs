//! STM32 Serial Bootloader flasher.
//!
//! Based on AN3155. A host driving the target's NRST and BOOT0 lines forces
//! it into the system bootloader, then erases, writes and reads back flash
//! a 256 byte block at a time over an 8E1 UART.
//!
//! ```text
//! Flasher ─┬─ handshake ── bootloader ── transport ── Uart
//!          ├─ bootmode ─────────────────────────────── Gpio
//!          └─ storage ──────────────────────────────── Storage
//! ```
//!
//! All operations are blocking; a flash operation holds its providers
//! exclusively until it returns.

#[macro_use]
extern crate log;

extern crate embedded_hal;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

pub mod bootloader;
pub mod bootmode;
pub mod config;
pub mod error;
pub mod flasher;
pub mod hal;
pub mod handshake;
pub mod protocol;
pub mod storage;
pub mod transport;

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(test)]
mod mock;

pub use config::{FlasherConfig, Options};
pub use error::{Error, FlashResult, ProtocolError};
pub use flasher::{Flasher, Phase, Progress};
pub use hal::{Gpio, Level, PinId, Storage, Uart, UartChannel, UartSettings};
pub use storage::DirStorage;
