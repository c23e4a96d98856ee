//! Flasher wiring and tunable options.

use crate::error::Error;
use crate::hal::{PinId, UartChannel};

/// Host lines and peripheral connected to the target.
///
/// `None` marks an unassigned line.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct FlasherConfig {
    /// Drives target NRST
    pub reset_pin: Option<PinId>,
    /// Drives target BOOT0
    pub boot0_pin: Option<PinId>,
    /// Host TX, wired to target RX
    pub uart_tx: Option<PinId>,
    /// Host RX, wired to target TX
    pub uart_rx: Option<PinId>,
    pub uart_channel: Option<UartChannel>,
}

/// A [`FlasherConfig`] that passed validation
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ValidConfig {
    pub(crate) reset_pin: PinId,
    pub(crate) boot0_pin: PinId,
    pub(crate) uart_tx: PinId,
    pub(crate) uart_rx: PinId,
    pub(crate) uart_channel: UartChannel,
}

impl FlasherConfig {
    pub fn new(
        reset_pin: PinId,
        boot0_pin: PinId,
        uart_tx: PinId,
        uart_rx: PinId,
        uart_channel: UartChannel,
    ) -> Self {
        Self {
            reset_pin: Some(reset_pin),
            boot0_pin: Some(boot0_pin),
            uart_tx: Some(uart_tx),
            uart_rx: Some(uart_rx),
            uart_channel: Some(uart_channel),
        }
    }

    /// Check every line is assigned and that the UART and control line
    /// pairs are distinct
    pub fn validate(&self) -> Result<ValidConfig, Error> {
        let (reset_pin, boot0_pin, uart_tx, uart_rx, uart_channel) = match (
            self.reset_pin,
            self.boot0_pin,
            self.uart_tx,
            self.uart_rx,
            self.uart_channel,
        ) {
            (Some(r), Some(b), Some(t), Some(x), Some(c)) => (r, b, t, x, c),
            _ => {
                error!("Flasher configuration has unassigned lines: {:?}", self);
                return Err(Error::ConfigInvalid);
            }
        };

        if uart_tx == uart_rx || reset_pin == boot0_pin {
            error!("Flasher configuration reuses a line: {:?}", self);
            return Err(Error::ConfigInvalid);
        }

        Ok(ValidConfig {
            reset_pin,
            boot0_pin,
            uart_tx,
            uart_rx,
            uart_channel,
        })
    }
}

impl ValidConfig {
    pub fn reset_pin(&self) -> PinId {
        self.reset_pin
    }

    pub fn boot0_pin(&self) -> PinId {
        self.boot0_pin
    }

    pub fn uart_channel(&self) -> UartChannel {
        self.uart_channel
    }
}

/// Parse a u32 with an optional `0x` prefix
pub fn parse_u32(s: &str) -> Result<u32, core::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Timeout to wait for bootloader responses
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "5000"))]
    pub response_timeout_ms: u32,

    /// Period to poll for bootloader responses
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,

    /// Time to hold the target in reset
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "100"))]
    pub reset_pulse_ms: u32,

    /// Period to wait for bootloader init after releasing reset
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "500"))]
    pub settle_delay_ms: u32,

    /// Number of reset + sync attempts before giving up on the target
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "3"))]
    pub presence_attempts: u32,

    /// Delay between presence detection attempts
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "100"))]
    pub presence_backoff_ms: u32,

    /// Largest image accepted for flashing
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "32768"))]
    pub max_image_size: u64,

    /// Flash address the image is loaded at
    #[cfg_attr(
        feature = "structopt",
        structopt(long, default_value = "0x08000000", parse(try_from_str = parse_u32))
    )]
    pub base_address: u32,

    /// Compare read-back data against the image
    #[cfg_attr(feature = "structopt", structopt(long))]
    pub verify_readback: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            response_timeout_ms: 5000,
            poll_delay_ms: 1,
            reset_pulse_ms: 100,
            settle_delay_ms: 500,
            presence_attempts: 3,
            presence_backoff_ms: 100,
            max_image_size: 32768,
            base_address: 0x0800_0000,
            verify_readback: false,
        }
    }
}
