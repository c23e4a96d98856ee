//! RESET / BOOT0 sequencing.
//!
//! BOOT0 is sampled by the target when NRST is released, so the level is
//! set first and the target is then pulsed through reset.

use embedded_hal::blocking::delay::DelayMs;

use crate::config::{Options, ValidConfig};
use crate::error::Error;
use crate::hal::{Gpio, Level, PinId};

pub struct BootMode<'a, G> {
    gpio: &'a mut G,
    reset_pin: PinId,
    boot0_pin: PinId,
    reset_pulse_ms: u32,
    settle_delay_ms: u32,
}

impl<'a, G: Gpio> BootMode<'a, G> {
    pub fn new(gpio: &'a mut G, config: &ValidConfig, options: &Options) -> Self {
        Self {
            gpio,
            reset_pin: config.reset_pin,
            boot0_pin: config.boot0_pin,
            reset_pulse_ms: options.reset_pulse_ms,
            settle_delay_ms: options.settle_delay_ms,
        }
    }

    /// Restart the target into the system bootloader
    pub fn enter<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.select(Level::High, delay)?;
        info!("Target entered bootloader mode");
        Ok(())
    }

    /// Restart the target into its application
    pub fn exit<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.select(Level::Low, delay)?;
        info!("Target exited bootloader mode");
        Ok(())
    }

    /// Hold the target in reset, release it and wait for it to boot
    pub fn pulse_reset<D: DelayMs<u32>>(&mut self, delay: &mut D) {
        debug!("Resetting target");

        self.gpio.set_level(self.reset_pin, Level::Low);
        delay.delay_ms(self.reset_pulse_ms);
        self.gpio.set_level(self.reset_pin, Level::High);
        delay.delay_ms(self.settle_delay_ms);
    }

    /// Run `f` with the target in bootloader mode.
    ///
    /// The target is returned to its application whatever `f` returns. A
    /// failure to exit is only reported when `f` succeeded.
    pub fn run<D, T, F>(&mut self, delay: &mut D, f: F) -> Result<T, Error>
    where
        D: DelayMs<u32>,
        F: FnOnce(&mut Self, &mut D) -> Result<T, Error>,
    {
        self.enter(delay)?;

        let result = f(self, delay);

        match (self.exit(delay), result) {
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(r)) => {
                warn!("Failed to exit bootloader mode after error: {}", e);
                Err(r)
            }
            (Ok(()), r) => r,
        }
    }

    fn select<D: DelayMs<u32>>(&mut self, level: Level, delay: &mut D) -> Result<(), Error> {
        for &pin in &[self.reset_pin, self.boot0_pin] {
            if let Err(e) = self.gpio.set_output(pin) {
                error!("Failed to configure GPIO {} as output: {:?}", pin, e);
                return Err(Error::GpioInit);
            }
        }

        self.gpio.set_level(self.boot0_pin, level);
        self.pulse_reset(delay);

        Ok(())
    }
}
