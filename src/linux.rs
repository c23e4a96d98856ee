//! Linux providers: a tty UART and sysfs GPIO lines.

use std::collections::{HashMap, VecDeque};
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::Path;
use std::time::Duration;

use embedded_hal::serial::{Read, Write};
use serial_core::{
    BaudRate, CharSize, Error as SerialError, FlowControl, Parity as SerialParity,
    SerialDevice as _, SerialPortSettings as _, StopBits as SerialStopBits,
};
use linux_embedded_hal::Serial;
use sysfs_gpio::{Direction, Pin};

use crate::hal::{Gpio, Level, Parity, PinId, StopBits, Uart, UartChannel, UartSettings};

/// Read timeout used while draining the port into the receive buffer
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Serial port with a receive buffer, so pending input can be counted
/// without consuming it
pub struct LinuxUart {
    port: Serial,
    rx: VecDeque<u8>,
}

impl LinuxUart {
    /// Open a serial port, e.g. `/dev/ttyUSB0`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SerialError> {
        let mut port = Serial::open(path.as_ref())?;
        port.0.set_timeout(DRAIN_TIMEOUT)?;

        Ok(Self {
            port,
            rx: VecDeque::new(),
        })
    }

    fn drain(&mut self) -> Result<(), IoErrorKind> {
        loop {
            match self.port.read() {
                Ok(v) => self.rx.push_back(v),
                Err(nb::Error::WouldBlock) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
    }
}

fn io_kind(e: SerialError) -> IoErrorKind {
    IoError::from(e).kind()
}

impl Uart for LinuxUart {
    type Error = IoErrorKind;

    fn configure(&mut self, _channel: UartChannel, settings: &UartSettings) -> Result<(), IoErrorKind> {
        // Apply settings
        let mut s = self.port.0.read_settings().map_err(io_kind)?;

        s.set_char_size(match settings.data_bits {
            5 => CharSize::Bits5,
            6 => CharSize::Bits6,
            7 => CharSize::Bits7,
            _ => CharSize::Bits8,
        });
        s.set_stop_bits(match settings.stop_bits {
            StopBits::One => SerialStopBits::Stop1,
            StopBits::Two => SerialStopBits::Stop2,
        });
        s.set_baud_rate(BaudRate::from_speed(settings.baud_rate as usize))
            .map_err(io_kind)?;
        s.set_flow_control(FlowControl::FlowNone);
        s.set_parity(match settings.parity {
            Parity::None => SerialParity::ParityNone,
            Parity::Odd => SerialParity::ParityOdd,
            Parity::Even => SerialParity::ParityEven,
        });

        self.port.0.write_settings(&s).map_err(io_kind)?;
        self.rx.clear();

        debug!("Serial port configured: {:?}", settings);
        Ok(())
    }

    fn set_pins(&mut self, _channel: UartChannel, tx: PinId, rx: PinId) -> Result<(), IoErrorKind> {
        debug!("Serial port lines fixed by the device, ignoring tx {} rx {}", tx, rx);
        Ok(())
    }

    fn write(&mut self, _channel: UartChannel, bytes: &[u8]) -> Result<usize, IoErrorKind> {
        for &b in bytes {
            nb::block!(self.port.write(b))?;
        }
        nb::block!(self.port.flush())?;
        Ok(bytes.len())
    }

    fn buffered_len(&mut self, _channel: UartChannel) -> Result<usize, IoErrorKind> {
        self.drain()?;
        Ok(self.rx.len())
    }

    fn read_exact(&mut self, _channel: UartChannel, buff: &mut [u8]) -> Result<usize, IoErrorKind> {
        if self.rx.len() < buff.len() {
            self.drain()?;
        }

        let n = buff.len().min(self.rx.len());
        for (slot, v) in buff.iter_mut().zip(self.rx.drain(..n)) {
            *slot = v;
        }
        Ok(n)
    }
}

/// GPIO lines through the sysfs interface, exported on first use
#[derive(Default)]
pub struct SysfsGpio {
    pins: HashMap<PinId, Pin>,
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gpio for SysfsGpio {
    type Error = sysfs_gpio::Error;

    fn set_output(&mut self, pin: PinId) -> Result<(), Self::Error> {
        let p = Pin::new(u64::from(pin));
        p.export()?;
        p.set_direction(Direction::Out)?;
        self.pins.insert(pin, p);
        Ok(())
    }

    fn set_level(&mut self, pin: PinId, level: Level) {
        let value = match level {
            Level::Low => 0,
            Level::High => 1,
        };
        match self.pins.get(&pin) {
            Some(p) => {
                if let Err(e) = p.set_value(value) {
                    warn!("Failed to set GPIO {}: {:?}", pin, e);
                }
            }
            None => warn!("GPIO {} driven before being configured", pin),
        }
    }
}
