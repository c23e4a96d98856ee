//! Polled command/response transport over the bootloader UART.

use embedded_hal::blocking::delay::DelayMs;

use crate::config::Options;
use crate::error::ProtocolError;
use crate::hal::{Uart, UartChannel};
use crate::protocol::{UART_ACK, UART_NACK};

pub struct Transport<'a, U, D> {
    uart: &'a mut U,
    delay: &'a mut D,
    channel: UartChannel,
    response_timeout_ms: u32,
    poll_delay_ms: u32,
}

impl<'a, U, D> Transport<'a, U, D>
where
    U: Uart,
    D: DelayMs<u32>,
{
    pub fn new(uart: &'a mut U, delay: &'a mut D, channel: UartChannel, options: &Options) -> Self {
        Self {
            uart,
            delay,
            channel,
            response_timeout_ms: options.response_timeout_ms,
            poll_delay_ms: options.poll_delay_ms.max(1),
        }
    }

    pub fn delay(&mut self) -> &mut D {
        &mut *self.delay
    }

    /// Write raw bytes, returning the count the UART accepted
    pub fn send(&mut self, bytes: &[u8]) -> Result<usize, ProtocolError<U::Error>> {
        Ok(self.uart.write(self.channel, bytes)?)
    }

    /// Poll until at least `count` bytes are buffered, returning the
    /// buffered length or 0 on timeout. Nothing is consumed.
    pub fn await_bytes(
        &mut self,
        count: usize,
        timeout_ms: u32,
    ) -> Result<usize, ProtocolError<U::Error>> {
        let mut t = 0;

        while t < timeout_ms {
            let n = self.uart.buffered_len(self.channel)?;
            if n >= count {
                return Ok(n);
            }

            // Wait for delay period
            self.delay.delay_ms(self.poll_delay_ms);
            t = t.saturating_add(self.poll_delay_ms);
        }

        Ok(0)
    }

    /// Consume exactly `buff.len()` buffered bytes
    pub fn read_exact(&mut self, buff: &mut [u8]) -> Result<(), ProtocolError<U::Error>> {
        let n = self.uart.read_exact(self.channel, buff)?;
        if n != buff.len() {
            debug!("Short read ({} of {} bytes)", n, buff.len());
            return Err(ProtocolError::ResponseTimeout);
        }
        Ok(())
    }

    /// Send `payload` and wait for a response of at least `response_len`
    /// bytes starting with ACK. Returns everything that was buffered.
    pub fn exchange(
        &mut self,
        payload: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, ProtocolError<U::Error>> {
        let written = self.send(payload)?;
        if written != payload.len() {
            error!("Short write ({} of {} bytes)", written, payload.len());
            return Err(ProtocolError::ShortWrite {
                written,
                expected: payload.len(),
            });
        }

        let available = self.await_bytes(response_len, self.response_timeout_ms)?;
        if available == 0 {
            error!("Receive timeout awaiting {} bytes", response_len);
            return Err(ProtocolError::ResponseTimeout);
        }

        let mut response = vec![0u8; available];
        self.read_exact(&mut response)?;

        match response[0] {
            UART_ACK => {
                trace!("Received bootloader ack");
                Ok(response)
            }
            UART_NACK => {
                debug!("Received bootloader nack");
                Err(ProtocolError::Nack)
            }
            v => {
                debug!("Received unexpected value: 0x{:02x}", v);
                Err(ProtocolError::InvalidResponse(v))
            }
        }
    }
}
