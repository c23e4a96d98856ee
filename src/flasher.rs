//! Flash orchestration: validate, locate the image, enter the bootloader,
//! erase, write, read back and always leave the target runnable.

use embedded_hal::blocking::delay::DelayMs;

use crate::bootloader::Bootloader;
use crate::bootmode::BootMode;
use crate::config::{FlasherConfig, Options, ValidConfig};
use crate::error::{Error, FlashResult};
use crate::hal::{Gpio, Storage, Uart, UartSettings};
use crate::handshake;
use crate::protocol::{MemoryAddress, BLOCK_PAD, BLOCK_SIZE};
use crate::storage::{read_block, with_image};
use crate::transport::Transport;

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Phase {
    Write,
    Read,
}

/// Reported after each completed block
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Progress {
    pub phase: Phase,
    /// 1-based index of the completed block
    pub block: usize,
    pub blocks: usize,
}

/// Drives a single flash session at a time over the providers it owns.
///
/// `flash` blocks for the whole operation; embedders needing a responsive
/// caller should run it on a dedicated thread.
pub struct Flasher<G, U, S, D> {
    gpio: G,
    uart: U,
    storage: S,
    delay: D,
    options: Options,
}

impl<G, U, S, D> Flasher<G, U, S, D>
where
    G: Gpio,
    U: Uart,
    S: Storage,
    D: DelayMs<u32>,
{
    /// Create a new flasher instance
    pub fn new(gpio: G, uart: U, storage: S, delay: D, options: Options) -> Self {
        Self {
            gpio,
            uart,
            storage,
            delay,
            options,
        }
    }

    /// Flash image `name` to the target wired as described by `config`
    pub fn flash(&mut self, config: &FlasherConfig, name: &str) -> FlashResult {
        self.flash_with_progress(config, name, |_| ())
    }

    /// As [`Flasher::flash`], calling `progress` after each block
    pub fn flash_with_progress<P>(
        &mut self,
        config: &FlasherConfig,
        name: &str,
        mut progress: P,
    ) -> FlashResult
    where
        P: FnMut(Progress),
    {
        let config = config.validate()?;

        if let Err(e) = self.storage.mount() {
            error!("Failed to initialise image storage: {:?}", e);
            return Err(Error::StorageInit);
        }

        let Self {
            gpio,
            uart,
            storage,
            delay,
            options,
        } = self;
        let options = &*options;

        let result = with_image(storage, name, options.max_image_size, |storage, image, size| {
            let blocks = ((size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64) as usize;

            BootMode::new(gpio, &config, options).run(delay, |mode, delay| {
                configure_uart(uart, &config)?;

                let link = Transport::new(uart, delay, config.uart_channel, options);
                let mut bl = Bootloader::new(link);

                handshake::detect_presence(mode, &mut bl, options)?;
                let info = handshake::setup(mode, &mut bl)?;
                info!(
                    "Bootloader version: {:02x?}, product ID: {:04x?}",
                    info.bootloader_version(),
                    info.product_id()
                );
                handshake::erase(&mut bl);

                info!("Writing target memory");
                write_image(&mut bl, storage, image, options, blocks, &mut progress)?;

                info!("Reading target memory");
                read_image(&mut bl, storage, image, options, blocks, &mut progress)?;

                Ok(())
            })
        });

        match &result {
            Ok(()) => info!("Target flashed successfully"),
            Err(e) => error!("Flash aborted: {} ({})", e, e.label()),
        }

        result
    }
}

fn configure_uart<U: Uart>(uart: &mut U, config: &ValidConfig) -> Result<(), Error> {
    let channel = config.uart_channel;

    uart.configure(channel, &UartSettings::BOOTLOADER)
        .and_then(|_| uart.set_pins(channel, config.uart_tx, config.uart_rx))
        .map_err(|e| {
            error!("Failed to initialise UART {}: {:?}", channel, e);
            Error::UartInit
        })?;

    info!("Initialised flash UART {}", channel);
    Ok(())
}

fn write_image<U, D, S, P>(
    bl: &mut Bootloader<U, D>,
    storage: &mut S,
    image: &mut S::Handle,
    options: &Options,
    blocks: usize,
    progress: &mut P,
) -> Result<(), Error>
where
    U: Uart,
    D: DelayMs<u32>,
    S: Storage,
    P: FnMut(Progress),
{
    rewind(storage, image)?;

    let mut address = MemoryAddress::new(options.base_address);
    let mut block = [BLOCK_PAD; BLOCK_SIZE];
    let mut index = 0;

    loop {
        block.fill(BLOCK_PAD);
        if next_block(storage, image, &mut block)? == 0 {
            break;
        }
        index += 1;

        info!("Writing block {}/{} at {}", index, blocks, address);
        if let Err(e) = bl.write_page(address, &block) {
            error!("Write of block {} failed: {}", index, e);
            return Err(Error::WriteFailed { block: index });
        }

        progress(Progress {
            phase: Phase::Write,
            block: index,
            blocks,
        });
        address.advance();
    }

    Ok(())
}

/// Re-stream the image's blocks through page reads. The returned data is
/// only compared with the image when `verify_readback` is set.
fn read_image<U, D, S, P>(
    bl: &mut Bootloader<U, D>,
    storage: &mut S,
    image: &mut S::Handle,
    options: &Options,
    blocks: usize,
    progress: &mut P,
) -> Result<(), Error>
where
    U: Uart,
    D: DelayMs<u32>,
    S: Storage,
    P: FnMut(Progress),
{
    rewind(storage, image)?;

    let mut address = MemoryAddress::new(options.base_address);
    let mut block = [BLOCK_PAD; BLOCK_SIZE];
    let mut readback = [0u8; BLOCK_SIZE];
    let mut index = 0;

    loop {
        block.fill(BLOCK_PAD);
        let n = next_block(storage, image, &mut block)?;
        if n == 0 {
            break;
        }
        index += 1;

        info!("Reading block {}/{} at {}", index, blocks, address);
        if let Err(e) = bl.read_page(address, &mut readback) {
            error!("Read of block {} failed: {}", index, e);
            return Err(Error::ReadFailed { block: index });
        }

        if options.verify_readback && readback[..n] != block[..n] {
            error!("Block {} at {} does not match the image", index, address);
            return Err(Error::VerifyMismatch {
                address: address.into(),
            });
        }

        progress(Progress {
            phase: Phase::Read,
            block: index,
            blocks,
        });
        address.advance();
    }

    Ok(())
}

fn rewind<S: Storage>(storage: &mut S, image: &mut S::Handle) -> Result<(), Error> {
    storage.rewind(image).map_err(|e| {
        error!("Failed to rewind image: {:?}", e);
        Error::CannotOpenFile
    })
}

fn next_block<S: Storage>(
    storage: &mut S,
    image: &mut S::Handle,
    block: &mut [u8; BLOCK_SIZE],
) -> Result<usize, Error> {
    read_block(storage, image, block).map_err(|e| {
        error!("Failed to read image: {:?}", e);
        Error::CannotOpenFile
    })
}
