#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use std::path::PathBuf;

use anyhow::Context;
use indicatif::ProgressBar;

use stm32_uart_flasher::linux::{LinuxUart, SysfsGpio};
use stm32_uart_flasher::{DirStorage, Flasher, FlasherConfig, Options, Phase, PinId, UartChannel};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    /// Image to flash, relative to the image directory
    image: String,

    /// Directory holding binary images
    #[structopt(long, default_value = ".")]
    images: PathBuf,

    /// Serial port connected to the target bootloader USART
    #[structopt(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// UART channel identifier
    #[structopt(long, default_value = "1")]
    uart_channel: UartChannel,

    /// Host TX line (target RX)
    #[structopt(long, default_value = "43")]
    uart_tx: PinId,

    /// Host RX line (target TX)
    #[structopt(long, default_value = "6")]
    uart_rx: PinId,

    /// GPIO driving target NRST
    #[structopt(long, default_value = "5")]
    reset_pin: PinId,

    /// GPIO driving target BOOT0
    #[structopt(long, default_value = "4")]
    boot0_pin: PinId,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    if let Ok(meta) = std::fs::metadata(o.images.join(&o.image)) {
        info!("Image {}: {}", o.image, bytefmt::format(meta.len()));
    }

    info!("Connecting to serial port");

    let uart = LinuxUart::open(&o.port)
        .with_context(|| format!("Error connecting to serial port {}", o.port))?;

    let config = FlasherConfig::new(o.reset_pin, o.boot0_pin, o.uart_tx, o.uart_rx, o.uart_channel);

    let mut flasher = Flasher::new(
        SysfsGpio::new(),
        uart,
        DirStorage::new(&o.images),
        linux_embedded_hal::Delay,
        o.options.clone(),
    );

    let bar = ProgressBar::new(0);
    let result = flasher.flash_with_progress(&config, &o.image, |p| {
        bar.set_length(p.blocks as u64);
        bar.set_position(p.block as u64);
        bar.set_message(match p.phase {
            Phase::Write => "writing",
            Phase::Read => "reading",
        });
    });
    bar.finish_and_clear();

    match result {
        Ok(()) => {
            info!("Target flashed!");
            Ok(())
        }
        Err(e) => {
            error!("Flash failed: {}", e);
            eprintln!("{}", e.label());
            std::process::exit(1);
        }
    }
}
