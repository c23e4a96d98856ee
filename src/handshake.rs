//! Target detection and pre-flash setup.

use embedded_hal::blocking::delay::DelayMs;

use crate::bootloader::Bootloader;
use crate::bootmode::BootMode;
use crate::config::Options;
use crate::error::Error;
use crate::hal::{Gpio, Uart};

/// Raw identification responses from the bootloader
#[derive(Clone, PartialEq, Debug)]
pub struct TargetInfo {
    pub commands: Vec<u8>,
    pub version: Vec<u8>,
    pub id: Vec<u8>,
}

impl TargetInfo {
    /// Bootloader protocol version, e.g. 0x31 for v3.1
    pub fn bootloader_version(&self) -> Option<u8> {
        self.version.get(1).copied()
    }

    /// Product ID from the Get ID response
    pub fn product_id(&self) -> Option<u16> {
        match self.id.get(2..4) {
            Some(&[hi, lo]) => Some(u16::from_be_bytes([hi, lo])),
            _ => None,
        }
    }
}

/// Check the target is alive and in bootloader mode.
///
/// The bootloader only accepts the discovery character shortly after reset,
/// so each attempt resets the target before Sync and Get.
pub fn detect_presence<G, U, D>(
    mode: &mut BootMode<G>,
    bl: &mut Bootloader<U, D>,
    options: &Options,
) -> Result<(), Error>
where
    G: Gpio,
    U: Uart,
    D: DelayMs<u32>,
{
    info!("Checking target presence");

    for attempt in 1..=options.presence_attempts {
        if attempt > 1 {
            bl.delay().delay_ms(options.presence_backoff_ms);
        }
        debug!("Presence attempt {}/{}", attempt, options.presence_attempts);

        mode.pulse_reset(bl.delay());

        match bl.sync().and_then(|_| bl.get()) {
            Ok(_) => {
                info!("Target detected in bootloader mode");
                return Ok(());
            }
            Err(e) => debug!("Presence attempt {} failed: {}", attempt, e),
        }
    }

    error!("No target detected or not in bootloader mode");
    Err(Error::TargetNotFound)
}

/// Reset the target and run the identification sequence, each step
/// reporting its own failure
pub fn setup<G, U, D>(mode: &mut BootMode<G>, bl: &mut Bootloader<U, D>) -> Result<TargetInfo, Error>
where
    G: Gpio,
    U: Uart,
    D: DelayMs<u32>,
{
    info!("Starting target setup");

    mode.pulse_reset(bl.delay());

    bl.sync().map_err(|e| {
        error!("Sync failed: {}", e);
        Error::SyncFailed
    })?;
    let commands = bl.get().map_err(|e| {
        error!("Get commands failed: {}", e);
        Error::GetCommandsFailed
    })?;
    let version = bl.get_version().map_err(|e| {
        error!("Get version failed: {}", e);
        Error::GetVersionFailed
    })?;
    let id = bl.get_id().map_err(|e| {
        error!("Get ID failed: {}", e);
        Error::GetIdFailed
    })?;

    let info = TargetInfo { commands, version, id };
    debug!("Target info: {:02x?}", info);

    Ok(info)
}

/// Issue both erase variants; which one takes effect depends on the
/// bootloader revision, so failures are logged and otherwise ignored
pub fn erase<U, D>(bl: &mut Bootloader<U, D>)
where
    U: Uart,
    D: DelayMs<u32>,
{
    info!("Erasing flash");

    if let Err(e) = bl.mass_erase() {
        warn!("Mass erase failed: {}", e);
    }
    if let Err(e) = bl.extended_erase() {
        warn!("Extended erase failed: {}", e);
    }
}
