//! Flash operation results and wire-level exchange errors.

use thiserror::Error;

/// Outcome of a flash operation; `Ok(())` is success.
pub type FlashResult = Result<(), Error>;

/// Reasons a flash operation can stop.
///
/// Every failure is terminal for the current operation, there is no
/// resumption of a partially written image.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("invalid flasher configuration")]
    ConfigInvalid,
    #[error("UART initialisation failed")]
    UartInit,
    #[error("GPIO initialisation failed")]
    GpioInit,
    #[error("image storage initialisation failed")]
    StorageInit,

    #[error("target not detected or not in bootloader mode")]
    TargetNotFound,
    #[error("failed to synchronise with the bootloader")]
    SyncFailed,
    #[error("failed to fetch supported bootloader commands")]
    GetCommandsFailed,
    #[error("failed to fetch bootloader version")]
    GetVersionFailed,
    #[error("failed to fetch chip ID")]
    GetIdFailed,

    #[error("image file not found")]
    FileNotFound,
    #[error("image file is empty")]
    FileEmpty,
    #[error("image of {size} bytes exceeds the {max} byte flash limit")]
    FileTooLarge { size: u64, max: u64 },
    #[error("image file could not be read")]
    CannotOpenFile,
    #[error("flash write failed at block {block}")]
    WriteFailed { block: usize },
    #[error("flash read failed at block {block}")]
    ReadFailed { block: usize },
    #[error("read-back mismatch in block at 0x{address:08x}")]
    VerifyMismatch { address: u32 },

    #[error("unknown error")]
    Unknown,
}

impl Error {
    /// Stable diagnostic label for this kind of failure
    pub fn label(&self) -> &'static str {
        match self {
            Error::ConfigInvalid => "invalid_configuration",
            Error::UartInit => "uart_initialization_failed",
            Error::GpioInit => "gpio_initialization_failed",
            Error::StorageInit => "storage_initialization_failed",
            Error::TargetNotFound => "stm32_not_detected",
            Error::SyncFailed => "failed_to_synchronize_with_stm32",
            Error::GetCommandsFailed => "failed_to_get_commands_from_stm32",
            Error::GetVersionFailed => "failed_to_get_bootloader_version",
            Error::GetIdFailed => "failed_to_get_stm32_chip_id",
            Error::FileNotFound => "file_not_found",
            Error::FileEmpty => "file_empty",
            Error::FileTooLarge { .. } => "file_too_large_for_flash_memory",
            Error::CannotOpenFile => "cannot_open_file",
            Error::WriteFailed { .. } => "flash_write_failed",
            Error::ReadFailed { .. } => "flash_read_failed",
            Error::VerifyMismatch { .. } => "flash_verify_mismatch",
            Error::Unknown => "unknown_error",
        }
    }
}

/// Failure of a single command/response exchange with the bootloader
#[derive(Clone, PartialEq, Debug, Error)]
pub enum ProtocolError<SerialError> {
    #[error("serial error: {0:?}")]
    Serial(SerialError),
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },
    #[error("response timeout")]
    ResponseTimeout,
    #[error("bootloader nack")]
    Nack,
    #[error("unexpected response 0x{0:02x}")]
    InvalidResponse(u8),
}

impl<SerialError> From<SerialError> for ProtocolError<SerialError> {
    fn from(e: SerialError) -> Self {
        Self::Serial(e)
    }
}
