//! Tuner acquisition errors.

use thiserror::Error;

/// Errors raised while acquiring a tuner device.
///
/// Once a device is open, expected hardware conditions (tune failures,
/// device gone) are reported as boolean operation results instead, per
/// the controller contract.
#[derive(Debug, Error)]
pub enum TunerError {
    /// No usable tuner device was found.
    #[error("no available tuner device found")]
    NoDevice,

    /// This build has no device backend for the current platform.
    #[error("tuner device access is not supported on this platform (supported: Linux)")]
    Unsupported,

    /// The device node could not be opened or configured.
    #[error("tuner device I/O error: {0}")]
    Io(#[from] std::io::Error),
}
