//! Stub backend for platforms without tuner device support.

use crate::tuner::{DeviceConfig, TunerDevice, TunerError};

pub fn open_first_available(
    _config: &DeviceConfig,
) -> Result<Box<dyn TunerDevice + Send>, TunerError> {
    Err(TunerError::Unsupported)
}
