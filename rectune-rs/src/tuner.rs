//! Tuner device control.
//!
//! [`TunerController`] owns one tuner device and drives it through the
//! tune / stop / read lifecycle. The device itself sits behind the
//! [`TunerDevice`] trait so the controller can be exercised without
//! hardware; the real backend lives in the platform module.

use std::time::Duration;

use crate::channels::MODULATION_8VSB;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

mod controller;
mod device;
mod error;
mod filters;

pub use controller::TunerController;
pub use device::TunerDevice;
pub use error::TunerError;
pub use filters::{FilterType, PidFilterSet, PID_MAX};

#[cfg(target_os = "linux")]
use linux as backend;
#[cfg(not(target_os = "linux"))]
use unsupported as backend;

/// PID of the Program Association Table.
pub const PID_PAT: u16 = 0x0000;
/// PID of the DVB Service Description Table.
pub const PID_DVB_SDT: u16 = 0x0011;
/// ATSC SI base PID, carrying MGT/VCT/STT.
pub const PID_ATSC_SI_BASE: u16 = 0x1ffb;

/// Tune timeout for 8VSB; terrestrial frontends lock quickly.
pub const VSB_TUNE_TIMEOUT: Duration = Duration::from_millis(2000);
/// Tune timeout for every other ATSC modulation. Some devices take time
/// for QAM256 tuning.
pub const QAM_TUNE_TIMEOUT: Duration = Duration::from_millis(4000);
/// Tune timeout for DVB-S/S2 transponders.
pub const DVB_TUNE_TIMEOUT: Duration = Duration::from_millis(8000);

/// Selects the frontend lock timeout for an ATSC modulation name.
pub fn atsc_tune_timeout(modulation: &str) -> Duration {
    if modulation == MODULATION_8VSB {
        VSB_TUNE_TIMEOUT
    } else {
        QAM_TUNE_TIMEOUT
    }
}

/// Which tuner device to acquire.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceConfig {
    /// Adapter index to use. `None` scans for the first usable adapter.
    pub adapter: Option<u32>,
    /// Frontend index within the adapter.
    pub frontend: u32,
}

/// Acquires the first available tuner device.
///
/// The returned device is locked to the caller and released on drop.
pub fn open_first_available(
    config: &DeviceConfig,
) -> Result<Box<dyn TunerDevice + Send>, TunerError> {
    backend::open_first_available(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_selection() {
        assert_eq!(atsc_tune_timeout("8VSB"), VSB_TUNE_TIMEOUT);
        assert_eq!(atsc_tune_timeout("QAM256"), QAM_TUNE_TIMEOUT);
        assert_eq!(atsc_tune_timeout("QPSK"), QAM_TUNE_TIMEOUT);
        assert_eq!(atsc_tune_timeout("8vsb"), QAM_TUNE_TIMEOUT);
    }
}
