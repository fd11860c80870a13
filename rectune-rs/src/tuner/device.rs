//! The boundary between the control plane and the tuner hardware.

use std::time::Duration;

use crate::channels::DvbTuneParams;
use crate::tuner::FilterType;

/// Operations the controller requires from a tuner device.
///
/// Implementations block for at most the given timeout in the tuning
/// calls and must never block indefinitely in
/// [`read_transport_stream`](TunerDevice::read_transport_stream).
/// Dropping a device releases its hardware resources.
pub trait TunerDevice {
    /// Tunes the frontend to an ATSC channel and waits for lock.
    ///
    /// Returns `true` once the frontend reports a stable lock within
    /// `timeout`, `false` otherwise.
    fn tune_atsc(&mut self, frequency: u32, modulation: &str, timeout: Duration) -> bool;

    /// Tunes the frontend to a DVB-S/S2 transponder and waits for lock.
    fn tune_dvb(&mut self, params: &DvbTuneParams, timeout: Duration) -> bool;

    /// Starts delivering packets with the given PID to the host.
    ///
    /// The PID has been validated against [`PID_MAX`](crate::tuner::PID_MAX)
    /// before this is called.
    fn add_pid_filter(&mut self, pid: u16, filter_type: FilterType);

    /// Starts a section filter matching one table id on the given PID.
    fn add_section_filter(&mut self, pid: u16, table_id: u8);

    /// Stops and releases every active PID and section filter.
    fn close_all_filters(&mut self);

    /// Stops the current tune and resets the device for the next one.
    fn stop_tune(&mut self);

    /// Hints that another tune request is queued; in-flight lock waits
    /// should return early.
    fn set_has_pending_tune(&mut self, pending: bool);

    /// Writes demultiplexed transport-stream bytes into `buf`.
    ///
    /// Returns the number of bytes written; 0 means no new data was
    /// available, not end of stream.
    fn read_transport_stream(&mut self, buf: &mut [u8]) -> usize;
}
