//! PID filter bookkeeping.

use std::collections::HashMap;

use log::warn;

use crate::tuner::TunerDevice;

/// Largest valid packet identifier (13 bits).
pub const PID_MAX: u16 = 0x1fff;

/// Content class of a PID filter.
///
/// The discriminants are a stable wire contract with the device layer;
/// do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterType {
    /// SI tables and anything that is not an elementary stream.
    Other = 0,
    /// Audio elementary stream.
    Audio = 1,
    /// Video elementary stream.
    Video = 2,
    /// Program clock reference.
    Pcr = 3,
}

impl From<FilterType> for u8 {
    fn from(value: FilterType) -> Self {
        value as u8
    }
}

/// The set of PID filters currently active on a device.
///
/// A device exposes at most one filter per PID, so the set is keyed by
/// PID alone; re-adding a PID overwrites its recorded content class. The
/// set is unordered and carries no further semantics.
#[derive(Debug, Default)]
pub struct PidFilterSet {
    filters: HashMap<u16, FilterType>,
}

impl PidFilterSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a filter for `pid` on the device and records it.
    ///
    /// Returns `false` without touching the device when `pid` exceeds
    /// [`PID_MAX`].
    pub fn add(&mut self, device: &mut dyn TunerDevice, pid: u16, filter_type: FilterType) -> bool {
        if pid > PID_MAX {
            warn!("rejecting PID filter 0x{pid:04x}: out of range");
            return false;
        }
        device.add_pid_filter(pid, filter_type);
        self.filters.insert(pid, filter_type);
        true
    }

    /// Closes every filter on the device and empties the set.
    pub fn clear_all(&mut self, device: &mut dyn TunerDevice) {
        device.close_all_filters();
        self.filters.clear();
    }

    /// Whether a filter for `pid` is active.
    pub fn contains(&self, pid: u16) -> bool {
        self.filters.contains_key(&pid)
    }

    /// Recorded content class of the filter for `pid`, if any.
    pub fn filter_type(&self, pid: u16) -> Option<FilterType> {
        self.filters.get(&pid).copied()
    }

    /// Number of active filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether no filter is active.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
