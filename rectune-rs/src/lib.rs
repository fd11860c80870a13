//! rectune library - ATSC / DVB-S/S2 tuner control
//!
//! This library drives a digital TV tuner device: it selects a frequency and
//! modulation, manages the set of PID filters delivered to the host, and
//! streams demultiplexed MPEG transport packets to a consumer.

pub mod channels;
pub mod ts_analyzer;
pub mod tuner;

// Re-export commonly used types
pub use channels::{DeliverySystem, DvbTuneParams, ScanFileError, TuneRequest};
pub use tuner::{DeviceConfig, FilterType, PidFilterSet, TunerController, TunerDevice, TunerError};
