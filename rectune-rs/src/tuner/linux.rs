//! Linux DVB character-device backend.
//!
//! Talks to `/dev/dvb/adapterN` directly: the frontend node for tuning,
//! one demux node per PID or section filter, and the DVR node for the
//! demultiplexed transport stream. The ioctl surface is declared locally
//! in [`sys`]; only the handful of calls this backend issues is covered.

use std::collections::HashMap;
use std::ffi::CStr;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use nix::libc;

use crate::channels::{DvbTuneParams, MODULATION_8PSK, MODULATION_8VSB, MODULATION_QAM256, MODULATION_QPSK};
use crate::tuner::{DeviceConfig, FilterType, TunerDevice, TunerError};

mod sys;

/// How long one frontend event poll may block.
const FE_POLL_TIMEOUT_MS: i32 = 100;
/// How many consecutive lock reports are required before the frontend is
/// trusted.
const FE_CONSECUTIVE_LOCK_SUCCESS_COUNT: u32 = 1;
/// How long one DVR poll may block.
const DVR_POLL_TIMEOUT_MS: i32 = 100;
/// Settle time after stopping a tune.
const TUNE_STOP_DELAY: Duration = Duration::from_millis(100);
/// Highest adapter index probed when no adapter is configured.
const MAX_ADAPTERS: u32 = 8;

// Universal Ku-band LNB local oscillator frequencies, in kHz.
const SLOF: u32 = 11_700 * 1000;
const LOF1: u32 = 9_750 * 1000;
const LOF2: u32 = 10_600 * 1000;

/// Acquires the first usable DVB adapter.
pub fn open_first_available(
    config: &DeviceConfig,
) -> Result<Box<dyn TunerDevice + Send>, TunerError> {
    let adapters: Vec<u32> = match config.adapter {
        Some(adapter) => vec![adapter],
        None => (0..MAX_ADAPTERS).collect(),
    };
    for adapter in adapters {
        match Device::open(adapter, config.frontend) {
            Ok(device) => return Ok(Box::new(device)),
            Err(err) => debug!("adapter{adapter}: {err}"),
        }
    }
    Err(TunerError::NoDevice)
}

/// One open DVB adapter.
///
/// Every PID filter holds its own demux fd; dropping the fd stops the
/// filter. The DVR fd is opened lazily once the frontend has lock and is
/// closed whenever the filter set is torn down, so no buffered packets
/// from the previous channel leak into the next one.
pub struct Device {
    frontend: File,
    demux_path: PathBuf,
    dvr_path: PathBuf,
    dvr: Option<File>,
    pid_filters: HashMap<u16, File>,
    section_filters: Vec<File>,
    fe_has_lock: bool,
    has_pending_tune: bool,
}

impl Device {
    fn open(adapter: u32, frontend: u32) -> std::io::Result<Self> {
        let base = PathBuf::from(format!("/dev/dvb/adapter{adapter}"));
        let fe = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(base.join(format!("frontend{frontend}")))?;

        let device = Self {
            frontend: fe,
            demux_path: base.join("demux0"),
            dvr_path: base.join("dvr0"),
            dvr: None,
            pid_filters: HashMap::new(),
            section_filters: Vec::new(),
            fe_has_lock: false,
            has_pending_tune: false,
        };

        if let Ok(fe_info) = device.frontend_info() {
            let name = unsafe { CStr::from_ptr(fe_info.name.as_ptr()) };
            let fe_type = match fe_info.fe_type {
                sys::FE_QPSK => "DVB-S",
                sys::FE_QAM => "DVB-C",
                sys::FE_OFDM => "DVB-T",
                sys::FE_ATSC => "ATSC",
                _ => "unknown",
            };
            info!(
                "using frontend {:?} (type {fe_type}) on adapter{adapter}",
                name.to_string_lossy()
            );
        }
        Ok(device)
    }

    fn frontend_info(&self) -> nix::Result<sys::DvbFrontendInfo> {
        let mut fe_info: sys::DvbFrontendInfo = unsafe { std::mem::zeroed() };
        unsafe { sys::fe_get_info(self.frontend.as_raw_fd(), &mut fe_info) }?;
        Ok(fe_info)
    }

    fn open_demux(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.demux_path)
    }

    fn open_dvr(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.dvr_path)
    }

    /// Closes the DVR and every filter; the frontend lock state is left
    /// to the caller.
    fn release_stream(&mut self) {
        self.dvr = None;
        self.pid_filters.clear();
        self.section_filters.clear();
    }

    fn reset_except_fe(&mut self) {
        self.fe_has_lock = false;
        self.release_stream();
    }

    /// One bounded wait for a frontend event reporting lock.
    fn is_fe_locked(&self) -> bool {
        let mut poll_fd = libc::pollfd {
            fd: self.frontend.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut poll_fd, 1, FE_POLL_TIMEOUT_MS) };
        if ready > 0 && poll_fd.revents & libc::POLLIN != 0 {
            let mut event: sys::DvbFrontendEvent = unsafe { std::mem::zeroed() };
            if unsafe { sys::fe_get_event(self.frontend.as_raw_fd(), &mut event) }.is_ok() {
                return event.status & sys::FE_HAS_LOCK != 0;
            }
        }
        false
    }

    /// Waits for a stable frontend lock, then opens the DVR.
    fn wait_for_lock(&mut self, timeout: Duration) -> bool {
        let mut lock_success_count = 0;
        let started = Instant::now();
        while started.elapsed() < timeout {
            if self.has_pending_tune {
                // The frontend command has already been issued and a queued
                // tune will override it; report success and bail out early.
                self.fe_has_lock = true;
                return true;
            }
            if self.is_fe_locked() {
                lock_success_count += 1;
            } else {
                lock_success_count = 0;
            }
            debug!("lock status: {}", lock_success_count > 0);
            if lock_success_count >= FE_CONSECUTIVE_LOCK_SUCCESS_COUNT {
                self.fe_has_lock = true;
                match self.open_dvr() {
                    Ok(dvr) => self.dvr = Some(dvr),
                    Err(err) => warn!("can't open DVR device: {err}"),
                }
                return true;
            }
        }
        false
    }

    /// Discards stale frontend events left over from a previous tune.
    fn drain_frontend_events(&self) {
        let mut event: sys::DvbFrontendEvent = unsafe { std::mem::zeroed() };
        while unsafe { sys::fe_get_event(self.frontend.as_raw_fd(), &mut event) }.is_ok() {}
    }

    fn set_properties(&self, props: &mut [sys::DtvProperty]) -> nix::Result<()> {
        let cmd_seq = sys::DtvProperties {
            num: props.len() as u32,
            props: props.as_mut_ptr(),
        };
        unsafe { sys::fe_set_property(self.frontend.as_raw_fd(), &cmd_seq) }?;
        Ok(())
    }

    fn clear_frontend(&self) -> nix::Result<()> {
        self.set_properties(&mut [dtv_property(sys::DTV_CLEAR, 0)])
    }
}

fn dtv_property(cmd: u32, data: u32) -> sys::DtvProperty {
    sys::DtvProperty {
        cmd,
        reserved: [0; 3],
        u: sys::DtvPropertyData { data },
        result: 0,
    }
}

/// Converts a downlink frequency to the intermediate frequency after a
/// universal LNB, in kHz.
fn lnb_intermediate_frequency(frequency: u32) -> u32 {
    if frequency >= SLOF {
        frequency - LOF2
    } else if frequency < LOF1 {
        LOF1 - frequency
    } else {
        frequency - LOF1
    }
}

fn code_rate(fec: &str) -> u32 {
    match fec {
        "1/2" => sys::FEC_1_2,
        "2/3" => sys::FEC_2_3,
        "3/4" => sys::FEC_3_4,
        "4/5" => sys::FEC_4_5,
        "5/6" => sys::FEC_5_6,
        "6/7" => sys::FEC_6_7,
        "7/8" => sys::FEC_7_8,
        "8/9" => sys::FEC_8_9,
        "3/5" => sys::FEC_3_5,
        "9/10" => sys::FEC_9_10,
        "AUTO" => sys::FEC_AUTO,
        other => {
            warn!("unrecognized FEC {other:?}, using none");
            sys::FEC_NONE
        }
    }
}

fn rolloff_value(rolloff: f64) -> u32 {
    if (rolloff - 0.35).abs() < f64::EPSILON {
        sys::ROLLOFF_35
    } else if (rolloff - 0.25).abs() < f64::EPSILON {
        sys::ROLLOFF_25
    } else if (rolloff - 0.20).abs() < f64::EPSILON {
        sys::ROLLOFF_20
    } else {
        sys::ROLLOFF_AUTO
    }
}

impl TunerDevice for Device {
    fn tune_atsc(&mut self, frequency: u32, modulation: &str, timeout: Duration) -> bool {
        self.reset_except_fe();

        let modulation = match modulation {
            MODULATION_8VSB => sys::VSB_8,
            MODULATION_QAM256 => sys::QAM_256,
            other => {
                error!("unrecognized ATSC modulation {other:?}");
                return false;
            }
        };
        if self.has_pending_tune {
            return false;
        }

        let mut inversion = sys::INVERSION_AUTO;
        if let Ok(fe_info) = self.frontend_info() {
            if fe_info.caps & sys::FE_CAN_INVERSION_AUTO == 0 {
                inversion = sys::INVERSION_OFF;
            }
        }

        let params = sys::DvbFrontendParameters {
            frequency,
            inversion,
            u: sys::FrontendParametersUnion {
                vsb: sys::DvbVsbParameters { modulation },
            },
        };
        if let Err(err) = unsafe { sys::fe_set_frontend(self.frontend.as_raw_fd(), &params) } {
            warn!("can't set frontend: {err}");
            return false;
        }

        self.wait_for_lock(timeout)
    }

    fn tune_dvb(&mut self, params: &DvbTuneParams, timeout: Duration) -> bool {
        self.reset_except_fe();
        if self.has_pending_tune {
            return false;
        }
        if let Err(err) = self.clear_frontend() {
            warn!("DTV_CLEAR failed: {err}");
        }

        let if_frequency = lnb_intermediate_frequency(params.frequency);
        debug!("tuning DVB, IF {if_frequency} kHz");

        let vertical = params
            .polarization
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            == Some('V');
        let voltage = if vertical {
            sys::SEC_VOLTAGE_13
        } else {
            sys::SEC_VOLTAGE_18
        };

        // Ordinal 2 is DVB-S; every other ordinal in the DVB range means S2.
        let delivery = if params.system.ordinal() == 2 {
            sys::SYS_DVBS
        } else {
            sys::SYS_DVBS2
        };

        let modulation = match params.modulation.as_str() {
            MODULATION_QPSK => sys::QPSK,
            MODULATION_8PSK => sys::PSK_8,
            other => {
                warn!("unrecognized DVB modulation {other:?}, assuming QPSK");
                sys::QPSK
            }
        };

        self.drain_frontend_events();

        let mut props = [
            dtv_property(sys::DTV_DELIVERY_SYSTEM, delivery),
            dtv_property(sys::DTV_FREQUENCY, if_frequency),
            dtv_property(sys::DTV_MODULATION, modulation),
            dtv_property(sys::DTV_SYMBOL_RATE, params.symbol_rate),
            dtv_property(sys::DTV_INNER_FEC, code_rate(&params.fec)),
            dtv_property(sys::DTV_VOLTAGE, voltage),
            dtv_property(sys::DTV_INVERSION, sys::INVERSION_AUTO),
            dtv_property(sys::DTV_ROLLOFF, rolloff_value(params.rolloff)),
            dtv_property(sys::DTV_PILOT, sys::PILOT_AUTO),
            dtv_property(sys::DTV_TUNE, 0),
        ];
        if let Err(err) = self.set_properties(&mut props) {
            warn!("FE_SET_PROPERTY failed: {err}");
            return false;
        }

        self.wait_for_lock(timeout)
    }

    fn add_pid_filter(&mut self, pid: u16, filter_type: FilterType) {
        if self.has_pending_tune {
            return;
        }
        let demux = match self.open_demux() {
            Ok(demux) => demux,
            Err(err) => {
                warn!("can't open demux device: {err}");
                return;
            }
        };

        let params = sys::DmxPesFilterParams {
            pid,
            input: sys::DMX_IN_FRONTEND,
            output: sys::DMX_OUT_TS_TAP,
            pes_type: match filter_type {
                FilterType::Audio => sys::DMX_PES_AUDIO,
                FilterType::Video => sys::DMX_PES_VIDEO,
                FilterType::Pcr => sys::DMX_PES_PCR,
                FilterType::Other => sys::DMX_PES_OTHER,
            },
            flags: sys::DMX_CHECK_CRC | sys::DMX_IMMEDIATE_START,
        };
        if let Err(err) = unsafe { sys::dmx_set_pes_filter(demux.as_raw_fd(), &params) } {
            warn!("DMX_SET_PES_FILTER failed for PID 0x{pid:04x}: {err}");
            return;
        }

        // Replacing an existing entry drops its fd, which stops the old
        // filter.
        self.pid_filters.insert(pid, demux);
    }

    fn add_section_filter(&mut self, pid: u16, table_id: u8) {
        if self.has_pending_tune {
            return;
        }
        let demux = match self.open_demux() {
            Ok(demux) => demux,
            Err(err) => {
                warn!("can't open demux device: {err}");
                return;
            }
        };

        let mut params: sys::DmxSctFilterParams = unsafe { std::mem::zeroed() };
        params.pid = pid;
        if table_id > 0 {
            params.filter.filter[0] = table_id;
            params.filter.mask[0] = 0xff;
        }
        params.timeout = 0;
        params.flags = sys::DMX_CHECK_CRC | sys::DMX_IMMEDIATE_START;

        if let Err(err) = unsafe { sys::dmx_set_filter(demux.as_raw_fd(), &params) } {
            warn!("DMX_SET_FILTER failed for PID 0x{pid:04x}: {err}");
            return;
        }
        self.section_filters.push(demux);
    }

    fn close_all_filters(&mut self) {
        // The DVR goes too, so no buffered packets from the previous
        // channel are delivered after the filters change.
        self.release_stream();
    }

    fn stop_tune(&mut self) {
        self.reset_except_fe();
        sleep(TUNE_STOP_DELAY);
    }

    fn set_has_pending_tune(&mut self, pending: bool) {
        self.has_pending_tune = pending;
    }

    fn read_transport_stream(&mut self, buf: &mut [u8]) -> usize {
        if !self.fe_has_lock || buf.is_empty() {
            return 0;
        }
        if self.dvr.is_none() {
            match self.open_dvr() {
                Ok(dvr) => self.dvr = Some(dvr),
                Err(err) => {
                    warn!("can't open DVR device: {err}");
                    return 0;
                }
            }
        }

        let fd = match &self.dvr {
            Some(dvr) => dvr.as_raw_fd(),
            None => return 0,
        };
        let mut poll_fd = libc::pollfd {
            fd,
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut poll_fd, 1, DVR_POLL_TIMEOUT_MS) };
        if ready == 0 {
            return 0;
        }
        if ready < 0 || poll_fd.revents & libc::POLLERR != 0 {
            warn!("can't read DVR, reopening");
            self.dvr = None;
            return 0;
        }

        match self.dvr.as_mut().map(|dvr| dvr.read(buf)) {
            Some(Ok(read)) => read,
            Some(Err(err)) if err.kind() == ErrorKind::WouldBlock => 0,
            Some(Err(err)) => {
                warn!("DVR read failed: {err}");
                0
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lnb_frequency_conversion() {
        // High band: above the switch frequency, offset by the high LO.
        assert_eq!(lnb_intermediate_frequency(12_034_000), 1_434_000);
        // Low band.
        assert_eq!(lnb_intermediate_frequency(11_000_000), 1_250_000);
        // Already below the low LO (an IF was given).
        assert_eq!(lnb_intermediate_frequency(1_180_000), 8_570_000);
    }

    #[test]
    fn code_rate_mapping() {
        assert_eq!(code_rate("3/4"), sys::FEC_3_4);
        assert_eq!(code_rate("9/10"), sys::FEC_9_10);
        assert_eq!(code_rate("bogus"), sys::FEC_NONE);
    }

    #[test]
    fn rolloff_mapping() {
        assert_eq!(rolloff_value(0.35), sys::ROLLOFF_35);
        assert_eq!(rolloff_value(0.2), sys::ROLLOFF_20);
        assert_eq!(rolloff_value(0.123), sys::ROLLOFF_AUTO);
    }
}
