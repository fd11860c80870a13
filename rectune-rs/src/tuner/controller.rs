//! The tuner controller state machine.
//!
//! A controller owns one open device and moves it between idle and
//! streaming. Tuning decides between a full frontend re-tune and a cheap
//! filter-only reconfiguration: reopening PID filters is cheap, re-locking
//! the RF front end is not, and channels that share a frequency (common on
//! cable and satellite multiplexes) must not pay the full tune cost when
//! only the filter list changes.

use std::sync::{Mutex, MutexGuard};

use log::{error, warn};

use crate::channels::TuneRequest;
use crate::tuner::{
    atsc_tune_timeout, DeviceConfig, FilterType, PidFilterSet, TunerDevice, TunerError,
    DVB_TUNE_TIMEOUT, PID_ATSC_SI_BASE, PID_DVB_SDT, PID_MAX, PID_PAT,
};

struct ControllerState {
    device: Option<Box<dyn TunerDevice + Send>>,
    streaming: bool,
    /// (frequency, modulation) of the channel the frontend is locked to.
    tuned: Option<(u32, String)>,
    filters: PidFilterSet,
}

/// Drives one tuner device through the tune / stop / read lifecycle.
///
/// Every public operation serializes on an internal mutex; at most one is
/// in flight at a time and none is reentrant with respect to the others. A
/// `stop_tune` or `close` issued from another thread takes effect once the
/// in-flight operation returns.
pub struct TunerController {
    state: Mutex<ControllerState>,
}

impl TunerController {
    /// Acquires the first available tuner device and wraps it in a
    /// controller.
    pub fn open_first_available(config: &DeviceConfig) -> Result<Self, TunerError> {
        let device = crate::tuner::open_first_available(config)?;
        Ok(Self::with_device(device))
    }

    /// Wraps an already-open device. Useful for replay sources and tests.
    pub fn with_device(device: Box<dyn TunerDevice + Send>) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                device: Some(device),
                streaming: false,
                tuned: None,
                filters: PidFilterSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().expect("tuner controller lock poisoned")
    }

    /// Tunes to the requested channel.
    ///
    /// If the request matches the currently locked (frequency, modulation)
    /// of an ATSC channel, only the baseline PID filters are reopened; the
    /// frontend keeps its lock. Otherwise the frontend is re-tuned, which
    /// blocks for up to the per-modulation lock timeout. On failure the
    /// controller stays idle with no filters and no recorded channel.
    pub fn tune(&self, request: &TuneRequest) -> bool {
        let mut state = self.lock();
        let ControllerState {
            device,
            streaming,
            tuned,
            filters,
        } = &mut *state;
        let Some(device) = device.as_deref_mut() else {
            error!("there's no available device");
            return false;
        };

        if *streaming {
            filters.clear_all(device);
            *streaming = false;
        }

        match request {
            TuneRequest::Atsc {
                frequency,
                modulation,
                ..
            } => {
                let same_channel = tuned
                    .as_ref()
                    .is_some_and(|(f, m)| f == frequency && m == modulation);
                if same_channel {
                    // Same frequency: reopening the PID filters is all that
                    // is needed, the frontend keeps its lock.
                    filters.add(device, PID_PAT, FilterType::Other);
                    filters.add(device, PID_ATSC_SI_BASE, FilterType::Other);
                    *streaming = true;
                    return true;
                }

                // The frontend is about to be retuned; whatever was
                // recorded no longer describes it.
                *tuned = None;
                if device.tune_atsc(*frequency, modulation, atsc_tune_timeout(modulation)) {
                    filters.add(device, PID_PAT, FilterType::Other);
                    filters.add(device, PID_ATSC_SI_BASE, FilterType::Other);
                    *tuned = Some((*frequency, modulation.clone()));
                    *streaming = true;
                    true
                } else {
                    false
                }
            }
            TuneRequest::Dvb(params) => {
                // DVB always re-tunes; the parameter set is not checked for
                // equality against the previous tune.
                *tuned = None;
                if device.tune_dvb(params, DVB_TUNE_TIMEOUT) {
                    filters.add(device, PID_PAT, FilterType::Other);
                    filters.add(device, PID_DVB_SDT, FilterType::Other);
                    *tuned = Some((params.frequency, params.modulation.clone()));
                    *streaming = true;
                    true
                } else {
                    false
                }
            }
            TuneRequest::File { path, .. } => {
                warn!("file replay is not a tuner operation: {}", path.display());
                false
            }
        }
    }

    /// Opens an additional PID filter. Valid once a device is open; PIDs
    /// above [`PID_MAX`] are rejected without touching the device.
    pub fn add_pid_filter(&self, pid: u16, filter_type: FilterType) -> bool {
        let mut state = self.lock();
        let ControllerState {
            device, filters, ..
        } = &mut *state;
        let Some(device) = device.as_deref_mut() else {
            error!("there's no available device");
            return false;
        };
        filters.add(device, pid, filter_type)
    }

    /// Opens a section filter matching `table_id` on `pid`.
    pub fn add_section_filter(&self, pid: u16, table_id: u8) -> bool {
        let mut state = self.lock();
        let Some(device) = state.device.as_deref_mut() else {
            error!("there's no available device");
            return false;
        };
        if pid > PID_MAX {
            warn!("rejecting section filter on PID 0x{pid:04x}: out of range");
            return false;
        }
        device.add_section_filter(pid, table_id);
        true
    }

    /// Stops the current tune.
    ///
    /// All filters are released and the device is reset so it can accept
    /// another tune request. Safe to call when idle or closed.
    pub fn stop_tune(&self) {
        let mut state = self.lock();
        let ControllerState {
            device,
            streaming,
            tuned,
            filters,
        } = &mut *state;
        if let Some(device) = device.as_deref_mut() {
            if *streaming {
                filters.clear_all(device);
            }
            device.stop_tune();
        }
        *streaming = false;
        *tuned = None;
    }

    /// Reads demultiplexed transport-stream bytes into `buf`.
    ///
    /// Returns 0 when no new data has arrived since the last call, or when
    /// the controller is not streaming; the caller must treat 0 as "try
    /// again", not end-of-stream.
    pub fn read_stream(&self, buf: &mut [u8]) -> usize {
        let mut state = self.lock();
        if !state.streaming {
            return 0;
        }
        match state.device.as_deref_mut() {
            Some(device) => device.read_transport_stream(buf),
            None => 0,
        }
    }

    /// Forwards the pending-tune hint to the device so an in-flight lock
    /// wait can return early.
    pub fn set_has_pending_tune(&self, pending: bool) {
        let mut state = self.lock();
        if let Some(device) = state.device.as_deref_mut() {
            device.set_has_pending_tune(pending);
        }
    }

    /// Releases all filters and the device. Idempotent; every operation
    /// except `close` itself fails or no-ops afterwards.
    pub fn close(&self) {
        let mut state = self.lock();
        let ControllerState {
            device,
            streaming,
            tuned,
            filters,
        } = &mut *state;
        if let Some(mut device) = device.take() {
            filters.clear_all(device.as_mut());
        }
        *streaming = false;
        *tuned = None;
    }

    /// Whether the controller currently delivers a stream.
    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    /// Whether a device is attached.
    pub fn is_device_open(&self) -> bool {
        self.lock().device.is_some()
    }
}

impl Drop for TunerController {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::channels::{DeliverySystem, DvbTuneParams};
    use crate::tuner::{QAM_TUNE_TIMEOUT, VSB_TUNE_TIMEOUT};

    #[derive(Debug, PartialEq)]
    enum Call {
        TuneAtsc(u32, String, Duration),
        TuneDvb(u32),
        AddPid(u16, FilterType),
        AddSection(u16, u8),
        CloseAll,
        StopTune,
        Pending(bool),
        Read,
    }

    #[derive(Clone, Default)]
    struct CallLog(Arc<Mutex<Vec<Call>>>);

    impl CallLog {
        fn push(&self, call: Call) {
            self.0.lock().unwrap().push(call);
        }

        fn take(&self) -> Vec<Call> {
            std::mem::take(&mut self.0.lock().unwrap())
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
        }
    }

    struct MockDevice {
        log: CallLog,
        tune_ok: Arc<AtomicBool>,
    }

    impl MockDevice {
        fn new(log: CallLog) -> Self {
            Self {
                log,
                tune_ok: Arc::new(AtomicBool::new(true)),
            }
        }
    }

    impl TunerDevice for MockDevice {
        fn tune_atsc(&mut self, frequency: u32, modulation: &str, timeout: Duration) -> bool {
            self.log
                .push(Call::TuneAtsc(frequency, modulation.to_owned(), timeout));
            self.tune_ok.load(Ordering::SeqCst)
        }

        fn tune_dvb(&mut self, params: &DvbTuneParams, _timeout: Duration) -> bool {
            self.log.push(Call::TuneDvb(params.frequency));
            self.tune_ok.load(Ordering::SeqCst)
        }

        fn add_pid_filter(&mut self, pid: u16, filter_type: FilterType) {
            self.log.push(Call::AddPid(pid, filter_type));
        }

        fn add_section_filter(&mut self, pid: u16, table_id: u8) {
            self.log.push(Call::AddSection(pid, table_id));
        }

        fn close_all_filters(&mut self) {
            self.log.push(Call::CloseAll);
        }

        fn stop_tune(&mut self) {
            self.log.push(Call::StopTune);
        }

        fn set_has_pending_tune(&mut self, pending: bool) {
            self.log.push(Call::Pending(pending));
        }

        fn read_transport_stream(&mut self, buf: &mut [u8]) -> usize {
            self.log.push(Call::Read);
            buf.len().min(188)
        }
    }

    fn controller(log: &CallLog) -> TunerController {
        TunerController::with_device(Box::new(MockDevice::new(log.clone())))
    }

    fn atsc(frequency: u32, modulation: &str) -> TuneRequest {
        TuneRequest::Atsc {
            frequency,
            modulation: modulation.to_owned(),
            rf_number: None,
        }
    }

    fn dvb(frequency: u32) -> TuneRequest {
        TuneRequest::Dvb(DvbTuneParams {
            system: DeliverySystem::DvbS2,
            frequency,
            polarization: "V".to_owned(),
            symbol_rate: 22500,
            fec: "3/4".to_owned(),
            rolloff: 0.35,
            modulation: "QPSK".to_owned(),
        })
    }

    fn is_tune(call: &Call) -> bool {
        matches!(call, Call::TuneAtsc(..) | Call::TuneDvb(..))
    }

    #[test]
    fn first_tune_takes_the_slow_path_and_adds_baseline_filters() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        assert!(ctl.is_streaming());
        assert_eq!(
            log.take(),
            vec![
                Call::TuneAtsc(609_000_000, "8VSB".to_owned(), VSB_TUNE_TIMEOUT),
                Call::AddPid(PID_PAT, FilterType::Other),
                Call::AddPid(PID_ATSC_SI_BASE, FilterType::Other),
            ]
        );
    }

    #[test]
    fn retuning_the_same_channel_skips_the_frontend() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        log.take();

        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        assert_eq!(
            log.take(),
            vec![
                Call::CloseAll,
                Call::AddPid(PID_PAT, FilterType::Other),
                Call::AddPid(PID_ATSC_SI_BASE, FilterType::Other),
            ]
        );
    }

    #[test]
    fn changing_frequency_clears_filters_and_retunes_once() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        log.take();

        assert!(ctl.tune(&atsc(615_000_000, "8VSB")));
        let calls = log.take();
        assert_eq!(calls[0], Call::CloseAll);
        assert_eq!(calls.iter().filter(|c| is_tune(c)).count(), 1);
    }

    #[test]
    fn changing_modulation_retunes_with_the_long_timeout() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        log.take();

        assert!(ctl.tune(&atsc(609_000_000, "QAM256")));
        let calls = log.take();
        assert!(calls.contains(&Call::TuneAtsc(
            609_000_000,
            "QAM256".to_owned(),
            QAM_TUNE_TIMEOUT
        )));
    }

    #[test]
    fn dvb_always_takes_the_slow_path() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&dvb(1_180_000)));
        assert!(ctl.tune(&dvb(1_180_000)));
        assert_eq!(log.count(is_tune), 2);
    }

    #[test]
    fn dvb_baseline_filters_are_pat_and_sdt() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&dvb(1_180_000)));
        let calls = log.take();
        assert!(calls.contains(&Call::AddPid(PID_PAT, FilterType::Other)));
        assert!(calls.contains(&Call::AddPid(PID_DVB_SDT, FilterType::Other)));
    }

    #[test]
    fn failed_tune_leaves_the_controller_idle() {
        let log = CallLog::default();
        let device = MockDevice::new(log.clone());
        device.tune_ok.store(false, Ordering::SeqCst);
        let ctl = TunerController::with_device(Box::new(device));
        assert!(!ctl.tune(&atsc(609_000_000, "8VSB")));
        assert!(!ctl.is_streaming());
        assert_eq!(log.count(|c| matches!(c, Call::AddPid(..))), 0);
    }

    #[test]
    fn failed_tune_records_no_stale_channel() {
        let log = CallLog::default();
        let device = MockDevice::new(log.clone());
        let tune_ok = device.tune_ok.clone();
        let ctl = TunerController::with_device(Box::new(device));
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));

        // A failed retune to another channel retargets the frontend, so
        // coming back to the first channel must not fast-path.
        tune_ok.store(false, Ordering::SeqCst);
        assert!(!ctl.tune(&atsc(615_000_000, "8VSB")));
        tune_ok.store(true, Ordering::SeqCst);
        log.take();

        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        assert_eq!(log.count(is_tune), 1);
    }

    #[test]
    fn file_requests_are_rejected() {
        let log = CallLog::default();
        let ctl = controller(&log);
        let request = TuneRequest::File {
            frequency: 0,
            path: "capture.ts".into(),
        };
        assert!(!ctl.tune(&request));
        assert!(log.take().is_empty());
    }

    #[test]
    fn pid_filter_bounds() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        log.take();

        assert!(ctl.add_pid_filter(0x1fff, FilterType::Video));
        assert!(!ctl.add_pid_filter(0x2000, FilterType::Other));
        assert_eq!(log.take(), vec![Call::AddPid(0x1fff, FilterType::Video)]);
    }

    #[test]
    fn section_filter_reaches_the_device() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.add_section_filter(PID_DVB_SDT, 0x42));
        assert!(!ctl.add_section_filter(0x2000, 0x42));
        assert_eq!(log.take(), vec![Call::AddSection(PID_DVB_SDT, 0x42)]);
    }

    #[test]
    fn stop_tune_then_read_performs_no_device_read() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        ctl.stop_tune();
        log.take();

        let mut buf = [0u8; 188];
        assert_eq!(ctl.read_stream(&mut buf), 0);
        assert!(log.take().is_empty());
    }

    #[test]
    fn read_stream_while_streaming_reads_the_device() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        log.take();

        let mut buf = [0u8; 512];
        assert_eq!(ctl.read_stream(&mut buf), 188);
        assert_eq!(log.take(), vec![Call::Read]);
    }

    #[test]
    fn stop_tune_clears_filters_only_while_streaming() {
        let log = CallLog::default();
        let ctl = controller(&log);
        ctl.stop_tune();
        assert_eq!(log.take(), vec![Call::StopTune]);

        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        log.take();
        ctl.stop_tune();
        assert_eq!(log.take(), vec![Call::CloseAll, Call::StopTune]);
    }

    #[test]
    fn pending_tune_hint_is_passed_through() {
        let log = CallLog::default();
        let ctl = controller(&log);
        ctl.set_has_pending_tune(true);
        ctl.set_has_pending_tune(false);
        assert_eq!(log.take(), vec![Call::Pending(true), Call::Pending(false)]);
    }

    #[test]
    fn close_is_idempotent_and_disables_everything() {
        let log = CallLog::default();
        let ctl = controller(&log);
        assert!(ctl.tune(&atsc(609_000_000, "8VSB")));
        ctl.close();
        ctl.close();
        assert!(!ctl.is_device_open());
        log.take();

        let mut buf = [0u8; 188];
        assert!(!ctl.tune(&atsc(609_000_000, "8VSB")));
        assert!(!ctl.add_pid_filter(0x0100, FilterType::Other));
        assert_eq!(ctl.read_stream(&mut buf), 0);
        ctl.stop_tune();
        assert!(log.take().is_empty());
    }
}
