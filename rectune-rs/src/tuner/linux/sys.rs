//! Subset of the Linux DVB uAPI (frontend and demux) used by this
//! backend, transcribed from `linux/dvb/frontend.h` and
//! `linux/dvb/demux.h`.

#![allow(dead_code)]

use nix::libc;
use nix::{ioctl_read, ioctl_write_ptr};

// fe_status
pub const FE_HAS_LOCK: u32 = 0x10;

// fe_caps
pub const FE_CAN_INVERSION_AUTO: u32 = 0x1;

// fe_type
pub const FE_QPSK: u32 = 0;
pub const FE_QAM: u32 = 1;
pub const FE_OFDM: u32 = 2;
pub const FE_ATSC: u32 = 3;

// fe_spectral_inversion
pub const INVERSION_OFF: u32 = 0;
pub const INVERSION_ON: u32 = 1;
pub const INVERSION_AUTO: u32 = 2;

// fe_modulation
pub const QPSK: u32 = 0;
pub const QAM_256: u32 = 5;
pub const VSB_8: u32 = 7;
pub const PSK_8: u32 = 9;

// fe_code_rate
pub const FEC_NONE: u32 = 0;
pub const FEC_1_2: u32 = 1;
pub const FEC_2_3: u32 = 2;
pub const FEC_3_4: u32 = 3;
pub const FEC_4_5: u32 = 4;
pub const FEC_5_6: u32 = 5;
pub const FEC_6_7: u32 = 6;
pub const FEC_7_8: u32 = 7;
pub const FEC_8_9: u32 = 8;
pub const FEC_AUTO: u32 = 9;
pub const FEC_3_5: u32 = 10;
pub const FEC_9_10: u32 = 11;

// fe_sec_voltage
pub const SEC_VOLTAGE_13: u32 = 0;
pub const SEC_VOLTAGE_18: u32 = 1;
pub const SEC_VOLTAGE_OFF: u32 = 2;

// fe_rolloff
pub const ROLLOFF_35: u32 = 0;
pub const ROLLOFF_20: u32 = 1;
pub const ROLLOFF_25: u32 = 2;
pub const ROLLOFF_AUTO: u32 = 3;

// fe_pilot
pub const PILOT_AUTO: u32 = 2;

// fe_delivery_system
pub const SYS_DVBS: u32 = 5;
pub const SYS_DVBS2: u32 = 6;
pub const SYS_ATSC: u32 = 11;

// dtv_property commands
pub const DTV_TUNE: u32 = 1;
pub const DTV_CLEAR: u32 = 2;
pub const DTV_FREQUENCY: u32 = 3;
pub const DTV_MODULATION: u32 = 4;
pub const DTV_INVERSION: u32 = 6;
pub const DTV_SYMBOL_RATE: u32 = 8;
pub const DTV_INNER_FEC: u32 = 9;
pub const DTV_VOLTAGE: u32 = 10;
pub const DTV_PILOT: u32 = 12;
pub const DTV_ROLLOFF: u32 = 13;
pub const DTV_DELIVERY_SYSTEM: u32 = 17;

// dmx_input
pub const DMX_IN_FRONTEND: u32 = 0;

// dmx_output
pub const DMX_OUT_TS_TAP: u32 = 2;

// dmx_ts_pes
pub const DMX_PES_AUDIO: u32 = 0;
pub const DMX_PES_VIDEO: u32 = 1;
pub const DMX_PES_PCR: u32 = 4;
pub const DMX_PES_OTHER: u32 = 20;

// dmx filter flags
pub const DMX_CHECK_CRC: u32 = 1;
pub const DMX_IMMEDIATE_START: u32 = 4;

pub const DMX_FILTER_SIZE: usize = 16;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DvbQpskParameters {
    pub symbol_rate: u32,
    pub fec_inner: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DvbQamParameters {
    pub symbol_rate: u32,
    pub fec_inner: u32,
    pub modulation: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DvbVsbParameters {
    pub modulation: u32,
}

/// Per-system parameter arm of `dvb_frontend_parameters`; the OFDM arm
/// is the largest and pads the union to the kernel's size.
#[repr(C)]
#[derive(Clone, Copy)]
pub union FrontendParametersUnion {
    pub qpsk: DvbQpskParameters,
    pub qam: DvbQamParameters,
    pub vsb: DvbVsbParameters,
    pub ofdm: [u32; 7],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DvbFrontendParameters {
    pub frequency: u32,
    pub inversion: u32,
    pub u: FrontendParametersUnion,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DvbFrontendEvent {
    pub status: u32,
    pub parameters: DvbFrontendParameters,
}

#[repr(C)]
pub struct DvbFrontendInfo {
    pub name: [libc::c_char; 128],
    pub fe_type: u32,
    pub frequency_min: u32,
    pub frequency_max: u32,
    pub frequency_stepsize: u32,
    pub frequency_tolerance: u32,
    pub symbol_rate_min: u32,
    pub symbol_rate_max: u32,
    pub symbol_rate_tolerance: u32,
    pub notifier_delay: u32,
    pub caps: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DtvPropertyBuffer {
    pub data: [u8; 32],
    pub len: u32,
    pub reserved1: [u32; 3],
    pub reserved2: *mut libc::c_void,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub union DtvPropertyData {
    pub data: u32,
    pub buffer: DtvPropertyBuffer,
}

/// One `struct dtv_property`; packed per the kernel header.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DtvProperty {
    pub cmd: u32,
    pub reserved: [u32; 3],
    pub u: DtvPropertyData,
    pub result: libc::c_int,
}

#[repr(C)]
pub struct DtvProperties {
    pub num: u32,
    pub props: *mut DtvProperty,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DmxFilter {
    pub filter: [u8; DMX_FILTER_SIZE],
    pub mask: [u8; DMX_FILTER_SIZE],
    pub mode: [u8; DMX_FILTER_SIZE],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DmxSctFilterParams {
    pub pid: u16,
    pub filter: DmxFilter,
    pub timeout: u32,
    pub flags: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DmxPesFilterParams {
    pub pid: u16,
    pub input: u32,
    pub output: u32,
    pub pes_type: u32,
    pub flags: u32,
}

ioctl_read!(fe_get_info, b'o', 61, DvbFrontendInfo);
ioctl_write_ptr!(fe_set_frontend, b'o', 76, DvbFrontendParameters);
ioctl_read!(fe_get_event, b'o', 78, DvbFrontendEvent);
ioctl_write_ptr!(fe_set_property, b'o', 82, DtvProperties);
ioctl_write_ptr!(dmx_set_filter, b'o', 43, DmxSctFilterParams);
ioctl_write_ptr!(dmx_set_pes_filter, b'o', 44, DmxPesFilterParams);
