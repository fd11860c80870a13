//! Channel tuning parameters and the plain-text scan-file parser.
//!
//! A scan file is a line-oriented list of channels to try. Each non-empty,
//! non-comment line describes one channel:
//!
//! ```text
//! # ATSC: "A <frequency> <modulation> [<rf-channel-number>]"
//! A 609000000 8VSB 36
//! # DVB-S/S2: "<S|S2> <frequency> <polarization> <symbol-rate> <fec> <rolloff> <modulation>"
//! S2 1180000 V 22500 3/4 0.2 QPSK
//! ```
//!
//! Parsing a scan file yields a list of [`TuneRequest`] values that are fed
//! to the tuner controller one by one.

use std::io::BufRead;
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

/// 8VSB, the ATSC terrestrial modulation.
pub const MODULATION_8VSB: &str = "8VSB";
/// QAM256, the common ATSC cable modulation.
pub const MODULATION_QAM256: &str = "QAM256";
/// QPSK, used by DVB-S.
pub const MODULATION_QPSK: &str = "QPSK";
/// 8PSK, used by DVB-S2.
pub const MODULATION_8PSK: &str = "8PSK";

/// Physical delivery system of a channel.
///
/// The ordinal values are a wire contract with the device layer (the DVB
/// tuning call receives the ordinal); do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeliverySystem {
    /// Replay from a transport-stream file.
    File = 0,
    /// ATSC terrestrial or cable.
    Atsc = 1,
    /// DVB-S satellite.
    DvbS = 2,
    /// DVB-S2 satellite.
    DvbS2 = 3,
}

impl DeliverySystem {
    /// Stable ordinal passed to the device layer.
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

/// Full parameter set for a DVB-S/S2 tuning call.
#[derive(Debug, Clone, PartialEq)]
pub struct DvbTuneParams {
    /// Delivery system, [`DeliverySystem::DvbS`] or [`DeliverySystem::DvbS2`].
    pub system: DeliverySystem,
    /// Transponder frequency in kHz.
    pub frequency: u32,
    /// Polarization tag; `V` selects 13 V LNB voltage, anything else 18 V.
    pub polarization: String,
    /// Symbol rate in kSym/s. Always positive.
    pub symbol_rate: u32,
    /// Inner forward-error-correction code rate, e.g. `3/4`.
    pub fec: String,
    /// Roll-off factor, e.g. `0.35`.
    pub rolloff: f64,
    /// Modulation name, e.g. `QPSK` or `8PSK`.
    pub modulation: String,
}

/// A single "how to tune" request, produced by the scan-file parser.
///
/// Exactly one delivery system per value; each variant carries only the
/// fields that are meaningful for it.
#[derive(Debug, Clone, PartialEq)]
pub enum TuneRequest {
    /// Replay a recorded transport stream from a file.
    File {
        /// Nominal frequency the recording was made on.
        frequency: u32,
        /// Path of the recording.
        path: PathBuf,
    },
    /// Tune an ATSC terrestrial/cable channel.
    Atsc {
        /// Channel frequency in Hz.
        frequency: u32,
        /// Modulation name, e.g. `8VSB` or `QAM256`.
        modulation: String,
        /// North-American RF channel number, when known.
        rf_number: Option<u32>,
    },
    /// Tune a DVB-S/S2 transponder.
    Dvb(DvbTuneParams),
}

impl TuneRequest {
    /// The delivery system this request targets.
    pub fn delivery_system(&self) -> DeliverySystem {
        match self {
            TuneRequest::File { .. } => DeliverySystem::File,
            TuneRequest::Atsc { .. } => DeliverySystem::Atsc,
            TuneRequest::Dvb(params) => params.system,
        }
    }

    /// The requested frequency.
    pub fn frequency(&self) -> u32 {
        match self {
            TuneRequest::File { frequency, .. } => *frequency,
            TuneRequest::Atsc { frequency, .. } => *frequency,
            TuneRequest::Dvb(params) => params.frequency,
        }
    }
}

/// Errors raised while parsing a scan file.
///
/// A numeric field that fails to parse aborts the whole file; there is no
/// per-line recovery, so a bad file never yields a silently truncated
/// channel list.
#[derive(Debug, Error)]
pub enum ScanFileError {
    /// The underlying reader failed.
    #[error("failed to read scan file: {0}")]
    Io(#[from] std::io::Error),

    /// A numeric token did not parse.
    #[error("scan file line {line}: invalid {field} {value:?}")]
    InvalidNumber {
        /// 1-based line number.
        line: usize,
        /// Which field was malformed.
        field: &'static str,
        /// The offending token.
        value: String,
    },

    /// A DVB line carried a zero symbol rate.
    #[error("scan file line {line}: symbol rate must be positive")]
    ZeroSymbolRate {
        /// 1-based line number.
        line: usize,
    },
}

fn parse_u32(token: &str, line: usize, field: &'static str) -> Result<u32, ScanFileError> {
    token.parse().map_err(|_| ScanFileError::InvalidNumber {
        line,
        field,
        value: token.to_owned(),
    })
}

fn parse_f64(token: &str, line: usize, field: &'static str) -> Result<f64, ScanFileError> {
    token.parse().map_err(|_| ScanFileError::InvalidNumber {
        line,
        field,
        value: token.to_owned(),
    })
}

/// Parses a scan file into the list of tune requests it describes.
///
/// Blank lines and lines starting with `#` are skipped. Lines whose token
/// count matches no known channel form are skipped as well; only malformed
/// numeric fields are an error.
pub fn parse_scan_file<R: BufRead>(reader: R) -> Result<Vec<TuneRequest>, ScanFileError> {
    let mut requests = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.len() {
            3 | 4 if tokens[0] == "A" => {
                let frequency = parse_u32(tokens[1], line_no, "frequency")?;
                let rf_number = match tokens.get(3) {
                    Some(token) => Some(parse_u32(token, line_no, "RF channel number")?),
                    None => None,
                };
                requests.push(TuneRequest::Atsc {
                    frequency,
                    modulation: tokens[2].to_owned(),
                    rf_number,
                });
            }
            7 => {
                // Any tag other than "S2" selects DVB-S, matching the scan
                // files in the wild that spell it "S", "s" or not at all.
                let system = if tokens[0] == "S2" {
                    DeliverySystem::DvbS2
                } else {
                    DeliverySystem::DvbS
                };
                if tokens[0] != "S" && tokens[0] != "S2" {
                    debug!("scan file line {line_no}: treating tag {:?} as DVB-S", tokens[0]);
                }
                let symbol_rate = parse_u32(tokens[3], line_no, "symbol rate")?;
                if symbol_rate == 0 {
                    return Err(ScanFileError::ZeroSymbolRate { line: line_no });
                }
                requests.push(TuneRequest::Dvb(DvbTuneParams {
                    system,
                    frequency: parse_u32(tokens[1], line_no, "frequency")?,
                    polarization: tokens[2].to_owned(),
                    symbol_rate,
                    fec: tokens[4].to_owned(),
                    rolloff: parse_f64(tokens[5], line_no, "rolloff")?,
                    modulation: tokens[6].to_owned(),
                }));
            }
            n => {
                debug!("scan file line {line_no}: skipping line with {n} tokens");
            }
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Vec<TuneRequest>, ScanFileError> {
        parse_scan_file(input.as_bytes())
    }

    #[test]
    fn parses_atsc_and_dvb_lines() {
        let requests =
            parse("A 609000000 8VSB\n# comment\n\nS2 1180000 V 22500 3/4 0.2 QPSK\n").unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0],
            TuneRequest::Atsc {
                frequency: 609000000,
                modulation: "8VSB".to_owned(),
                rf_number: None,
            }
        );
        assert_eq!(
            requests[1],
            TuneRequest::Dvb(DvbTuneParams {
                system: DeliverySystem::DvbS2,
                frequency: 1180000,
                polarization: "V".to_owned(),
                symbol_rate: 22500,
                fec: "3/4".to_owned(),
                rolloff: 0.2,
                modulation: "QPSK".to_owned(),
            })
        );
    }

    #[test]
    fn parses_rf_channel_number() {
        let requests = parse("A 195000000 QAM256 12\n").unwrap();
        assert_eq!(
            requests[0],
            TuneRequest::Atsc {
                frequency: 195000000,
                modulation: "QAM256".to_owned(),
                rf_number: Some(12),
            }
        );
    }

    #[test]
    fn unknown_token_counts_are_skipped() {
        let requests = parse("A 609000000\nS2 1180000 V 22500 3/4 0.2\n").unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn non_atsc_three_token_lines_are_skipped() {
        let requests = parse("B 609000000 8VSB\n").unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn permissive_dvb_tag_selects_dvbs() {
        let requests = parse("X 1234000 H 27500 5/6 0.35 8PSK\n").unwrap();
        assert_eq!(requests[0].delivery_system(), DeliverySystem::DvbS);
    }

    #[test]
    fn malformed_frequency_aborts_the_parse() {
        let err = parse("A 609000000 8VSB\nA banana 8VSB\n").unwrap_err();
        match err {
            ScanFileError::InvalidNumber { line, value, .. } => {
                assert_eq!(line, 2);
                assert_eq!(value, "banana");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_symbol_rate_is_rejected() {
        let err = parse("S 1180000 V 0 3/4 0.35 QPSK\n").unwrap_err();
        assert!(matches!(err, ScanFileError::ZeroSymbolRate { line: 1 }));
    }

    #[test]
    fn delivery_system_ordinals_are_stable() {
        assert_eq!(DeliverySystem::File.ordinal(), 0);
        assert_eq!(DeliverySystem::Atsc.ordinal(), 1);
        assert_eq!(DeliverySystem::DvbS.ordinal(), 2);
        assert_eq!(DeliverySystem::DvbS2.ordinal(), 3);
    }
}
