//! PSI/SI section reassembly and identity.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::ts_analyzer::packet::TsPacket;

/// Fixed long-form section header: table_id through
/// last_section_number, plus at least one byte of body.
pub const SI_HEADER_LEN: usize = 9;

pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_CAT: u8 = 0x01;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
pub const TABLE_ID_MGT: u8 = 0xc7;
pub const TABLE_ID_TVCT: u8 = 0xc8;
pub const TABLE_ID_CVCT: u8 = 0xc9;
pub const TABLE_ID_STT: u8 = 0xcd;

/// Human-readable name of a table id, for logging.
pub fn table_name(table_id: u8) -> &'static str {
    match table_id {
        TABLE_ID_PAT => "PAT",
        TABLE_ID_CAT => "CAT",
        TABLE_ID_PMT => "PMT",
        TABLE_ID_SDT_ACTUAL => "SDT",
        TABLE_ID_SDT_OTHER => "SDT (other)",
        TABLE_ID_MGT => "MGT",
        TABLE_ID_TVCT => "TVCT",
        TABLE_ID_CVCT => "CVCT",
        TABLE_ID_STT => "STT",
        _ => "unknown",
    }
}

/// Identity of one SI section instance.
///
/// Equality and hashing cover table_id, table_id_extension and
/// section_number only. The current_next_indicator is carried for
/// inspection but excluded from identity: a "next" announcement of a
/// section and its "current" form name the same table instance.
#[derive(Debug, Clone)]
pub struct SiSection {
    pub table_id: u8,
    pub table_id_extension: u16,
    pub section_number: u8,
    pub current_next_indicator: bool,
}

impl SiSection {
    /// Reads the section identity from raw section bytes.
    ///
    /// `None` when `data` is shorter than the fixed long-form header.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SI_HEADER_LEN {
            return None;
        }
        Some(Self {
            table_id: data[0],
            table_id_extension: u16::from(data[3]) << 8 | u16::from(data[4]),
            section_number: data[6],
            current_next_indicator: data[5] & 0x01 != 0,
        })
    }
}

impl PartialEq for SiSection {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id
            && self.table_id_extension == other.table_id_extension
            && self.section_number == other.section_number
    }
}

impl Eq for SiSection {}

impl Hash for SiSection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table_id.hash(state);
        self.table_id_extension.hash(state);
        self.section_number.hash(state);
    }
}

/// Tracks which section identities have been seen.
#[derive(Debug, Default)]
pub struct SectionDeduper {
    seen: HashSet<SiSection>,
}

impl SectionDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the section in `data`, returning its identity only when
    /// it was not seen before.
    pub fn observe(&mut self, data: &[u8]) -> Option<SiSection> {
        let section = SiSection::parse(data)?;
        self.seen.insert(section.clone()).then_some(section)
    }

    /// Number of distinct sections seen so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Reassembles PSI sections from the transport packets of one PID.
///
/// The caller feeds packets in stream order; completed sections come
/// back as owned byte vectors. A section truncated by a new
/// payload_unit_start is discarded.
#[derive(Debug, Default)]
pub struct SectionCollector {
    buf: Vec<u8>,
    assembling: bool,
}

impl SectionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet, returning any sections it completed.
    pub fn push(&mut self, packet: &TsPacket<'_>) -> Vec<Vec<u8>> {
        let mut sections = Vec::new();
        let Some(payload) = packet.payload() else {
            return sections;
        };

        if packet.payload_unit_start() {
            let Some((&pointer, rest)) = payload.split_first() else {
                return sections;
            };
            let pointer = usize::from(pointer);
            if pointer > rest.len() {
                self.reset();
                return sections;
            }
            if self.assembling {
                // Bytes before the pointer target close out the section
                // in progress.
                self.buf.extend_from_slice(&rest[..pointer]);
                self.drain_complete(&mut sections);
            }
            self.buf.clear();
            self.assembling = true;
            self.buf.extend_from_slice(&rest[pointer..]);
        } else {
            if !self.assembling {
                return sections;
            }
            self.buf.extend_from_slice(payload);
        }

        self.drain_complete(&mut sections);
        sections
    }

    /// Drops any partially assembled section.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.assembling = false;
    }

    fn drain_complete(&mut self, sections: &mut Vec<Vec<u8>>) {
        loop {
            if self.buf.first() == Some(&0xff) {
                // Stuffing runs to the end of the packet.
                self.reset();
                return;
            }
            if self.buf.len() < 3 {
                return;
            }
            let section_len = usize::from(self.buf[1] & 0x0f) << 8 | usize::from(self.buf[2]);
            let total = 3 + section_len;
            if self.buf.len() < total {
                return;
            }
            let rest = self.buf.split_off(total);
            sections.push(std::mem::replace(&mut self.buf, rest));
        }
    }
}
