//! MPEG transport stream analysis.
//!
//! Just enough TS parsing to support channel scanning: splitting the
//! byte stream into packets, reassembling PSI/SI sections, and tracking
//! section identity for deduplication.

pub mod packet;
pub mod psi;

pub use packet::{TsPacket, SYNC_BYTE, TS_PACKET_SIZE};
pub use psi::{SectionCollector, SectionDeduper, SiSection};
