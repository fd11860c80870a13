//! Transport packet view.

/// Size of one MPEG transport stream packet.
pub const TS_PACKET_SIZE: usize = 188;
/// First byte of every transport packet.
pub const SYNC_BYTE: u8 = 0x47;

/// Borrowed view of one 188-byte transport packet.
#[derive(Debug, Clone, Copy)]
pub struct TsPacket<'a> {
    data: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Wraps `data` if it is one whole packet starting with the sync
    /// byte.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() != TS_PACKET_SIZE || data[0] != SYNC_BYTE {
            return None;
        }
        Some(Self { data })
    }

    /// 13-bit packet identifier.
    pub fn pid(&self) -> u16 {
        u16::from(self.data[1] & 0x1f) << 8 | u16::from(self.data[2])
    }

    pub fn payload_unit_start(&self) -> bool {
        self.data[1] & 0x40 != 0
    }

    pub fn transport_error(&self) -> bool {
        self.data[1] & 0x80 != 0
    }

    pub fn continuity_counter(&self) -> u8 {
        self.data[3] & 0x0f
    }

    /// Packet payload, with the adaptation field skipped when present.
    ///
    /// `None` when the adaptation field control says the packet carries
    /// no payload, or when the adaptation field length is corrupt.
    pub fn payload(&self) -> Option<&'a [u8]> {
        let control = (self.data[3] >> 4) & 0x3;
        if control & 0x1 == 0 {
            return None;
        }
        let start = if control & 0x2 != 0 {
            4 + 1 + usize::from(self.data[4])
        } else {
            4
        };
        if start > TS_PACKET_SIZE {
            return None;
        }
        Some(&self.data[start..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pid: u16, pusi: bool, control: u8, body: &[u8]) -> Vec<u8> {
        let mut data = vec![0xff; TS_PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = (pid >> 8) as u8 & 0x1f | if pusi { 0x40 } else { 0 };
        data[2] = pid as u8;
        data[3] = control << 4;
        data[4..4 + body.len()].copy_from_slice(body);
        data
    }

    #[test]
    fn rejects_bad_sync_and_short_buffers() {
        assert!(TsPacket::parse(&[0x47; 100]).is_none());
        let mut data = packet(0x1ffb, false, 0x1, &[]);
        data[0] = 0x48;
        assert!(TsPacket::parse(&data).is_none());
    }

    #[test]
    fn header_fields() {
        let data = packet(0x1ffb, true, 0x1, &[0xab]);
        let ts = TsPacket::parse(&data).unwrap();
        assert_eq!(ts.pid(), 0x1ffb);
        assert!(ts.payload_unit_start());
        assert!(!ts.transport_error());
        assert_eq!(ts.payload().unwrap()[0], 0xab);
        assert_eq!(ts.payload().unwrap().len(), TS_PACKET_SIZE - 4);
    }

    #[test]
    fn adaptation_field_is_skipped() {
        // adaptation_field_control 0b11, adaptation field of 7 bytes.
        let mut body = vec![7u8];
        body.extend_from_slice(&[0; 7]);
        body.push(0xcd);
        let data = packet(0x0031, false, 0x3, &body);
        let ts = TsPacket::parse(&data).unwrap();
        assert_eq!(ts.payload().unwrap()[0], 0xcd);
    }

    #[test]
    fn adaptation_only_packet_has_no_payload() {
        let data = packet(0x0031, false, 0x2, &[0]);
        let ts = TsPacket::parse(&data).unwrap();
        assert!(ts.payload().is_none());
    }
}
