use num_enum::{FromPrimitive, IntoPrimitive};
use zerocopy::byteorder::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// TNS packet header as carried on the wire (large-SDU framing: the
/// packet length occupies the first four bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct TnsHeader {
    pub length: U32,
    pub packet_type: u8,
    pub flags: u8,
    pub header_checksum: U16,
}

impl TnsHeader {
    /// Borrow a header view from the start of a payload, if there is room.
    pub fn parse(payload: &[u8]) -> Option<&TnsHeader> {
        TnsHeader::ref_from_prefix(payload).ok().map(|(h, _)| h)
    }

    pub fn packet_type(&self) -> TnsPacketType {
        TnsPacketType::from_primitive(self.packet_type)
    }
}

/// TNS packet types observed at the type byte (offset 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum TnsPacketType {
    Connect = 0x01,
    Accept = 0x02,
    Ack = 0x03,
    Refuse = 0x04,
    Redirect = 0x05,
    Data = 0x06,
    Null = 0x07,
    Abort = 0x09,
    Resend = 0x0B,
    Marker = 0x0C,
    Attention = 0x0D,
    Control = 0x0E,

    #[num_enum(catch_all)]
    Unknown(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_header() {
        // length 0x0000001d, type DATA, flags 0, checksum 0
        let payload = [0x00, 0x00, 0x00, 0x1d, 0x06, 0x00, 0x00, 0x00, 0xaa];
        let header = TnsHeader::parse(&payload).unwrap();
        assert_eq!(header.length.get(), 29);
        assert_eq!(header.packet_type(), TnsPacketType::Data);
    }

    #[test]
    fn short_payload_has_no_header() {
        assert!(TnsHeader::parse(&[0x00, 0x2f]).is_none());
    }

    #[test]
    fn unknown_type_is_preserved() {
        assert_eq!(TnsPacketType::from_primitive(0x7f), TnsPacketType::Unknown(0x7f));
    }
}
