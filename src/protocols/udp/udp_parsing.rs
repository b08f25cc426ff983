use crate::protocols::ipv4::Ipv4Address;
use crate::protocols::utility::{BytesExt, Checksum};
use thiserror::Error as ThisError;

/// The number of bytes in a UDP header
pub const HEADER_OCTETS: u16 = 8;

/// Represents a UDP header, either one that was parsed or one we are
/// going to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// The source port
    pub source: u16,
    /// The destination port
    pub destination: u16,
    /// The length of the UDP packet in bytes, including the header
    pub length: u16,
    /// The UDP checksum
    pub checksum: u16,
}

impl UdpHeader {
    /// Parses a UDP header from an iterator spanning the whole packet,
    /// payload included.
    pub fn from_bytes_ipv4(
        mut packet: impl Iterator<Item = u8>,
        packet_len: usize,
        source_address: Ipv4Address,
        destination_address: Ipv4Address,
    ) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::HeaderTooShort;

        let mut checksum = Checksum::new();

        let source_port = packet.next_u16_be().ok_or(HTS)?;
        checksum.add_u16(source_port);

        let destination_port = packet.next_u16_be().ok_or(HTS)?;
        checksum.add_u16(destination_port);

        let length = packet.next_u16_be().ok_or(HTS)?;
        checksum.add_u16(length);
        // This is used a second time in the pseudo-header.
        checksum.add_u16(length);

        let expected_checksum = packet.next_u16_be().ok_or(HTS)?;

        // Pseudo-header parts
        checksum.add_u32(source_address.into());
        checksum.add_u32(destination_address.into());
        checksum.add_u8(0, 17);

        checksum.accumulate_remainder(&mut packet);

        if packet_len != length as usize {
            Err(ParseError::LengthMismatch)?
        }

        let actual_checksum = checksum.as_u16();
        if actual_checksum != expected_checksum {
            Err(ParseError::Checksum {
                actual: actual_checksum,
                expected: expected_checksum,
            })?
        }

        Ok(Self {
            source: source_port,
            destination: destination_port,
            length,
            checksum: expected_checksum,
        })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Too few bytes to constitute a UDP header")]
    HeaderTooShort,
    #[error(
        "The computed checksum {actual:#06x} did not match the header checksum {expected:#06x}"
    )]
    Checksum { actual: u16, expected: u16 },
    #[error("The number of message bytes differs from the header")]
    LengthMismatch,
    #[error("The message is too long to fit a UDP packet")]
    OverlyLongPayload,
}

/// Creates a serialized UDP packet header with the values provided.
/// The payload does not become part of the output but participates in
/// the checksum.
pub fn build_udp_header(
    source_address: Ipv4Address,
    source_port: u16,
    destination_address: Ipv4Address,
    destination_port: u16,
    payload: impl Iterator<Item = u8>,
) -> Result<Vec<u8>, ParseError> {
    let mut checksum = Checksum::new();
    let payload_length = checksum.accumulate_remainder(payload);
    let length = payload_length
        .checked_add(HEADER_OCTETS)
        .ok_or(ParseError::OverlyLongPayload)?;

    checksum.add_u16(source_port);
    checksum.add_u16(destination_port);
    checksum.add_u16(length);
    checksum.add_u16(length);
    checksum.add_u32(source_address.into());
    checksum.add_u32(destination_address.into());
    checksum.add_u8(0, 17);

    let mut out = Vec::with_capacity(HEADER_OCTETS as usize);
    out.extend_from_slice(&source_port.to_be_bytes());
    out.extend_from_slice(&destination_port.to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&checksum.as_u16().to_be_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Address = Ipv4Address::new([10, 0, 0, 190]);
    const DST: Ipv4Address = Ipv4Address::new([10, 0, 0, 122]);

    #[test]
    fn header_round_trip() -> anyhow::Result<()> {
        let payload = b"hello";
        let serial = build_udp_header(SRC, 0xc7ce, DST, 0x04d2, payload.iter().cloned())?;
        assert_eq!(serial.len(), HEADER_OCTETS as usize);

        let whole: Vec<u8> = serial
            .iter()
            .cloned()
            .chain(payload.iter().cloned())
            .collect();
        let parsed = UdpHeader::from_bytes_ipv4(whole.iter().cloned(), whole.len(), SRC, DST)?;
        assert_eq!(parsed.source, 0xc7ce);
        assert_eq!(parsed.destination, 0x04d2);
        assert_eq!(parsed.length, 13);
        Ok(())
    }

    #[test]
    fn agrees_with_etherparse() -> anyhow::Result<()> {
        let payload = b"datagram";
        let serial = build_udp_header(SRC, 68, DST, 67, payload.iter().cloned())?;

        let (parsed, _) = etherparse::UdpHeader::from_slice(&serial)?;
        assert_eq!(parsed.source_port, 68);
        assert_eq!(parsed.destination_port, 67);
        assert_eq!(parsed.length, 16);
        let expected =
            parsed.calc_checksum_ipv4_raw(SRC.to_bytes(), DST.to_bytes(), payload)?;
        assert_eq!(parsed.checksum, expected);
        Ok(())
    }

    #[test]
    fn length_mismatch_is_rejected() -> anyhow::Result<()> {
        let payload = b"hello";
        let serial = build_udp_header(SRC, 1, DST, 2, payload.iter().cloned())?;
        let whole: Vec<u8> = serial
            .iter()
            .cloned()
            .chain(payload.iter().cloned())
            .collect();
        // Claim one byte more than the packet holds.
        let result = UdpHeader::from_bytes_ipv4(whole.iter().cloned(), whole.len() + 1, SRC, DST);
        assert_eq!(result, Err(ParseError::LengthMismatch));
        Ok(())
    }

    #[test]
    fn corrupted_payload_fails_checksum() -> anyhow::Result<()> {
        let payload = b"hello";
        let serial = build_udp_header(SRC, 1, DST, 2, payload.iter().cloned())?;
        let mut whole: Vec<u8> = serial
            .iter()
            .cloned()
            .chain(payload.iter().cloned())
            .collect();
        whole[8] ^= 0x20;
        let result = UdpHeader::from_bytes_ipv4(whole.iter().cloned(), whole.len(), SRC, DST);
        assert!(matches!(result, Err(ParseError::Checksum { .. })));
        Ok(())
    }
}
