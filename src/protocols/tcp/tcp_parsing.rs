use super::tcb::{Flags, Segment};
use crate::protocols::ipv4::Ipv4Address;
use crate::protocols::utility::{BytesExt, Checksum};
use thiserror::Error as ThisError;

/// The number of bytes in a TCP header without options
pub const HEADER_OCTETS: u16 = 20;

/// The number of `u32` words in a TCP header without options
const BASE_WORDS: u8 = 5;

/// A TCP header, as described in RFC 9293 section 3.1. Options are
/// not supported; the data offset is always five words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// The control bits
    pub ctl: Flags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    /// Parses a header from a byte iterator spanning the whole TCP
    /// packet, payload included; the payload and the addresses enter
    /// the checksum through the pseudo-header.
    pub fn from_bytes(
        mut bytes: impl Iterator<Item = u8>,
        src_address: Ipv4Address,
        dst_address: Ipv4Address,
    ) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::HeaderTooShort;
        let mut checksum = Checksum::new();

        let src_port = bytes.next_u16_be().ok_or(HTS)?;
        checksum.add_u16(src_port);

        let dst_port = bytes.next_u16_be().ok_or(HTS)?;
        checksum.add_u16(dst_port);

        let seq = bytes.next_u32_be().ok_or(HTS)?;
        checksum.add_u32(seq.to_be_bytes());

        let ack = bytes.next_u32_be().ok_or(HTS)?;
        checksum.add_u32(ack.to_be_bytes());

        let offset_byte = bytes.next_u8().ok_or(HTS)?;
        let control_byte = bytes.next_u8().ok_or(HTS)?;
        checksum.add_u8(offset_byte, control_byte);
        if offset_byte >> 4 != BASE_WORDS {
            Err(ParseError::UnexpectedOptions)?
        }
        let ctl = Flags::from(control_byte);

        let window = bytes.next_u16_be().ok_or(HTS)?;
        checksum.add_u16(window);

        let expected_checksum = bytes.next_u16_be().ok_or(HTS)?;

        let urgent = bytes.next_u16_be().ok_or(HTS)?;
        checksum.add_u16(urgent);

        let text_length = checksum.accumulate_remainder(&mut bytes);

        // Pseudo-header: addresses, a zero byte, the TCP protocol
        // number, and the length of header plus text.
        checksum.add_u32(src_address.into());
        checksum.add_u32(dst_address.into());
        checksum.add_u8(0, 6);
        checksum.add_u16(HEADER_OCTETS + text_length);

        let actual_checksum = checksum.as_u16();
        if actual_checksum != expected_checksum {
            Err(ParseError::Checksum {
                actual: actual_checksum,
                expected: expected_checksum,
            })?
        }

        Ok(Self {
            src_port,
            dst_port,
            seq,
            ack,
            ctl,
            window,
            checksum: expected_checksum,
            urgent,
        })
    }

    /// The abstract segment this header describes, as consumed by the
    /// [`Tcb`](super::tcb::Tcb).
    pub fn segment(&self, payload_len: usize) -> Segment {
        Segment {
            seq: self.seq,
            ack: self.ack,
            datalen: payload_len as u32,
            wnd: self.window as u32,
            flags: self.ctl,
        }
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("The TCP header is incomplete")]
    HeaderTooShort,
    #[error("TCP options are not supported")]
    UnexpectedOptions,
    #[error(
        "The computed checksum {actual:#06x} did not match the header checksum {expected:#06x}"
    )]
    Checksum { actual: u16, expected: u16 },
}

/// A builder for TCP headers. The fields align with those found on
/// [`TcpHeader`].
#[derive(Debug, Clone, Copy)]
pub struct TcpHeaderBuilder {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    ctl: Flags,
    window: u16,
}

impl TcpHeaderBuilder {
    /// Creates a new builder.
    pub fn new(src_port: u16, dst_port: u16, seq: u32) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack: 0,
            ctl: Flags::NONE,
            window: 0,
        }
    }

    /// A builder preloaded from an engine segment.
    pub fn from_segment(src_port: u16, dst_port: u16, seg: Segment) -> Self {
        Self {
            src_port,
            dst_port,
            seq: seg.seq,
            ack: seg.ack,
            ctl: seg.flags,
            window: seg.wnd as u16,
        }
    }

    /// Sets the acknowledgment number and the ACK control bit.
    pub fn ack(mut self, ack: u32) -> Self {
        self.ack = ack;
        self.ctl |= Flags::ACK;
        self
    }

    pub fn syn(mut self) -> Self {
        self.ctl |= Flags::SYN;
        self
    }

    pub fn fin(mut self) -> Self {
        self.ctl |= Flags::FIN;
        self
    }

    pub fn rst(mut self) -> Self {
        self.ctl |= Flags::RST;
        self
    }

    pub fn psh(mut self) -> Self {
        self.ctl |= Flags::PSH;
        self
    }

    /// Sets the advertised window.
    pub fn wnd(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    /// Creates the serialized header. The payload does not become part
    /// of the output but participates in the checksum.
    pub fn build(
        self,
        src_address: Ipv4Address,
        dst_address: Ipv4Address,
        payload: impl Iterator<Item = u8>,
    ) -> Vec<u8> {
        let offset_byte = BASE_WORDS << 4;
        let control_byte = u8::from(self.ctl);

        let mut checksum = Checksum::new();
        checksum.add_u16(self.src_port);
        checksum.add_u16(self.dst_port);
        checksum.add_u32(self.seq.to_be_bytes());
        checksum.add_u32(self.ack.to_be_bytes());
        checksum.add_u8(offset_byte, control_byte);
        checksum.add_u16(self.window);
        let text_length = checksum.accumulate_remainder(payload);
        checksum.add_u32(src_address.into());
        checksum.add_u32(dst_address.into());
        checksum.add_u8(0, 6);
        checksum.add_u16(HEADER_OCTETS + text_length);

        let mut out = Vec::with_capacity(HEADER_OCTETS as usize);
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.ack.to_be_bytes());
        out.push(offset_byte);
        out.push(control_byte);
        out.extend_from_slice(&self.window.to_be_bytes());
        out.extend_from_slice(&checksum.as_u16().to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Address = Ipv4Address::LOCALHOST;
    const DST: Ipv4Address = Ipv4Address::new([123, 45, 67, 89]);

    #[test]
    fn parses_etherparse_packet() -> anyhow::Result<()> {
        let payload = b"Hello, world!";
        let mut expected = etherparse::TcpHeader::new(0xcafe, 0xbabe, 123456789, 1024);
        expected.acknowledgment_number = 10;
        expected.ack = true;
        expected.psh = true;
        expected.checksum =
            expected.calc_checksum_ipv4_raw(SRC.to_bytes(), DST.to_bytes(), payload)?;
        let serial = {
            let mut serial = vec![];
            expected.write(&mut serial)?;
            serial.extend_from_slice(payload);
            serial
        };

        let actual = TcpHeader::from_bytes(serial.iter().cloned(), SRC, DST)?;
        assert_eq!(actual.src_port, 0xcafe);
        assert_eq!(actual.dst_port, 0xbabe);
        assert_eq!(actual.seq, 123456789);
        assert_eq!(actual.ack, 10);
        assert_eq!(actual.ctl, Flags::ACK | Flags::PSH);
        assert_eq!(actual.window, 1024);
        assert_eq!(actual.checksum, expected.checksum);
        assert_eq!(actual.urgent, 0);
        Ok(())
    }

    #[test]
    fn builds_what_etherparse_would() -> anyhow::Result<()> {
        let payload = b"ping";
        let serial = TcpHeaderBuilder::new(80, 1025, 301)
            .ack(102)
            .wnd(1300)
            .build(SRC, DST, payload.iter().cloned());

        let mut expected = etherparse::TcpHeader::new(80, 1025, 301, 1300);
        expected.acknowledgment_number = 102;
        expected.ack = true;
        expected.checksum =
            expected.calc_checksum_ipv4_raw(SRC.to_bytes(), DST.to_bytes(), payload)?;
        let expected_serial = {
            let mut out = vec![];
            expected.write(&mut out)?;
            out
        };
        assert_eq!(serial, expected_serial);
        Ok(())
    }

    #[test]
    fn header_round_trip_with_payload() -> anyhow::Result<()> {
        let payload = b"hello world";
        let serial = TcpHeaderBuilder::new(0x04d2, 0x1234, 0x2a675817)
            .ack(0x0d53)
            .psh()
            .wnd(0xfa4b)
            .build(SRC, DST, payload.iter().cloned());

        let whole: Vec<u8> = serial
            .iter()
            .cloned()
            .chain(payload.iter().cloned())
            .collect();
        let parsed = TcpHeader::from_bytes(whole.iter().cloned(), SRC, DST)?;
        assert_eq!(parsed.seq, 0x2a675817);
        assert_eq!(parsed.ack, 0x0d53);
        assert!(parsed.ctl.has_all(Flags::ACK | Flags::PSH));
        assert_eq!(parsed.window, 0xfa4b);

        let seg = parsed.segment(payload.len());
        assert_eq!(seg.datalen, 11);
        assert_eq!(seg.seg_len(), 11);
        assert_eq!(seg.wnd, 0xfa4b);
        Ok(())
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let payload = b"hello world";
        let serial = TcpHeaderBuilder::new(1, 2, 3)
            .ack(4)
            .build(SRC, DST, payload.iter().cloned());

        let mut whole: Vec<u8> = serial
            .iter()
            .cloned()
            .chain(payload.iter().cloned())
            .collect();
        whole[25] ^= 0x01;
        let result = TcpHeader::from_bytes(whole.iter().cloned(), SRC, DST);
        assert!(matches!(result, Err(ParseError::Checksum { .. })));
    }

    #[test]
    fn options_are_not_supported() {
        let mut serial = TcpHeaderBuilder::new(1, 2, 3).build(SRC, DST, [].into_iter());
        // Claim a six-word header.
        serial[12] = 6 << 4;
        assert_eq!(
            TcpHeader::from_bytes(serial.iter().cloned(), SRC, DST),
            Err(ParseError::UnexpectedOptions)
        );
    }
}
