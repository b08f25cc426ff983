use std::fmt::{self, Display};
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// TCP control bits, laid out as in the low byte of the header's
/// data-offset/control word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Self = Self(0);
    /// No more data from sender
    pub const FIN: Self = Self(1 << 0);
    /// Synchronize sequence numbers
    pub const SYN: Self = Self(1 << 1);
    /// Reset the connection
    pub const RST: Self = Self(1 << 2);
    /// Push function
    pub const PSH: Self = Self(1 << 3);
    /// Acknowledgment field significant
    pub const ACK: Self = Self(1 << 4);
    /// Urgent pointer field significant
    pub const URG: Self = Self(1 << 5);
    /// The passive-open reply.
    pub const SYNACK: Self = Self(Self::SYN.0 | Self::ACK.0);
    /// The teardown workhorse.
    pub const FINACK: Self = Self(Self::FIN.0 | Self::ACK.0);

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether any of the bits in `other` are set in `self`.
    pub const fn has_any(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every bit in `other` is set in `self`.
    pub const fn has_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The bits of `self` with the bits of `other` cleared.
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn fin(self) -> bool {
        self.has_any(Self::FIN)
    }

    pub const fn syn(self) -> bool {
        self.has_any(Self::SYN)
    }

    pub const fn rst(self) -> bool {
        self.has_any(Self::RST)
    }

    pub const fn psh(self) -> bool {
        self.has_any(Self::PSH)
    }

    pub const fn ack(self) -> bool {
        self.has_any(Self::ACK)
    }

    pub const fn urg(self) -> bool {
        self.has_any(Self::URG)
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<u8> for Flags {
    fn from(n: u8) -> Self {
        // Only the six control bits of the wire byte are meaningful.
        Self(n & 0b11_1111)
    }
}

impl From<Flags> for u8 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

impl Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "[]");
        }
        let names = [
            (Self::FIN, "FIN"),
            (Self::SYN, "SYN"),
            (Self::RST, "RST"),
            (Self::PSH, "PSH"),
            (Self::ACK, "ACK"),
            (Self::URG, "URG"),
        ];
        write!(f, "[")?;
        let mut first = true;
        for (flag, name) in names {
            if self.has_any(flag) {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        write!(f, "]")
    }
}

/// A TCP segment as the engine sees it: the sequencing fields, the
/// advertised window, the control bits, and the payload length. Wire
/// encoding and the payload bytes themselves live elsewhere.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Sequence number of the first byte the segment occupies.
    pub seq: u32,
    /// Acknowledgment number. Meaningful only when the ACK flag is set.
    pub ack: u32,
    /// Payload bytes carried, excluding control bits.
    pub datalen: u32,
    /// Window advertised by the segment's sender. Must fit in 16 bits.
    pub wnd: u32,
    pub flags: Flags,
}

impl Segment {
    /// The length of the segment in sequence space. SYN and FIN each
    /// occupy one sequence number on top of the payload.
    pub const fn seg_len(&self) -> u32 {
        self.datalen + self.flags.syn() as u32 + self.flags.fin() as u32
    }

    /// Sequence number of the last byte the segment occupies. Only
    /// meaningful when `seg_len() > 0`.
    pub fn last(&self) -> u32 {
        self.seq.wrapping_add(self.seg_len()).wrapping_sub(1)
    }

    /// Whether the segment carries neither control bits nor data, as
    /// returned by a TCB with nothing to transmit.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.datalen == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_set_operations() {
        let synack = Flags::SYN | Flags::ACK;
        assert_eq!(synack, Flags::SYNACK);
        assert!(synack.has_any(Flags::SYN));
        assert!(synack.has_all(Flags::SYN | Flags::ACK));
        assert!(!synack.has_all(Flags::SYN | Flags::FIN));
        assert_eq!(synack.without(Flags::SYN), Flags::ACK);
        assert_eq!(synack & Flags::ACK, Flags::ACK);
        assert!((synack & Flags::FIN).is_empty());
    }

    #[test]
    fn flag_display() {
        assert_eq!(Flags::NONE.to_string(), "[]");
        assert_eq!(Flags::FINACK.to_string(), "[FIN,ACK]");
        assert_eq!((Flags::SYN | Flags::PSH).to_string(), "[SYN,PSH]");
    }

    #[test]
    fn wire_byte_round_trip() {
        let flags = Flags::from(0b01_0010);
        assert!(flags.syn());
        assert!(flags.ack());
        assert_eq!(u8::from(flags), 0b01_0010);
        // Reserved high bits are masked off.
        assert_eq!(Flags::from(0b1100_0001), Flags::FIN);
    }

    #[test]
    fn segment_length_counts_control_bits() {
        let mut seg = Segment {
            seq: 100,
            datalen: 10,
            ..Default::default()
        };
        assert_eq!(seg.seg_len(), 10);
        assert_eq!(seg.last(), 109);

        seg.flags = Flags::SYN;
        assert_eq!(seg.seg_len(), 11);

        seg.flags = Flags::SYN | Flags::FIN;
        assert_eq!(seg.seg_len(), 12);
        assert_eq!(seg.last(), 111);
    }

    #[test]
    fn segment_last_wraps() {
        let seg = Segment {
            seq: u32::MAX,
            datalen: 2,
            ..Default::default()
        };
        assert_eq!(seg.last(), 0);
    }
}
