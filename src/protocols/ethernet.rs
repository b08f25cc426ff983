//! Ethernet II framing: hardware addresses and the 14-byte header
//! that fronts every frame the stack touches.

use super::utility::BytesExt;
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// The number of bytes in an Ethernet II header
pub const HEADER_OCTETS: usize = 14;

/// EtherType of IPv4 payloads
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// EtherType of ARP payloads
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// A 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The address every station on the segment receives.
    pub const BROADCAST: Self = Self([0xff; 6]);

    pub const fn new(address: [u8; 6]) -> Self {
        Self(address)
    }

    pub fn to_bytes(self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(address: [u8; 6]) -> Self {
        Self(address)
    }
}

impl From<MacAddress> for [u8; 6] {
    fn from(address: MacAddress) -> Self {
        address.0
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// An Ethernet II header: the two hardware addresses and the type of
/// the payload that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn new(destination: MacAddress, source: MacAddress, ethertype: u16) -> Self {
        Self {
            destination,
            source,
            ethertype,
        }
    }

    /// Parses a header from a byte iterator.
    pub fn from_bytes(mut bytes: impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::HeaderTooShort;
        let destination = bytes.next_mac().ok_or(HTS)?;
        let source = bytes.next_mac().ok_or(HTS)?;
        let ethertype = bytes.next_u16_be().ok_or(HTS)?;
        Ok(Self {
            destination,
            source,
            ethertype,
        })
    }

    /// Creates the serialized header.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_OCTETS);
        out.extend_from_slice(&self.destination.to_bytes());
        out.extend_from_slice(&self.source.to_bytes());
        out.extend_from_slice(&self.ethertype.to_be_bytes());
        out
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("The Ethernet header is incomplete")]
    HeaderTooShort,
}
