//! The codec for IPv4-over-Ethernet ARP packets.
//!
//! https://en.wikipedia.org/wiki/Address_Resolution_Protocol#Packet_structure

use crate::protocols::ethernet::{MacAddress, ETHERTYPE_IPV4};
use crate::protocols::ipv4::Ipv4Address;
use crate::protocols::utility::BytesExt;
use thiserror::Error as ThisError;

/// Hardware type for Ethernet
const HTYPE: u16 = 1;
/// Protocol type for IPv4
const PTYPE: u16 = ETHERTYPE_IPV4;
/// Hardware address length
const HLEN: u8 = 6;
/// Protocol address length
const PLEN: u8 = 4;

/// The number of bytes in an IPv4-over-Ethernet ARP packet
pub const PACKET_OCTETS: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Request = 1,
    Reply = 2,
}

/// A struct representing an ARP packet.
#[derive(Debug, PartialEq, Eq, Copy, Hash, Clone)]
pub struct ArpPacket {
    pub operation: Operation,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Address,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Address,
}

impl ArpPacket {
    /// Creates a serialized ARP packet from the configuration provided.
    pub fn build(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(PACKET_OCTETS);
        out.extend_from_slice(&HTYPE.to_be_bytes());
        out.extend_from_slice(&PTYPE.to_be_bytes());
        out.push(HLEN);
        out.push(PLEN);
        out.extend_from_slice(&(self.operation as u16).to_be_bytes());
        out.extend_from_slice(&self.sender_mac.to_bytes());
        out.extend_from_slice(&self.sender_ip.to_bytes());
        out.extend_from_slice(&self.target_mac.to_bytes());
        out.extend_from_slice(&self.target_ip.to_bytes());
        out
    }

    /// Parses an ARP packet from a byte iterator.
    pub fn from_bytes(mut bytes: impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::HeaderTooShort;

        if bytes.next_u16_be().ok_or(HTS)? != HTYPE {
            return Err(ParseError::UnsupportedHardware);
        }
        if bytes.next_u16_be().ok_or(HTS)? != PTYPE {
            return Err(ParseError::UnsupportedProtocol);
        }
        if bytes.next_u8().ok_or(HTS)? != HLEN || bytes.next_u8().ok_or(HTS)? != PLEN {
            return Err(ParseError::UnsupportedAddressLength);
        }

        let operation = match bytes.next_u16_be().ok_or(HTS)? {
            1 => Operation::Request,
            2 => Operation::Reply,
            _ => return Err(ParseError::InvalidOperation),
        };
        let sender_mac = bytes.next_mac().ok_or(HTS)?;
        let sender_ip = bytes.next_ipv4addr().ok_or(HTS)?;
        let target_mac = bytes.next_mac().ok_or(HTS)?;
        let target_ip = bytes.next_ipv4addr().ok_or(HTS)?;
        Ok(Self {
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("The ARP packet is incomplete")]
    HeaderTooShort,
    #[error("Only Ethernet hardware addresses are supported")]
    UnsupportedHardware,
    #[error("Only IPv4 protocol addresses are supported")]
    UnsupportedProtocol,
    #[error("Unexpected hardware or protocol address length")]
    UnsupportedAddressLength,
    #[error("Invalid operation: should be 1 for request, 2 for reply")]
    InvalidOperation,
}
