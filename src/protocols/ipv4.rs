//! The Internet Protocol, version 4: addressing and the header codec.
//! Options, fragmentation, and reassembly are out of scope; the stack
//! speaks plain 20-byte headers.

mod ipv4_address;
mod ipv4_parsing;

pub use ipv4_address::Ipv4Address;
pub use ipv4_parsing::{
    ControlFlags, HeaderBuildError, Ipv4Header, Ipv4HeaderBuilder, ParseError, HEADER_OCTETS,
};

/// IP protocol number of TCP
pub const PROTOCOL_TCP: u8 = 6;
/// IP protocol number of UDP
pub const PROTOCOL_UDP: u8 = 17;
