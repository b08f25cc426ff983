//! A synchronous, user-space TCP/IP port stack built around a pure TCP
//! transmission control block.
//!
//! # Organization
//!
//! - [`protocols`] holds the individual protocol layers: wire codecs
//!   for Ethernet, ARP, IPv4, UDP, TCP, and DHCP, and the TCP engine
//!   itself.
//! - [`protocols::tcp::tcb`] is the heart of the crate: a pure,
//!   allocation-free state machine implementing the RFC 9293
//!   connection diagram as decisions over individual segments. It
//!   performs no I/O and keeps no timers; the caller proposes outgoing
//!   segments and reports incoming ones.
//! - [`stack`] wires the layers together. A [`PortStack`] owns an
//!   interface identity and a set of sockets and multiplexes ports,
//!   one Ethernet frame at a time.
//!
//! # Design
//!
//! Everything here is single-threaded and synchronous. No operation
//! blocks, suspends, or spawns; a `PortStack` is driven entirely by
//! the caller moving frames with [`PortStack::recv_eth`] and
//! [`PortStack::handle_eth`]. Retransmission, reordering, and the
//! TIME-WAIT timeout are the caller's responsibility, which keeps the
//! engine deterministic: the sequence of calls fully determines the
//! resulting state.

pub mod protocols;
pub mod stack;

pub use protocols::ethernet::MacAddress;
pub use protocols::ipv4::Ipv4Address;
pub use protocols::tcp::tcb::{Flags, Segment, State, Tcb, TcbError};
pub use protocols::tcp::tcp_socket::{SocketError, TcpSocket, TcpSocketConfig};
pub use protocols::tcp::Iss;
pub use protocols::utility::Endpoint;
pub use stack::{PortStack, PortStackConfig, StackError, TcpHandle, UdpHandle};
