//! The User Datagram Protocol: the header codec and a minimal
//! datagram socket the stack demultiplexes into.

pub mod udp_parsing;

use super::ethernet::MacAddress;
use super::utility::Endpoint;
use std::collections::VecDeque;

/// A bound UDP port with queues of whole datagrams in each direction.
/// The stack moves the queued datagrams onto and off the wire; the
/// user exchanges payloads with [`UdpSocket::send_to`] and
/// [`UdpSocket::recv_from`].
#[derive(Debug, Default)]
pub struct UdpSocket {
    port: u16,
    rx: VecDeque<(Endpoint, Vec<u8>)>,
    tx: VecDeque<(Endpoint, MacAddress, Vec<u8>)>,
}

impl UdpSocket {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// The bound local port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Queues one datagram for transmission. The remote hardware
    /// address is the caller's to supply; this stack does not resolve
    /// it on the socket's behalf.
    pub fn send_to(&mut self, remote: Endpoint, remote_mac: MacAddress, payload: &[u8]) {
        self.tx.push_back((remote, remote_mac, payload.to_vec()));
    }

    /// Takes the oldest received datagram, if any.
    pub fn recv_from(&mut self) -> Option<(Endpoint, Vec<u8>)> {
        self.rx.pop_front()
    }

    /// The number of datagrams waiting to be read.
    pub fn buffered_input(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn deliver(&mut self, from: Endpoint, payload: Vec<u8>) {
        self.rx.push_back((from, payload));
    }

    pub(crate) fn take_outgoing(&mut self) -> Option<(Endpoint, MacAddress, Vec<u8>)> {
        self.tx.pop_front()
    }
}
