//! The port stack: one Ethernet interface identity multiplexing TCP
//! and UDP ports, driven entirely by the caller moving frames.
//!
//! A [`PortStack`] performs no I/O of its own. The caller delivers
//! each received frame with [`PortStack::recv_eth`] and drains at most
//! one outgoing frame per call to [`PortStack::handle_eth`], which
//! makes the stack equally at home over a tap device, a test harness,
//! or a bare NIC driver.

pub mod ring;

use crate::protocols::arp::{arp_parsing, ArpCache, ArpPacket, Operation};
use crate::protocols::ethernet::{
    self, EthernetHeader, MacAddress, ETHERTYPE_ARP, ETHERTYPE_IPV4,
};
use crate::protocols::ipv4::{
    self, Ipv4Address, Ipv4HeaderBuilder, PROTOCOL_TCP, PROTOCOL_UDP,
};
use crate::protocols::tcp::tcb::{State, TcbError};
use crate::protocols::tcp::tcp_parsing::{self, TcpHeader, TcpHeaderBuilder};
use crate::protocols::tcp::tcp_socket::{SocketError, TcpSocket, TcpSocketConfig};
use crate::protocols::tcp::Iss;
use crate::protocols::udp::udp_parsing::{self, build_udp_header, UdpHeader};
use crate::protocols::udp::UdpSocket;
use crate::protocols::utility::Endpoint;
use thiserror::Error as ThisError;

/// Interface identity for a [`PortStack`].
#[derive(Debug, Clone, Copy)]
pub struct PortStackConfig {
    pub mac: MacAddress,
    /// Largest frame [`PortStack::handle_eth`] may produce.
    pub mtu: usize,
}

/// Names a TCP socket owned by a [`PortStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpHandle(usize);

/// Names a UDP socket owned by a [`PortStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpHandle(usize);

#[derive(Debug, ThisError)]
pub enum StackError {
    /// The frame or segment was not for us, or nobody is listening.
    /// Log it and carry on.
    #[error("dropped packet: {0}")]
    Dropped(&'static str),
    #[error("dropped segment: {0}")]
    Socket(#[from] SocketError),
    #[error("ethernet: {0}")]
    Ethernet(#[from] ethernet::ParseError),
    #[error("arp: {0}")]
    Arp(#[from] arp_parsing::ParseError),
    #[error("ipv4: {0}")]
    Ipv4(#[from] ipv4::ParseError),
    #[error("tcp: {0}")]
    Tcp(#[from] tcp_parsing::ParseError),
    #[error("udp: {0}")]
    Udp(#[from] udp_parsing::ParseError),
    #[error("ipv4 header build: {0}")]
    Ipv4Build(#[from] ipv4::HeaderBuildError),
    #[error("port {0} is already in use")]
    PortInUse(u16),
    #[error("the frame buffer is smaller than the frame")]
    BufferTooSmall,
}

impl StackError {
    /// Whether this is a per-packet problem: the packet was dropped
    /// and the stack remains healthy.
    pub fn is_drop(&self) -> bool {
        !matches!(
            self,
            StackError::PortInUse(_) | StackError::BufferTooSmall | StackError::Ipv4Build(_)
        )
    }
}

impl From<TcbError> for StackError {
    fn from(err: TcbError) -> Self {
        StackError::Socket(SocketError::Tcb(err))
    }
}

/// A synchronous host stack: Ethernet framing, ARP resolution, and
/// IPv4 carrying the owned TCP and UDP sockets.
pub struct PortStack {
    mac: MacAddress,
    addr: Ipv4Address,
    mtu: usize,
    arp: ArpCache,
    tcp_sockets: Vec<TcpSocket>,
    udp_sockets: Vec<UdpSocket>,
}

impl PortStack {
    pub fn new(config: PortStackConfig) -> Self {
        Self {
            mac: config.mac,
            addr: Ipv4Address::CURRENT_NETWORK,
            mtu: config.mtu,
            arp: ArpCache::new(),
            tcp_sockets: Vec::new(),
            udp_sockets: Vec::new(),
        }
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn addr(&self) -> Ipv4Address {
        self.addr
    }

    /// Assigns the interface's IPv4 address.
    pub fn set_addr(&mut self, addr: Ipv4Address) {
        self.addr = addr;
    }

    /// The address resolver, for starting and inspecting lookups.
    pub fn arp(&mut self) -> &mut ArpCache {
        &mut self.arp
    }

    /// Creates a TCP socket owned by the stack.
    pub fn open_tcp(&mut self, config: TcpSocketConfig) -> TcpHandle {
        self.tcp_sockets.push(TcpSocket::new(config));
        TcpHandle(self.tcp_sockets.len() - 1)
    }

    pub fn tcp_socket(&self, handle: TcpHandle) -> &TcpSocket {
        &self.tcp_sockets[handle.0]
    }

    pub fn tcp_socket_mut(&mut self, handle: TcpHandle) -> &mut TcpSocket {
        &mut self.tcp_sockets[handle.0]
    }

    /// Binds a socket to `port` and starts listening.
    pub fn listen_tcp(&mut self, handle: TcpHandle, port: u16, iss: Iss) -> Result<(), StackError> {
        self.check_tcp_port_free(handle, port)?;
        self.tcp_sockets[handle.0]
            .open_listen(port, iss.into())
            .map_err(SocketError::from)?;
        Ok(())
    }

    /// Binds a socket to `local_port` and starts connecting to
    /// `remote`, whose hardware address the caller supplies.
    pub fn dial_tcp(
        &mut self,
        handle: TcpHandle,
        local_port: u16,
        remote_mac: MacAddress,
        remote: Endpoint,
        iss: Iss,
    ) -> Result<(), StackError> {
        self.check_tcp_port_free(handle, local_port)?;
        self.tcp_sockets[handle.0]
            .open_dial(local_port, remote_mac, remote, iss.into())
            .map_err(SocketError::from)?;
        Ok(())
    }

    fn check_tcp_port_free(&self, handle: TcpHandle, port: u16) -> Result<(), StackError> {
        let busy = self.tcp_sockets.iter().enumerate().any(|(i, socket)| {
            i != handle.0 && socket.port() == Some(port) && socket.state() != State::Closed
        });
        if busy {
            return Err(StackError::PortInUse(port));
        }
        Ok(())
    }

    /// Creates a UDP socket bound to `port`.
    pub fn open_udp(&mut self, port: u16) -> Result<UdpHandle, StackError> {
        if self.udp_sockets.iter().any(|socket| socket.port() == port) {
            return Err(StackError::PortInUse(port));
        }
        self.udp_sockets.push(UdpSocket::new(port));
        Ok(UdpHandle(self.udp_sockets.len() - 1))
    }

    pub fn udp_socket_mut(&mut self, handle: UdpHandle) -> &mut UdpSocket {
        &mut self.udp_sockets[handle.0]
    }

    /// Ingests one received Ethernet frame and demultiplexes it to
    /// the owning protocol or socket. Errors with
    /// [`StackError::is_drop`] mean the frame was discarded; the stack
    /// itself is unaffected.
    pub fn recv_eth(&mut self, frame: &[u8]) -> Result<(), StackError> {
        let eth = EthernetHeader::from_bytes(frame.iter().copied())?;
        if eth.destination != self.mac && eth.destination != MacAddress::BROADCAST {
            return Err(StackError::Dropped("frame for another station"));
        }
        let payload = &frame[ethernet::HEADER_OCTETS..];
        match eth.ethertype {
            ETHERTYPE_ARP => {
                let packet = ArpPacket::from_bytes(payload.iter().copied())?;
                self.arp.handle_packet(packet, self.mac, self.addr);
                Ok(())
            }
            ETHERTYPE_IPV4 => {
                let ip = ipv4::Ipv4Header::from_bytes(payload.iter().copied())?;
                if ip.destination != self.addr && ip.destination != Ipv4Address::BROADCAST {
                    return Err(StackError::Dropped("datagram for another host"));
                }
                let total = ip.total_length as usize;
                if total < ipv4::HEADER_OCTETS as usize || payload.len() < total {
                    return Err(StackError::Dropped("truncated datagram"));
                }
                let transport = &payload[ipv4::HEADER_OCTETS as usize..total];
                match ip.protocol {
                    PROTOCOL_TCP => self.recv_tcp(eth.source, ip.source, ip.destination, transport),
                    PROTOCOL_UDP => self.recv_udp(ip.source, ip.destination, transport),
                    _ => Err(StackError::Dropped("unhandled transport protocol")),
                }
            }
            _ => Err(StackError::Dropped("unhandled ethertype")),
        }
    }

    fn recv_tcp(
        &mut self,
        remote_mac: MacAddress,
        remote_ip: Ipv4Address,
        local_ip: Ipv4Address,
        transport: &[u8],
    ) -> Result<(), StackError> {
        let header = TcpHeader::from_bytes(transport.iter().copied(), remote_ip, local_ip)?;
        let payload = &transport[tcp_parsing::HEADER_OCTETS as usize..];
        let remote = Endpoint::new(remote_ip, header.src_port);

        // An exact connection match wins over a listener on the port.
        let index = self
            .tcp_sockets
            .iter()
            .position(|socket| {
                socket.port() == Some(header.dst_port) && socket.remote() == Some(remote)
            })
            .or_else(|| {
                self.tcp_sockets.iter().position(|socket| {
                    socket.port() == Some(header.dst_port) && socket.state() == State::Listen
                })
            })
            .ok_or(StackError::Dropped("no TCP socket on port"))?;
        self.tcp_sockets[index].recv_segment(remote_mac, remote, &header, payload)?;
        Ok(())
    }

    fn recv_udp(
        &mut self,
        remote_ip: Ipv4Address,
        local_ip: Ipv4Address,
        transport: &[u8],
    ) -> Result<(), StackError> {
        let header = UdpHeader::from_bytes_ipv4(
            transport.iter().copied(),
            transport.len(),
            remote_ip,
            local_ip,
        )?;
        let payload = transport[udp_parsing::HEADER_OCTETS as usize..].to_vec();
        let socket = self
            .udp_sockets
            .iter_mut()
            .find(|socket| socket.port() == header.destination)
            .ok_or(StackError::Dropped("no UDP socket on port"))?;
        socket.deliver(Endpoint::new(remote_ip, header.source), payload);
        Ok(())
    }

    /// Writes at most one pending outgoing frame into `frame` and
    /// returns its length, or 0 when nothing is waiting to be sent.
    /// ARP traffic goes first since resolution unblocks everything
    /// else, then queued UDP datagrams, then the TCP sockets in order.
    pub fn handle_eth(&mut self, frame: &mut [u8]) -> Result<usize, StackError> {
        if let Some(packet) = self.arp.take_outgoing(self.mac, self.addr) {
            let destination = match packet.operation {
                Operation::Request => MacAddress::BROADCAST,
                Operation::Reply => packet.target_mac,
            };
            return emit_frame(
                frame,
                EthernetHeader::new(destination, self.mac, ETHERTYPE_ARP),
                &[&packet.build()],
            );
        }

        for socket in &mut self.udp_sockets {
            if let Some((remote, remote_mac, payload)) = socket.take_outgoing() {
                let local_port = socket.port();
                let udp = build_udp_header(
                    self.addr,
                    local_port,
                    remote.address,
                    remote.port,
                    payload.iter().copied(),
                )?;
                let ip = Ipv4HeaderBuilder::new(
                    self.addr,
                    remote.address,
                    PROTOCOL_UDP,
                    (udp.len() + payload.len()) as u16,
                )
                .build()?;
                return emit_frame(
                    frame,
                    EthernetHeader::new(remote_mac, self.mac, ETHERTYPE_IPV4),
                    &[&ip, &udp, &payload],
                );
            }
        }

        let mtu_payload = self.mtu.saturating_sub(
            ethernet::HEADER_OCTETS
                + ipv4::HEADER_OCTETS as usize
                + tcp_parsing::HEADER_OCTETS as usize,
        );
        for socket in &mut self.tcp_sockets {
            if let Some(out) = socket.poll_transmit(mtu_payload) {
                let tcp = TcpHeaderBuilder::from_segment(out.local_port, out.remote.port, out.segment)
                    .build(self.addr, out.remote.address, out.payload.iter().copied());
                let ip = Ipv4HeaderBuilder::new(
                    self.addr,
                    out.remote.address,
                    PROTOCOL_TCP,
                    (tcp.len() + out.payload.len()) as u16,
                )
                .build()?;
                return emit_frame(
                    frame,
                    EthernetHeader::new(out.remote_mac, self.mac, ETHERTYPE_IPV4),
                    &[&ip, &tcp, &out.payload],
                );
            }
        }

        Ok(0)
    }
}

/// Assembles an Ethernet frame from header and payload parts.
fn emit_frame(
    frame: &mut [u8],
    header: EthernetHeader,
    parts: &[&[u8]],
) -> Result<usize, StackError> {
    let total = ethernet::HEADER_OCTETS + parts.iter().map(|part| part.len()).sum::<usize>();
    if frame.len() < total {
        return Err(StackError::BufferTooSmall);
    }
    let eth = header.build();
    let mut at = 0;
    for part in std::iter::once(&eth[..]).chain(parts.iter().copied()) {
        frame[at..at + part.len()].copy_from_slice(part);
        at += part.len();
    }
    Ok(total)
}
