use super::tcb::{Segment, State, Tcb, TcbError};
use super::tcp_parsing::TcpHeader;
use crate::protocols::ethernet::MacAddress;
use crate::protocols::utility::Endpoint;
use crate::stack::ring::RingBuffer;
use thiserror::Error as ThisError;

/// Buffer sizing for a TCP socket.
#[derive(Debug, Clone, Copy)]
pub struct TcpSocketConfig {
    pub tx_buf_size: usize,
    pub rx_buf_size: usize,
}

impl Default for TcpSocketConfig {
    fn default() -> Self {
        Self {
            tx_buf_size: 2048,
            rx_buf_size: 2048,
        }
    }
}

/// Errors surfaced by a [`TcpSocket`].
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    #[error(transparent)]
    Tcb(#[from] TcbError),
    #[error("the socket is not open")]
    NotOpen,
    #[error("the connection is closing")]
    Closing,
    #[error("segment from an unrelated peer")]
    ForeignPeer,
    #[error("the receive buffer cannot hold the segment payload")]
    RxBufferFull,
}

/// One finished outgoing segment: the engine-approved header fields,
/// the payload bytes consumed from the transmit ring, and where the
/// frame should go.
#[derive(Debug)]
pub(crate) struct OutgoingSegment {
    pub segment: Segment,
    pub payload: Vec<u8>,
    pub local_port: u16,
    pub remote: Endpoint,
    pub remote_mac: MacAddress,
}

/// A TCP socket: transmit and receive rings around a pure [`Tcb`].
///
/// The socket performs no I/O and keeps no timers. The stack feeds it
/// accepted segments through `recv_segment` and drains it one segment
/// at a time through `poll_transmit`; the user exchanges bytes with
/// [`TcpSocket::write`] and [`TcpSocket::read`].
///
/// There is no retransmission queue. Payload bytes leave the transmit
/// ring the moment the engine commits their segment, so a lossy link
/// needs recovery above this layer.
#[derive(Debug)]
pub struct TcpSocket {
    tcb: Tcb,
    tx: RingBuffer,
    rx: RingBuffer,
    local_port: Option<u16>,
    remote: Option<Endpoint>,
    remote_mac: Option<MacAddress>,
}

impl TcpSocket {
    pub fn new(config: TcpSocketConfig) -> Self {
        Self {
            tcb: Tcb::new(),
            tx: RingBuffer::new(config.tx_buf_size),
            rx: RingBuffer::new(config.rx_buf_size),
            local_port: None,
            remote: None,
            remote_mac: None,
        }
    }

    /// The connection state of the underlying control block.
    pub fn state(&self) -> State {
        self.tcb.state()
    }

    /// The bound local port, if the socket has been opened.
    pub fn port(&self) -> Option<u16> {
        self.local_port
    }

    /// The remote endpoint: the dial target, or the peer a listener
    /// accepted.
    pub fn remote(&self) -> Option<Endpoint> {
        self.remote
    }

    /// Bytes buffered and ready for [`TcpSocket::read`].
    pub fn buffered_input(&self) -> usize {
        self.rx.len()
    }

    /// Starts listening for a connection on `port`.
    pub fn open_listen(&mut self, port: u16, iss: u32) -> Result<(), TcbError> {
        self.tcb.open(iss, self.initial_window(), State::Listen)?;
        self.local_port = Some(port);
        self.remote = None;
        self.remote_mac = None;
        self.tx.clear();
        self.rx.clear();
        Ok(())
    }

    /// Starts actively connecting to `remote`, whose hardware address
    /// the caller has already resolved.
    pub fn open_dial(
        &mut self,
        local_port: u16,
        remote_mac: MacAddress,
        remote: Endpoint,
        iss: u32,
    ) -> Result<(), TcbError> {
        self.tcb.open(iss, self.initial_window(), State::SynSent)?;
        self.local_port = Some(local_port);
        self.remote = Some(remote);
        self.remote_mac = Some(remote_mac);
        self.tx.clear();
        self.rx.clear();
        Ok(())
    }

    fn initial_window(&self) -> u32 {
        (self.rx.capacity() as u32).min(u16::MAX as u32)
    }

    /// Queues bytes for transmission and returns how many fit in the
    /// buffer. Data may be queued as soon as the socket opens; it
    /// rides out once the connection establishes.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, SocketError> {
        match self.tcb.state() {
            State::Closed => return Err(SocketError::NotOpen),
            State::Listen
            | State::SynSent
            | State::SynReceived
            | State::Established
            | State::CloseWait => {}
            _ => return Err(SocketError::Closing),
        }
        Ok(self.tx.enqueue_slice(data))
    }

    /// Moves received bytes into `buf` and returns how many were
    /// copied. Freed buffer space widens the advertised window.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let taken = self.rx.dequeue_slice(buf);
        self.update_recv_window();
        taken
    }

    /// Closes the sending half; see [`Tcb::close`].
    pub fn close(&mut self) -> Result<(), TcbError> {
        self.tcb.close()
    }

    /// Drops the connection on the spot.
    pub fn abort(&mut self) {
        self.tcb.abort();
    }

    /// Digests one segment addressed to this socket.
    pub(crate) fn recv_segment(
        &mut self,
        remote_mac: MacAddress,
        remote: Endpoint,
        header: &TcpHeader,
        payload: &[u8],
    ) -> Result<(), SocketError> {
        match self.tcb.state() {
            State::Closed => return Err(SocketError::NotOpen),
            State::Listen => {
                // The handshake pins the peer for the rest of the
                // connection.
                self.remote = Some(remote);
                self.remote_mac = Some(remote_mac);
            }
            _ => {
                if self.remote != Some(remote) {
                    return Err(SocketError::ForeignPeer);
                }
            }
        }
        if payload.len() > self.rx.free() {
            return Err(SocketError::RxBufferFull);
        }
        self.tcb.receive(header.segment(payload.len()))?;
        let taken = self.rx.enqueue_slice(payload);
        debug_assert_eq!(taken, payload.len());
        self.update_recv_window();
        Ok(())
    }

    /// Produces the next segment owed to the wire, consuming its
    /// payload from the transmit ring, or `None` when the socket has
    /// nothing to say.
    pub(crate) fn poll_transmit(&mut self, mtu_payload: usize) -> Option<OutgoingSegment> {
        if matches!(self.tcb.state(), State::Closed | State::Listen) {
            return None;
        }
        let budget = self
            .tx
            .len()
            .min(self.tcb.max_in_flight_data() as usize)
            .min(mtu_payload);
        let segment = self.tcb.pending_segment(budget as u32);
        if segment.is_empty() {
            if self.tcb.state() == State::TimeWait {
                // Nothing further is owed; being driven again stands in
                // for the 2 MSL timer.
                self.tcb.abort();
            }
            return None;
        }
        let local_port = self.local_port?;
        let remote = self.remote?;
        let remote_mac = self.remote_mac?;
        if let Err(err) = self.tcb.send(segment) {
            tracing::warn!(%err, seq = segment.seq, "not transmitting segment");
            return None;
        }
        let mut payload = vec![0; segment.datalen as usize];
        let taken = self.tx.dequeue_slice(&mut payload);
        debug_assert_eq!(taken, payload.len());
        if self.tcb.state() == State::TimeWait && self.tcb.pending_segment(0).is_empty() {
            self.tcb.abort();
        }
        Some(OutgoingSegment {
            segment,
            payload,
            local_port,
            remote,
            remote_mac,
        })
    }

    fn update_recv_window(&mut self) {
        if self.tcb.state() != State::Closed {
            self.tcb
                .set_recv_window((self.rx.free() as u32).min(u16::MAX as u32));
        }
    }
}
