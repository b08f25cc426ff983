//! A pure TCP transmission control block.
//!
//! [`Tcb`] implements the sender and receiver halves of the RFC 9293
//! state machine as decisions over individual segments. It owns the
//! send and receive sequence spaces and the short queue of control
//! flags owed to the wire, and it never performs I/O: the caller
//! proposes an outgoing segment (usually obtained from
//! [`Tcb::pending_segment`]) and confirms transmission with
//! [`Tcb::send`], or reports an incoming segment with
//! [`Tcb::receive`]. Either the segment is committed to the block's
//! state or it is rejected and the block is left untouched.
//!
//! The engine requires sequential delivery: a segment whose sequence
//! number is not exactly the next expected byte is rejected with
//! [`TcbError::RequireSequential`]. Reordering, reassembly, and
//! retransmission are the caller's problem, as are all timers. The
//! TIME-WAIT timeout in particular is delivered by the caller as
//! [`Tcb::abort`].

pub mod modular_cmp;
mod pending;
mod receive_sequence_space;
mod segment;
mod send_sequence_space;
mod state;

pub use segment::{Flags, Segment};
pub use state::State;

use modular_cmp::{in_window, mod_bounded, Leq};
use pending::PendingQueue;
use receive_sequence_space::ReceiveSequenceSpace;
use send_sequence_space::SendSequenceSpace;
use thiserror::Error as ThisError;

/// The largest window either side may advertise, limited by the
/// 16-bit window field of the wire header.
const MAX_WND: u32 = u16::MAX as u32;

/// Errors returned by the control block.
///
/// The `reject` category ([`TcbError::is_reject`]) marks segments the
/// caller should drop and otherwise ignore; the block's state is
/// byte-for-byte unchanged. The remaining errors signal a misuse of
/// the API or a protocol violation by the peer, after which the caller
/// typically resets the connection.
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum TcbError {
    /// Open was called on a TCB that is neither CLOSED nor LISTEN.
    #[error("TCB not closed")]
    NotClosed,
    /// Open was called with a target state other than LISTEN or
    /// SYN-SENT.
    #[error("open expects LISTEN or SYN-SENT")]
    InvalidState,
    /// Close was called on a CLOSED TCB.
    #[error("connection does not exist")]
    ConnNotExist,
    /// Close was called on a connection already past the point of
    /// closing.
    #[error("connection closing")]
    ConnectionClosing,
    /// The handshake expected a SYN and the segment carried none, or
    /// a listener saw anything besides a bare SYN.
    #[error("expected SYN")]
    ExpectedSyn,
    /// The acknowledgment field contradicts the handshake.
    #[error("bad segment acknowledgement")]
    BadSegack,
    /// FIN-WAIT-1 received a segment with neither an ACK nor a FIN.
    #[error("fin-wait-1 expected ACK")]
    FinWait1ExpectedAck,
    /// FIN-WAIT-2 received a segment without a FIN.
    #[error("fin-wait-2 expected FIN|ACK")]
    FinWait2ExpectedFinack,
    /// Reject: a window field exceeds what 16 bits can encode.
    #[error("reject: window larger than 2**16-1")]
    WindowOverflow,
    /// Reject: the segment occupies sequence space we cannot accept.
    #[error("reject: seq not in window")]
    SeqNotInWindow,
    /// Reject: the segment's last byte falls outside the receive
    /// window.
    #[error("reject: last byte not in window")]
    LastNotInWindow,
    /// Reject: the segment is not the next expected one. This engine
    /// does not reorder.
    #[error("reject: seq != rcv.nxt, segments must arrive in order")]
    RequireSequential,
    /// Reject: the acknowledgment is outside `[snd.una, snd.nxt]`.
    #[error("reject: ack outside [snd.una, snd.nxt]")]
    AckNotNext,
    /// Reject: the outgoing segment carries control bits that are
    /// neither queued nor natural to the current state.
    #[error("reject: flags not permitted in this state")]
    FlagsNotAllowed,
}

impl TcbError {
    /// Whether the caller should simply drop the offending segment and
    /// carry on.
    pub fn is_reject(self) -> bool {
        matches!(
            self,
            TcbError::WindowOverflow
                | TcbError::SeqNotInWindow
                | TcbError::LastNotInWindow
                | TcbError::RequireSequential
                | TcbError::AckNotNext
                | TcbError::FlagsNotAllowed
        )
    }
}

/// A TCP transmission control block.
///
/// Created in the CLOSED state; [`Tcb::open`] begins a passive or
/// active connection and the segment exchange drives it around the
/// connection diagram. All storage is inline and fixed-size; no
/// operation allocates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tcb {
    state: State,
    snd: SendSequenceSpace,
    rcv: ReceiveSequenceSpace,
    pending: PendingQueue,
}

impl Tcb {
    /// Creates a control block with no connection state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current connection state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The next sequence number expected from the remote, which is
    /// also the only sequence number the block will accept. 0 before a
    /// SYN has been received.
    pub fn recv_next(&self) -> u32 {
        self.rcv.nxt
    }

    /// The locally advertised receive window. 0 once closed.
    pub fn recv_window(&self) -> u32 {
        self.rcv.wnd
    }

    /// The initial send sequence number fixed by [`Tcb::open`].
    pub fn iss(&self) -> u32 {
        self.snd.iss
    }

    /// Advertises a new receive window. The next outgoing segment
    /// carries it to the peer.
    pub fn set_recv_window(&mut self, wnd: u32) {
        self.rcv.wnd = wnd;
    }

    /// The most payload the peer can currently accept, accounting for
    /// sequence numbers already in flight. One sequence number is held
    /// back so a control flag always fits in the window. 0 before the
    /// remote ISS is known.
    pub fn max_in_flight_data(&self) -> u32 {
        if !self.state.is_synchronized() {
            return 0;
        }
        self.snd
            .wnd
            .saturating_sub(self.snd.in_flight())
            .saturating_sub(1)
    }

    /// Opens the connection, passively (LISTEN) or actively
    /// (SYN-SENT). `iss` seeds the send sequence space and `wnd` is
    /// the local receive window. Permitted from CLOSED or LISTEN only.
    pub fn open(&mut self, iss: u32, wnd: u32, state: State) -> Result<(), TcbError> {
        if self.state != State::Closed && self.state != State::Listen {
            return Err(TcbError::NotClosed);
        }
        if state != State::Listen && state != State::SynSent {
            return Err(TcbError::InvalidState);
        }
        if wnd > MAX_WND {
            return Err(TcbError::WindowOverflow);
        }
        self.state = state;
        self.rcv.reset(wnd, 0);
        // The peer's window is unknown until its first segment; leave
        // just enough room for our SYN.
        self.snd.reset(iss, 1);
        self.pending.clear();
        if state == State::SynSent {
            self.pending.push(Flags::SYN);
        }
        tracing::debug!(%state, iss, wnd, "open");
        Ok(())
    }

    /// Closes the connection as described by RFC 9293 section 3.10.4.
    /// From the synchronized states this queues a FIN; callers are
    /// expected to have no more data to send.
    pub fn close(&mut self) -> Result<(), TcbError> {
        match self.state {
            State::Closed => return Err(TcbError::ConnNotExist),
            State::Listen | State::SynSent => self.drop_connection(),
            State::SynReceived | State::Established => {
                let front = (self.pending.front() & Flags::ACK) | Flags::FIN;
                self.pending.set_front(front);
            }
            State::CloseWait => {
                self.state = State::LastAck;
                self.pending.clear();
                self.pending.push(Flags::FINACK);
            }
            State::FinWait2 | State::TimeWait => return Err(TcbError::ConnectionClosing),
            State::FinWait1 | State::Closing | State::LastAck => {}
        }
        Ok(())
    }

    /// Unconditionally tears the connection down to CLOSED, clearing
    /// all state. This stands in for both a reset and the TIME-WAIT
    /// timeout, which are the caller's to deliver.
    pub fn abort(&mut self) {
        self.drop_connection();
    }

    fn drop_connection(&mut self) {
        self.state = State::Closed;
        self.snd = SendSequenceSpace::default();
        self.rcv = ReceiveSequenceSpace::default();
        self.pending.clear();
    }

    /// Constructs the next segment the caller should place on the
    /// wire, combining the owed control flags with up to `payload_len`
    /// bytes of data. Returns the zero segment when nothing is owed
    /// and no data can be sent.
    ///
    /// The segment is a proposal: it takes effect only once the caller
    /// confirms transmission through [`Tcb::send`].
    pub fn pending_segment(&self, payload_len: u32) -> Segment {
        let can_carry_data = matches!(self.state, State::Established | State::CloseWait);
        let payload_len = if can_carry_data { payload_len } else { 0 };
        if self.pending.front().is_empty() && payload_len == 0 {
            return Segment::default();
        }
        let mut flags = self.pending.front();
        if payload_len > 0 {
            flags |= Flags::PSH;
        }
        if self.state.is_synchronized() {
            // Everything after the handshake acknowledges.
            flags |= Flags::ACK;
        }
        let ack = if flags.ack() { self.rcv.nxt } else { 0 };
        Segment {
            seq: self.snd.nxt,
            ack,
            datalen: payload_len,
            wnd: self.rcv.wnd,
            flags,
        }
    }

    /// Processes a segment the caller is about to transmit, committing
    /// its effect on the send space, the pending-flag queue, and the
    /// connection state. A rejected segment leaves the block untouched
    /// and must not be placed on the wire.
    pub fn send(&mut self, seg: Segment) -> Result<(), TcbError> {
        self.validate_outgoing(&seg)?;

        let has_fin = seg.flags.fin();
        let has_ack = seg.flags.ack();
        let mut queue_after = Flags::NONE;
        match self.state {
            State::SynReceived if has_fin => self.state = State::FinWait1,
            State::Established if has_fin => self.state = State::FinWait1,
            State::Closing if has_ack => self.state = State::TimeWait,
            State::CloseWait if has_fin => self.state = State::LastAck,
            State::CloseWait if has_ack => {
                // The remote is done sending; our FIN follows the data.
                queue_after = Flags::FINACK;
            }
            _ => {}
        }

        self.pending.advance(seg.flags);
        self.pending.or_front(queue_after);

        self.snd.nxt = self.snd.nxt.wrapping_add(seg.seg_len());
        self.rcv.wnd = seg.wnd;
        Ok(())
    }

    /// Processes a segment received from the network, committing its
    /// effect if it is acceptable. Only the exact next expected
    /// sequence number is accepted; the caller must deliver segments
    /// in order and retry after a reject.
    ///
    /// Calling this on a CLOSED block is a caller bug and panics.
    pub fn receive(&mut self, seg: Segment) -> Result<(), TcbError> {
        self.validate_incoming(&seg)?;

        let prev_nxt = self.snd.nxt;
        let pending = match self.state {
            State::Listen => self.rcv_listen(&seg),
            State::SynSent => self.rcv_syn_sent(&seg)?,
            State::SynReceived => self.rcv_syn_received(&seg)?,
            State::Established => self.rcv_established(&seg),
            State::FinWait1 => self.rcv_fin_wait1(&seg)?,
            State::FinWait2 => self.rcv_fin_wait2(&seg)?,
            State::Closing => self.rcv_closing(&seg),
            State::CloseWait | State::TimeWait => Flags::NONE,
            State::LastAck => {
                if seg.flags.ack() {
                    self.drop_connection();
                    return Ok(());
                }
                Flags::NONE
            }
            State::Closed => unreachable!("receive on a closed TCB"),
        };

        self.pending.set_front(pending);

        self.snd.wnd = seg.wnd;
        self.snd.wl1 = seg.seq;
        self.snd.wl2 = seg.ack;
        if seg.flags.ack() {
            self.snd.una = seg.ack;
        }
        self.rcv.nxt = self.rcv.nxt.wrapping_add(seg.seg_len());

        if prev_nxt != 0 && self.snd.nxt != prev_nxt {
            tracing::debug!(
                state = %self.state,
                seg_ack = seg.ack,
                seg_seq = seg.seq,
                snd_nxt = self.snd.nxt,
                prev_nxt,
                "snd.nxt changed during receive"
            );
        }
        Ok(())
    }

    fn validate_outgoing(&self, seg: &Segment) -> Result<(), TcbError> {
        if seg.wnd > MAX_WND {
            return Err(TcbError::WindowOverflow);
        }
        // The engine emits strictly contiguous sequence numbers.
        if seg.seq != self.snd.nxt {
            return Err(TcbError::SeqNotInWindow);
        }
        if seg.flags.ack() && seg.ack != self.rcv.nxt {
            return Err(TcbError::AckNotNext);
        }
        let allowed = self.pending.front() | self.state.natural_flags();
        if !allowed.has_all(seg.flags) {
            return Err(TcbError::FlagsNotAllowed);
        }
        Ok(())
    }

    fn validate_incoming(&self, seg: &Segment) -> Result<(), TcbError> {
        if seg.wnd > MAX_WND {
            return Err(TcbError::WindowOverflow);
        }
        match self.state {
            State::Listen => {
                // Only a bare SYN opens a passive connection.
                if !seg.flags.syn() || seg.flags.has_any(Flags::ACK | Flags::FIN | Flags::RST) {
                    return Err(TcbError::ExpectedSyn);
                }
                return Ok(());
            }
            State::SynSent => {
                if !seg.flags.syn() {
                    return Err(TcbError::ExpectedSyn);
                }
                return Ok(());
            }
            _ => {}
        }
        if seg.flags.syn() {
            // Sequence numbers are synchronized; a SYN here is old
            // sequence space at best.
            return Err(TcbError::SeqNotInWindow);
        }
        if seg.seg_len() > 0 && !in_window(seg.last(), self.rcv.nxt, self.rcv.wnd) {
            return Err(TcbError::LastNotInWindow);
        }
        if seg.seq != self.rcv.nxt {
            return Err(TcbError::RequireSequential);
        }
        if seg.flags.ack() && !mod_bounded(self.snd.una, Leq, seg.ack, Leq, self.snd.nxt) {
            return Err(TcbError::AckNotNext);
        }
        Ok(())
    }

    fn rcv_listen(&mut self, seg: &Segment) -> Flags {
        // validate_incoming vouched for a bare SYN.
        self.rcv.reset(self.rcv.wnd, seg.seq);
        self.snd.reset(self.snd.iss, seg.wnd);
        self.state = State::SynReceived;
        Flags::SYNACK
    }

    fn rcv_syn_sent(&mut self, seg: &Segment) -> Result<Flags, TcbError> {
        let pending = if seg.flags.ack() {
            if seg.ack != self.snd.una.wrapping_add(1) {
                return Err(TcbError::BadSegack);
            }
            self.state = State::Established;
            Flags::ACK
        } else {
            // Simultaneous open, RFC 9293 figure 7. Answer with
            // SYN|ACK; rewind snd so ours reuses the ISS.
            self.state = State::SynReceived;
            self.snd.reset(self.snd.iss, seg.wnd);
            Flags::SYNACK
        };
        self.rcv.reset(self.rcv.wnd, seg.seq);
        Ok(pending)
    }

    fn rcv_syn_received(&mut self, seg: &Segment) -> Result<Flags, TcbError> {
        if !seg.flags.ack() {
            return Err(TcbError::BadSegack);
        }
        if seg.ack != self.snd.una.wrapping_add(1) {
            return Err(TcbError::BadSegack);
        }
        self.state = State::Established;
        Ok(if seg.seg_len() > 0 {
            Flags::ACK
        } else {
            Flags::NONE
        })
    }

    fn rcv_established(&mut self, seg: &Segment) -> Flags {
        if seg.flags.fin() {
            self.state = State::CloseWait;
            Flags::ACK
        } else if seg.seg_len() > 0 {
            Flags::ACK
        } else {
            Flags::NONE
        }
    }

    fn rcv_fin_wait1(&mut self, seg: &Segment) -> Result<Flags, TcbError> {
        let acks_our_fin = seg.flags.ack() && seg.ack == self.snd.nxt;
        if seg.flags.fin() {
            // Both FIN-processing outcomes owe the peer an ACK; which
            // state we land in depends on whether our own FIN is
            // acknowledged too.
            self.state = if acks_our_fin {
                State::TimeWait
            } else {
                State::Closing
            };
            Ok(Flags::ACK)
        } else if acks_our_fin {
            self.state = State::FinWait2;
            Ok(Flags::NONE)
        } else if !seg.flags.ack() {
            Err(TcbError::FinWait1ExpectedAck)
        } else {
            // An ACK of older data; hold our ground and acknowledge
            // anything it carried.
            Ok(if seg.seg_len() > 0 {
                Flags::ACK
            } else {
                Flags::NONE
            })
        }
    }

    fn rcv_fin_wait2(&mut self, seg: &Segment) -> Result<Flags, TcbError> {
        if !seg.flags.fin() {
            return Err(TcbError::FinWait2ExpectedFinack);
        }
        self.state = State::TimeWait;
        Ok(Flags::ACK)
    }

    fn rcv_closing(&mut self, seg: &Segment) -> Flags {
        if seg.flags.ack() && seg.ack == self.snd.nxt {
            self.state = State::TimeWait;
        }
        Flags::NONE
    }
}
