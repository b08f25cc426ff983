use super::segment::Flags;
use std::fmt::{self, Display};

/// The state of the TCP state machine as described in RFC 9293
/// section 3.3.2, including the CLOSED and LISTEN quiet states.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No connection state at all.
    #[default]
    Closed,
    /// Waiting for a connection request from any remote TCP peer and
    /// port.
    Listen,
    /// Waiting for a matching connection request after having sent a
    /// connection request.
    SynSent,
    /// Waiting for a confirming connection request acknowledgment after
    /// having both received and sent a connection request.
    SynReceived,
    /// An open connection, data received can be delivered to the user.
    /// The normal state for the data transfer phase of the connection.
    Established,
    /// Waiting for a connection termination request from the remote
    /// TCP, or an acknowledgment of the connection termination request
    /// previously sent.
    FinWait1,
    /// Waiting for a connection termination request from the remote
    /// TCP.
    FinWait2,
    /// Waiting for a connection termination request from the local
    /// user.
    CloseWait,
    /// Waiting for a connection termination request acknowledgment from
    /// the remote TCP.
    Closing,
    /// Waiting for an acknowledgment of the connection termination
    /// request previously sent to the remote TCP (which includes an
    /// acknowledgment of its connection termination request).
    LastAck,
    /// Waiting for enough time to pass to be sure the remote TCP
    /// received the acknowledgment of its connection termination
    /// request.
    TimeWait,
}

impl State {
    /// Whether a SYN from the peer has been consumed, fixing the
    /// initial receive sequence and synchronizing sequence numbers.
    pub fn is_synchronized(self) -> bool {
        !matches!(self, State::Closed | State::Listen | State::SynSent)
    }

    /// Control bits a segment may carry out of this state without
    /// having been queued first.
    pub(crate) fn natural_flags(self) -> Flags {
        match self {
            State::Closed | State::Listen => Flags::NONE,
            State::SynSent => Flags::SYN,
            State::SynReceived => Flags::SYNACK,
            State::Established | State::CloseWait => Flags::ACK | Flags::PSH | Flags::FIN,
            State::FinWait1 | State::LastAck => Flags::FINACK,
            State::FinWait2 | State::Closing | State::TimeWait => Flags::ACK,
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            State::Closed => write!(f, "CLOSED"),
            State::Listen => write!(f, "LISTEN"),
            State::SynSent => write!(f, "SYN-SENT"),
            State::SynReceived => write!(f, "SYN-RECEIVED"),
            State::Established => write!(f, "ESTABLISHED"),
            State::FinWait1 => write!(f, "FIN-WAIT-1"),
            State::FinWait2 => write!(f, "FIN-WAIT-2"),
            State::CloseWait => write!(f, "CLOSE-WAIT"),
            State::Closing => write!(f, "CLOSING"),
            State::LastAck => write!(f, "LAST-ACK"),
            State::TimeWait => write!(f, "TIME-WAIT"),
        }
    }
}
