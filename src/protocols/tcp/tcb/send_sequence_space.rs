use super::modular_cmp::seq_size;

//      1         2          3          4
// ----------|----------|----------|----------
//        SND.UNA    SND.NXT    SND.UNA
//                             +SND.WND
//
// 1 - old sequence numbers which have been acknowledged
// 2 - sequence numbers of unacknowledged data
// 3 - sequence numbers allowed for new data transmission (send window)
// 4 - future sequence numbers which are not yet allowed
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct SendSequenceSpace {
    /// Oldest unacknowledged sequence number
    pub una: u32,
    /// Next sequence number to be sent
    pub nxt: u32,
    /// The size of the remote TCP's receive window. Fits in 16 bits.
    pub wnd: u32,
    /// Urgent pointer; carried but not interpreted
    pub up: u32,
    /// Segment sequence number used for last window update
    pub wl1: u32,
    /// Segment acknowledgment number used for last window update
    pub wl2: u32,
    /// Initial send sequence number
    pub iss: u32,
}

impl SendSequenceSpace {
    /// Reinitializes the space for a fresh connection attempt. `nxt`
    /// starts at the ISS itself; sending the SYN consumes the first
    /// sequence number and advances it.
    pub fn reset(&mut self, iss: u32, remote_wnd: u32) {
        *self = Self {
            iss,
            una: iss,
            nxt: iss,
            wnd: remote_wnd,
            ..Default::default()
        };
    }

    /// Sequence numbers sent but not yet acknowledged, control bits
    /// included.
    pub fn in_flight(&self) -> u32 {
        seq_size(self.una, self.nxt)
    }
}
